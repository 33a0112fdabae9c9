// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The reboot coordinator
//!
//! Reboot requests are recorded as a flag on the requesting machine.  What a
//! machine must actually do is derived on demand from the flags along its
//! ancestor chain (see [`crate::decision`]): a flagged machine reboots, and
//! everything it hosts, directly or through nested containers, shuts down.
//! Nothing derived is ever cached, so clearing a flag takes effect on the next
//! query without any cleanup.

use crate::authz::Authorizer;
use crate::config::WatchScope;
use crate::decision::decide_action;
use crate::decision::RebootAction;
use crate::error::Error;
use crate::hierarchy::HierarchyStore;
use crate::machine::MachineId;
use crate::notifier::ChangeNotifier;
use crate::notifier::Notification;
use crate::resources::Resources;
use slog::debug;
use slog::info;
use slog::o;
use slog::Logger;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct RebootCoordinator<S> {
    log: Logger,
    store: Arc<S>,
    resources: Resources,
    watch_scope: WatchScope,
}

impl<S: HierarchyStore> RebootCoordinator<S> {
    pub fn new(store: Arc<S>, watch_scope: WatchScope, log: &Logger) -> Self {
        let log = log.new(o!("component" => "RebootCoordinator"));
        let resources = Resources::new(&log);
        RebootCoordinator { log, store, resources, watch_scope }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn watch_scope(&self) -> WatchScope {
        self.watch_scope
    }

    /// Returns the number of live watches.
    pub fn watch_count(&self) -> usize {
        self.resources.len()
    }

    fn authorize(
        &self,
        caller: &dyn Authorizer,
        machine: &MachineId,
    ) -> Result<(), Error> {
        if caller.auth_owner(machine) {
            Ok(())
        } else {
            Err(Error::PermissionDenied)
        }
    }

    /// Returns `machine` followed by its parent, grandparent, and so on up to
    /// its host machine.
    pub async fn ancestor_chain(
        &self,
        machine: &MachineId,
    ) -> Result<Vec<MachineId>, Error> {
        let mut chain = vec![machine.clone()];
        let mut next = self.store.parent(machine).await?;
        while let Some(parent) = next {
            if chain.contains(&parent) {
                return Err(Error::Internal(format!(
                    "machine hierarchy loops back to {parent} above {machine}"
                )));
            }
            next = self.store.parent(&parent).await?;
            chain.push(parent);
        }
        Ok(chain)
    }

    /// Starts a watch that fires when a reboot flag relevant to `machine`
    /// changes, and returns its id.
    ///
    /// Which flags are relevant depends on the configured [`WatchScope`].
    /// Flags of machines hosted by `machine` never are.
    pub async fn watch_for_reboot_event(
        &self,
        caller: &dyn Authorizer,
        machine: &MachineId,
    ) -> Result<String, Error> {
        self.authorize(caller, machine)?;
        let watched = match self.watch_scope {
            WatchScope::Machine => vec![machine.clone()],
            WatchScope::MachineAndAncestors => {
                self.ancestor_chain(machine).await?
            }
        };
        let mut flags = Vec::with_capacity(watched.len());
        for watched_machine in &watched {
            flags.push(self.store.watch_reboot_flag(watched_machine).await?);
        }
        let notifier = ChangeNotifier::new(machine.clone(), flags);
        let id = self.resources.register(notifier);
        debug!(
            self.log,
            "watching for reboot events";
            "machine" => %machine,
            "watcher_id" => &id,
            "watched" => watched.len(),
        );
        Ok(id)
    }

    /// Records a reboot request for `machine`.
    pub async fn request_reboot(
        &self,
        caller: &dyn Authorizer,
        machine: &MachineId,
    ) -> Result<(), Error> {
        self.authorize(caller, machine)?;
        self.store.set_reboot_flag(machine, true).await?;
        info!(self.log, "reboot requested"; "machine" => %machine);
        Ok(())
    }

    /// Withdraws any reboot request for `machine`.
    pub async fn clear_reboot(
        &self,
        caller: &dyn Authorizer,
        machine: &MachineId,
    ) -> Result<(), Error> {
        self.authorize(caller, machine)?;
        self.store.set_reboot_flag(machine, false).await?;
        info!(self.log, "reboot request cleared"; "machine" => %machine);
        Ok(())
    }

    /// Works out what `machine` must do given the current reboot flags.
    pub async fn get_reboot_action(
        &self,
        caller: &dyn Authorizer,
        machine: &MachineId,
    ) -> Result<RebootAction, Error> {
        self.authorize(caller, machine)?;
        let chain = self.ancestor_chain(machine).await?;
        let mut flagged = BTreeSet::new();
        for m in &chain {
            if self.store.reboot_flag(m).await? {
                flagged.insert(m);
            }
        }
        let action = decide_action(&chain, |m| flagged.contains(m));
        debug!(
            self.log,
            "computed reboot action";
            "machine" => %machine,
            "action" => ?action,
        );
        Ok(action)
    }

    /// Waits for the watch `watcher_id` to fire.
    ///
    /// A watch is forgotten once it has reported that it closed, so later
    /// calls for the same id fail with `WatcherNotFound`.
    pub async fn next_event(
        &self,
        watcher_id: &str,
    ) -> Result<Notification, Error> {
        let notifier = self
            .resources
            .get(watcher_id)
            .ok_or_else(|| Error::WatcherNotFound(watcher_id.to_string()))?;
        let notification = notifier.next().await;
        if let Notification::Closed(reason) = notification {
            debug!(
                self.log,
                "watch closed";
                "machine" => %notifier.machine(),
                "watcher_id" => watcher_id,
                "reason" => ?reason,
            );
            self.resources.release(watcher_id);
        }
        Ok(notification)
    }

    /// Stops the watch `watcher_id`.  Unknown or already-stopped watches are
    /// ignored.
    pub fn stop_watcher(&self, watcher_id: &str) {
        self.resources.stop(watcher_id);
    }

    /// Stops every watch handed out by this coordinator.
    pub fn stop_all(&self) {
        info!(self.log, "stopping all reboot watches");
        self.resources.stop_all();
    }
}
