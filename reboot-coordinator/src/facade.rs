// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The reboot API offered to machine agents
//!
//! One [`RebootApi`] exists per connected agent.  Every call takes a batch of
//! machine tags and produces one result per tag: a bad tag, an unknown
//! machine, or a machine the agent may not touch only fails its own slot.
//! Only a failure of the hierarchy store itself fails a whole call.

use crate::authz::Authorizer;
use crate::coordinator::RebootCoordinator;
use crate::error::Error;
use crate::hierarchy::HierarchyStore;
use crate::machine::MachineId;
use crate::machine::MachineTag;
use crate::notifier::CloseReason;
use crate::notifier::Notification;
use crate::params::Entities;
use crate::params::ErrorResult;
use crate::params::ErrorResults;
use crate::params::NotifyWatchResult;
use crate::params::NotifyWatchResults;
use crate::params::RebootActionResult;
use crate::params::RebootActionResults;
use crate::params::ServerError;
use slog::o;
use slog::warn;
use slog::Logger;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;

pub struct RebootApi<S: HierarchyStore> {
    log: Logger,
    coordinator: Arc<RebootCoordinator<S>>,
    auth: Arc<dyn Authorizer>,
    // Watches started through this API, with how each one closed once it
    // has.  Only these may be waited on or stopped through it, and they are
    // stopped when it is dropped.
    watchers: Mutex<BTreeMap<String, Option<CloseReason>>>,
}

impl<S: HierarchyStore> RebootApi<S> {
    /// Creates the API for one caller, who must be a machine agent.
    pub fn new(
        coordinator: Arc<RebootCoordinator<S>>,
        auth: Arc<dyn Authorizer>,
        log: &Logger,
    ) -> Result<Self, Error> {
        if !auth.auth_machine_agent() {
            return Err(Error::PermissionDenied);
        }
        Ok(RebootApi {
            log: log.new(o!("component" => "RebootApi")),
            coordinator,
            auth,
            watchers: Mutex::new(BTreeMap::new()),
        })
    }

    /// Runs `op` for every machine named in `args`, in order.
    async fn each_machine<T, F, Fut>(
        &self,
        args: &Entities,
        op: F,
    ) -> Result<Vec<Result<T, ServerError>>, Error>
    where
        F: Fn(MachineId) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut results = Vec::with_capacity(args.entities.len());
        for entity in &args.entities {
            let outcome = match entity.tag.parse::<MachineTag>() {
                Ok(tag) => op(tag.into_id()).await,
                Err(err) => Err(Error::from(err)),
            };
            match outcome {
                Ok(value) => results.push(Ok(value)),
                Err(err) if err.is_call_level() => {
                    warn!(
                        self.log,
                        "abandoning batch";
                        "tag" => &entity.tag,
                        "error" => %err,
                    );
                    return Err(err);
                }
                Err(err) => results.push(Err(ServerError::from(err))),
            }
        }
        Ok(results)
    }

    /// Starts a watch for reboot events on each machine.
    pub async fn watch_for_reboot_event(
        &self,
        args: &Entities,
    ) -> Result<NotifyWatchResults, Error> {
        let results = self
            .each_machine(args, |machine| async move {
                let id = self
                    .coordinator
                    .watch_for_reboot_event(self.auth.as_ref(), &machine)
                    .await?;
                self.watchers.lock().unwrap().insert(id.clone(), None);
                Ok::<_, Error>(id)
            })
            .await?;
        Ok(NotifyWatchResults {
            results: results
                .into_iter()
                .map(|result| match result {
                    Ok(id) => {
                        NotifyWatchResult { watcher_id: Some(id), error: None }
                    }
                    Err(err) => {
                        NotifyWatchResult { watcher_id: None, error: Some(err) }
                    }
                })
                .collect(),
        })
    }

    /// Asks for each machine to be rebooted.
    pub async fn request_reboot(
        &self,
        args: &Entities,
    ) -> Result<ErrorResults, Error> {
        let results = self
            .each_machine(args, |machine| async move {
                self.coordinator
                    .request_reboot(self.auth.as_ref(), &machine)
                    .await
            })
            .await?;
        Ok(error_results(results))
    }

    /// Withdraws any reboot request for each machine.
    pub async fn clear_reboot(
        &self,
        args: &Entities,
    ) -> Result<ErrorResults, Error> {
        let results = self
            .each_machine(args, |machine| async move {
                self.coordinator
                    .clear_reboot(self.auth.as_ref(), &machine)
                    .await
            })
            .await?;
        Ok(error_results(results))
    }

    /// Reports what each machine must do about outstanding reboot requests.
    pub async fn get_reboot_action(
        &self,
        args: &Entities,
    ) -> Result<RebootActionResults, Error> {
        let results = self
            .each_machine(args, |machine| async move {
                self.coordinator
                    .get_reboot_action(self.auth.as_ref(), &machine)
                    .await
            })
            .await?;
        Ok(RebootActionResults {
            results: results
                .into_iter()
                .map(|result| match result {
                    Ok(action) => {
                        RebootActionResult { result: Some(action), error: None }
                    }
                    Err(err) => {
                        RebootActionResult { result: None, error: Some(err) }
                    }
                })
                .collect(),
        })
    }

    /// Waits for the next event on a watch started through this API.
    ///
    /// Once a watch has closed, for whatever reason, every later call
    /// reports the same close until the watch is stopped here.
    pub async fn watcher_next(
        &self,
        watcher_id: &str,
    ) -> Result<Notification, Error> {
        let state = self.watchers.lock().unwrap().get(watcher_id).copied();
        match state {
            None => {
                return Err(Error::WatcherNotFound(watcher_id.to_string()));
            }
            Some(Some(reason)) => return Ok(Notification::Closed(reason)),
            Some(None) => (),
        }
        let result = self.coordinator.next_event(watcher_id).await;
        let notification = match result {
            Ok(notification) => notification,
            // Stopped behind our back, by a shutdown of the whole service.
            Err(Error::WatcherNotFound(_)) => {
                Notification::Closed(CloseReason::Stopped)
            }
            Err(err) => return Err(err),
        };
        if let Notification::Closed(reason) = notification {
            let mut watchers = self.watchers.lock().unwrap();
            if let Some(closed) = watchers.get_mut(watcher_id) {
                closed.get_or_insert(reason);
            }
        }
        Ok(notification)
    }

    /// Stops a watch started through this API.  Stopping an unknown or
    /// already-stopped watch does nothing.
    pub fn watcher_stop(&self, watcher_id: &str) {
        if self.watchers.lock().unwrap().remove(watcher_id).is_some() {
            self.coordinator.stop_watcher(watcher_id);
        }
    }
}

impl<S: HierarchyStore> Drop for RebootApi<S> {
    fn drop(&mut self) {
        let watchers = match self.watchers.get_mut() {
            Ok(watchers) => std::mem::take(watchers),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        for (id, closed) in watchers {
            if closed.is_none() {
                self.coordinator.stop_watcher(&id);
            }
        }
    }
}

fn error_results(results: Vec<Result<(), ServerError>>) -> ErrorResults {
    ErrorResults {
        results: results
            .into_iter()
            .map(|result| ErrorResult { error: result.err() })
            .collect(),
    }
}
