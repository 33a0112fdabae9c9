// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reboot coordination for machines arranged in a containment hierarchy
//!
//! Host machines run containers, which may run containers of their own.  Any
//! machine's agent may ask for its machine to be rebooted.  Everything the
//! machine hosts must then shut down, and each agent can watch for, and ask
//! about, what its own machine has to do.

pub mod authz;
pub mod config;
pub mod coordinator;
pub mod decision;
pub mod error;
pub mod facade;
pub mod hierarchy;
pub mod machine;
pub mod memory;
pub mod notifier;
pub mod params;
mod resources;

pub use authz::Authorizer;
pub use authz::MachineAgentAuthorizer;
pub use config::Config;
pub use config::WatchScope;
pub use coordinator::RebootCoordinator;
pub use decision::RebootAction;
pub use error::Error;
pub use facade::RebootApi;
pub use hierarchy::HierarchyStore;
pub use machine::MachineId;
pub use machine::MachineTag;
pub use memory::InMemoryHierarchy;
pub use notifier::CloseReason;
pub use notifier::Notification;

use slog::info;
use slog::o;
use slog::Logger;
use std::sync::Arc;

/// A running reboot coordinator over an in-memory machine hierarchy
pub struct RebootService {
    log: Logger,
    coordinator: Arc<RebootCoordinator<InMemoryHierarchy>>,
}

impl RebootService {
    /// Builds the hierarchy described by `config` and a coordinator over it.
    pub fn start(config: &Config, log: &Logger) -> Result<Self, String> {
        let log = log.new(o!("component" => "RebootService"));
        info!(
            log,
            "setting up reboot coordinator";
            "machines" => config.machines.len(),
            "watch_scope" => ?config.watch.scope,
        );

        let store = InMemoryHierarchy::new(&log);
        store
            .add_machines(&config.machines)
            .map_err(|e| format!("loading machine hierarchy: {e}"))?;
        let coordinator = Arc::new(RebootCoordinator::new(
            Arc::new(store),
            config.watch.scope,
            &log,
        ));
        Ok(RebootService { log, coordinator })
    }

    pub fn store(&self) -> &Arc<InMemoryHierarchy> {
        self.coordinator.store()
    }

    pub fn coordinator(&self) -> &Arc<RebootCoordinator<InMemoryHierarchy>> {
        &self.coordinator
    }

    /// Returns the API for a caller with the given credentials.
    pub fn api(
        &self,
        auth: Arc<dyn Authorizer>,
    ) -> Result<RebootApi<InMemoryHierarchy>, Error> {
        RebootApi::new(Arc::clone(&self.coordinator), auth, &self.log)
    }

    /// Returns the API for the agent of the machine tagged `tag`.
    pub fn api_for_machine(
        &self,
        tag: &str,
    ) -> Result<RebootApi<InMemoryHierarchy>, Error> {
        let machine = tag.parse::<MachineTag>()?.into_id();
        self.api(Arc::new(MachineAgentAuthorizer::new(machine)))
    }

    /// Stops every outstanding watch, waking anyone waiting on one.
    pub fn shutdown(&self) {
        info!(self.log, "shutting down reboot coordinator");
        self.coordinator.stop_all();
    }
}

/// Builds the root logger described by `config`.
pub fn run_logger(config: &Config) -> Result<Logger, String> {
    config
        .log
        .to_logger("reboot-coordinator")
        .map_err(|message| format!("initializing logger: {}", message))
}
