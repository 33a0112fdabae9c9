// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interface to the machine containment hierarchy and its reboot flags

use crate::machine::MachineId;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("machine {0} not found")]
    NotFound(MachineId),
    #[error("machine {0} already exists")]
    AlreadyExists(MachineId),
    #[error(
        "machine {machine} cannot be placed under {}",
        .parent.as_ref().map_or("nothing".to_string(), ToString::to_string)
    )]
    Misplaced { machine: MachineId, parent: Option<MachineId> },
    #[error("machine {machine} still hosts containers: {containers:?}")]
    HasContainers { machine: MachineId, containers: Vec<MachineId> },
    #[error("hierarchy store unavailable: {0}")]
    Unavailable(String),
}

/// A machine's position in the hierarchy
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct HierarchyNode {
    pub id: MachineId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<MachineId>,
}

/// Access to the machine hierarchy and the per-machine reboot flag
///
/// Implementations must allow operations on different machines to proceed
/// concurrently, and must serialize mutations of a single machine's flag with
/// the notifications delivered through [`HierarchyStore::watch_reboot_flag`].
#[async_trait]
pub trait HierarchyStore: Send + Sync + 'static {
    /// Returns the machine hosting `id`, or `None` for a host machine.
    async fn parent(
        &self,
        id: &MachineId,
    ) -> Result<Option<MachineId>, StoreError>;

    /// Returns the containers directly hosted by `id`.
    async fn children(
        &self,
        id: &MachineId,
    ) -> Result<Vec<MachineId>, StoreError>;

    async fn reboot_flag(&self, id: &MachineId) -> Result<bool, StoreError>;

    /// Sets or clears the reboot flag.
    ///
    /// Writing the value the flag already holds succeeds and does not notify
    /// watchers.
    async fn set_reboot_flag(
        &self,
        id: &MachineId,
        value: bool,
    ) -> Result<(), StoreError>;

    /// Returns a receiver for the machine's reboot flag.
    ///
    /// The current value is already marked as seen, so
    /// [`watch::Receiver::changed`] resolves on the first mutation after this
    /// call.  Once the machine is removed the channel is closed.
    async fn watch_reboot_flag(
        &self,
        id: &MachineId,
    ) -> Result<watch::Receiver<bool>, StoreError>;
}
