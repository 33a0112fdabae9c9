// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Authorization verdicts for reboot requests
//!
//! Authentication and the wider authorization policy live outside this crate.
//! The coordinator only asks the questions below of whatever identity the
//! caller was authenticated as.

use crate::machine::MachineId;

pub trait Authorizer: Send + Sync {
    /// Returns true if the caller is a machine agent.
    fn auth_machine_agent(&self) -> bool;

    /// Returns true if the caller may act on `machine`.
    fn auth_owner(&self, machine: &MachineId) -> bool;
}

/// The identity of the agent running on one machine
///
/// An agent may only act on its own machine.
#[derive(Clone, Debug)]
pub struct MachineAgentAuthorizer {
    machine: MachineId,
}

impl MachineAgentAuthorizer {
    pub fn new(machine: MachineId) -> Self {
        MachineAgentAuthorizer { machine }
    }

    pub fn machine(&self) -> &MachineId {
        &self.machine
    }
}

impl Authorizer for MachineAgentAuthorizer {
    fn auth_machine_agent(&self) -> bool {
        true
    }

    fn auth_owner(&self, machine: &MachineId) -> bool {
        self.machine == *machine
    }
}
