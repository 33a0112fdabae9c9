// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deciding what a machine must do about outstanding reboot requests

use crate::machine::MachineId;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// What a machine agent must do in response to reboot requests
///
/// This is never stored.  It is recomputed from the reboot flags along the
/// machine's ancestor chain every time it is asked for.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema,
)]
pub enum RebootAction {
    /// Nothing on the ancestor chain wants a reboot.
    #[serde(rename = "noop")]
    ShouldDoNothing,
    /// The machine itself was asked to reboot.
    #[serde(rename = "reboot")]
    ShouldReboot,
    /// A machine hosting this one is rebooting; this one must shut down and
    /// will come back with its host.
    #[serde(rename = "shutdown")]
    ShouldShutdown,
}

impl fmt::Display for RebootAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RebootAction::ShouldDoNothing => "noop",
            RebootAction::ShouldReboot => "reboot",
            RebootAction::ShouldShutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Decides what the first machine in `chain` must do.
///
/// `chain` is the machine followed by its parent, grandparent, and so on up
/// to a host machine.  The closest flagged entry wins: the machine's own flag
/// means reboot, and any flagged ancestor otherwise means shut down.
pub fn decide_action<F>(chain: &[MachineId], mut is_flagged: F) -> RebootAction
where
    F: FnMut(&MachineId) -> bool,
{
    match chain.iter().position(|machine| is_flagged(machine)) {
        None => RebootAction::ShouldDoNothing,
        Some(0) => RebootAction::ShouldReboot,
        Some(_) => RebootAction::ShouldShutdown,
    }
}
