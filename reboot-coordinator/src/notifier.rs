// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Change notification for one watched machine

use crate::machine::MachineId;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::sync::Mutex;

/// Why a [`ChangeNotifier`] stopped delivering changes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The watch was stopped by its owner.
    Stopped,
    /// A machine covered by the watch no longer exists.
    MachineRemoved,
}

/// Result of waiting on a [`ChangeNotifier`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notification {
    /// At least one watched flag changed since the last notification.
    ///
    /// Several changes may be folded into one notification, so consumers
    /// must re-read whatever state they care about.
    Changed,
    /// The watch is finished; every later wait returns the same thing.
    Closed(CloseReason),
}

struct NotifierState {
    flags: Vec<watch::Receiver<bool>>,
    stop_rx: watch::Receiver<bool>,
    closed: Option<CloseReason>,
}

/// Wakes a waiter whenever one of a set of reboot flags changes
///
/// The set always includes the watched machine's own flag and, depending on
/// the coordinator's configured scope, the flags of its ancestors.
pub struct ChangeNotifier {
    machine: MachineId,
    stop_tx: watch::Sender<bool>,
    // Waiters take turns: receivers need `&mut` to track what they have seen.
    state: Mutex<NotifierState>,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("machine", &self.machine)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl ChangeNotifier {
    /// Creates a notifier over `flags`, receivers that have already seen the
    /// current value of each flag.
    pub fn new(machine: MachineId, flags: Vec<watch::Receiver<bool>>) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        ChangeNotifier {
            machine,
            stop_tx,
            state: Mutex::new(NotifierState { flags, stop_rx, closed: None }),
        }
    }

    /// The machine this notifier was created for
    pub fn machine(&self) -> &MachineId {
        &self.machine
    }

    /// Stops the notifier.
    ///
    /// Any waiter blocked in [`ChangeNotifier::next`] returns
    /// `Closed(Stopped)`.  Stopping twice is harmless.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Waits for the next change to any watched flag.
    ///
    /// This is cancel safe: dropping the future before it completes loses no
    /// changes.
    pub async fn next(&self) -> Notification {
        let mut state = self.state.lock().await;
        let NotifierState { flags, stop_rx, closed } = &mut *state;

        if let Some(reason) = closed {
            return Notification::Closed(*reason);
        }
        if *stop_rx.borrow() {
            *closed = Some(CloseReason::Stopped);
            return Notification::Closed(CloseReason::Stopped);
        }

        let notification = {
            let mut flag_changes: FuturesUnordered<_> =
                flags.iter_mut().map(|rx| rx.changed()).collect();
            // With no flags the second branch is disabled at once and only a
            // stop can end the wait.
            tokio::select! {
                biased;

                _ = stop_rx.changed() => {
                    Notification::Closed(CloseReason::Stopped)
                }
                Some(result) = flag_changes.next() => match result {
                    Ok(()) => Notification::Changed,
                    Err(_) => Notification::Closed(CloseReason::MachineRemoved),
                },
            }
        };

        match notification {
            Notification::Changed => {
                // Everything that changed up to now is covered by this
                // notification.
                for rx in flags.iter_mut() {
                    rx.mark_unchanged();
                }
            }
            Notification::Closed(reason) => *closed = Some(reason),
        }
        notification
    }
}
