// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ownership of the watches handed out to agents

use crate::notifier::ChangeNotifier;
use slog::debug;
use slog::o;
use slog::Logger;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

/// The set of live watches belonging to one coordinator
///
/// Agents only ever see the string id of a watch.  A watch lives until it is
/// stopped by id, until [`Resources::stop_all`], until the `Resources` itself
/// is dropped, or until it closes on its own and is released.
#[derive(Debug)]
pub struct Resources {
    log: Logger,
    inner: Mutex<ResourcesInner>,
}

#[derive(Debug, Default)]
struct ResourcesInner {
    next_id: u64,
    notifiers: BTreeMap<String, Arc<ChangeNotifier>>,
}

impl Resources {
    pub fn new(log: &Logger) -> Self {
        Resources {
            log: log.new(o!("component" => "Resources")),
            inner: Mutex::new(ResourcesInner::default()),
        }
    }

    /// Takes ownership of `notifier` and returns the id it is known by.
    ///
    /// Ids are never reused.
    pub fn register(&self, notifier: ChangeNotifier) -> String {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id.to_string();
        debug!(
            self.log,
            "registered watch";
            "id" => &id,
            "machine" => %notifier.machine(),
        );
        inner.notifiers.insert(id.clone(), Arc::new(notifier));
        id
    }

    pub fn get(&self, id: &str) -> Option<Arc<ChangeNotifier>> {
        self.inner.lock().unwrap().notifiers.get(id).cloned()
    }

    /// Stops and forgets the watch `id`.  Unknown ids are ignored.
    pub fn stop(&self, id: &str) {
        let removed = self.inner.lock().unwrap().notifiers.remove(id);
        if let Some(notifier) = removed {
            debug!(self.log, "stopped watch"; "id" => id);
            notifier.stop();
        }
    }

    /// Forgets the watch `id`, which has already closed.
    pub fn release(&self, id: &str) {
        if self.inner.lock().unwrap().notifiers.remove(id).is_some() {
            debug!(self.log, "released closed watch"; "id" => id);
        }
    }

    /// Stops and forgets every watch.
    pub fn stop_all(&self) {
        let notifiers =
            std::mem::take(&mut self.inner.lock().unwrap().notifiers);
        if !notifiers.is_empty() {
            debug!(
                self.log,
                "stopping all watches";
                "count" => notifiers.len(),
            );
        }
        for notifier in notifiers.into_values() {
            notifier.stop();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for Resources {
    fn drop(&mut self) {
        // Tolerate a poisoned lock here rather than panicking while dropping.
        let inner = match self.inner.get_mut() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        for notifier in std::mem::take(&mut inner.notifiers).into_values() {
            notifier.stop();
        }
    }
}
