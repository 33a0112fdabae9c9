// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An in-process [`HierarchyStore`]

use crate::hierarchy::HierarchyNode;
use crate::hierarchy::HierarchyStore;
use crate::hierarchy::StoreError;
use crate::machine::MachineId;
use async_trait::async_trait;
use slog::debug;
use slog::info;
use slog::o;
use slog::Logger;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::RwLock;
use tokio::sync::watch;

#[derive(Debug)]
struct MachineEntry {
    parent: Option<MachineId>,
    children: BTreeSet<MachineId>,
    // The flag lives in the channel itself.  The sender serializes writers
    // and bumps the version seen by every receiver in the same step.
    reboot_flag: watch::Sender<bool>,
}

/// Machine hierarchy and reboot flags held in memory
///
/// The machine map sits behind a read/write lock, but only provisioning and
/// destruction take the write side.  Flag reads, writes, and watches take the
/// read lock and then operate on the machine's own channel, so requests for
/// different machines never wait on each other.
#[derive(Debug)]
pub struct InMemoryHierarchy {
    log: Logger,
    machines: RwLock<BTreeMap<MachineId, MachineEntry>>,
}

impl InMemoryHierarchy {
    pub fn new(log: &Logger) -> Self {
        Self {
            log: log.new(o!("component" => "InMemoryHierarchy")),
            machines: RwLock::new(BTreeMap::new()),
        }
    }

    /// Records a newly provisioned machine, hosted by `parent` if it is a
    /// container.
    ///
    /// Containers must have a parent and hosts must not.
    pub fn add_machine(
        &self,
        id: MachineId,
        parent: Option<MachineId>,
    ) -> Result<(), StoreError> {
        let mut machines = self.machines.write().unwrap();
        if machines.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        if id.is_container() != parent.is_some() {
            return Err(StoreError::Misplaced { machine: id, parent });
        }
        if let Some(parent) = &parent {
            let Some(parent_entry) = machines.get_mut(parent) else {
                return Err(StoreError::NotFound(parent.clone()));
            };
            parent_entry.children.insert(id.clone());
        }
        debug!(
            self.log,
            "adding machine";
            "machine" => %id,
            "parent" => ?parent.as_ref().map(|p| p.as_str()),
        );
        let (reboot_flag, _) = watch::channel(false);
        machines.insert(
            id,
            MachineEntry { parent, children: BTreeSet::new(), reboot_flag },
        );
        Ok(())
    }

    /// Records the destruction of a machine.
    ///
    /// A machine still hosting containers cannot be removed.  Every watch on
    /// the removed machine's flag is closed.
    pub fn remove_machine(&self, id: &MachineId) -> Result<(), StoreError> {
        let mut machines = self.machines.write().unwrap();
        let entry = machines.get(id).ok_or_else(|| not_found(id))?;
        if !entry.children.is_empty() {
            return Err(StoreError::HasContainers {
                machine: id.clone(),
                containers: entry.children.iter().cloned().collect(),
            });
        }
        // Safe to unwrap as we just checked the key existed above
        let entry = machines.remove(id).unwrap();
        if let Some(parent) = &entry.parent {
            if let Some(parent_entry) = machines.get_mut(parent) {
                parent_entry.children.remove(id);
            }
        }
        info!(
            self.log,
            "removed machine";
            "machine" => %id,
            "watchers" => entry.reboot_flag.receiver_count(),
        );
        Ok(())
    }

    /// Adds every machine in `nodes`, parents first.
    pub fn add_machines<'a, I>(&self, nodes: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = &'a HierarchyNode>,
    {
        for node in nodes {
            self.add_machine(node.id.clone(), node.parent.clone())?;
        }
        Ok(())
    }

    /// Returns every machine currently known, ordered by id.
    pub fn nodes(&self) -> Vec<HierarchyNode> {
        self.machines
            .read()
            .unwrap()
            .iter()
            .map(|(id, entry)| HierarchyNode {
                id: id.clone(),
                parent: entry.parent.clone(),
            })
            .collect()
    }

    fn with_entry<T, F>(&self, id: &MachineId, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&MachineEntry) -> T,
    {
        let machines = self.machines.read().unwrap();
        machines.get(id).map(f).ok_or_else(|| not_found(id))
    }
}

fn not_found(id: &MachineId) -> StoreError {
    StoreError::NotFound(id.clone())
}

#[async_trait]
impl HierarchyStore for InMemoryHierarchy {
    async fn parent(
        &self,
        id: &MachineId,
    ) -> Result<Option<MachineId>, StoreError> {
        self.with_entry(id, |entry| entry.parent.clone())
    }

    async fn children(
        &self,
        id: &MachineId,
    ) -> Result<Vec<MachineId>, StoreError> {
        self.with_entry(id, |entry| entry.children.iter().cloned().collect())
    }

    async fn reboot_flag(&self, id: &MachineId) -> Result<bool, StoreError> {
        self.with_entry(id, |entry| *entry.reboot_flag.borrow())
    }

    async fn set_reboot_flag(
        &self,
        id: &MachineId,
        value: bool,
    ) -> Result<(), StoreError> {
        let modified = self.with_entry(id, |entry| {
            entry.reboot_flag.send_if_modified(|flag| {
                if *flag != value {
                    *flag = value;
                    true
                } else {
                    false
                }
            })
        })?;
        debug!(
            self.log,
            "set reboot flag";
            "machine" => %id,
            "value" => value,
            "modified" => modified,
        );
        Ok(())
    }

    async fn watch_reboot_flag(
        &self,
        id: &MachineId,
    ) -> Result<watch::Receiver<bool>, StoreError> {
        self.with_entry(id, |entry| entry.reboot_flag.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reboot_test_utils::dev::test_setup_log;
    use std::time::Duration;

    fn id(s: &str) -> MachineId {
        s.parse().unwrap()
    }

    fn three_levels(log: &Logger) -> InMemoryHierarchy {
        let store = InMemoryHierarchy::new(log);
        store.add_machine(id("0"), None).unwrap();
        store.add_machine(id("0/lxd/0"), Some(id("0"))).unwrap();
        store.add_machine(id("0/lxd/0/lxd/0"), Some(id("0/lxd/0"))).unwrap();
        store
    }

    #[tokio::test]
    async fn test_parents_and_children() {
        let logctx = test_setup_log("test_parents_and_children");
        let store = three_levels(&logctx.log);

        assert_eq!(store.parent(&id("0")).await.unwrap(), None);
        assert_eq!(
            store.parent(&id("0/lxd/0/lxd/0")).await.unwrap(),
            Some(id("0/lxd/0"))
        );
        assert_eq!(
            store.children(&id("0")).await.unwrap(),
            vec![id("0/lxd/0")]
        );
        assert!(store
            .children(&id("0/lxd/0/lxd/0"))
            .await
            .unwrap()
            .is_empty());

        assert_eq!(
            store.parent(&id("7")).await,
            Err(StoreError::NotFound(id("7")))
        );
        assert_eq!(
            store.reboot_flag(&id("7")).await,
            Err(StoreError::NotFound(id("7")))
        );
        assert_eq!(
            store.set_reboot_flag(&id("7"), true).await,
            Err(StoreError::NotFound(id("7")))
        );
        assert!(matches!(
            store.watch_reboot_flag(&id("7")).await,
            Err(StoreError::NotFound(_))
        ));

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_provisioning_errors() {
        let logctx = test_setup_log("test_provisioning_errors");
        let store = three_levels(&logctx.log);

        assert_eq!(
            store.add_machine(id("0"), None),
            Err(StoreError::AlreadyExists(id("0")))
        );
        assert_eq!(
            store.add_machine(id("5/lxd/0"), Some(id("5"))),
            Err(StoreError::NotFound(id("5")))
        );
        assert_eq!(
            store.add_machine(id("0/lxd/1"), None),
            Err(StoreError::Misplaced { machine: id("0/lxd/1"), parent: None })
        );
        assert_eq!(
            store.add_machine(id("2"), Some(id("0"))),
            Err(StoreError::Misplaced {
                machine: id("2"),
                parent: Some(id("0")),
            })
        );
        assert_eq!(
            store.children(&id("0")).await.unwrap(),
            vec![id("0/lxd/0")]
        );
        assert_eq!(
            store.remove_machine(&id("0/lxd/0")),
            Err(StoreError::HasContainers {
                machine: id("0/lxd/0"),
                containers: vec![id("0/lxd/0/lxd/0")],
            })
        );

        store.remove_machine(&id("0/lxd/0/lxd/0")).unwrap();
        store.remove_machine(&id("0/lxd/0")).unwrap();
        assert!(store.children(&id("0")).await.unwrap().is_empty());
        assert_eq!(
            store.remove_machine(&id("0/lxd/0")),
            Err(StoreError::NotFound(id("0/lxd/0")))
        );
        assert_eq!(
            store.nodes(),
            vec![HierarchyNode { id: id("0"), parent: None }]
        );

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_flag_writes_notify_only_on_change() {
        let logctx = test_setup_log("test_flag_writes_notify_only_on_change");
        let store = three_levels(&logctx.log);
        let machine = id("0/lxd/0");

        let mut rx = store.watch_reboot_flag(&machine).await.unwrap();
        assert!(!rx.has_changed().unwrap());

        store.set_reboot_flag(&machine, true).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
        assert!(store.reboot_flag(&machine).await.unwrap());

        // Setting it again is a successful no-op.
        store.set_reboot_flag(&machine, true).await.unwrap();
        assert!(!rx.has_changed().unwrap());
        assert!(store.reboot_flag(&machine).await.unwrap());

        // Neighbours are untouched.
        assert!(!store.reboot_flag(&id("0")).await.unwrap());
        assert!(!store.reboot_flag(&id("0/lxd/0/lxd/0")).await.unwrap());

        store.set_reboot_flag(&machine, false).await.unwrap();
        store.set_reboot_flag(&machine, false).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
        assert!(!rx.has_changed().unwrap());

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_remove_closes_watches() {
        let logctx = test_setup_log("test_remove_closes_watches");
        let store = three_levels(&logctx.log);
        let leaf = id("0/lxd/0/lxd/0");

        let mut rx = store.watch_reboot_flag(&leaf).await.unwrap();
        let waiter = tokio::spawn(async move { rx.changed().await });

        store.remove_machine(&leaf).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(10), waiter)
            .await
            .expect("watch was not closed")
            .unwrap();
        assert!(result.is_err());

        logctx.cleanup_successful();
    }
}
