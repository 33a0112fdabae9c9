// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared helpers for the reboot API integration tests

use reboot_coordinator::config::WatchConfig;
use reboot_coordinator::hierarchy::HierarchyNode;
use reboot_coordinator::params::Entities;
use reboot_coordinator::CloseReason;
use reboot_coordinator::Config;
use reboot_coordinator::InMemoryHierarchy;
use reboot_coordinator::Notification;
use reboot_coordinator::RebootAction;
use reboot_coordinator::RebootApi;
use reboot_coordinator::RebootService;
use reboot_coordinator::WatchScope;
use slog::Logger;
use std::time::Duration;

const NO_CHANGE_WAIT: Duration = Duration::from_millis(50);
const CHANGE_WAIT: Duration = Duration::from_secs(10);

pub const HOST: &str = "machine-0";
pub const CONTAINER: &str = "machine-0-lxd-0";
pub const NESTED: &str = "machine-0-lxd-0-lxd-0";
pub const OTHER_HOST: &str = "machine-1";

/// Starts a service over `0 -> 0/lxd/0 -> 0/lxd/0/lxd/0` plus host `1`.
pub fn start_service(log: &Logger, scope: WatchScope) -> RebootService {
    let node = |id: &str, parent: Option<&str>| HierarchyNode {
        id: id.parse().unwrap(),
        parent: parent.map(|p| p.parse().unwrap()),
    };
    let config = Config {
        log: dropshot::ConfigLogging::StderrTerminal {
            level: dropshot::ConfigLoggingLevel::Info,
        },
        watch: WatchConfig { scope },
        machines: vec![
            node("0", None),
            node("0/lxd/0", Some("0")),
            node("0/lxd/0/lxd/0", Some("0/lxd/0")),
            node("1", None),
        ],
    };
    RebootService::start(&config, log).unwrap()
}

pub fn entities(tags: &[&str]) -> Entities {
    tags.iter().copied().collect()
}

/// Asks `api` for the action of the single machine it acts for.
pub async fn action(
    api: &RebootApi<InMemoryHierarchy>,
    tag: &str,
) -> RebootAction {
    let results = api.get_reboot_action(&entities(&[tag])).await.unwrap();
    assert_eq!(results.results.len(), 1);
    let result = &results.results[0];
    assert_eq!(result.error, None, "error computing action for {tag}");
    result.result.unwrap()
}

/// Checks the events delivered on one watch.
pub struct WatcherChecker<'a> {
    api: &'a RebootApi<InMemoryHierarchy>,
    watcher_id: String,
}

impl<'a> WatcherChecker<'a> {
    /// Starts a watch for `tag`, which `api` must be allowed to act on.
    pub async fn start(
        api: &'a RebootApi<InMemoryHierarchy>,
        tag: &str,
    ) -> WatcherChecker<'a> {
        let results =
            api.watch_for_reboot_event(&entities(&[tag])).await.unwrap();
        assert_eq!(results.results.len(), 1);
        let result = &results.results[0];
        assert_eq!(result.error, None, "error watching {tag}");
        let watcher_id = result.watcher_id.clone().unwrap();
        WatcherChecker { api, watcher_id }
    }

    pub fn watcher_id(&self) -> &str {
        &self.watcher_id
    }

    pub async fn assert_one_change(&self) {
        let n = tokio::time::timeout(
            CHANGE_WAIT,
            self.api.watcher_next(&self.watcher_id),
        )
        .await
        .expect("timed out waiting for a change")
        .unwrap();
        assert_eq!(n, Notification::Changed);
        self.assert_no_change().await;
    }

    pub async fn assert_no_change(&self) {
        if let Ok(n) = tokio::time::timeout(
            NO_CHANGE_WAIT,
            self.api.watcher_next(&self.watcher_id),
        )
        .await
        {
            panic!("unexpected event on watcher {}: {n:?}", self.watcher_id);
        }
    }

    pub async fn assert_closed(&self, reason: CloseReason) {
        let n = tokio::time::timeout(
            CHANGE_WAIT,
            self.api.watcher_next(&self.watcher_id),
        )
        .await
        .expect("timed out waiting for the watch to close")
        .unwrap();
        assert_eq!(n, Notification::Closed(reason));
    }

    pub fn stop(&self) {
        self.api.watcher_stop(&self.watcher_id);
    }
}
