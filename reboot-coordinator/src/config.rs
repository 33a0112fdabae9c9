// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for parsing configuration files and working with a reboot
//! coordinator configuration

use crate::hierarchy::HierarchyNode;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use dropshot::ConfigLogging;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Configuration for a reboot coordinator
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Config {
    /// Server-wide logging configuration.
    pub log: ConfigLogging,
    /// Which reboot flags wake a machine's watch.
    #[serde(default)]
    pub watch: WatchConfig,
    /// Machines known at startup, each listed after its parent.
    #[serde(default)]
    pub machines: Vec<HierarchyNode>,
}

impl Config {
    /// Load a `Config` from the given TOML file
    pub fn from_file(path: &Utf8Path) -> Result<Config, LoadError> {
        let file_contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.into(), err })?;
        let config_parsed: Config = toml::from_str(&file_contents)
            .map_err(|err| LoadError::Parse { path: path.into(), err })?;
        Ok(config_parsed)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub scope: WatchScope,
}

/// The flags covered by a watch on one machine
///
/// A machine's own flag is always covered; flags of the machines it hosts
/// never are.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WatchScope {
    /// Only the machine's own flag.
    Machine,
    /// The machine's own flag and the flags of every machine above it, so
    /// that an agent learns when its host is about to reboot.
    #[default]
    MachineAndAncestors,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("error reading \"{path}\": {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error parsing \"{path}\": {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
}
