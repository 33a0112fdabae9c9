// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Machine identifiers and tags
//!
//! A [`MachineId`] names a host machine (`"0"`) or a container nested inside
//! another machine (`"0/lxd/1"`, `"0/lxd/1/kvm/0"`).  Agents refer to
//! machines by [`MachineTag`], the id with a `machine-` prefix and `/`
//! replaced by `-` (`"machine-0-lxd-1"`).
//!
//! The id syntax records where a container was created, but nothing in this
//! crate derives the containment hierarchy from it: that is the job of the
//! [`crate::hierarchy::HierarchyStore`].

use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const TAG_PREFIX: &str = "machine-";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MachineIdParseError {
    #[error("machine id is empty")]
    Empty,
    #[error("invalid machine number {0:?}")]
    BadNumber(String),
    #[error("invalid container type {0:?}")]
    BadContainerType(String),
    #[error("container type {0:?} is not followed by a number")]
    MissingNumber(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MachineTagParseError {
    #[error("{0:?} is not a machine tag")]
    NotMachineTag(String),
    #[error("{tag:?} is not a valid machine tag: {err}")]
    BadId {
        tag: String,
        #[source]
        err: MachineIdParseError,
    },
}

/// Identifier of a machine or container, unique within a controller
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct MachineId(String);

impl MachineId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the tag agents use to refer to this machine.
    pub fn tag(&self) -> MachineTag {
        MachineTag(self.clone())
    }

    /// Returns true if this id names a container rather than a host.
    pub fn is_container(&self) -> bool {
        self.0.contains('/')
    }
}

fn is_number(s: &str) -> bool {
    // "0" is fine, "01" is not.
    !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_digit())
        && (s == "0" || !s.starts_with('0'))
}

fn is_container_type(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_lowercase())
}

impl FromStr for MachineId {
    type Err = MachineIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(MachineIdParseError::Empty);
        }
        let mut parts = s.split('/');
        // `split` always yields at least one item.
        let host = parts.next().unwrap_or_default();
        if !is_number(host) {
            return Err(MachineIdParseError::BadNumber(host.to_string()));
        }
        while let Some(kind) = parts.next() {
            if !is_container_type(kind) {
                return Err(MachineIdParseError::BadContainerType(
                    kind.to_string(),
                ));
            }
            match parts.next() {
                Some(n) if is_number(n) => {}
                Some(n) => {
                    return Err(MachineIdParseError::BadNumber(n.to_string()))
                }
                None => {
                    return Err(MachineIdParseError::MissingNumber(
                        kind.to_string(),
                    ))
                }
            }
        }
        Ok(MachineId(s.to_string()))
    }
}

impl TryFrom<String> for MachineId {
    type Error = MachineIdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MachineId> for String {
    fn from(id: MachineId) -> Self {
        id.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The external name of a machine, e.g. `machine-0-lxd-1`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MachineTag(MachineId);

impl MachineTag {
    pub fn into_id(self) -> MachineId {
        self.0
    }
}

impl FromStr for MachineTag {
    type Err = MachineTagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(rest) = s.strip_prefix(TAG_PREFIX) else {
            return Err(MachineTagParseError::NotMachineTag(s.to_string()));
        };
        // Container types never contain '-', so every '-' in the remainder
        // was a '/' in the id.
        rest.replace('-', "/").parse().map(MachineTag).map_err(|err| {
            MachineTagParseError::BadId { tag: s.to_string(), err }
        })
    }
}

impl fmt::Display for MachineTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{TAG_PREFIX}{}", self.0.as_str().replace('/', "-"))
    }
}
