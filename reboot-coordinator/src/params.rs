// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request and result types for the reboot API
//!
//! Every batched call takes a list of entities and answers with one result
//! per entity, in the same order.

use crate::decision::RebootAction;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Entity {
    pub tag: String,
}

#[derive(
    Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema,
)]
pub struct Entities {
    pub entities: Vec<Entity>,
}

impl<S: Into<String>> FromIterator<S> for Entities {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Entities {
            entities: iter
                .into_iter()
                .map(|tag| Entity { tag: tag.into() })
                .collect(),
        }
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema,
)]
pub enum ErrorCode {
    #[serde(rename = "not found")]
    NotFound,
    #[serde(rename = "unauthorized access")]
    Unauthorized,
    #[serde(rename = "not valid")]
    NotValid,
    #[serde(rename = "internal")]
    Internal,
}

/// An error reported for a single entity
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ServerError {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(
    Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema,
)]
pub struct ErrorResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServerError>,
}

#[derive(
    Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema,
)]
pub struct ErrorResults {
    pub results: Vec<ErrorResult>,
}

impl ErrorResults {
    /// Returns the first error in the batch, if any.
    pub fn one_error(&self) -> Option<&ServerError> {
        self.results.iter().find_map(|r| r.error.as_ref())
    }
}

#[derive(
    Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema,
)]
pub struct NotifyWatchResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watcher_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServerError>,
}

#[derive(
    Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema,
)]
pub struct NotifyWatchResults {
    pub results: Vec<NotifyWatchResult>,
}

#[derive(
    Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema,
)]
pub struct RebootActionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RebootAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServerError>,
}

#[derive(
    Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema,
)]
pub struct RebootActionResults {
    pub results: Vec<RebootActionResult>,
}
