// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Entity metadata model
//!
//! Every synchronizable entity carries four reserved metadata fields next
//! to its domain fields:
//! - `id`: non-empty string, unique within its type ([`validate_id`])
//! - `updatedAt`: server-assigned timestamp, monotonically non-decreasing
//!   per entity
//! - `version`: opaque server-assigned concurrency token
//! - `deleted`: soft-delete flag
//!
//! Typed client entities embed [`SystemProperties`] with
//! `#[serde(flatten)]` and implement [`SyncEntity`]. The server works
//! over [`TableRow`], a dynamic row keeping the metadata typed and the
//! domain fields as raw JSON, so one table controller serves any
//! registered entity type without reflection at request time.

use crate::edm::EdmDateTimeOffset;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

/// JSON name of the entity id field.
pub const ID_FIELD: &str = "id";
/// JSON name of the last-update timestamp field.
pub const UPDATED_AT_FIELD: &str = "updatedAt";
/// JSON name of the opaque version field.
pub const VERSION_FIELD: &str = "version";
/// JSON name of the soft-delete flag field.
pub const DELETED_FIELD: &str = "deleted";

/// The four reserved metadata fields, in wire shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemProperties {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<EdmDateTimeOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(default)]
    pub deleted: bool,
}

/// Trait implemented by typed client entities.
///
/// Implementors embed a [`SystemProperties`] value flattened into their
/// serde representation and expose it here so the engine can read and
/// write the reserved fields without knowing the domain shape.
pub trait SyncEntity: Serialize + serde::de::DeserializeOwned + Clone + Send + Sync {
    /// Remote table name this entity type synchronizes with.
    const TABLE: &'static str;

    fn system(&self) -> &SystemProperties;

    fn system_mut(&mut self) -> &mut SystemProperties;

    fn id(&self) -> &str {
        &self.system().id
    }

    fn version(&self) -> Option<&Version> {
        self.system().version.as_ref()
    }
}

/// Dynamic server-side row: typed metadata plus raw domain fields.
///
/// Serializes to the same flat JSON object a typed entity produces; the
/// reserved names always resolve from `system`, never from `fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(flatten)]
    pub system: SystemProperties,
    #[serde(flatten)]
    pub fields: Map<String, Json>,
}

/// Rows are dynamically typed; address them through a named table
/// (the constant is unused there).
impl SyncEntity for TableRow {
    const TABLE: &'static str = "";

    fn system(&self) -> &SystemProperties {
        &self.system
    }

    fn system_mut(&mut self) -> &mut SystemProperties {
        &mut self.system
    }
}

impl TableRow {
    /// Parse a full JSON object into a row. Non-object payloads are
    /// rejected.
    pub fn from_json(value: Json) -> Result<Self, EntityError> {
        if !value.is_object() {
            return Err(EntityError::NotAnObject);
        }
        serde_json::from_value(value).map_err(|e| EntityError::Decode(e.to_string()))
    }

    /// Look up a field by JSON name; reserved names resolve from the
    /// metadata, everything else from the raw field map.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Json> {
        match name {
            ID_FIELD => Some(Json::String(self.system.id.clone())),
            UPDATED_AT_FIELD => self
                .system
                .updated_at
                .map(|dt| Json::String(dt.to_string())),
            VERSION_FIELD => self.system.version.as_ref().map(|v| Json::String(v.to_base64())),
            DELETED_FIELD => Some(Json::Bool(self.system.deleted)),
            other => self.fields.get(other).cloned(),
        }
    }

    /// Project the row down to the named fields (plus nothing else);
    /// reserved fields must be requested explicitly.
    #[must_use]
    pub fn project(&self, names: &[String]) -> Json {
        let mut out = Map::new();
        for name in names {
            if let Some(value) = self.field(name) {
                out.insert(name.clone(), value);
            }
        }
        Json::Object(out)
    }
}

/// Validate an entity id: `^[A-Za-z0-9][A-Za-z0-9_.:-]{0,126}$`.
pub fn validate_id(id: &str) -> Result<(), EntityError> {
    let mut chars = id.chars();
    let first = chars.next().ok_or_else(|| EntityError::InvalidId(id.to_string()))?;
    if !first.is_ascii_alphanumeric() {
        return Err(EntityError::InvalidId(id.to_string()));
    }
    if id.len() > 127 {
        return Err(EntityError::InvalidId(id.to_string()));
    }
    for c in chars {
        if !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-')) {
            return Err(EntityError::InvalidId(id.to_string()));
        }
    }
    Ok(())
}

#[derive(Debug)]
pub enum EntityError {
    InvalidId(String),
    NotAnObject,
    Decode(String),
}

impl Display for EntityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::InvalidId(id) => write!(f, "invalid entity id: {:?}", id),
            Self::NotAnObject => write!(f, "entity payload must be a JSON object"),
            Self::Decode(e) => write!(f, "entity decode error: {}", e),
        }
    }
}

#[allow(clippy::absolute_paths)]
impl std::error::Error for EntityError {}
