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

//! Opaque concurrency version and its ETag text form
//!
//! Every entity carries a server-assigned [`Version`], an opaque byte
//! string guaranteed to change on each mutation. On the wire it appears
//! in two places with the same base64 payload:
//! - the `version` JSON field of the entity body, and
//! - a strong HTTP entity tag, `"<base64>"`, in `ETag`/`If-Match`/
//!   `If-None-Match` headers ([`ETag`]).
//!
//! `*` is the wildcard tag matching any existing version. Weak tags
//! (`W/"..."`) are rejected; version comparison is always strong.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::str::FromStr;

/// Opaque server-generated concurrency token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(Vec<u8>);

impl Version {
    /// A fresh random version, distinct from every previously issued one
    /// with overwhelming probability.
    #[must_use]
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().as_bytes().to_vec())
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Base64 text form used in JSON bodies.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self, VersionError> {
        BASE64
            .decode(s)
            .map(Self)
            .map_err(|_| VersionError::BadBase64(s.to_string()))
    }

    /// The strong entity tag carrying this version.
    #[must_use]
    pub fn etag(&self) -> ETag {
        ETag::Tag(self.to_base64())
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(DeError::custom)
    }
}

/// A strong HTTP entity tag: either the `*` wildcard or a quoted base64
/// version payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ETag {
    /// `*` — matches any existing version.
    Any,
    /// `"<base64>"` — matches exactly the version with this payload.
    Tag(String),
}

impl ETag {
    /// Whether this tag matches the given stored version.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Self::Any => true,
            Self::Tag(b64) => *b64 == version.to_base64(),
        }
    }

    /// Parse a comma-separated entity-tag list as found in `If-Match` /
    /// `If-None-Match` header values.
    pub fn parse_list(value: &str) -> Result<Vec<Self>, VersionError> {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Self::from_str)
            .collect()
    }
}

impl Display for ETag {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Any => f.write_str("*"),
            Self::Tag(b64) => write!(f, "\"{}\"", b64),
        }
    }
}

impl FromStr for ETag {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" {
            return Ok(Self::Any);
        }
        if s.starts_with("W/") {
            return Err(VersionError::WeakTag(s.to_string()));
        }
        if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
            return Ok(Self::Tag(s[1..s.len() - 1].to_string()));
        }
        Err(VersionError::BadTag(s.to_string()))
    }
}

impl From<&Version> for ETag {
    fn from(version: &Version) -> Self {
        version.etag()
    }
}

#[derive(Debug)]
pub enum VersionError {
    BadBase64(String),
    BadTag(String),
    WeakTag(String),
}

impl Display for VersionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::BadBase64(s) => write!(f, "invalid base64 version: {:?}", s),
            Self::BadTag(s) => write!(f, "invalid entity tag: {:?}", s),
            Self::WeakTag(s) => write!(f, "weak entity tags are not supported: {:?}", s),
        }
    }
}

#[allow(clippy::absolute_paths)]
impl std::error::Error for VersionError {}
