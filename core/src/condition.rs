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

//! Conditional request model (RFC 7232 §5/§6)
//!
//! [`Conditional`] carries the parsed precondition headers of one
//! request. The client fills it from an options bag and writes it onto
//! outgoing requests; the server parses it from incoming headers and
//! evaluates it against the stored entity with [`Conditional::evaluate`].
//!
//! Evaluation order follows RFC 7232: `If-Match` wins over
//! `If-Unmodified-Since`, `If-None-Match` over `If-Modified-Since`, and
//! the modification-date fallbacks only apply when their tag counterpart
//! is absent.

use crate::edm::EdmDateTimeOffset;
use crate::version::{ETag, Version, VersionError};
use http::header::{HeaderMap, HeaderValue, IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_UNMODIFIED_SINCE};
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

/// Parsed precondition headers of a single request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditional {
    pub if_match: Vec<ETag>,
    pub if_none_match: Vec<ETag>,
    pub if_modified_since: Option<EdmDateTimeOffset>,
    pub if_unmodified_since: Option<EdmDateTimeOffset>,
}

/// Outcome of evaluating preconditions against the stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// All preconditions hold; perform the operation.
    Proceed,
    /// A negative condition matched on a read; answer 304.
    NotModified,
    /// A precondition failed; answer 412 with the current entity.
    Failed,
}

impl Conditional {
    /// Parse the four precondition headers from a request header map.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ConditionError> {
        let mut parsed = Self::default();
        for value in headers.get_all(IF_MATCH) {
            parsed.if_match.extend(parse_tag_header(value)?);
        }
        for value in headers.get_all(IF_NONE_MATCH) {
            parsed.if_none_match.extend(parse_tag_header(value)?);
        }
        if let Some(value) = headers.get(IF_MODIFIED_SINCE) {
            parsed.if_modified_since = Some(parse_date_header(value)?);
        }
        if let Some(value) = headers.get(IF_UNMODIFIED_SINCE) {
            parsed.if_unmodified_since = Some(parse_date_header(value)?);
        }
        Ok(parsed)
    }

    /// Write the carried preconditions onto an outgoing header map.
    pub fn write_headers(&self, headers: &mut HeaderMap) -> Result<(), ConditionError> {
        if !self.if_match.is_empty() {
            headers.insert(IF_MATCH, tag_list_value(&self.if_match)?);
        }
        if !self.if_none_match.is_empty() {
            headers.insert(IF_NONE_MATCH, tag_list_value(&self.if_none_match)?);
        }
        if let Some(date) = self.if_modified_since {
            headers.insert(IF_MODIFIED_SINCE, date_value(date)?);
        }
        if let Some(date) = self.if_unmodified_since {
            headers.insert(IF_UNMODIFIED_SINCE, date_value(date)?);
        }
        Ok(())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.if_match.is_empty()
            && self.if_none_match.is_empty()
            && self.if_modified_since.is_none()
            && self.if_unmodified_since.is_none()
    }

    /// Evaluate against an existing entity's version and timestamp.
    /// `is_read` selects the 304 behavior of the negative conditions.
    #[must_use]
    pub fn evaluate(
        &self,
        version: Option<&Version>,
        updated_at: Option<EdmDateTimeOffset>,
        is_read: bool,
    ) -> Disposition {
        if !self.if_match.is_empty() {
            let matched = version
                .map(|v| self.if_match.iter().any(|tag| tag.matches(v)))
                .unwrap_or(false);
            if !matched {
                return Disposition::Failed;
            }
        } else if let (Some(since), Some(updated)) = (self.if_unmodified_since, updated_at) {
            if updated > since {
                return Disposition::Failed;
            }
        }

        if !self.if_none_match.is_empty() {
            let matched = version
                .map(|v| self.if_none_match.iter().any(|tag| tag.matches(v)))
                .unwrap_or(false);
            if matched {
                return if is_read {
                    Disposition::NotModified
                } else {
                    Disposition::Failed
                };
            }
        } else if is_read {
            if let (Some(since), Some(updated)) = (self.if_modified_since, updated_at) {
                if updated <= since {
                    return Disposition::NotModified;
                }
            }
        }

        Disposition::Proceed
    }
}

fn parse_tag_header(value: &HeaderValue) -> Result<Vec<ETag>, ConditionError> {
    let text = value
        .to_str()
        .map_err(|_| ConditionError::BadHeader("entity-tag header is not valid text".into()))?;
    ETag::parse_list(text).map_err(ConditionError::BadTag)
}

fn tag_list_value(tags: &[ETag]) -> Result<HeaderValue, ConditionError> {
    let text = tags
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    HeaderValue::from_str(&text).map_err(|_| ConditionError::BadHeader(text))
}

fn parse_date_header(value: &HeaderValue) -> Result<EdmDateTimeOffset, ConditionError> {
    let text = value
        .to_str()
        .map_err(|_| ConditionError::BadHeader("date header is not valid text".into()))?;
    // IMF-fixdate carries the obsolete GMT zone name; RFC 3339 accepted
    // as a fallback for tooling convenience.
    let rfc2822 = text.replace(" GMT", " +0000");
    OffsetDateTime::parse(&rfc2822, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(text, &Rfc3339))
        .map(EdmDateTimeOffset::from)
        .map_err(|_| ConditionError::BadHeader(text.to_string()))
}

fn date_value(date: EdmDateTimeOffset) -> Result<HeaderValue, ConditionError> {
    let dt: OffsetDateTime = date.into();
    let text = dt
        .format(&Rfc2822)
        .map_err(|_| ConditionError::BadHeader(date.to_string()))?;
    HeaderValue::from_str(&text).map_err(|_| ConditionError::BadHeader(text))
}

#[derive(Debug)]
pub enum ConditionError {
    BadTag(VersionError),
    BadHeader(String),
}

impl Display for ConditionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::BadTag(e) => write!(f, "invalid entity tag: {}", e),
            Self::BadHeader(text) => write!(f, "invalid conditional header: {:?}", text),
        }
    }
}

#[allow(clippy::absolute_paths)]
impl std::error::Error for ConditionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::BadTag(e) => Some(e),
            Self::BadHeader(_) => None,
        }
    }
}
