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

//! OData query subset
//!
//! The recognized options are `$filter`, `$orderby`, `$select`, `$skip`,
//! `$top`, `$count` and `__includedeleted`. [`Query`] is the parsed
//! description: the server obtains one from a request's query string via
//! [`Query::parse`], the client produces one with
//! [`builder::QueryBuilder`] and serializes it back with
//! [`Query::to_query_string`]. Both directions share the expression tree
//! in [`ast`].
//!
//! Repeated options follow the chaining tie-breaks: `$skip` accumulates,
//! `$top` takes the minimum, `$orderby` keys append in order of
//! appearance. Unknown `$`-options and malformed values are rejected.

pub mod ast;
pub mod builder;
pub mod lexer;
pub mod parser;

use ast::{Expr, OrderBy};
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::fmt::Write as _;

/// Parsed description of a table query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub select: Vec<String>,
    pub skip: Option<u64>,
    pub top: Option<u64>,
    pub count: bool,
    pub include_deleted: bool,
}

impl Query {
    /// Parse a (possibly percent-encoded) query string.
    pub fn parse(query_string: &str) -> Result<Self, ParseError> {
        let pairs = url::form_urlencoded::parse(query_string.as_bytes());
        let mut query = Self::default();
        for (key, value) in pairs {
            query.apply_option(&key, &value)?;
        }
        Ok(query)
    }

    fn apply_option(&mut self, key: &str, value: &str) -> Result<(), ParseError> {
        match key {
            "$filter" => {
                let expr = parser::parse_filter(value)?;
                self.filter = Some(match self.filter.take() {
                    Some(existing) => existing.and(expr),
                    None => expr,
                });
            }
            "$orderby" => {
                self.order_by.extend(parser::parse_orderby(value)?);
            }
            "$select" => {
                for name in value.split(',') {
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(ParseError::new("empty $select field", 0));
                    }
                    if !self.select.iter().any(|existing| existing == name) {
                        self.select.push(name.to_string());
                    }
                }
            }
            "$skip" => {
                let n = parse_non_negative(value, "$skip")?;
                self.skip = Some(self.skip.unwrap_or(0).saturating_add(n));
            }
            "$top" => {
                let n = parse_non_negative(value, "$top")?;
                self.top = Some(self.top.map_or(n, |existing| existing.min(n)));
            }
            "$count" => {
                self.count = parse_bool(value, "$count")?;
            }
            "__includedeleted" => {
                self.include_deleted = parse_bool(value, "__includedeleted")?;
            }
            other if other.starts_with('$') => {
                return Err(ParseError::new(
                    format!("unrecognized query option {:?}", other),
                    0,
                ));
            }
            // Non-$ keys (api versions etc.) pass through unexamined.
            _ => {}
        }
        Ok(())
    }

    /// Serialize to the unencoded query-string form. Key order is stable:
    /// `$filter`, `$orderby`, `$select`, `$skip`, `$top`, `$count`,
    /// `__includedeleted`; absent/default options are omitted.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(filter) = &self.filter {
            parts.push(format!("$filter={}", filter.to_odata()));
        }
        if !self.order_by.is_empty() {
            let mut clause = String::from("$orderby=");
            for (i, key) in self.order_by.iter().enumerate() {
                if i > 0 {
                    clause.push(',');
                }
                clause.push_str(&key.to_odata());
            }
            parts.push(clause);
        }
        if !self.select.is_empty() {
            parts.push(format!("$select={}", self.select.join(",")));
        }
        if let Some(skip) = self.skip {
            if skip > 0 {
                parts.push(format!("$skip={}", skip));
            }
        }
        if let Some(top) = self.top {
            parts.push(format!("$top={}", top));
        }
        if self.count {
            parts.push("$count=true".to_string());
        }
        if self.include_deleted {
            parts.push("__includedeleted=true".to_string());
        }
        parts.join("&")
    }

    /// Percent-encoded form suitable for a URL query component.
    #[must_use]
    pub fn to_encoded_query_string(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        if let Some(filter) = &self.filter {
            serializer.append_pair("$filter", &filter.to_odata());
        }
        if !self.order_by.is_empty() {
            let mut clause = String::new();
            for (i, key) in self.order_by.iter().enumerate() {
                if i > 0 {
                    clause.push(',');
                }
                clause.push_str(&key.to_odata());
            }
            serializer.append_pair("$orderby", &clause);
        }
        if !self.select.is_empty() {
            serializer.append_pair("$select", &self.select.join(","));
        }
        if let Some(skip) = self.skip {
            if skip > 0 {
                let mut buf = String::new();
                let _ = write!(buf, "{}", skip);
                serializer.append_pair("$skip", &buf);
            }
        }
        if let Some(top) = self.top {
            let mut buf = String::new();
            let _ = write!(buf, "{}", top);
            serializer.append_pair("$top", &buf);
        }
        if self.count {
            serializer.append_pair("$count", "true");
        }
        if self.include_deleted {
            serializer.append_pair("__includedeleted", "true");
        }
        serializer.finish()
    }
}

fn parse_non_negative(value: &str, option: &str) -> Result<u64, ParseError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ParseError::new(format!("{} must be a non-negative integer", option), 0))
}

fn parse_bool(value: &str, option: &str) -> Result<bool, ParseError> {
    match value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ParseError::new(
            format!("{} must be true or false", option),
            0,
        )),
    }
}

/// Failure to understand query text; maps to a bad-request response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} (at offset {})", self.message, self.position)
    }
}

#[allow(clippy::absolute_paths)]
impl std::error::Error for ParseError {}
