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

//! Fluent query construction for clients.
//!
//! Builds the same expression tree the server parser produces, so a
//! compiled query reparses to an equivalent tree:
//!
//! ```rust
//! use datasync_core::query::builder::{field, QueryBuilder};
//!
//! let query = QueryBuilder::new()
//!     .filter(field("year").ge(2000).and(field("title").startswith("The")))
//!     .order_by("releaseDate")
//!     .top(5)
//!     .build();
//! assert_eq!(
//!     query.to_query_string(),
//!     "$filter=((year ge 2000) and startswith(title,'The'))&$orderby=releaseDate&$top=5"
//! );
//! ```
//!
//! String comparisons are ordinal. The `*_ignore_case` variants compile
//! to `tolower(...)` applied to both sides; no locale-sensitive
//! comparison is offered.

use super::ast::{BinaryOp, Expr, Function, OrderBy, Value};
use super::Query;
use crate::edm::{EdmDate, EdmDateTimeOffset, EdmTimeOfDay};
use crate::entity::{DELETED_FIELD, ID_FIELD, UPDATED_AT_FIELD, VERSION_FIELD};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Start an expression from a field reference.
#[must_use]
pub fn field(name: impl Into<String>) -> Operand {
    Operand(Expr::Member(name.into()))
}

/// Two-argument `concat`.
#[must_use]
pub fn concat(lhs: impl IntoOperand, rhs: impl IntoOperand) -> Operand {
    Operand(Expr::Function(
        Function::Concat,
        vec![lhs.into_operand().0, rhs.into_operand().0],
    ))
}

/// Conversion into a literal [`Value`].
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoValue for i32 {
    fn into_value(self) -> Value {
        Value::Int(i64::from(self))
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Double(self)
    }
}

impl IntoValue for Decimal {
    fn into_value(self) -> Value {
        Value::Decimal(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::String(self.to_string())
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl IntoValue for EdmDate {
    fn into_value(self) -> Value {
        Value::Date(self)
    }
}

impl IntoValue for EdmTimeOfDay {
    fn into_value(self) -> Value {
        Value::TimeOfDay(self)
    }
}

impl IntoValue for EdmDateTimeOffset {
    fn into_value(self) -> Value {
        Value::DateTimeOffset(self)
    }
}

impl IntoValue for Uuid {
    fn into_value(self) -> Value {
        Value::Guid(self)
    }
}

/// Conversion into an expression operand: a field/expression, or any
/// literal.
pub trait IntoOperand {
    fn into_operand(self) -> Operand;
}

impl IntoOperand for Operand {
    fn into_operand(self) -> Operand {
        self
    }
}

macro_rules! literal_operand {
    ($($ty:ty),* $(,)?) => {
        $(impl IntoOperand for $ty {
            fn into_operand(self) -> Operand {
                Operand(Expr::Constant(self.into_value()))
            }
        })*
    };
}

literal_operand!(
    Value,
    bool,
    i32,
    i64,
    f64,
    Decimal,
    &str,
    String,
    EdmDate,
    EdmTimeOfDay,
    EdmDateTimeOffset,
    Uuid,
);

/// A scalar expression under construction.
#[derive(Debug, Clone)]
pub struct Operand(Expr);

impl Operand {
    fn compare(self, op: BinaryOp, rhs: impl IntoOperand) -> Filter {
        Filter(Expr::Binary(
            op,
            Box::new(self.0),
            Box::new(rhs.into_operand().0),
        ))
    }

    fn arith(self, op: BinaryOp, rhs: impl IntoOperand) -> Self {
        Self(Expr::Binary(
            op,
            Box::new(self.0),
            Box::new(rhs.into_operand().0),
        ))
    }

    fn call(self, func: Function) -> Self {
        Self(Expr::Function(func, vec![self.0]))
    }

    pub fn eq(self, rhs: impl IntoOperand) -> Filter {
        self.compare(BinaryOp::Eq, rhs)
    }

    pub fn ne(self, rhs: impl IntoOperand) -> Filter {
        self.compare(BinaryOp::Ne, rhs)
    }

    pub fn gt(self, rhs: impl IntoOperand) -> Filter {
        self.compare(BinaryOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl IntoOperand) -> Filter {
        self.compare(BinaryOp::Ge, rhs)
    }

    pub fn lt(self, rhs: impl IntoOperand) -> Filter {
        self.compare(BinaryOp::Lt, rhs)
    }

    pub fn le(self, rhs: impl IntoOperand) -> Filter {
        self.compare(BinaryOp::Le, rhs)
    }

    pub fn add(self, rhs: impl IntoOperand) -> Self {
        self.arith(BinaryOp::Add, rhs)
    }

    pub fn sub(self, rhs: impl IntoOperand) -> Self {
        self.arith(BinaryOp::Sub, rhs)
    }

    pub fn mul(self, rhs: impl IntoOperand) -> Self {
        self.arith(BinaryOp::Mul, rhs)
    }

    pub fn div(self, rhs: impl IntoOperand) -> Self {
        self.arith(BinaryOp::Div, rhs)
    }

    pub fn modulo(self, rhs: impl IntoOperand) -> Self {
        self.arith(BinaryOp::Mod, rhs)
    }

    pub fn ceiling(self) -> Self {
        self.call(Function::Ceiling)
    }

    pub fn floor(self) -> Self {
        self.call(Function::Floor)
    }

    pub fn round(self) -> Self {
        self.call(Function::Round)
    }

    pub fn day(self) -> Self {
        self.call(Function::Day)
    }

    pub fn month(self) -> Self {
        self.call(Function::Month)
    }

    pub fn year(self) -> Self {
        self.call(Function::Year)
    }

    pub fn hour(self) -> Self {
        self.call(Function::Hour)
    }

    pub fn minute(self) -> Self {
        self.call(Function::Minute)
    }

    pub fn second(self) -> Self {
        self.call(Function::Second)
    }

    pub fn to_lower(self) -> Self {
        self.call(Function::ToLower)
    }

    pub fn to_upper(self) -> Self {
        self.call(Function::ToUpper)
    }

    pub fn startswith(self, prefix: impl IntoOperand) -> Filter {
        Filter(Expr::Function(
            Function::StartsWith,
            vec![self.0, prefix.into_operand().0],
        ))
    }

    pub fn endswith(self, suffix: impl IntoOperand) -> Filter {
        Filter(Expr::Function(
            Function::EndsWith,
            vec![self.0, suffix.into_operand().0],
        ))
    }

    /// Ordinal, case-insensitive equality: lowercases both sides.
    pub fn eq_ignore_case(self, rhs: &str) -> Filter {
        self.to_lower().eq(rhs.to_lowercase())
    }

    /// Ordinal, case-insensitive inequality: lowercases both sides.
    pub fn ne_ignore_case(self, rhs: &str) -> Filter {
        self.to_lower().ne(rhs.to_lowercase())
    }

    pub fn is_null(self) -> Filter {
        self.eq(Value::Null)
    }

    pub fn in_list<I>(self, values: I) -> Filter
    where
        I: IntoIterator,
        I::Item: IntoValue,
    {
        Filter(Expr::In(
            Box::new(self.0),
            values.into_iter().map(IntoValue::into_value).collect(),
        ))
    }
}

/// A boolean filter under construction.
#[derive(Debug, Clone)]
pub struct Filter(Expr);

impl Filter {
    pub fn and(self, other: Self) -> Self {
        Self(self.0.and(other.0))
    }

    pub fn or(self, other: Self) -> Self {
        Self(self.0.or(other.0))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self(self.0.not())
    }

    #[must_use]
    pub fn into_expr(self) -> Expr {
        self.0
    }
}

impl From<Filter> for Expr {
    fn from(filter: Filter) -> Self {
        filter.0
    }
}

/// Builder assembling a [`Query`] description.
///
/// `skip` accumulates across calls, `top` takes the minimum, order-by
/// keys and selected fields append in call order — the same tie-breaks
/// the server applies to repeated query options.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter; combined with any previous filter using `and`.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.query.filter = Some(match self.query.filter.take() {
            Some(existing) => existing.and(filter.0),
            None => filter.0,
        });
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.query.order_by.push(OrderBy::asc(field));
        self
    }

    #[must_use]
    pub fn order_by_desc(mut self, field: impl Into<String>) -> Self {
        self.query.order_by.push(OrderBy::desc(field));
        self
    }

    /// Project to the named fields. The four metadata fields are always
    /// appended: they are required to deserialize the page items.
    #[must_use]
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.query.select.iter().any(|existing| *existing == field) {
                self.query.select.push(field);
            }
        }
        self
    }

    #[must_use]
    pub fn skip(mut self, n: u64) -> Self {
        self.query.skip = Some(self.query.skip.unwrap_or(0).saturating_add(n));
        self
    }

    #[must_use]
    pub fn top(mut self, n: u64) -> Self {
        self.query.top = Some(self.query.top.map_or(n, |existing| existing.min(n)));
        self
    }

    #[must_use]
    pub fn include_deleted(mut self, include: bool) -> Self {
        self.query.include_deleted = include;
        self
    }

    #[must_use]
    pub fn include_count(mut self, count: bool) -> Self {
        self.query.count = count;
        self
    }

    #[must_use]
    pub fn build(mut self) -> Query {
        if !self.query.select.is_empty() {
            for required in &[ID_FIELD, UPDATED_AT_FIELD, VERSION_FIELD, DELETED_FIELD] {
                if !self.query.select.iter().any(|f| f == required) {
                    self.query.select.push((*required).to_string());
                }
            }
        }
        self.query
    }
}
