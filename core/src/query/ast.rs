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

//! Query expression tree
//!
//! The canonical form shared by the parser (server side) and the fluent
//! builder (client side). [`Expr::to_odata`] emits the documented text
//! subset; [`crate::query::parser`] reads it back. Binary nodes always
//! serialize parenthesized so composed filters nest without precedence
//! surprises.

use crate::edm::{EdmDate, EdmDateTimeOffset, EdmTimeOfDay};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::fmt::Write as _;
use uuid::Uuid;

/// A typed literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Decimal(Decimal),
    String(String),
    Date(EdmDate),
    TimeOfDay(EdmTimeOfDay),
    DateTimeOffset(EdmDateTimeOffset),
    Guid(Uuid),
}

impl Value {
    /// OData literal text form.
    #[must_use]
    pub fn to_odata(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Double(d) => {
                // `{:?}` keeps a trailing `.0` so the literal reparses
                // as a double rather than an integer
                format!("{:?}", d)
            }
            Self::Decimal(d) => format!("{}M", d),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Date(d) => format!("cast({},Edm.Date)", d),
            Self::TimeOfDay(t) => format!("cast({},Edm.TimeOfDay)", t),
            Self::DateTimeOffset(dt) => format!("cast({},Edm.DateTimeOffset)", dt),
            Self::Guid(g) => format!("cast({},Edm.Guid)", g),
        }
    }

    /// Ordering between two values, with numeric promotion across
    /// int/double/decimal. `None` when the pair is not comparable.
    #[must_use]
    pub fn try_compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Double(a), Self::Double(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Double(b)) => (*a as f64).partial_cmp(b),
            (Self::Double(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Decimal(a), Self::Decimal(b)) => Some(a.cmp(b)),
            (Self::Decimal(a), Self::Int(b)) => Some(a.cmp(&Decimal::from(*b))),
            (Self::Int(a), Self::Decimal(b)) => Some(Decimal::from(*a).cmp(b)),
            (Self::Decimal(a), Self::Double(b)) => a.to_f64().and_then(|a| a.partial_cmp(b)),
            (Self::Double(a), Self::Decimal(b)) => b.to_f64().and_then(|b| a.partial_cmp(&b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::TimeOfDay(a), Self::TimeOfDay(b)) => Some(a.cmp(b)),
            (Self::DateTimeOffset(a), Self::DateTimeOffset(b)) => Some(a.cmp(b)),
            (Self::Guid(a), Self::Guid(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Equality with `null eq null` true and cross-type pairs unequal.
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Null, _) | (_, Self::Null) => false,
            _ => self.try_compare(other) == Some(Ordering::Equal),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
}

/// Binary operators, logical through multiplicative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Mod => "mod",
        }
    }
}

/// Recognized scalar functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Ceiling,
    Floor,
    Round,
    Day,
    Month,
    Year,
    Hour,
    Minute,
    Second,
    StartsWith,
    EndsWith,
    ToLower,
    ToUpper,
    Concat,
}

impl Function {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Ceiling => "ceiling",
            Self::Floor => "floor",
            Self::Round => "round",
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
            Self::ToLower => "tolower",
            Self::ToUpper => "toupper",
            Self::Concat => "concat",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "ceiling" => Self::Ceiling,
            "floor" => Self::Floor,
            "round" => Self::Round,
            "day" => Self::Day,
            "month" => Self::Month,
            "year" => Self::Year,
            "hour" => Self::Hour,
            "minute" => Self::Minute,
            "second" => Self::Second,
            "startswith" => Self::StartsWith,
            "endswith" => Self::EndsWith,
            "tolower" => Self::ToLower,
            "toupper" => Self::ToUpper,
            "concat" => Self::Concat,
            _ => return None,
        })
    }

    /// Expected argument count.
    #[must_use]
    pub fn arity(self) -> usize {
        match self {
            Self::StartsWith | Self::EndsWith | Self::Concat => 2,
            _ => 1,
        }
    }
}

/// Edm target types usable in `cast(...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdmType {
    Boolean,
    Int32,
    Int64,
    Double,
    Decimal,
    String,
    Date,
    TimeOfDay,
    DateTimeOffset,
    Guid,
}

impl EdmType {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Edm.Boolean" => Self::Boolean,
            "Edm.Int32" => Self::Int32,
            "Edm.Int64" => Self::Int64,
            "Edm.Double" => Self::Double,
            "Edm.Decimal" => Self::Decimal,
            "Edm.String" => Self::String,
            "Edm.Date" => Self::Date,
            "Edm.TimeOfDay" => Self::TimeOfDay,
            "Edm.DateTimeOffset" => Self::DateTimeOffset,
            "Edm.Guid" => Self::Guid,
            _ => return None,
        })
    }
}

impl Display for EdmType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Boolean => "Edm.Boolean",
            Self::Int32 => "Edm.Int32",
            Self::Int64 => "Edm.Int64",
            Self::Double => "Edm.Double",
            Self::Decimal => "Edm.Decimal",
            Self::String => "Edm.String",
            Self::Date => "Edm.Date",
            Self::TimeOfDay => "Edm.TimeOfDay",
            Self::DateTimeOffset => "Edm.DateTimeOffset",
            Self::Guid => "Edm.Guid",
        };
        f.write_str(name)
    }
}

/// A boolean or scalar expression over entity fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Value),
    Member(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Function(Function, Vec<Expr>),
    Convert(Box<Expr>, EdmType),
    In(Box<Expr>, Vec<Value>),
}

impl Expr {
    /// Combine two filters with `and`.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::Binary(BinaryOp::And, Box::new(self), Box::new(other))
    }

    /// Combine two filters with `or`.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Binary(BinaryOp::Or, Box::new(self), Box::new(other))
    }

    /// Negate a filter.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Unary(UnaryOp::Not, Box::new(self))
    }

    /// OData text form of the expression. Binary nodes are always
    /// parenthesized.
    #[must_use]
    pub fn to_odata(&self) -> String {
        let mut out = String::new();
        self.write_odata(&mut out);
        out
    }

    fn write_odata(&self, out: &mut String) {
        match self {
            Self::Constant(v) => out.push_str(&v.to_odata()),
            Self::Member(name) => out.push_str(name),
            Self::Unary(UnaryOp::Not, inner) => {
                out.push_str("not ");
                inner.write_odata(out);
            }
            Self::Binary(op, lhs, rhs) => {
                out.push('(');
                lhs.write_odata(out);
                let _ = write!(out, " {} ", op.keyword());
                rhs.write_odata(out);
                out.push(')');
            }
            Self::Function(func, args) => {
                out.push_str(func.name());
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    arg.write_odata(out);
                }
                out.push(')');
            }
            Self::Convert(inner, target) => {
                out.push_str("cast(");
                inner.write_odata(out);
                let _ = write!(out, ",{})", target);
            }
            Self::In(member, values) => {
                member.write_odata(out);
                out.push_str(" in (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&value.to_odata());
                }
                out.push(')');
            }
        }
    }
}

/// Sort direction in `$orderby`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One `$orderby` key, in order of appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    #[must_use]
    pub fn to_odata(&self) -> String {
        match self.direction {
            Direction::Asc => self.field.clone(),
            Direction::Desc => format!("{} desc", self.field),
        }
    }
}
