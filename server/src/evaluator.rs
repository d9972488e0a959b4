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

//! Query evaluation over in-memory rows.
//!
//! [`execute`] applies a parsed [`Query`] to a snapshot of rows:
//! access-control view and soft-delete visibility first, then filter,
//! ordering, optional count, then paging with the server page size and
//! a continuation link. Expression evaluation uses typed [`Value`]s
//! with numeric promotion; string fields compare against typed literals
//! (dates, guids) by parsing the field value.
//!
//! Null semantics: ordering comparisons involving `null` are false,
//! `null eq null` is true, and scalar functions propagate `null`.

use datasync_core::ast::{BinaryOp, EdmType, Expr, Function, OrderBy, UnaryOp, Value};
use datasync_core::query::Query;
use datasync_core::{EdmDate, EdmDateTimeOffset, EdmTimeOfDay, Page, TableRow};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use time::OffsetDateTime;

/// Server paging configuration.
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    /// Rows per page when `$top` is absent; also the per-page ceiling.
    pub page_size: u64,
    /// Largest `$top` a request may carry; above it the request fails.
    pub max_top: u64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_top: 100_000,
        }
    }
}

/// Apply `query` to `rows`, producing one page.
pub fn execute(
    query: &Query,
    rows: &[TableRow],
    view: Option<&Expr>,
    limits: &PageLimits,
) -> Result<Page<Json>, EvalError> {
    if let Some(top) = query.top {
        if top > limits.max_top {
            return Err(EvalError::TopExceedsLimit(top, limits.max_top));
        }
    }

    let mut matched: Vec<&TableRow> = Vec::new();
    for row in rows {
        if !query.include_deleted && row.system.deleted {
            continue;
        }
        if let Some(view) = view {
            if !expect_bool(eval(view, row)?)? {
                continue;
            }
        }
        if let Some(filter) = &query.filter {
            if !expect_bool(eval(filter, row)?)? {
                continue;
            }
        }
        matched.push(row);
    }

    sort_rows(&mut matched, &query.order_by)?;

    let total = matched.len() as u64;
    let count = if query.count { Some(total) } else { None };

    let skip = query.skip.unwrap_or(0);
    let page_size = query
        .top
        .map_or(limits.page_size, |top| top.min(limits.page_size));

    let start = (skip as usize).min(matched.len());
    let end = (start + page_size as usize).min(matched.len());
    let window = &matched[start..end];

    let items: Vec<Json> = if query.select.is_empty() {
        window
            .iter()
            .map(|row| serde_json::to_value(row).map_err(|e| EvalError::Internal(e.to_string())))
            .collect::<Result<_, _>>()?
    } else {
        window.iter().map(|row| row.project(&query.select)).collect()
    };

    let returned = items.len() as u64;
    let next_link = if page_size > 0 && returned == page_size && skip + returned < total {
        let mut next = query.clone();
        next.skip = Some(skip + returned);
        next.top = None;
        Some(next.to_query_string())
    } else {
        None
    };

    Ok(Page {
        items,
        count,
        next_link,
    })
}

fn sort_rows(rows: &mut Vec<&TableRow>, keys: &[OrderBy]) -> Result<(), EvalError> {
    if keys.is_empty() {
        return Ok(());
    }
    // resolve every key up front so field errors surface as 400s
    let mut decorated: Vec<(Vec<Value>, &TableRow)> = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let mut resolved = Vec::with_capacity(keys.len());
        for key in keys {
            resolved.push(member_value(row, &key.field)?);
        }
        decorated.push((resolved, *row));
    }
    decorated.sort_by(|(a, _), (b, _)| {
        for (i, key) in keys.iter().enumerate() {
            let ordering = sort_compare(&a[i], &b[i]);
            let ordering = match key.direction {
                datasync_core::ast::Direction::Asc => ordering,
                datasync_core::ast::Direction::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    *rows = decorated.into_iter().map(|(_, row)| row).collect();
    Ok(())
}

/// Total order for sorting: nulls first, incomparable pairs equal.
fn sort_compare(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => {
            let (a, b) = coerce_pair(a.clone(), b.clone());
            a.try_compare(&b).unwrap_or(Ordering::Equal)
        }
    }
}

/// Evaluate an expression against one row.
pub fn eval(expr: &Expr, row: &TableRow) -> Result<Value, EvalError> {
    match expr {
        Expr::Constant(value) => Ok(value.clone()),
        Expr::Member(name) => member_value(row, name),
        Expr::Unary(UnaryOp::Not, inner) => {
            let value = expect_bool(eval(inner, row)?)?;
            Ok(Value::Bool(!value))
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs, row)?;
            let rhs = eval(rhs, row)?;
            apply_binary(*op, lhs, rhs)
        }
        Expr::Function(func, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, row)?);
            }
            apply_function(*func, values)
        }
        Expr::Convert(inner, target) => {
            let value = eval(inner, row)?;
            convert(value, *target)
        }
        Expr::In(member, list) => {
            let value = eval(member, row)?;
            let hit = list.iter().any(|candidate| {
                let (a, b) = coerce_pair(value.clone(), candidate.clone());
                a.equals(&b)
            });
            Ok(Value::Bool(hit))
        }
    }
}

fn member_value(row: &TableRow, name: &str) -> Result<Value, EvalError> {
    match row.field(name) {
        Some(json) => {
            // updatedAt is a timestamp on the wire; compare and sort it
            // as one, not as its string form
            if name == datasync_core::entity::UPDATED_AT_FIELD {
                if let Json::String(s) = &json {
                    if let Ok(dt) = s.parse::<EdmDateTimeOffset>() {
                        return Ok(Value::DateTimeOffset(dt));
                    }
                }
            }
            json_value(&json)
        }
        None if name == datasync_core::entity::UPDATED_AT_FIELD
            || name == datasync_core::entity::VERSION_FIELD =>
        {
            // metadata not yet assigned on this row
            Ok(Value::Null)
        }
        None => Err(EvalError::UnknownField(name.to_string())),
    }
}

fn json_value(json: &Json) -> Result<Value, EvalError> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Double(f))
            } else {
                Err(EvalError::Unsupported("number out of range".into()))
            }
        }
        Json::String(s) => Ok(Value::String(s.clone())),
        Json::Array(_) | Json::Object(_) => {
            Err(EvalError::Unsupported("nested values cannot be filtered".into()))
        }
    }
}

/// When one side is a string and the other a typed literal, parse the
/// string into the literal's type so stored JSON strings compare
/// against `cast(...)` constants.
fn coerce_pair(a: Value, b: Value) -> (Value, Value) {
    fn parse_as(reference: &Value, s: &str) -> Option<Value> {
        match reference {
            Value::Date(_) => s.parse::<EdmDate>().ok().map(Value::Date),
            Value::TimeOfDay(_) => s.parse::<EdmTimeOfDay>().ok().map(Value::TimeOfDay),
            Value::DateTimeOffset(_) => {
                s.parse::<EdmDateTimeOffset>().ok().map(Value::DateTimeOffset)
            }
            Value::Guid(_) => s.parse().ok().map(Value::Guid),
            Value::Decimal(_) => s.parse::<Decimal>().ok().map(Value::Decimal),
            _ => None,
        }
    }
    match (&a, &b) {
        (Value::String(s), _) => {
            if let Some(parsed) = parse_as(&b, s) {
                return (parsed, b);
            }
            (a, b)
        }
        (_, Value::String(s)) => {
            if let Some(parsed) = parse_as(&a, s) {
                return (a, parsed);
            }
            (a, b)
        }
        _ => (a, b),
    }
}

fn apply_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::And => Ok(Value::Bool(expect_bool(lhs)? && expect_bool(rhs)?)),
        BinaryOp::Or => Ok(Value::Bool(expect_bool(lhs)? || expect_bool(rhs)?)),
        BinaryOp::Eq | BinaryOp::Ne => {
            let (lhs, rhs) = coerce_pair(lhs, rhs);
            let equal = lhs.equals(&rhs);
            Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
        }
        BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le => {
            if lhs.is_null() || rhs.is_null() {
                return Ok(Value::Bool(false));
            }
            let (lhs, rhs) = coerce_pair(lhs, rhs);
            let holds = match lhs.try_compare(&rhs) {
                Some(ordering) => match op {
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    BinaryOp::Ge => ordering != Ordering::Less,
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    _ => unreachable!(),
                },
                None => false,
            };
            Ok(Value::Bool(holds))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, lhs, rhs)
        }
    }
}

fn arithmetic(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }
    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div => {
                    if b == 0 {
                        return Err(EvalError::DivideByZero);
                    }
                    a.checked_div(b)
                }
                BinaryOp::Mod => {
                    if b == 0 {
                        return Err(EvalError::DivideByZero);
                    }
                    a.checked_rem(b)
                }
                _ => unreachable!(),
            };
            result
                .map(Value::Int)
                .ok_or_else(|| EvalError::Unsupported("integer overflow".into()))
        }
        (Value::Decimal(_), Value::Double(_)) | (Value::Double(_), Value::Decimal(_)) => {
            let a = to_f64(&lhs)?;
            let b = to_f64(&rhs)?;
            float_arithmetic(op, a, b)
        }
        (Value::Decimal(_), _) | (_, Value::Decimal(_)) => {
            let a = to_decimal(&lhs)?;
            let b = to_decimal(&rhs)?;
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div => {
                    if b.is_zero() {
                        return Err(EvalError::DivideByZero);
                    }
                    a.checked_div(b)
                }
                BinaryOp::Mod => {
                    if b.is_zero() {
                        return Err(EvalError::DivideByZero);
                    }
                    a.checked_rem(b)
                }
                _ => unreachable!(),
            };
            result
                .map(Value::Decimal)
                .ok_or_else(|| EvalError::Unsupported("decimal overflow".into()))
        }
        _ => {
            let a = to_f64(&lhs)?;
            let b = to_f64(&rhs)?;
            float_arithmetic(op, a, b)
        }
    }
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> Result<Value, EvalError> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => unreachable!(),
    };
    Ok(Value::Double(result))
}

fn to_f64(value: &Value) -> Result<f64, EvalError> {
    match value {
        Value::Int(i) => Ok(*i as f64),
        Value::Double(d) => Ok(*d),
        Value::Decimal(d) => d
            .to_f64()
            .ok_or_else(|| EvalError::Unsupported("decimal out of double range".into())),
        other => Err(EvalError::TypeMismatch(format!(
            "expected a number, found {:?}",
            other
        ))),
    }
}

fn to_decimal(value: &Value) -> Result<Decimal, EvalError> {
    match value {
        Value::Int(i) => Ok(Decimal::from(*i)),
        Value::Decimal(d) => Ok(*d),
        other => Err(EvalError::TypeMismatch(format!(
            "expected a decimal, found {:?}",
            other
        ))),
    }
}

fn apply_function(func: Function, mut args: Vec<Value>) -> Result<Value, EvalError> {
    // single-argument scalar functions propagate null
    if func != Function::Concat && args.iter().any(Value::is_null) {
        return Ok(match func {
            Function::StartsWith | Function::EndsWith => Value::Bool(false),
            _ => Value::Null,
        });
    }
    match func {
        Function::Ceiling | Function::Floor | Function::Round => {
            let value = args.remove(0);
            match value {
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Double(d) => Ok(Value::Double(match func {
                    Function::Ceiling => d.ceil(),
                    Function::Floor => d.floor(),
                    _ => d.round(),
                })),
                Value::Decimal(d) => Ok(Value::Decimal(match func {
                    Function::Ceiling => d.ceil(),
                    Function::Floor => d.floor(),
                    _ => d.round(),
                })),
                other => Err(EvalError::TypeMismatch(format!(
                    "{} expects a number, found {:?}",
                    func.name(),
                    other
                ))),
            }
        }
        Function::Day | Function::Month | Function::Year => {
            let value = args.remove(0);
            let (year, month, day) = date_parts(&value, func)?;
            Ok(Value::Int(match func {
                Function::Day => i64::from(day),
                Function::Month => i64::from(month),
                _ => i64::from(year),
            }))
        }
        Function::Hour | Function::Minute | Function::Second => {
            let value = args.remove(0);
            let (hour, minute, second) = time_parts(&value, func)?;
            Ok(Value::Int(match func {
                Function::Hour => i64::from(hour),
                Function::Minute => i64::from(minute),
                _ => i64::from(second),
            }))
        }
        Function::StartsWith | Function::EndsWith => {
            let prefix = expect_string(args.remove(1), func)?;
            let subject = expect_string(args.remove(0), func)?;
            Ok(Value::Bool(if func == Function::StartsWith {
                subject.starts_with(&prefix)
            } else {
                subject.ends_with(&prefix)
            }))
        }
        Function::ToLower => {
            let s = expect_string(args.remove(0), func)?;
            Ok(Value::String(s.to_lowercase()))
        }
        Function::ToUpper => {
            let s = expect_string(args.remove(0), func)?;
            Ok(Value::String(s.to_uppercase()))
        }
        Function::Concat => {
            if args.iter().any(Value::is_null) {
                return Ok(Value::Null);
            }
            let rhs = expect_string(args.remove(1), func)?;
            let lhs = expect_string(args.remove(0), func)?;
            Ok(Value::String(lhs + &rhs))
        }
    }
}

fn date_parts(value: &Value, func: Function) -> Result<(i32, u8, u8), EvalError> {
    match value {
        Value::Date(d) => {
            let date: time::Date = (*d).into();
            Ok((date.year(), u8::from(date.month()), date.day()))
        }
        Value::DateTimeOffset(dt) => {
            let dt: OffsetDateTime = (*dt).into();
            Ok((dt.year(), u8::from(dt.month()), dt.day()))
        }
        Value::String(s) => {
            if let Ok(dt) = s.parse::<EdmDateTimeOffset>() {
                return date_parts(&Value::DateTimeOffset(dt), func);
            }
            if let Ok(d) = s.parse::<EdmDate>() {
                return date_parts(&Value::Date(d), func);
            }
            Err(EvalError::TypeMismatch(format!(
                "{} expects a date, found {:?}",
                func.name(),
                s
            )))
        }
        other => Err(EvalError::TypeMismatch(format!(
            "{} expects a date, found {:?}",
            func.name(),
            other
        ))),
    }
}

fn time_parts(value: &Value, func: Function) -> Result<(u8, u8, u8), EvalError> {
    match value {
        Value::TimeOfDay(t) => {
            let t: time::Time = (*t).into();
            Ok((t.hour(), t.minute(), t.second()))
        }
        Value::DateTimeOffset(dt) => {
            let dt: OffsetDateTime = (*dt).into();
            Ok((dt.hour(), dt.minute(), dt.second()))
        }
        Value::String(s) => {
            if let Ok(dt) = s.parse::<EdmDateTimeOffset>() {
                return time_parts(&Value::DateTimeOffset(dt), func);
            }
            if let Ok(t) = s.parse::<EdmTimeOfDay>() {
                return time_parts(&Value::TimeOfDay(t), func);
            }
            Err(EvalError::TypeMismatch(format!(
                "{} expects a time, found {:?}",
                func.name(),
                s
            )))
        }
        other => Err(EvalError::TypeMismatch(format!(
            "{} expects a time, found {:?}",
            func.name(),
            other
        ))),
    }
}

fn convert(value: Value, target: EdmType) -> Result<Value, EvalError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let converted = match target {
        EdmType::Double => Value::Double(to_f64(&value)?),
        EdmType::Decimal => Value::Decimal(to_decimal(&value)?),
        EdmType::Int32 | EdmType::Int64 => match value {
            Value::Int(i) => Value::Int(i),
            Value::Double(d) => Value::Int(d.trunc() as i64),
            Value::Decimal(d) => Value::Int(
                d.trunc()
                    .to_i64()
                    .ok_or_else(|| EvalError::Unsupported("decimal out of integer range".into()))?,
            ),
            other => {
                return Err(EvalError::TypeMismatch(format!(
                    "cannot cast {:?} to an integer",
                    other
                )))
            }
        },
        EdmType::String => Value::String(match value {
            Value::String(s) => s,
            other => other.to_odata(),
        }),
        EdmType::Boolean => match value {
            Value::Bool(b) => Value::Bool(b),
            other => {
                return Err(EvalError::TypeMismatch(format!(
                    "cannot cast {:?} to a boolean",
                    other
                )))
            }
        },
        EdmType::Date | EdmType::TimeOfDay | EdmType::DateTimeOffset | EdmType::Guid => {
            match &value {
                Value::String(s) => match target {
                    EdmType::Date => s
                        .parse::<EdmDate>()
                        .map(Value::Date)
                        .map_err(|e| EvalError::TypeMismatch(e.to_string()))?,
                    EdmType::TimeOfDay => s
                        .parse::<EdmTimeOfDay>()
                        .map(Value::TimeOfDay)
                        .map_err(|e| EvalError::TypeMismatch(e.to_string()))?,
                    EdmType::DateTimeOffset => s
                        .parse::<EdmDateTimeOffset>()
                        .map(Value::DateTimeOffset)
                        .map_err(|e| EvalError::TypeMismatch(e.to_string()))?,
                    _ => s
                        .parse()
                        .map(Value::Guid)
                        .map_err(|_| EvalError::TypeMismatch(format!("invalid guid {:?}", s)))?,
                },
                _ => value,
            }
        }
    };
    Ok(converted)
}

fn expect_bool(value: Value) -> Result<bool, EvalError> {
    match value {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        other => Err(EvalError::TypeMismatch(format!(
            "expected a boolean expression, found {:?}",
            other
        ))),
    }
}

fn expect_string(value: Value, func: Function) -> Result<String, EvalError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(EvalError::TypeMismatch(format!(
            "{} expects a string, found {:?}",
            func.name(),
            other
        ))),
    }
}

#[derive(Debug)]
pub enum EvalError {
    UnknownField(String),
    TypeMismatch(String),
    TopExceedsLimit(u64, u64),
    DivideByZero,
    Unsupported(String),
    Internal(String),
}

impl Display for EvalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::UnknownField(name) => write!(f, "unknown field {:?}", name),
            Self::TypeMismatch(msg) => write!(f, "type mismatch: {}", msg),
            Self::TopExceedsLimit(top, max) => {
                write!(f, "$top={} exceeds the server limit of {}", top, max)
            }
            Self::DivideByZero => write!(f, "division by zero"),
            Self::Unsupported(msg) => write!(f, "unsupported expression: {}", msg),
            Self::Internal(msg) => write!(f, "evaluation failure: {}", msg),
        }
    }
}

#[allow(clippy::absolute_paths)]
impl std::error::Error for EvalError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn movies() -> Vec<TableRow> {
        (0..248)
            .map(|i| {
                TableRow::from_json(json!({
                    "id": format!("id-{:03}", i),
                    "title": format!("Movie {:03}", i),
                    "year": 1980 + (i % 40),
                    "rating": (i % 10) as f64 / 2.0,
                    "releaseDate": format!("{:04}-06-15", 1980 + (i % 40)),
                    "deleted": false
                }))
                .unwrap()
            })
            .collect()
    }

    fn run(query_string: &str, rows: &[TableRow]) -> Page<Json> {
        let query = Query::parse(query_string).unwrap();
        execute(&query, rows, None, &PageLimits::default()).unwrap()
    }

    #[test]
    fn default_paging_returns_100_and_continuation() {
        let rows = movies();
        let page = run("", &rows);
        assert_eq!(page.items.len(), 100);
        assert_eq!(page.next_link.as_deref(), Some("$skip=100"));

        let page = run("$skip=100", &rows);
        assert_eq!(page.items.len(), 100);
        assert_eq!(page.next_link.as_deref(), Some("$skip=200"));

        let page = run("$skip=200", &rows);
        assert_eq!(page.items.len(), 48);
        assert!(page.next_link.is_none());
    }

    #[test]
    fn paged_items_concatenate_to_unpaged_result() {
        let rows = movies();
        let mut collected = Vec::new();
        let mut query_string = "$orderby=id".to_string();
        loop {
            let page = run(&query_string, &rows);
            collected.extend(page.items);
            match page.next_link {
                Some(next) => query_string = next,
                None => break,
            }
        }
        assert_eq!(collected.len(), 248);
        let ids: Vec<_> = collected.iter().map(|i| i["id"].clone()).collect();
        let mut sorted = ids.clone();
        sorted.sort_by_key(|v| v.as_str().unwrap().to_string());
        assert_eq!(ids, sorted);
    }

    #[test]
    fn filter_and_order_by_release_date() {
        let rows = movies();
        let page = run(
            "$filter=year ge 2000&$orderby=releaseDate asc&$top=5",
            &rows,
        );
        assert_eq!(page.items.len(), 5);
        let mut last = String::new();
        for item in &page.items {
            assert!(item["year"].as_i64().unwrap() >= 2000);
            let date = item["releaseDate"].as_str().unwrap().to_string();
            assert!(date >= last);
            last = date;
        }
    }

    #[test]
    fn top_zero_returns_count_only() {
        let rows = movies();
        let page = run("$top=0&$count=true", &rows);
        assert!(page.items.is_empty());
        assert_eq!(page.count, Some(248));
        assert!(page.next_link.is_none());
    }

    #[test]
    fn skip_past_end_returns_empty_page_without_continuation() {
        let rows = movies();
        let page = run("$skip=500", &rows);
        assert!(page.items.is_empty());
        assert!(page.next_link.is_none());
    }

    #[test]
    fn top_above_cap_fails() {
        let rows = movies();
        let query = Query::parse("$top=100001").unwrap();
        assert!(matches!(
            execute(&query, &rows, None, &PageLimits::default()),
            Err(EvalError::TopExceedsLimit(_, _))
        ));
    }

    #[test]
    fn soft_deleted_rows_hidden_unless_requested() {
        let mut rows = movies();
        rows[0].system.deleted = true;
        let page = run("$count=true&$top=0", &rows);
        assert_eq!(page.count, Some(247));

        let page = run("$count=true&$top=0&__includedeleted=true", &rows);
        assert_eq!(page.count, Some(248));
    }

    #[test]
    fn data_view_is_injected_as_conjunct() {
        let rows = movies();
        let query = Query::parse("$count=true&$top=0").unwrap();
        let view = datasync_core::query::parser::parse_filter("year ge 2010").unwrap();
        let page = execute(&query, &rows, Some(&view), &PageLimits::default()).unwrap();
        let expected = rows
            .iter()
            .filter(|r| r.fields["year"].as_i64().unwrap() >= 2010)
            .count() as u64;
        assert_eq!(page.count, Some(expected));
    }

    #[test]
    fn string_fields_compare_against_cast_literals() {
        let rows = vec![TableRow::from_json(json!({
            "id": "a",
            "updatedAt": "2024-08-23T20:22:54.291Z",
            "stamp": "2024-08-23T20:22:54.291Z"
        }))
        .unwrap()];
        let page = run(
            "$filter=stamp gt cast(2024-01-01T00:00:00Z,Edm.DateTimeOffset)",
            &rows,
        );
        assert_eq!(page.items.len(), 1);

        let page = run(
            "$filter=updatedAt gt cast(2024-12-01T00:00:00Z,Edm.DateTimeOffset)",
            &rows,
        );
        assert!(page.items.is_empty());
    }

    #[test]
    fn functions_evaluate() {
        let rows = vec![TableRow::from_json(json!({
            "id": "a",
            "title": "The Matrix",
            "releaseDate": "1999-03-31",
            "price": 9.99
        }))
        .unwrap()];
        assert_eq!(run("$filter=startswith(title,'The')", &rows).items.len(), 1);
        assert_eq!(run("$filter=endswith(title,'trix')", &rows).items.len(), 1);
        assert_eq!(
            run("$filter=tolower(title) eq 'the matrix'", &rows).items.len(),
            1
        );
        assert_eq!(run("$filter=year(releaseDate) eq 1999", &rows).items.len(), 1);
        assert_eq!(run("$filter=floor(price) eq 9.0", &rows).items.len(), 1);
        assert_eq!(run("$filter=ceiling(price) eq 10.0", &rows).items.len(), 1);
        assert_eq!(
            run("$filter=concat(title,'!') eq 'The Matrix!'", &rows).items.len(),
            1
        );
    }

    #[test]
    fn arithmetic_evaluates() {
        let rows = vec![TableRow::from_json(json!({"id": "a", "year": 2001})).unwrap()];
        assert_eq!(run("$filter=year add 1 eq 2002", &rows).items.len(), 1);
        assert_eq!(run("$filter=year mod 2 eq 1", &rows).items.len(), 1);
        assert_eq!(run("$filter=year sub 1 eq 2000", &rows).items.len(), 1);
        assert_eq!(run("$filter=year div 2 eq 1000", &rows).items.len(), 1);
    }

    #[test]
    fn null_comparisons_are_false_null_eq_null_true() {
        let rows = vec![TableRow::from_json(json!({"id": "a", "rating": null})).unwrap()];
        assert!(run("$filter=rating gt 1", &rows).items.is_empty());
        assert_eq!(run("$filter=rating eq null", &rows).items.len(), 1);
    }

    #[test]
    fn unknown_field_fails() {
        let rows = movies();
        let query = Query::parse("$filter=nope eq 1").unwrap();
        assert!(matches!(
            execute(&query, &rows, None, &PageLimits::default()),
            Err(EvalError::UnknownField(_))
        ));
        let query = Query::parse("$orderby=nope").unwrap();
        assert!(matches!(
            execute(&query, &rows, None, &PageLimits::default()),
            Err(EvalError::UnknownField(_))
        ));
    }

    #[test]
    fn select_projects_fields() {
        let rows = movies();
        let page = run("$select=id,title&$top=1", &rows);
        let item = page.items[0].as_object().unwrap();
        assert!(item.contains_key("id"));
        assert!(item.contains_key("title"));
        assert!(!item.contains_key("year"));
    }

    #[test]
    fn in_list_matches() {
        let rows = movies();
        let page = run("$filter=year in (1999,2000)&$count=true&$top=0", &rows);
        let expected = rows
            .iter()
            .filter(|r| {
                let y = r.fields["year"].as_i64().unwrap();
                y == 1999 || y == 2000
            })
            .count() as u64;
        assert_eq!(page.count, Some(expected));
    }

    #[test]
    fn next_link_preserves_filter_and_drops_top() {
        let rows = movies();
        let page = run("$filter=year ge 1980&$top=100&$count=true", &rows);
        assert_eq!(page.items.len(), 100);
        let next = page.next_link.unwrap();
        assert!(next.contains("$filter="));
        assert!(next.contains("$skip=100"));
        assert!(next.contains("$count=true"));
        assert!(!next.contains("$top"));
    }
}
