//! In-memory lookup semantics
//!
//! One pure comparison per lookup kind, held in a static table. Each
//! function receives `(record value, lookup value)`.
//!
//! Multi-valued properties match when any element matches, except for
//! `isnull` (a list is never null) and `contains` (element membership).

use regex::RegexBuilder;

use crate::datastore::{FilterOperator, Value};

use super::ast::LookupKind;

/// Comparison implementing one lookup kind
pub type LookupFn = fn(&Value, &Value) -> bool;

static LOOKUPS: &[(LookupKind, LookupFn)] = &[
    (LookupKind::Exact, exact),
    (LookupKind::IExact, iexact),
    (LookupKind::Gt, gt),
    (LookupKind::Gte, gte),
    (LookupKind::Lt, lt),
    (LookupKind::Lte, lte),
    (LookupKind::IsNull, isnull),
    (LookupKind::In, within),
    (LookupKind::StartsWith, startswith),
    (LookupKind::IStartsWith, istartswith),
    (LookupKind::EndsWith, endswith),
    (LookupKind::IEndsWith, iendswith),
    (LookupKind::Contains, contains),
    (LookupKind::IContains, icontains),
    (LookupKind::Range, range),
    (LookupKind::Year, year),
    (LookupKind::Regex, regex),
    (LookupKind::IRegex, iregex),
    (LookupKind::Ancestor, ancestor),
];

/// Returns the in-memory comparison for `kind`
pub fn emulated(kind: LookupKind) -> Option<LookupFn> {
    LOOKUPS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, f)| *f)
}

fn any_element(actual: &Value, test: impl Fn(&Value) -> bool) -> bool {
    match actual {
        Value::List(items) => items.iter().any(test),
        single => test(single),
    }
}

fn compare_with(op: FilterOperator, actual: &Value, expected: &Value) -> bool {
    any_element(actual, |v| op.test(v, expected))
}

fn text_test(actual: &Value, expected: &Value, test: impl Fn(&str, &str) -> bool) -> bool {
    let Some(needle) = expected.as_text() else {
        return false;
    };
    any_element(actual, |v| v.as_text().map_or(false, |hay| test(hay, needle)))
}

fn exact(actual: &Value, expected: &Value) -> bool {
    if actual.same_as(expected) {
        return true;
    }
    matches!(actual, Value::List(_)) && compare_with(FilterOperator::Eq, actual, expected)
}

fn iexact(actual: &Value, expected: &Value) -> bool {
    text_test(actual, expected, |hay, needle| hay.to_lowercase() == needle.to_lowercase())
}

fn gt(actual: &Value, expected: &Value) -> bool {
    compare_with(FilterOperator::Gt, actual, expected)
}

fn gte(actual: &Value, expected: &Value) -> bool {
    compare_with(FilterOperator::Gte, actual, expected)
}

fn lt(actual: &Value, expected: &Value) -> bool {
    compare_with(FilterOperator::Lt, actual, expected)
}

fn lte(actual: &Value, expected: &Value) -> bool {
    compare_with(FilterOperator::Lte, actual, expected)
}

fn isnull(actual: &Value, expected: &Value) -> bool {
    actual.is_null() == expected.as_bool().unwrap_or(true)
}

fn within(actual: &Value, expected: &Value) -> bool {
    let candidates = match expected {
        Value::List(items) => items.as_slice(),
        single => std::slice::from_ref(single),
    };
    any_element(actual, |v| candidates.iter().any(|c| v.same_as(c)))
}

fn startswith(actual: &Value, expected: &Value) -> bool {
    text_test(actual, expected, |hay, needle| hay.starts_with(needle))
}

fn istartswith(actual: &Value, expected: &Value) -> bool {
    text_test(actual, expected, |hay, needle| {
        hay.to_lowercase().starts_with(&needle.to_lowercase())
    })
}

fn endswith(actual: &Value, expected: &Value) -> bool {
    text_test(actual, expected, |hay, needle| hay.ends_with(needle))
}

fn iendswith(actual: &Value, expected: &Value) -> bool {
    text_test(actual, expected, |hay, needle| {
        hay.to_lowercase().ends_with(&needle.to_lowercase())
    })
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::List(items) => items.iter().any(|v| v.same_as(expected)),
        Value::Text(hay) => expected.as_text().map_or(false, |needle| hay.contains(needle)),
        _ => false,
    }
}

fn icontains(actual: &Value, expected: &Value) -> bool {
    text_test(actual, expected, |hay, needle| {
        hay.to_lowercase().contains(&needle.to_lowercase())
    })
}

fn bounds(expected: &Value) -> Option<(&Value, &Value)> {
    match expected.as_list() {
        Some([lower, upper]) => Some((lower, upper)),
        _ => None,
    }
}

fn range(actual: &Value, expected: &Value) -> bool {
    let Some((lower, upper)) = bounds(expected) else {
        return false;
    };
    any_element(actual, |v| {
        FilterOperator::Gte.test(v, lower) && FilterOperator::Lte.test(v, upper)
    })
}

fn year(actual: &Value, expected: &Value) -> bool {
    if let Some((lower, upper)) = bounds(expected) {
        return any_element(actual, |v| {
            FilterOperator::Gte.test(v, lower) && FilterOperator::Lt.test(v, upper)
        });
    }
    let Some(wanted) = expected.as_i64() else {
        return false;
    };
    any_element(actual, |v| v.year().map_or(false, |y| i64::from(y) == wanted))
}

fn pattern_test(actual: &Value, expected: &Value, case_insensitive: bool) -> bool {
    let Some(pattern) = expected.as_text() else {
        return false;
    };
    let Ok(re) = RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
    else {
        return false;
    };
    any_element(actual, |v| v.as_text().map_or(false, |hay| re.is_match(hay)))
}

fn regex(actual: &Value, expected: &Value) -> bool {
    pattern_test(actual, expected, false)
}

fn iregex(actual: &Value, expected: &Value) -> bool {
    pattern_test(actual, expected, true)
}

fn ancestor(actual: &Value, expected: &Value) -> bool {
    match (actual.as_key(), expected.as_key()) {
        (Some(key), Some(scope)) => key.has_ancestor(scope),
        _ => false,
    }
}
