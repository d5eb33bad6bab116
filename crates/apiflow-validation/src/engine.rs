//! The rule evaluation engine.
//!
//! `evaluate` is a pure function from (declared rules, response, rule
//! library, variable bindings) to a [`ValidationResult`]. Evaluation errors
//! (bad regex, malformed JSON, missing library rule) fail the individual
//! rule with an explanatory `error` field; they never propagate.

use crate::response::ResponseData;
use crate::result::{RuleOutcome, ValidationResult};
use crate::rule::{
    BodyOperator, BodyRule, HeaderOperator, HeaderRule, RequestValidation, RuleCategory, RuleLibrary,
    StatusOperator, StatusRule, TimeOperator, TimeRule, ValidationRule,
};
use jsonschema::{Draft, JSONSchema};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

/// Resolved variable bindings used for `{{name}}` placeholder substitution
pub type EnvVars = HashMap<String, String>;

/// Evaluate a request's declared validation rules against a response.
///
/// An absent or disabled config yields a disabled, vacuously-passing result
/// with zero rules. Disabled individual rules are reported as passed but
/// excluded from the pass/fail tally; `all_passed` is true iff no enabled
/// rule failed.
pub fn evaluate(
    config: Option<&RequestValidation>,
    response: &ResponseData,
    library: &dyn RuleLibrary,
    variables: &EnvVars,
) -> ValidationResult {
    let config = match config {
        Some(config) if config.enabled => config,
        _ => return ValidationResult::disabled(),
    };

    let mut outcomes = Vec::with_capacity(config.rules.len());

    for slot in &config.rules {
        // Inline definition wins over a simultaneously-present library id.
        let resolved = slot.rule.as_ref().or_else(|| {
            slot.library_rule_id
                .as_deref()
                .and_then(|id| library.rule(id))
        });

        let rule = match resolved {
            Some(rule) => rule,
            None => {
                let id = slot
                    .library_rule_id
                    .clone()
                    .unwrap_or_else(|| "<unknown>".to_string());
                debug!(rule_id = %id, "Referenced library rule not found");
                outcomes.push((
                    RuleOutcome::errored(
                        &id,
                        None,
                        format!("Rule not found: {}", id),
                        "Rule not found",
                    ),
                    true,
                ));
                continue;
            }
        };

        if !rule.enabled() {
            outcomes.push((
                RuleOutcome::passed(rule.id(), rule.category(), "Rule is disabled; skipped"),
                false,
            ));
            continue;
        }

        let outcome = match rule {
            ValidationRule::Status(r) => evaluate_status_rule(r, response, variables),
            ValidationRule::Header(r) => evaluate_header_rule(r, response, variables),
            ValidationRule::Body(r) => evaluate_body_rule(r, response, variables),
            ValidationRule::Time(r) => evaluate_time_rule(r, response, variables),
        };
        debug!(rule_id = %rule.id(), passed = outcome.passed, "Evaluated validation rule");
        outcomes.push((outcome, true));
    }

    ValidationResult::from_outcomes(outcomes)
}

// ---------------------------------------------------------------------------
// Placeholder resolution
// ---------------------------------------------------------------------------

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("valid placeholder pattern"))
}

fn lookup_var<'a>(vars: &'a EnvVars, name: &str) -> Option<&'a str> {
    vars.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Resolve `{{name}}` placeholders case-insensitively against the bindings.
///
/// An unresolved placeholder is left verbatim and reported as `Err` so the
/// calling rule fails with a descriptive message instead of silently
/// comparing against template text.
fn resolve_placeholders(input: &str, vars: &EnvVars) -> Result<String, String> {
    let mut unresolved: Option<String> = None;
    let out = placeholder_regex().replace_all(input, |caps: &regex::Captures| {
        let name = caps[1].trim();
        match lookup_var(vars, name) {
            Some(value) => value.to_string(),
            None => {
                if unresolved.is_none() {
                    unresolved = Some(name.to_string());
                }
                caps[0].to_string()
            }
        }
    });
    match unresolved {
        Some(name) => Err(format!("Unresolved placeholder: {{{{{}}}}}", name)),
        None => Ok(out.into_owned()),
    }
}

fn resolve_required(
    field: &Option<String>,
    vars: &EnvVars,
    what: &str,
) -> Result<String, String> {
    match field {
        Some(raw) => resolve_placeholders(raw, vars),
        None => Err(format!("Rule is missing its {}", what)),
    }
}

fn resolve_list(values: &Option<Vec<String>>, vars: &EnvVars) -> Result<Vec<String>, String> {
    let values = values
        .as_ref()
        .ok_or_else(|| "Rule is missing its value list".to_string())?;
    values
        .iter()
        .map(|v| resolve_placeholders(v, vars))
        .collect()
}

fn parse_i64(raw: &str) -> Result<i64, String> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| format!("Invalid numeric value '{}'", raw))
}

// ---------------------------------------------------------------------------
// Status rules
// ---------------------------------------------------------------------------

fn evaluate_status_rule(rule: &StatusRule, response: &ResponseData, vars: &EnvVars) -> RuleOutcome {
    let cat = RuleCategory::Status;
    let actual = i64::from(response.status);
    let outcome = numeric_check(
        "status",
        actual,
        status_numeric_op(rule.operator),
        &rule.value,
        &rule.secondary_value,
        &rule.values,
        vars,
    );
    match outcome {
        Ok((passed, expected)) => finish_numeric(&rule.id, cat, passed, &expected, actual),
        Err(error) => RuleOutcome::errored(&rule.id, cat, "Status rule could not be evaluated", error)
            .with_actual(actual.to_string()),
    }
}

/// Numeric operator shared between status and time rules.
enum NumericOp {
    Equals,
    NotEquals,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Between,
    In,
    NotIn,
    IsSuccess,
    IsNotSuccess,
}

fn status_numeric_op(op: StatusOperator) -> NumericOp {
    match op {
        StatusOperator::Equals => NumericOp::Equals,
        StatusOperator::NotEquals => NumericOp::NotEquals,
        StatusOperator::Greater => NumericOp::Greater,
        StatusOperator::GreaterOrEqual => NumericOp::GreaterOrEqual,
        StatusOperator::Less => NumericOp::Less,
        StatusOperator::LessOrEqual => NumericOp::LessOrEqual,
        StatusOperator::Between => NumericOp::Between,
        StatusOperator::In => NumericOp::In,
        StatusOperator::NotIn => NumericOp::NotIn,
        StatusOperator::IsSuccess => NumericOp::IsSuccess,
        StatusOperator::IsNotSuccess => NumericOp::IsNotSuccess,
    }
}

fn time_numeric_op(op: TimeOperator) -> NumericOp {
    match op {
        TimeOperator::Equals => NumericOp::Equals,
        TimeOperator::Greater => NumericOp::Greater,
        TimeOperator::GreaterOrEqual => NumericOp::GreaterOrEqual,
        TimeOperator::Less => NumericOp::Less,
        TimeOperator::LessOrEqual => NumericOp::LessOrEqual,
        TimeOperator::Between => NumericOp::Between,
    }
}

/// Evaluate a numeric operator; returns (passed, expected-description).
fn numeric_check(
    subject: &str,
    actual: i64,
    op: NumericOp,
    value: &Option<String>,
    secondary: &Option<String>,
    values: &Option<Vec<String>>,
    vars: &EnvVars,
) -> Result<(bool, String), String> {
    match op {
        NumericOp::IsSuccess => Ok((
            (200..300).contains(&actual),
            format!("{} in 2xx range", subject),
        )),
        NumericOp::IsNotSuccess => Ok((
            !(200..300).contains(&actual),
            format!("{} outside 2xx range", subject),
        )),
        NumericOp::In | NumericOp::NotIn => {
            let list = resolve_list(values, vars)?
                .iter()
                .map(|v| parse_i64(v))
                .collect::<Result<Vec<_>, _>>()?;
            let contained = list.contains(&actual);
            let passed = matches!(op, NumericOp::In) == contained;
            let verb = if matches!(op, NumericOp::In) { "in" } else { "not in" };
            Ok((passed, format!("{} {} {:?}", subject, verb, list)))
        }
        NumericOp::Between => {
            let low = parse_i64(&resolve_required(value, vars, "value")?)?;
            let high = parse_i64(&resolve_required(secondary, vars, "secondary value")?)?;
            Ok((
                actual >= low && actual <= high,
                format!("{} between {} and {}", subject, low, high),
            ))
        }
        _ => {
            let expected = parse_i64(&resolve_required(value, vars, "value")?)?;
            let (passed, verb) = match op {
                NumericOp::Equals => (actual == expected, "equals"),
                NumericOp::NotEquals => (actual != expected, "not equals"),
                NumericOp::Greater => (actual > expected, "greater than"),
                NumericOp::GreaterOrEqual => (actual >= expected, "at least"),
                NumericOp::Less => (actual < expected, "less than"),
                NumericOp::LessOrEqual => (actual <= expected, "at most"),
                _ => unreachable!("range and set operators handled above"),
            };
            Ok((passed, format!("{} {} {}", subject, verb, expected)))
        }
    }
}

fn finish_numeric(
    rule_id: &str,
    cat: RuleCategory,
    passed: bool,
    expected: &str,
    actual: i64,
) -> RuleOutcome {
    if passed {
        RuleOutcome::passed(rule_id, cat, expected)
            .with_expected(expected.to_string())
            .with_actual(actual.to_string())
    } else {
        RuleOutcome::failed(rule_id, cat, format!("Expected {}, got {}", expected, actual))
            .with_expected(expected.to_string())
            .with_actual(actual.to_string())
    }
}

// ---------------------------------------------------------------------------
// Header rules
// ---------------------------------------------------------------------------

fn evaluate_header_rule(rule: &HeaderRule, response: &ResponseData, vars: &EnvVars) -> RuleOutcome {
    let cat = RuleCategory::Header;
    let name = match resolve_placeholders(&rule.header_name, vars) {
        Ok(name) => name,
        Err(error) => {
            return RuleOutcome::errored(&rule.id, cat, "Header rule could not be evaluated", error)
        }
    };
    let actual = response.header(&name);

    match rule.operator {
        HeaderOperator::Exists => {
            if actual.is_some() {
                RuleOutcome::passed(&rule.id, cat, format!("Header '{}' exists", name))
            } else {
                RuleOutcome::failed(&rule.id, cat, format!("Header '{}' not found", name))
                    .with_expected(format!("header '{}' present", name))
            }
        }
        HeaderOperator::NotExists => {
            if actual.is_none() {
                RuleOutcome::passed(&rule.id, cat, format!("Header '{}' absent", name))
            } else {
                RuleOutcome::failed(&rule.id, cat, format!("Header '{}' is present", name))
                    .with_expected(format!("header '{}' absent", name))
                    .with_actual(actual.unwrap_or_default().to_string())
            }
        }
        _ => {
            let actual = match actual {
                Some(value) => value,
                None => {
                    return RuleOutcome::failed(
                        &rule.id,
                        cat,
                        format!("Header '{}' not found", name),
                    )
                    .with_expected(format!("header '{}' present", name));
                }
            };
            match header_string_check(rule, actual, vars) {
                Ok((passed, expected)) => {
                    if passed {
                        RuleOutcome::passed(&rule.id, cat, format!("Header '{}' {}", name, expected))
                            .with_expected(expected)
                            .with_actual(actual.to_string())
                    } else {
                        RuleOutcome::failed(
                            &rule.id,
                            cat,
                            format!("Expected header '{}' {}, got '{}'", name, expected, actual),
                        )
                        .with_expected(expected)
                        .with_actual(actual.to_string())
                    }
                }
                Err(error) => {
                    RuleOutcome::errored(&rule.id, cat, "Header rule could not be evaluated", error)
                        .with_actual(actual.to_string())
                }
            }
        }
    }
}

fn header_string_check(
    rule: &HeaderRule,
    actual: &str,
    vars: &EnvVars,
) -> Result<(bool, String), String> {
    let cs = rule.case_sensitive;
    match rule.operator {
        HeaderOperator::In | HeaderOperator::NotIn => {
            let list = resolve_list(&rule.values, vars)?;
            let contained = list.iter().any(|v| str_equals(actual, v, cs));
            let passed = (rule.operator == HeaderOperator::In) == contained;
            let verb = if rule.operator == HeaderOperator::In { "in" } else { "not in" };
            Ok((passed, format!("{} {:?}", verb, list)))
        }
        _ => {
            let expected = resolve_required(&rule.value, vars, "value")?;
            let (passed, verb) = match rule.operator {
                HeaderOperator::Equals => (str_equals(actual, &expected, cs), "equals"),
                HeaderOperator::NotEquals => (!str_equals(actual, &expected, cs), "not equals"),
                HeaderOperator::Contains => (str_contains(actual, &expected, cs), "contains"),
                HeaderOperator::StartsWith => (str_starts_with(actual, &expected, cs), "starts with"),
                HeaderOperator::EndsWith => (str_ends_with(actual, &expected, cs), "ends with"),
                HeaderOperator::MatchesRegex => {
                    (regex_match(actual, &expected, cs)?, "matches")
                }
                _ => unreachable!("existence and set operators handled above"),
            };
            Ok((passed, format!("{} '{}'", verb, expected)))
        }
    }
}

// ---------------------------------------------------------------------------
// String operator helpers (shared by header and body rules)
// ---------------------------------------------------------------------------

fn str_equals(actual: &str, expected: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        actual == expected
    } else {
        actual.eq_ignore_ascii_case(expected)
    }
}

fn str_contains(actual: &str, expected: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        actual.contains(expected)
    } else {
        actual.to_lowercase().contains(&expected.to_lowercase())
    }
}

fn str_starts_with(actual: &str, expected: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        actual.starts_with(expected)
    } else {
        actual.to_lowercase().starts_with(&expected.to_lowercase())
    }
}

fn str_ends_with(actual: &str, expected: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        actual.ends_with(expected)
    } else {
        actual.to_lowercase().ends_with(&expected.to_lowercase())
    }
}

fn regex_match(actual: &str, pattern: &str, case_sensitive: bool) -> Result<bool, String> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| format!("Invalid regular expression '{}': {}", pattern, e))?;
    Ok(regex.is_match(actual))
}

// ---------------------------------------------------------------------------
// Body rules
// ---------------------------------------------------------------------------

fn evaluate_body_rule(rule: &BodyRule, response: &ResponseData, vars: &EnvVars) -> RuleOutcome {
    let cat = RuleCategory::Body;
    let body = match response.decoded_body() {
        Ok(body) => body,
        Err(error) => {
            return RuleOutcome::errored(&rule.id, cat, "Body could not be decoded", error)
        }
    };

    match rule.operator {
        BodyOperator::IsJson => {
            shape_outcome(&rule.id, "JSON", serde_json::from_str::<Value>(&body).is_ok())
        }
        BodyOperator::IsXml => shape_outcome(&rule.id, "XML", looks_like_xml(&body)),
        BodyOperator::IsHtml => shape_outcome(&rule.id, "HTML", looks_like_html(&body)),
        BodyOperator::JsonPathExists
        | BodyOperator::JsonPathEquals
        | BodyOperator::JsonPathContains => evaluate_json_path_rule(rule, &body, vars),
        BodyOperator::JsonSchemaMatches => evaluate_json_schema_rule(rule, &body),
        _ => match body_string_check(rule, &body, vars) {
            Ok((passed, expected)) => {
                if passed {
                    RuleOutcome::passed(&rule.id, cat, format!("Body {}", expected))
                        .with_expected(expected)
                } else {
                    RuleOutcome::failed(&rule.id, cat, format!("Expected body {}", expected))
                        .with_expected(expected)
                        .with_actual(truncate(&body, 200))
                }
            }
            Err(error) => {
                RuleOutcome::errored(&rule.id, cat, "Body rule could not be evaluated", error)
            }
        },
    }
}

fn shape_outcome(rule_id: &str, shape: &str, passed: bool) -> RuleOutcome {
    let cat = RuleCategory::Body;
    if passed {
        RuleOutcome::passed(rule_id, cat, format!("Body is {}", shape))
    } else {
        RuleOutcome::failed(rule_id, cat, format!("Body is not {}", shape))
            .with_expected(format!("body is {}", shape))
    }
}

fn looks_like_html(body: &str) -> bool {
    let lower = body.trim_start().to_lowercase();
    lower.starts_with("<!doctype html") || lower.contains("<html")
}

fn looks_like_xml(body: &str) -> bool {
    let trimmed = body.trim();
    if trimmed.starts_with("<?xml") {
        return true;
    }
    trimmed.starts_with('<') && trimmed.ends_with('>') && !looks_like_html(body)
}

fn body_string_check(
    rule: &BodyRule,
    body: &str,
    vars: &EnvVars,
) -> Result<(bool, String), String> {
    let cs = rule.case_sensitive;
    match rule.operator {
        BodyOperator::In | BodyOperator::NotIn => {
            let list = resolve_list(&rule.values, vars)?;
            let contained = list.iter().any(|v| str_equals(body, v, cs));
            let passed = (rule.operator == BodyOperator::In) == contained;
            let verb = if rule.operator == BodyOperator::In { "in" } else { "not in" };
            Ok((passed, format!("{} {:?}", verb, list)))
        }
        _ => {
            let expected = resolve_required(&rule.value, vars, "value")?;
            let (passed, verb) = match rule.operator {
                BodyOperator::Equals => (str_equals(body, &expected, cs), "equals"),
                BodyOperator::NotEquals => (!str_equals(body, &expected, cs), "not equals"),
                BodyOperator::Contains => (str_contains(body, &expected, cs), "contains"),
                BodyOperator::StartsWith => (str_starts_with(body, &expected, cs), "starts with"),
                BodyOperator::EndsWith => (str_ends_with(body, &expected, cs), "ends with"),
                BodyOperator::MatchesRegex => (regex_match(body, &expected, cs)?, "matches"),
                _ => unreachable!("shape, set and json operators handled above"),
            };
            Ok((passed, format!("{} '{}'", verb, expected)))
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

// ---------------------------------------------------------------------------
// JSON path rules
// ---------------------------------------------------------------------------

/// Accept paths with or without a leading `$.`; a bare `$` means the root.
fn normalize_json_path(path: &str) -> String {
    let trimmed = path.trim();
    let stripped = trimmed
        .strip_prefix("$.")
        .or_else(|| trimmed.strip_prefix('$'))
        .unwrap_or(trimmed);
    if stripped.is_empty() {
        "@".to_string()
    } else {
        stripped.to_string()
    }
}

fn search_json_path(body: &str, path: &str) -> Result<Value, String> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| format!("Body is not valid JSON: {}", e))?;
    let normalized = normalize_json_path(path);
    let compiled = jmespath::compile(&normalized)
        .map_err(|e| format!("Invalid JSON path '{}': {}", path, e))?;
    let result = compiled
        .search(&value)
        .map_err(|e| format!("Failed to evaluate JSON path '{}': {}", path, e))?;
    Ok(serde_json::to_value(result).unwrap_or(Value::Null))
}

fn value_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Compare a JSON value found at a path against the rule's textual value.
/// Strings compare directly; everything else compares against the expected
/// text parsed as JSON, falling back to textual comparison.
fn json_value_matches(actual: &Value, expected: &str) -> bool {
    match actual {
        Value::String(s) => s == expected,
        other => {
            if let Ok(parsed) = serde_json::from_str::<Value>(expected) {
                other == &parsed
            } else {
                value_display(other) == expected
            }
        }
    }
}

fn evaluate_json_path_rule(rule: &BodyRule, body: &str, vars: &EnvVars) -> RuleOutcome {
    let cat = RuleCategory::Body;
    let raw_path = match &rule.json_path {
        Some(path) => path,
        None => {
            return RuleOutcome::errored(
                &rule.id,
                cat,
                "JSON path rule could not be evaluated",
                "Rule is missing its JSON path",
            )
        }
    };
    let path = match resolve_placeholders(raw_path, vars) {
        Ok(path) => path,
        Err(error) => {
            return RuleOutcome::errored(&rule.id, cat, "JSON path rule could not be evaluated", error)
        }
    };
    let found = match search_json_path(body, &path) {
        Ok(found) => found,
        Err(error) => {
            return RuleOutcome::errored(&rule.id, cat, "JSON path rule could not be evaluated", error)
        }
    };

    match rule.operator {
        BodyOperator::JsonPathExists => {
            if found.is_null() {
                RuleOutcome::failed(&rule.id, cat, format!("JSON path '{}' not found", path))
                    .with_expected(format!("'{}' present", path))
            } else {
                RuleOutcome::passed(&rule.id, cat, format!("JSON path '{}' exists", path))
                    .with_actual(value_display(&found))
            }
        }
        BodyOperator::JsonPathEquals => {
            let expected = match resolve_required(&rule.value, vars, "value") {
                Ok(expected) => expected,
                Err(error) => {
                    return RuleOutcome::errored(
                        &rule.id,
                        cat,
                        "JSON path rule could not be evaluated",
                        error,
                    )
                }
            };
            if json_value_matches(&found, &expected) {
                RuleOutcome::passed(&rule.id, cat, format!("JSON path '{}' equals '{}'", path, expected))
                    .with_expected(expected)
                    .with_actual(value_display(&found))
            } else {
                RuleOutcome::failed(
                    &rule.id,
                    cat,
                    format!(
                        "Expected JSON path '{}' to equal '{}', got '{}'",
                        path,
                        expected,
                        value_display(&found)
                    ),
                )
                .with_expected(expected)
                .with_actual(value_display(&found))
            }
        }
        BodyOperator::JsonPathContains => {
            let expected = match resolve_required(&rule.value, vars, "value") {
                Ok(expected) => expected,
                Err(error) => {
                    return RuleOutcome::errored(
                        &rule.id,
                        cat,
                        "JSON path rule could not be evaluated",
                        error,
                    )
                }
            };
            let contained = match &found {
                Value::String(s) => s.contains(&expected),
                Value::Array(items) => items.iter().any(|item| json_value_matches(item, &expected)),
                Value::Object(map) => map.contains_key(&expected),
                other => value_display(other).contains(&expected),
            };
            if contained {
                RuleOutcome::passed(
                    &rule.id,
                    cat,
                    format!("JSON path '{}' contains '{}'", path, expected),
                )
                .with_expected(expected)
                .with_actual(value_display(&found))
            } else {
                RuleOutcome::failed(
                    &rule.id,
                    cat,
                    format!("Expected JSON path '{}' to contain '{}'", path, expected),
                )
                .with_expected(expected)
                .with_actual(value_display(&found))
            }
        }
        _ => unreachable!("caller dispatches only json path operators here"),
    }
}

// ---------------------------------------------------------------------------
// JSON schema rules
// ---------------------------------------------------------------------------

fn evaluate_json_schema_rule(rule: &BodyRule, body: &str) -> RuleOutcome {
    let cat = RuleCategory::Body;
    let schema_value = match &rule.schema {
        Some(schema) => schema,
        None => {
            return RuleOutcome::errored(
                &rule.id,
                cat,
                "JSON schema rule could not be evaluated",
                "Rule is missing its schema document",
            )
        }
    };
    let body_value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            return RuleOutcome::errored(
                &rule.id,
                cat,
                "JSON schema rule could not be evaluated",
                format!("Body is not valid JSON: {}", e),
            )
        }
    };

    let schema = match JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema_value)
    {
        Ok(schema) => schema,
        Err(e) => {
            return RuleOutcome::errored(
                &rule.id,
                cat,
                "JSON schema rule could not be evaluated",
                format!("Invalid JSON Schema: {}", e),
            )
        }
    };

    // Drain the error iterator in its own statement: it borrows `schema`
    // and `body_value` and must not outlive them in the tail expression.
    let violations: Vec<String> = match schema.validate(&body_value) {
        Ok(()) => Vec::new(),
        Err(errors) => errors.map(|e| e.to_string()).collect(),
    };

    if violations.is_empty() {
        RuleOutcome::passed(&rule.id, cat, "Body matches schema")
    } else {
        RuleOutcome::failed(&rule.id, cat, "Body does not match schema")
            .with_expected("body matches schema".to_string())
            .with_actual(violations.join("; "))
    }
}

// ---------------------------------------------------------------------------
// Time rules
// ---------------------------------------------------------------------------

fn evaluate_time_rule(rule: &TimeRule, response: &ResponseData, vars: &EnvVars) -> RuleOutcome {
    let cat = RuleCategory::Time;
    let actual = response.elapsed_ms as i64;
    let outcome = numeric_check(
        "elapsed time (ms)",
        actual,
        time_numeric_op(rule.operator),
        &rule.value,
        &rule.secondary_value,
        &None,
        vars,
    );
    match outcome {
        Ok((passed, expected)) => finish_numeric(&rule.id, cat, passed, &expected, actual),
        Err(error) => RuleOutcome::errored(&rule.id, cat, "Time rule could not be evaluated", error)
            .with_actual(actual.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleRef;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn status_rule(operator: StatusOperator, value: Option<&str>) -> ValidationRule {
        ValidationRule::Status(StatusRule {
            id: "status-1".to_string(),
            operator,
            value: value.map(String::from),
            secondary_value: None,
            values: None,
            enabled: true,
        })
    }

    fn config_of(rules: Vec<ValidationRule>) -> RequestValidation {
        RequestValidation::new(rules.into_iter().map(RuleRef::inline).collect())
    }

    fn run(config: &RequestValidation, response: &ResponseData) -> ValidationResult {
        evaluate(Some(config), response, &(), &EnvVars::new())
    }

    #[test]
    fn test_absent_config_is_disabled() {
        let result = evaluate(None, &ResponseData::new(200), &(), &EnvVars::new());
        assert!(!result.enabled);
        assert!(result.all_passed);
        assert_eq!(result.total_rules, 0);
    }

    #[test]
    fn test_disabled_config_is_vacuously_passing() {
        let mut config = config_of(vec![status_rule(StatusOperator::Equals, Some("200"))]);
        config.enabled = false;
        let result = run(&config, &ResponseData::new(500));
        assert!(!result.enabled);
        assert!(result.all_passed);
        assert_eq!(result.total_rules, 0);
    }

    #[test]
    fn test_status_equals_200_passes() {
        let config = config_of(vec![status_rule(StatusOperator::Equals, Some("200"))]);
        let result = run(&config, &ResponseData::new(200));
        assert!(result.all_passed);
        assert_eq!(result.passed_rules, 1);
        assert_eq!(result.failed_rules, 0);
    }

    #[test]
    fn test_status_equals_200_fails_on_404_with_actual() {
        let config = config_of(vec![status_rule(StatusOperator::Equals, Some("200"))]);
        let result = run(&config, &ResponseData::new(404));
        assert!(!result.all_passed);
        assert_eq!(result.failed_rules, 1);
        let outcome = &result.rule_results[0];
        assert_eq!(outcome.actual.as_deref(), Some("404"));
        assert!(!outcome.passed);
    }

    #[test]
    fn test_status_between_and_set_membership() {
        let between = ValidationRule::Status(StatusRule {
            id: "between".to_string(),
            operator: StatusOperator::Between,
            value: Some("200".to_string()),
            secondary_value: Some("299".to_string()),
            values: None,
            enabled: true,
        });
        let within = ValidationRule::Status(StatusRule {
            id: "in".to_string(),
            operator: StatusOperator::In,
            value: None,
            secondary_value: None,
            values: Some(vec!["200".to_string(), "201".to_string()]),
            enabled: true,
        });
        let result = run(&config_of(vec![between, within]), &ResponseData::new(201));
        assert!(result.all_passed);
        assert_eq!(result.passed_rules, 2);
    }

    #[test]
    fn test_status_is_success() {
        let config = config_of(vec![status_rule(StatusOperator::IsSuccess, None)]);
        assert!(run(&config, &ResponseData::new(204)).all_passed);
        assert!(!run(&config, &ResponseData::new(500)).all_passed);
    }

    #[test]
    fn test_status_invalid_value_is_rule_error() {
        let config = config_of(vec![status_rule(StatusOperator::Equals, Some("abc"))]);
        let result = run(&config, &ResponseData::new(200));
        assert!(!result.all_passed);
        let outcome = &result.rule_results[0];
        assert!(outcome.error.as_deref().unwrap().contains("Invalid numeric value"));
    }

    #[test]
    fn test_header_exists_is_case_insensitive() {
        let rule = ValidationRule::Header(HeaderRule {
            id: "h1".to_string(),
            header_name: "Content-Type".to_string(),
            operator: HeaderOperator::Exists,
            value: None,
            values: None,
            case_sensitive: false,
            enabled: true,
        });
        let response = ResponseData::new(200).with_header("content-type", "application/json");
        let result = run(&config_of(vec![rule]), &response);
        assert!(result.all_passed);
    }

    #[test]
    fn test_header_equals_respects_case_flag() {
        let insensitive = ValidationRule::Header(HeaderRule {
            id: "h1".to_string(),
            header_name: "X-Env".to_string(),
            operator: HeaderOperator::Equals,
            value: Some("PROD".to_string()),
            values: None,
            case_sensitive: false,
            enabled: true,
        });
        let sensitive = ValidationRule::Header(HeaderRule {
            id: "h2".to_string(),
            header_name: "X-Env".to_string(),
            operator: HeaderOperator::Equals,
            value: Some("PROD".to_string()),
            values: None,
            case_sensitive: true,
            enabled: true,
        });
        let response = ResponseData::new(200).with_header("X-Env", "prod");
        let result = run(&config_of(vec![insensitive, sensitive]), &response);
        assert_eq!(result.passed_rules, 1);
        assert_eq!(result.failed_rules, 1);
        assert!(result.rule_results[0].passed);
        assert!(!result.rule_results[1].passed);
    }

    #[test]
    fn test_header_invalid_regex_fails_with_error() {
        let rule = ValidationRule::Header(HeaderRule {
            id: "h1".to_string(),
            header_name: "X-Id".to_string(),
            operator: HeaderOperator::MatchesRegex,
            value: Some("([unclosed".to_string()),
            values: None,
            case_sensitive: false,
            enabled: true,
        });
        let response = ResponseData::new(200).with_header("X-Id", "abc");
        let result = run(&config_of(vec![rule]), &response);
        assert!(!result.all_passed);
        let outcome = &result.rule_results[0];
        assert!(outcome
            .error
            .as_deref()
            .unwrap()
            .contains("Invalid regular expression"));
    }

    #[test]
    fn test_header_missing_fails_string_operator() {
        let rule = ValidationRule::Header(HeaderRule {
            id: "h1".to_string(),
            header_name: "X-Missing".to_string(),
            operator: HeaderOperator::Contains,
            value: Some("x".to_string()),
            values: None,
            case_sensitive: false,
            enabled: true,
        });
        let result = run(&config_of(vec![rule]), &ResponseData::new(200));
        assert!(!result.all_passed);
        assert!(result.rule_results[0].message.contains("not found"));
    }

    fn body_rule(operator: BodyOperator) -> BodyRule {
        BodyRule {
            id: "b1".to_string(),
            operator,
            value: None,
            values: None,
            json_path: None,
            schema: None,
            case_sensitive: false,
            enabled: true,
        }
    }

    #[test]
    fn test_body_shape_checks() {
        let json_body = ResponseData::new(200).with_body(r#"{"ok":true}"#);
        let xml_body = ResponseData::new(200).with_body("<?xml version=\"1.0\"?><root/>");
        let html_body = ResponseData::new(200).with_body("<!DOCTYPE html><html></html>");

        let is_json = config_of(vec![ValidationRule::Body(body_rule(BodyOperator::IsJson))]);
        let is_xml = config_of(vec![ValidationRule::Body(body_rule(BodyOperator::IsXml))]);
        let is_html = config_of(vec![ValidationRule::Body(body_rule(BodyOperator::IsHtml))]);

        assert!(run(&is_json, &json_body).all_passed);
        assert!(!run(&is_json, &xml_body).all_passed);
        assert!(run(&is_xml, &xml_body).all_passed);
        assert!(!run(&is_xml, &html_body).all_passed);
        assert!(run(&is_html, &html_body).all_passed);
    }

    #[test]
    fn test_body_contains_case_insensitive_by_default() {
        let mut rule = body_rule(BodyOperator::Contains);
        rule.value = Some("HELLO".to_string());
        let response = ResponseData::new(200).with_body("well hello there");
        let result = run(&config_of(vec![ValidationRule::Body(rule)]), &response);
        assert!(result.all_passed);
    }

    #[test]
    fn test_json_path_equals_passes_for_numeric_value() {
        let mut rule = body_rule(BodyOperator::JsonPathEquals);
        rule.json_path = Some("$.data.id".to_string());
        rule.value = Some("123".to_string());
        let response = ResponseData::new(200).with_body(r#"{"data":{"id":123}}"#);
        let result = run(&config_of(vec![ValidationRule::Body(rule)]), &response);
        assert!(result.all_passed, "{:?}", result.rule_results);
    }

    #[test]
    fn test_json_path_works_without_dollar_prefix() {
        let mut rule = body_rule(BodyOperator::JsonPathEquals);
        rule.json_path = Some("data.id".to_string());
        rule.value = Some("123".to_string());
        let response = ResponseData::new(200).with_body(r#"{"data":{"id":123}}"#);
        let result = run(&config_of(vec![ValidationRule::Body(rule)]), &response);
        assert!(result.all_passed);
    }

    #[test]
    fn test_json_path_on_malformed_body_fails_with_error() {
        let mut rule = body_rule(BodyOperator::JsonPathEquals);
        rule.json_path = Some("$.data.id".to_string());
        rule.value = Some("123".to_string());
        let response = ResponseData::new(200).with_body("this is not json");
        let result = run(&config_of(vec![ValidationRule::Body(rule)]), &response);
        assert!(!result.all_passed);
        let outcome = &result.rule_results[0];
        assert!(outcome.error.as_deref().unwrap().contains("not valid JSON"));
    }

    #[test]
    fn test_json_path_exists_and_missing() {
        let mut present = body_rule(BodyOperator::JsonPathExists);
        present.id = "present".to_string();
        present.json_path = Some("$.items[0].name".to_string());
        let mut missing = body_rule(BodyOperator::JsonPathExists);
        missing.id = "missing".to_string();
        missing.json_path = Some("$.items[0].nope".to_string());

        let response =
            ResponseData::new(200).with_body(r#"{"items":[{"name":"first"},{"name":"second"}]}"#);
        let result = run(
            &config_of(vec![
                ValidationRule::Body(present),
                ValidationRule::Body(missing),
            ]),
            &response,
        );
        assert_eq!(result.passed_rules, 1);
        assert_eq!(result.failed_rules, 1);
    }

    #[test]
    fn test_json_path_contains_on_array() {
        let mut rule = body_rule(BodyOperator::JsonPathContains);
        rule.json_path = Some("$.tags".to_string());
        rule.value = Some("beta".to_string());
        let response = ResponseData::new(200).with_body(r#"{"tags":["alpha","beta"]}"#);
        let result = run(&config_of(vec![ValidationRule::Body(rule)]), &response);
        assert!(result.all_passed);
    }

    #[test]
    fn test_json_schema_match_and_mismatch() {
        let schema = json!({
            "type": "object",
            "properties": { "id": { "type": "integer" } },
            "required": ["id"]
        });
        let mut rule = body_rule(BodyOperator::JsonSchemaMatches);
        rule.schema = Some(schema);
        let config = config_of(vec![ValidationRule::Body(rule)]);

        let good = ResponseData::new(200).with_body(r#"{"id":7}"#);
        assert!(run(&config, &good).all_passed);

        let bad = ResponseData::new(200).with_body(r#"{"id":"seven"}"#);
        let result = run(&config, &bad);
        assert!(!result.all_passed);
        assert!(result.rule_results[0].actual.is_some());
    }

    #[test]
    fn test_json_schema_reports_every_violation() {
        let schema = json!({
            "type": "object",
            "properties": {
                "id": { "type": "integer" },
                "name": { "type": "string" }
            },
            "required": ["id", "name"]
        });
        let mut rule = body_rule(BodyOperator::JsonSchemaMatches);
        rule.schema = Some(schema);
        let config = config_of(vec![ValidationRule::Body(rule)]);

        let response = ResponseData::new(200).with_body(r#"{"id":"seven"}"#);
        let result = run(&config, &response);
        assert!(!result.all_passed);
        let actual = result.rule_results[0].actual.as_deref().unwrap();
        // Both the type mismatch and the missing property are reported.
        assert!(actual.contains("integer"));
        assert!(actual.contains("name"));
    }

    #[test]
    fn test_base64_body_is_decoded_before_checks() {
        // base64 of {"ok":true}
        let mut rule = body_rule(BodyOperator::JsonPathEquals);
        rule.json_path = Some("$.ok".to_string());
        rule.value = Some("true".to_string());
        let response = ResponseData::new(200).with_base64_body("eyJvayI6dHJ1ZX0=");
        let result = run(&config_of(vec![ValidationRule::Body(rule)]), &response);
        assert!(result.all_passed, "{:?}", result.rule_results);
    }

    #[test]
    fn test_time_rule_less_than() {
        let rule = ValidationRule::Time(TimeRule {
            id: "t1".to_string(),
            operator: TimeOperator::Less,
            value: Some("500".to_string()),
            secondary_value: None,
            enabled: true,
        });
        let fast = ResponseData::new(200).with_elapsed_ms(120);
        let slow = ResponseData::new(200).with_elapsed_ms(900);
        let config = config_of(vec![rule]);
        assert!(run(&config, &fast).all_passed);
        assert!(!run(&config, &slow).all_passed);
    }

    #[test]
    fn test_placeholder_resolution_is_case_insensitive() {
        let config = config_of(vec![status_rule(
            StatusOperator::Equals,
            Some("{{Expected_Status}}"),
        )]);
        let mut vars = EnvVars::new();
        vars.insert("EXPECTED_STATUS".to_string(), "200".to_string());
        let result = evaluate(Some(&config), &ResponseData::new(200), &(), &vars);
        assert!(result.all_passed);
    }

    #[test]
    fn test_unresolved_placeholder_fails_the_rule() {
        let config = config_of(vec![status_rule(
            StatusOperator::Equals,
            Some("{{missing_var}}"),
        )]);
        let result = run(&config, &ResponseData::new(200));
        assert!(!result.all_passed);
        let outcome = &result.rule_results[0];
        assert!(outcome
            .error
            .as_deref()
            .unwrap()
            .contains("Unresolved placeholder: {{missing_var}}"));
    }

    #[test]
    fn test_disabled_rule_counts_in_total_but_not_in_tally() {
        let mut disabled = StatusRule {
            id: "off".to_string(),
            operator: StatusOperator::Equals,
            value: Some("500".to_string()),
            secondary_value: None,
            values: None,
            enabled: false,
        };
        disabled.enabled = false;
        let config = config_of(vec![
            status_rule(StatusOperator::Equals, Some("200")),
            ValidationRule::Status(disabled),
        ]);
        let result = run(&config, &ResponseData::new(200));
        assert_eq!(result.total_rules, 2);
        assert_eq!(result.passed_rules, 1);
        assert_eq!(result.failed_rules, 0);
        assert!(result.all_passed);
        let off = &result.rule_results[1];
        assert!(off.passed);
        assert!(off.message.contains("disabled"));
    }

    #[test]
    fn test_missing_library_rule_fails_with_rule_not_found() {
        let config = RequestValidation::new(vec![RuleRef::library("nope")]);
        let result = run(&config, &ResponseData::new(200));
        assert!(!result.all_passed);
        assert_eq!(result.total_rules, 1);
        let outcome = &result.rule_results[0];
        assert_eq!(outcome.rule_id, "nope");
        assert!(outcome.category.is_none());
        assert_eq!(outcome.error.as_deref(), Some("Rule not found"));
    }

    #[test]
    fn test_library_lookup_and_inline_precedence() {
        let mut library = HashMap::new();
        library.insert(
            "shared".to_string(),
            status_rule(StatusOperator::Equals, Some("500")),
        );

        // Library-only reference resolves through the library.
        let config = RequestValidation::new(vec![RuleRef::library("shared")]);
        let result = evaluate(Some(&config), &ResponseData::new(500), &library, &EnvVars::new());
        assert!(result.all_passed);

        // Inline takes precedence over a simultaneously-present library id.
        let both = RuleRef {
            rule: Some(status_rule(StatusOperator::Equals, Some("200"))),
            library_rule_id: Some("shared".to_string()),
        };
        let config = RequestValidation::new(vec![both]);
        let result = evaluate(Some(&config), &ResponseData::new(200), &library, &EnvVars::new());
        assert!(result.all_passed);
    }

    #[test]
    fn test_evaluate_is_deterministic_apart_from_timestamp() {
        let config = config_of(vec![
            status_rule(StatusOperator::Equals, Some("200")),
            ValidationRule::Body({
                let mut rule = body_rule(BodyOperator::JsonPathEquals);
                rule.json_path = Some("$.ok".to_string());
                rule.value = Some("true".to_string());
                rule
            }),
        ]);
        let response = ResponseData::new(200).with_body(r#"{"ok":true}"#);

        let mut first = run(&config, &response);
        let mut second = run(&config, &response);
        let stamp = first.executed_at;
        second.executed_at = stamp;
        first.executed_at = stamp;
        assert_eq!(first, second);
    }
}
