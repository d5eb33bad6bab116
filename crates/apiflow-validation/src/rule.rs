use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_enabled() -> bool {
    true
}

/// Rule category discriminant, reported on every per-rule outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Assertion on the numeric response status
    Status,
    /// Assertion on a response header
    Header,
    /// Assertion on the response body
    Body,
    /// Assertion on the elapsed response time
    Time,
}

/// A single declarative assertion about an HTTP response.
///
/// Closed tagged union: one payload struct per category, each with its own
/// operator set, so no variant carries fields it cannot use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum ValidationRule {
    /// Assertion on the numeric response status
    Status(StatusRule),
    /// Assertion on a response header
    Header(HeaderRule),
    /// Assertion on the response body
    Body(BodyRule),
    /// Assertion on the elapsed response time in milliseconds
    Time(TimeRule),
}

impl ValidationRule {
    /// The rule's identifier
    pub fn id(&self) -> &str {
        match self {
            ValidationRule::Status(r) => &r.id,
            ValidationRule::Header(r) => &r.id,
            ValidationRule::Body(r) => &r.id,
            ValidationRule::Time(r) => &r.id,
        }
    }

    /// Whether the rule is enabled
    pub fn enabled(&self) -> bool {
        match self {
            ValidationRule::Status(r) => r.enabled,
            ValidationRule::Header(r) => r.enabled,
            ValidationRule::Body(r) => r.enabled,
            ValidationRule::Time(r) => r.enabled,
        }
    }

    /// The rule's category discriminant
    pub fn category(&self) -> RuleCategory {
        match self {
            ValidationRule::Status(_) => RuleCategory::Status,
            ValidationRule::Header(_) => RuleCategory::Header,
            ValidationRule::Body(_) => RuleCategory::Body,
            ValidationRule::Time(_) => RuleCategory::Time,
        }
    }
}

/// Operators applicable to status rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum StatusOperator {
    Equals,
    NotEquals,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Between,
    In,
    NotIn,
    /// Status is in the 2xx range
    IsSuccess,
    /// Status is outside the 2xx range
    IsNotSuccess,
}

/// Operators applicable to header rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum HeaderOperator {
    Exists,
    NotExists,
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    MatchesRegex,
    In,
    NotIn,
}

/// Operators applicable to body rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum BodyOperator {
    IsJson,
    IsXml,
    IsHtml,
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    MatchesRegex,
    In,
    NotIn,
    JsonPathExists,
    JsonPathEquals,
    JsonPathContains,
    JsonSchemaMatches,
}

/// Operators applicable to time rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum TimeOperator {
    Equals,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Between,
}

/// Assertion on the numeric response status code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRule {
    /// Rule identifier, unique within its validation config or library
    pub id: String,

    /// Comparison operator
    pub operator: StatusOperator,

    /// Primary comparison value (a status code)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Upper bound for `between`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_value: Option<String>,

    /// Value list for `in` / `not_in`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,

    /// Disabled rules are reported but do not affect the verdict
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Assertion on a response header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderRule {
    /// Rule identifier, unique within its validation config or library
    pub id: String,

    /// Header name, looked up case-insensitively
    pub header_name: String,

    /// Comparison operator
    pub operator: HeaderOperator,

    /// Primary comparison value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Value list for `in` / `not_in`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,

    /// Whether string comparison is case-sensitive (default insensitive)
    #[serde(default)]
    pub case_sensitive: bool,

    /// Disabled rules are reported but do not affect the verdict
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Assertion on the response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyRule {
    /// Rule identifier, unique within its validation config or library
    pub id: String,

    /// Comparison operator
    pub operator: BodyOperator,

    /// Primary comparison value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Value list for `in` / `not_in`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,

    /// Path for the `json_path_*` operators, with or without a leading `$.`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,

    /// Schema document for `json_schema_matches`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,

    /// Whether string comparison is case-sensitive (default insensitive)
    #[serde(default)]
    pub case_sensitive: bool,

    /// Disabled rules are reported but do not affect the verdict
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Assertion on the elapsed response time in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRule {
    /// Rule identifier, unique within its validation config or library
    pub id: String,

    /// Comparison operator
    pub operator: TimeOperator,

    /// Primary comparison value in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Upper bound for `between`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_value: Option<String>,

    /// Disabled rules are reported but do not affect the verdict
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// One rule slot in a request's validation config.
///
/// Either an inline rule definition, a reference into the shared rule
/// library, or both; the inline definition takes precedence when both are
/// present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRef {
    /// Inline rule definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<ValidationRule>,

    /// Reference to a rule in the shared library
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_rule_id: Option<String>,
}

impl RuleRef {
    /// A slot holding an inline rule
    pub fn inline(rule: ValidationRule) -> Self {
        Self {
            rule: Some(rule),
            library_rule_id: None,
        }
    }

    /// A slot referencing a library rule by id
    pub fn library(id: impl Into<String>) -> Self {
        Self {
            rule: None,
            library_rule_id: Some(id.into()),
        }
    }
}

/// The validation configuration a request declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestValidation {
    /// A disabled config short-circuits to a vacuously-passing verdict
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// The declared rules, in evaluation order
    #[serde(default)]
    pub rules: Vec<RuleRef>,
}

impl RequestValidation {
    /// An enabled config over the given rule slots
    pub fn new(rules: Vec<RuleRef>) -> Self {
        Self {
            enabled: true,
            rules,
        }
    }
}

/// A lookup from rule id to a globally-defined rule, supplied once per
/// evaluation call. The engine never writes through this.
pub trait RuleLibrary {
    /// Look up a library rule by id
    fn rule(&self, id: &str) -> Option<&ValidationRule>;
}

impl RuleLibrary for HashMap<String, ValidationRule> {
    fn rule(&self, id: &str) -> Option<&ValidationRule> {
        self.get(id)
    }
}

/// The empty rule library
impl RuleLibrary for () {
    fn rule(&self, _id: &str) -> Option<&ValidationRule> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_serialization_is_tagged_by_category() {
        let rule = ValidationRule::Status(StatusRule {
            id: "r1".to_string(),
            operator: StatusOperator::Equals,
            value: Some("200".to_string()),
            secondary_value: None,
            values: None,
            enabled: true,
        });

        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["category"], "status");
        assert_eq!(json["operator"], "equals");
        assert_eq!(json["value"], "200");

        let back: ValidationRule = serde_json::from_value(json).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn test_rule_defaults_on_deserialize() {
        let rule: ValidationRule = serde_json::from_str(
            r#"{"category":"header","id":"h1","headerName":"Content-Type","operator":"exists"}"#,
        )
        .unwrap();

        match &rule {
            ValidationRule::Header(h) => {
                assert!(h.enabled);
                assert!(!h.case_sensitive);
                assert!(h.value.is_none());
            }
            _ => panic!("Expected header rule"),
        }
        assert_eq!(rule.category(), RuleCategory::Header);
        assert_eq!(rule.id(), "h1");
    }

    #[test]
    fn test_rule_ref_constructors() {
        let inline = RuleRef::inline(ValidationRule::Time(TimeRule {
            id: "t1".to_string(),
            operator: TimeOperator::Less,
            value: Some("500".to_string()),
            secondary_value: None,
            enabled: true,
        }));
        assert!(inline.rule.is_some());
        assert!(inline.library_rule_id.is_none());

        let library = RuleRef::library("shared-1");
        assert!(library.rule.is_none());
        assert_eq!(library.library_rule_id.as_deref(), Some("shared-1"));
    }

    #[test]
    fn test_hashmap_rule_library_lookup() {
        let mut library = HashMap::new();
        library.insert(
            "shared-1".to_string(),
            ValidationRule::Status(StatusRule {
                id: "shared-1".to_string(),
                operator: StatusOperator::IsSuccess,
                value: None,
                secondary_value: None,
                values: None,
                enabled: true,
            }),
        );

        assert!(library.rule("shared-1").is_some());
        assert!(library.rule("missing").is_none());
        assert!(().rule("shared-1").is_none());
    }
}
