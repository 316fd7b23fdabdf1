//! Declarative parameter schemas and their validator.
//!
//! The constraint set is closed: scalars (string, integer, number,
//! boolean), arrays, and nested objects, with length/value/item bounds, an
//! integer positivity flag, regex patterns, and format hints. Validation is
//! pure, performs no I/O, and is idempotent — validating an
//! already-accepted value accepts it again unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Format hints for string parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringFormat {
    /// Must parse as an absolute URL.
    Url,
}

/// One parameter schema node.
///
/// The `type` tag is the closed set of parameter kinds; an unrecognized
/// tag fails deserialization, which callers treat as fatal at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamSchema {
    /// A string with optional length, pattern, and format constraints.
    String {
        /// Minimum length in characters.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_length: Option<usize>,
        /// Maximum length in characters.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
        /// Regex the whole value must match.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        /// Format hint.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<StringFormat>,
    },
    /// An integer with optional bounds.
    Integer {
        /// Minimum value, inclusive.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<i64>,
        /// Maximum value, inclusive.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<i64>,
        /// Require a strictly positive value.
        #[serde(default)]
        positive: bool,
    },
    /// A float with optional bounds.
    Number {
        /// Minimum value, inclusive.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        /// Maximum value, inclusive.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
    },
    /// A boolean.
    Boolean,
    /// An array with an element schema and optional size bounds.
    Array {
        /// Element schema.
        items: Box<ParamSchema>,
        /// Minimum item count.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_items: Option<usize>,
        /// Maximum item count.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
    /// A nested object with named properties.
    Object {
        /// Property schemas by name.
        properties: BTreeMap<String, PropertySchema>,
    },
}

/// A named property: a schema plus requiredness and a description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    /// The property's value schema.
    #[serde(flatten)]
    pub schema: ParamSchema,
    /// Whether the property must be present.
    #[serde(default)]
    pub required: bool,
    /// Human-readable description, surfaced in `tools/list`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One validation failure, rendered as `path: message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    /// Dotted/indexed path to the offending value.
    pub path: String,
    /// What was wrong.
    pub message: String,
}

impl std::fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validate `args` against a top-level property map.
///
/// Collects every issue rather than stopping at the first; unknown keys in
/// `args` are ignored.
///
/// # Errors
///
/// Returns the full issue list when anything fails.
pub fn validate_object(
    properties: &BTreeMap<String, PropertySchema>,
    args: &Value,
) -> Result<(), Vec<SchemaIssue>> {
    let mut issues = Vec::new();

    let Some(map) = args.as_object() else {
        issues.push(SchemaIssue {
            path: "$".to_string(),
            message: format!("expected an object, got {}", type_name(args)),
        });
        return Err(issues);
    };

    for (name, property) in properties {
        match map.get(name) {
            Some(value) => validate_value(&property.schema, value, name, &mut issues),
            None if property.required => issues.push(SchemaIssue {
                path: name.clone(),
                message: "required parameter is missing".to_string(),
            }),
            None => {},
        }
    }

    if issues.is_empty() { Ok(()) } else { Err(issues) }
}

fn validate_value(schema: &ParamSchema, value: &Value, path: &str, issues: &mut Vec<SchemaIssue>) {
    match schema {
        ParamSchema::String {
            min_length,
            max_length,
            pattern,
            format,
        } => {
            let Some(s) = value.as_str() else {
                push(issues, path, format!("expected a string, got {}", type_name(value)));
                return;
            };
            let len = s.chars().count();
            if let Some(min) = min_length {
                if len < *min {
                    push(issues, path, format!("must be at least {min} characters"));
                }
            }
            if let Some(max) = max_length {
                if len > *max {
                    push(issues, path, format!("must be at most {max} characters"));
                }
            }
            if let Some(pattern) = pattern {
                match regex::Regex::new(pattern) {
                    Ok(re) => {
                        if !re.is_match(s) {
                            push(issues, path, format!("does not match pattern {pattern}"));
                        }
                    },
                    Err(_) => push(issues, path, format!("schema pattern is invalid: {pattern}")),
                }
            }
            if let Some(StringFormat::Url) = format {
                if url::Url::parse(s).is_err() {
                    push(issues, path, "is not a valid URL".to_string());
                }
            }
        },
        ParamSchema::Integer {
            minimum,
            maximum,
            positive,
        } => {
            let Some(n) = value.as_i64() else {
                push(issues, path, format!("expected an integer, got {}", type_name(value)));
                return;
            };
            if *positive && n <= 0 {
                push(issues, path, "must be positive".to_string());
            }
            if let Some(min) = minimum {
                if n < *min {
                    push(issues, path, format!("must be at least {min}"));
                }
            }
            if let Some(max) = maximum {
                if n > *max {
                    push(issues, path, format!("must be at most {max}"));
                }
            }
        },
        ParamSchema::Number { minimum, maximum } => {
            let Some(n) = value.as_f64() else {
                push(issues, path, format!("expected a number, got {}", type_name(value)));
                return;
            };
            if let Some(min) = minimum {
                if n < *min {
                    push(issues, path, format!("must be at least {min}"));
                }
            }
            if let Some(max) = maximum {
                if n > *max {
                    push(issues, path, format!("must be at most {max}"));
                }
            }
        },
        ParamSchema::Boolean => {
            if !value.is_boolean() {
                push(issues, path, format!("expected a boolean, got {}", type_name(value)));
            }
        },
        ParamSchema::Array {
            items,
            min_items,
            max_items,
        } => {
            let Some(array) = value.as_array() else {
                push(issues, path, format!("expected an array, got {}", type_name(value)));
                return;
            };
            if let Some(min) = min_items {
                if array.len() < *min {
                    push(issues, path, format!("must have at least {min} items"));
                }
            }
            if let Some(max) = max_items {
                if array.len() > *max {
                    push(issues, path, format!("must have at most {max} items"));
                }
            }
            for (i, element) in array.iter().enumerate() {
                validate_value(items, element, &format!("{path}[{i}]"), issues);
            }
        },
        ParamSchema::Object { properties } => {
            let Some(map) = value.as_object() else {
                push(issues, path, format!("expected an object, got {}", type_name(value)));
                return;
            };
            for (name, property) in properties {
                let child_path = format!("{path}.{name}");
                match map.get(name) {
                    Some(child) => validate_value(&property.schema, child, &child_path, issues),
                    None if property.required => push(
                        issues,
                        &child_path,
                        "required parameter is missing".to_string(),
                    ),
                    None => {},
                }
            }
        },
    }
}

impl ParamSchema {
    /// Startup check: every regex in the schema tree must compile and
    /// every bound pair must be ordered.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first defect found.
    pub fn check(&self) -> Result<(), String> {
        match self {
            Self::String {
                min_length,
                max_length,
                pattern,
                ..
            } => {
                if let (Some(min), Some(max)) = (min_length, max_length) {
                    if min > max {
                        return Err(format!("min_length {min} exceeds max_length {max}"));
                    }
                }
                if let Some(pattern) = pattern {
                    regex::Regex::new(pattern)
                        .map_err(|e| format!("invalid pattern {pattern}: {e}"))?;
                }
                Ok(())
            },
            Self::Integer {
                minimum, maximum, ..
            } => {
                if let (Some(min), Some(max)) = (minimum, maximum) {
                    if min > max {
                        return Err(format!("minimum {min} exceeds maximum {max}"));
                    }
                }
                Ok(())
            },
            Self::Number { minimum, maximum } => {
                if let (Some(min), Some(max)) = (minimum, maximum) {
                    if min > max {
                        return Err(format!("minimum {min} exceeds maximum {max}"));
                    }
                }
                Ok(())
            },
            Self::Boolean => Ok(()),
            Self::Array {
                items,
                min_items,
                max_items,
            } => {
                if let (Some(min), Some(max)) = (min_items, max_items) {
                    if min > max {
                        return Err(format!("min_items {min} exceeds max_items {max}"));
                    }
                }
                items.check()
            },
            Self::Object { properties } => {
                for (name, property) in properties {
                    property
                        .schema
                        .check()
                        .map_err(|e| format!("{name}: {e}"))?;
                }
                Ok(())
            },
        }
    }

    /// Render as a JSON-Schema-shaped value for `tools/list`.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        match self {
            Self::String {
                min_length,
                max_length,
                pattern,
                format,
            } => {
                let mut node = serde_json::json!({"type": "string"});
                if let Some(min) = min_length {
                    node["minLength"] = (*min).into();
                }
                if let Some(max) = max_length {
                    node["maxLength"] = (*max).into();
                }
                if let Some(pattern) = pattern {
                    node["pattern"] = pattern.clone().into();
                }
                if let Some(StringFormat::Url) = format {
                    node["format"] = "uri".into();
                }
                node
            },
            Self::Integer {
                minimum,
                maximum,
                positive,
            } => {
                let mut node = serde_json::json!({"type": "integer"});
                if *positive {
                    node["exclusiveMinimum"] = 0.into();
                }
                if let Some(min) = minimum {
                    node["minimum"] = (*min).into();
                }
                if let Some(max) = maximum {
                    node["maximum"] = (*max).into();
                }
                node
            },
            Self::Number { minimum, maximum } => {
                let mut node = serde_json::json!({"type": "number"});
                if let Some(min) = minimum {
                    node["minimum"] = (*min).into();
                }
                if let Some(max) = maximum {
                    node["maximum"] = (*max).into();
                }
                node
            },
            Self::Boolean => serde_json::json!({"type": "boolean"}),
            Self::Array {
                items,
                min_items,
                max_items,
            } => {
                let mut node = serde_json::json!({
                    "type": "array",
                    "items": items.to_json_schema(),
                });
                if let Some(min) = min_items {
                    node["minItems"] = (*min).into();
                }
                if let Some(max) = max_items {
                    node["maxItems"] = (*max).into();
                }
                node
            },
            Self::Object { properties } => properties_to_json_schema(properties),
        }
    }
}

/// Render a property map as a JSON-Schema object node.
#[must_use]
pub fn properties_to_json_schema(properties: &BTreeMap<String, PropertySchema>) -> Value {
    let mut props = serde_json::Map::new();
    let mut required = Vec::new();
    for (name, property) in properties {
        let mut node = property.schema.to_json_schema();
        if let Some(description) = &property.description {
            node["description"] = description.clone().into();
        }
        props.insert(name.clone(), node);
        if property.required {
            required.push(Value::from(name.clone()));
        }
    }
    let mut node = serde_json::json!({
        "type": "object",
        "properties": props,
    });
    if !required.is_empty() {
        node["required"] = Value::Array(required);
    }
    node
}

fn push(issues: &mut Vec<SchemaIssue>, path: &str, message: String) {
    issues.push(SchemaIssue {
        path: path.to_string(),
        message,
    });
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keyword_properties() -> BTreeMap<String, PropertySchema> {
        let mut properties = BTreeMap::new();
        properties.insert(
            "keywords".to_string(),
            PropertySchema {
                schema: ParamSchema::Array {
                    items: Box::new(ParamSchema::String {
                        min_length: Some(1),
                        max_length: Some(200),
                        pattern: None,
                        format: None,
                    }),
                    min_items: Some(1),
                    max_items: Some(20),
                },
                required: true,
                description: Some("Keywords to search".to_string()),
            },
        );
        properties
    }

    #[test]
    fn accepts_valid_args() {
        let properties = keyword_properties();
        assert!(validate_object(&properties, &json!({"keywords": ["a", "b"]})).is_ok());
    }

    #[test]
    fn missing_required_parameter() {
        let properties = keyword_properties();
        let issues = validate_object(&properties, &json!({})).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].to_string(), "keywords: required parameter is missing");
    }

    #[test]
    fn wrong_type_reports_path() {
        let properties = keyword_properties();
        let issues = validate_object(&properties, &json!({"keywords": "oops"})).unwrap_err();
        assert_eq!(issues[0].path, "keywords");
        assert!(issues[0].message.contains("expected an array"));
    }

    #[test]
    fn element_issues_carry_indexed_paths() {
        let properties = keyword_properties();
        let issues =
            validate_object(&properties, &json!({"keywords": ["ok", "", 7]})).unwrap_err();
        let rendered: Vec<String> = issues.iter().map(ToString::to_string).collect();
        assert!(rendered.iter().any(|i| i.starts_with("keywords[1]:")));
        assert!(rendered.iter().any(|i| i.starts_with("keywords[2]:")));
    }

    #[test]
    fn array_size_bounds() {
        let properties = keyword_properties();
        let issues = validate_object(&properties, &json!({"keywords": []})).unwrap_err();
        assert!(issues[0].message.contains("at least 1"));

        let many: Vec<String> = (0..21).map(|i| i.to_string()).collect();
        let issues = validate_object(&properties, &json!({"keywords": many})).unwrap_err();
        assert!(issues[0].message.contains("at most 20"));
    }

    #[test]
    fn unknown_args_keys_are_ignored() {
        let properties = keyword_properties();
        assert!(
            validate_object(&properties, &json!({"keywords": ["a"], "extra": true})).is_ok()
        );
    }

    #[test]
    fn validation_is_idempotent() {
        let properties = keyword_properties();
        let args = json!({"keywords": ["a", "b"]});
        assert!(validate_object(&properties, &args).is_ok());
        // The value is unchanged by validation; a second pass agrees.
        assert!(validate_object(&properties, &args).is_ok());
        assert_eq!(args, json!({"keywords": ["a", "b"]}));
    }

    #[test]
    fn integer_constraints() {
        let schema = ParamSchema::Integer {
            minimum: Some(2),
            maximum: Some(50),
            positive: true,
        };
        let mut issues = Vec::new();
        validate_value(&schema, &json!(25), "n", &mut issues);
        assert!(issues.is_empty());

        validate_value(&schema, &json!(-1), "n", &mut issues);
        assert!(issues.iter().any(|i| i.message.contains("positive")));
        issues.clear();

        validate_value(&schema, &json!(99), "n", &mut issues);
        assert!(issues[0].message.contains("at most 50"));
    }

    #[test]
    fn string_pattern_and_format() {
        let schema = ParamSchema::String {
            min_length: None,
            max_length: None,
            pattern: Some("^https?://".to_string()),
            format: Some(StringFormat::Url),
        };
        let mut issues = Vec::new();
        validate_value(&schema, &json!("https://example.com/x"), "url", &mut issues);
        assert!(issues.is_empty());

        validate_value(&schema, &json!("ftp://example.com"), "url", &mut issues);
        assert!(issues.iter().any(|i| i.message.contains("pattern")));
        issues.clear();

        validate_value(&schema, &json!("https://"), "url", &mut issues);
        assert!(issues.iter().any(|i| i.message.contains("not a valid URL")));
    }

    #[test]
    fn nested_object_validation() {
        let mut inner = BTreeMap::new();
        inner.insert(
            "depth".to_string(),
            PropertySchema {
                schema: ParamSchema::Integer {
                    minimum: Some(0),
                    maximum: Some(10),
                    positive: false,
                },
                required: true,
                description: None,
            },
        );
        let mut properties = BTreeMap::new();
        properties.insert(
            "options".to_string(),
            PropertySchema {
                schema: ParamSchema::Object { properties: inner },
                required: false,
                description: None,
            },
        );

        assert!(validate_object(&properties, &json!({})).is_ok());
        let issues =
            validate_object(&properties, &json!({"options": {}})).unwrap_err();
        assert_eq!(issues[0].path, "options.depth");
    }

    #[test]
    fn unknown_type_tag_fails_parse() {
        let err = toml::from_str::<ParamSchema>("type = \"tuple\"").unwrap_err();
        assert!(err.to_string().contains("unknown variant") || !err.to_string().is_empty());
    }

    #[test]
    fn check_rejects_bad_patterns_and_inverted_bounds() {
        let bad_pattern = ParamSchema::String {
            min_length: None,
            max_length: None,
            pattern: Some("[unclosed".to_string()),
            format: None,
        };
        assert!(bad_pattern.check().is_err());

        let inverted = ParamSchema::Integer {
            minimum: Some(10),
            maximum: Some(2),
            positive: false,
        };
        assert!(inverted.check().is_err());
    }

    #[test]
    fn json_schema_rendering() {
        let properties = keyword_properties();
        let rendered = properties_to_json_schema(&properties);
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["properties"]["keywords"]["type"], "array");
        assert_eq!(rendered["properties"]["keywords"]["minItems"], 1);
        assert_eq!(rendered["required"][0], "keywords");
    }
}
