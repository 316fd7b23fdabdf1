//! Named parameter schemas registered in the binary.
//!
//! The tool file can reference these by name instead of spelling a schema
//! inline (`schema = "url_batch"`).

use std::collections::BTreeMap;

use dragnet_config::schema::{ParamSchema, PropertySchema, StringFormat};

/// Resolve a named schema.
#[must_use]
pub fn named_schema(name: &str) -> Option<BTreeMap<String, PropertySchema>> {
    match name {
        "url_batch" => Some(url_batch()),
        _ => None,
    }
}

/// `url_batch`: `{ urls: [url] 1..=50 }` — the shape shared by scraping
/// tools.
fn url_batch() -> BTreeMap<String, PropertySchema> {
    let mut properties = BTreeMap::new();
    properties.insert(
        "urls".to_string(),
        PropertySchema {
            schema: ParamSchema::Array {
                items: Box::new(ParamSchema::String {
                    min_length: Some(1),
                    max_length: Some(2000),
                    pattern: None,
                    format: Some(StringFormat::Url),
                }),
                min_items: Some(1),
                max_items: Some(50),
            },
            required: true,
            description: Some("URLs to scrape".to_string()),
        },
    );
    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use dragnet_config::schema::validate_object;
    use serde_json::json;

    #[test]
    fn url_batch_resolves() {
        assert!(named_schema("url_batch").is_some());
        assert!(named_schema("no_such_schema").is_none());
    }

    #[test]
    fn url_batch_validates_urls() {
        let schema = named_schema("url_batch").unwrap();
        assert!(validate_object(&schema, &json!({"urls": ["https://example.com"]})).is_ok());
        let issues = validate_object(&schema, &json!({"urls": ["not a url"]})).unwrap_err();
        assert!(issues[0].to_string().starts_with("urls[0]:"));
    }
}
