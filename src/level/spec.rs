//! Capability tables describing a compliance level.
//!
//! A [`ComplianceSpec`] is plain data: for each of the five request
//! parameters it lists named features, each with a `match` pattern and a
//! `supported` flag. Tables are deserialized from JSON:
//!
//! ```json
//! {
//!   "image": {
//!     "region":   { "full": { "syntax": "full", "required": true, "supported": true, "match": "^full$" } },
//!     "size":     { ... },
//!     "rotation": { ... },
//!     "quality":  { "color": { ..., "default": true } },
//!     "format":   { "jpg": { "syntax": "jpg", "required": true, "supported": true, "match": "^jpe?g$" } }
//!   }
//! }
//! ```
//!
//! Entry order is the document order. Format resolution is first-match, so
//! [`FeatureTable`] keeps entries in a `Vec` instead of a sorted map.

use regex::Regex;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;

/// Root of a level's capability document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComplianceSpec {
    pub image: ImageSpec,
}

/// Per-parameter feature tables.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSpec {
    pub region: FeatureTable,
    pub size: FeatureTable,
    pub rotation: FeatureTable,
    pub quality: FeatureTable,
    pub format: FeatureTable,
}

/// A single named capability, e.g. `regionByPx` or `jpg`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Feature {
    /// Human-readable syntax, e.g. `x,y,w,h`.
    #[serde(default)]
    pub syntax: String,
    #[serde(default)]
    pub required: bool,
    pub supported: bool,
    /// Marks the concrete quality that `default` resolves to.
    #[serde(default)]
    pub default: bool,
    #[serde(rename = "match", deserialize_with = "deserialize_pattern")]
    pub pattern: Regex,
}

impl Feature {
    pub fn matches(&self, value: &str) -> bool {
        self.pattern.is_match(value)
    }
}

fn deserialize_pattern<'de, D>(deserializer: D) -> Result<Regex, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Regex::new(&raw).map_err(|e| de::Error::custom(format!("invalid match pattern {raw:?}: {e}")))
}

/// Named features in declared order.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable(Vec<(String, Feature)>);

impl FeatureTable {
    pub fn new(entries: Vec<(String, Feature)>) -> Self {
        Self(entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Feature)> {
        self.0.iter().map(|(name, feature)| (name.as_str(), feature))
    }

    pub fn get(&self, name: &str) -> Option<&Feature> {
        self.iter().find(|(n, _)| *n == name).map(|(_, f)| f)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for FeatureTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = FeatureTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of feature name to feature details")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, feature)) = map.next_entry::<String, Feature>()? {
                    if entries.iter().any(|(n, _): &(String, Feature)| *n == name) {
                        return Err(de::Error::custom(format!("duplicate feature {name:?}")));
                    }
                    entries.push((name, feature));
                }
                Ok(FeatureTable(entries))
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(json: &str) -> Result<FeatureTable, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[test]
    fn table_preserves_document_order() {
        let t = table(
            r#"{
                "zeta":  { "supported": true, "match": "^z$" },
                "alpha": { "supported": true, "match": "^a$" },
                "mid":   { "supported": false, "match": "^m$" }
            }"#,
        )
        .unwrap();

        let names: Vec<&str> = t.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn invalid_pattern_fails_at_load() {
        let err = table(r#"{ "bad": { "supported": true, "match": "^(unclosed$" } }"#).unwrap_err();
        assert!(err.to_string().contains("invalid match pattern"));
    }

    #[test]
    fn duplicate_names_rejected() {
        let result = table(
            r#"{
                "jpg": { "supported": true, "match": "^jpg$" },
                "jpg": { "supported": true, "match": "^jpeg$" }
            }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn feature_defaults_for_optional_fields() {
        let t = table(r#"{ "png": { "supported": true, "match": "^png$" } }"#).unwrap();
        let png = t.get("png").unwrap();
        assert!(!png.required);
        assert!(!png.default);
        assert_eq!(png.syntax, "");
        assert!(png.matches("png"));
        assert!(!png.matches("apng"));
    }

    #[test]
    fn unknown_feature_keys_rejected() {
        let result = table(r#"{ "png": { "supported": true, "match": "^png$", "colour": 1 } }"#);
        assert!(result.is_err());
    }
}
