//! Lock document shape detection.
//!
//! Two incompatible schemas are accepted. The shape is resolved once here and
//! the extractor dispatches on the resulting [`LockDocument`] variant.
//!
//! ```text
//! Flat (lockfile v2/v3, optionally wrapped in "packages"):
//!   { "node_modules/a": { "version": "1.0.0", "resolved": "https://..." }, ... }
//!
//! Nested (lockfile v1):
//!   { "dependencies": { "a": { "version": "1.0.0", "resolved": "https://...",
//!                              "dependencies": { "b": { ... } } } } }
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::{LockfileError, LockfileResult};

/// Key wrapping the flat schema in npm lockfile v2/v3.
pub const PACKAGES_KEY: &str = "packages";

/// Key holding the nested dependency tree in npm lockfile v1.
pub const DEPENDENCIES_KEY: &str = "dependencies";

/// One entry of the flat schema.
///
/// Unknown fields (`integrity`, `dev`, `link`, ...) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlatEntry {
    /// Archive URL; absent for the root entry, links and bundled packages.
    #[serde(default)]
    pub resolved: Option<String>,

    /// Resolved version.
    #[serde(default)]
    pub version: Option<String>,

    /// Real package name, present for aliased installs.
    #[serde(default)]
    pub name: Option<String>,
}

/// A parsed lock document with its shape resolved.
#[derive(Debug, Clone)]
pub enum LockDocument {
    /// Map from install path to entry.
    Flat(BTreeMap<String, FlatEntry>),

    /// Root `dependencies` map of the nested tree, walked by the extractor
    /// with an explicit stack.
    Nested(Map<String, Value>),
}

impl LockDocument {
    /// Parse a document and resolve its shape.
    ///
    /// A document carrying both `packages` and `dependencies` is treated as
    /// flat, since `packages` is the authoritative section in that case.
    pub fn parse(input: &str) -> LockfileResult<Self> {
        let value =
            parse_unbounded(input).map_err(|e| LockfileError::MalformedDocument(e.to_string()))?;

        let Value::Object(mut root) = value else {
            return Err(LockfileError::MalformedDocument(
                "expected a JSON object at the top level".to_string(),
            ));
        };

        if let Some(packages) = root.remove(PACKAGES_KEY) {
            return Self::flat_from(packages);
        }

        if let Some(dependencies) = root.remove(DEPENDENCIES_KEY) {
            return match dependencies {
                Value::Object(map) => Ok(LockDocument::Nested(map)),
                other => Err(LockfileError::MalformedDocument(format!(
                    "'dependencies' must be an object, found {}",
                    json_type(&other)
                ))),
            };
        }

        // Bare flat map: every value is an entry object.
        if !root.is_empty() && root.values().all(Value::is_object) {
            return Self::flat_from(Value::Object(root));
        }

        Err(LockfileError::MalformedDocument(
            "document has neither a 'packages' nor a 'dependencies' section".to_string(),
        ))
    }

    fn flat_from(value: Value) -> LockfileResult<Self> {
        serde_json::from_value(value)
            .map(LockDocument::Flat)
            .map_err(|e| LockfileError::MalformedDocument(format!("invalid flat entry: {}", e)))
    }

    /// Short name of the shape, for logging.
    pub fn shape(&self) -> &'static str {
        match self {
            LockDocument::Flat(_) => "flat",
            LockDocument::Nested(_) => "nested",
        }
    }
}

/// Parse JSON without serde_json's nesting limit; deep nested lock graphs
/// grow the stack on the heap instead of failing.
fn parse_unbounded(input: &str) -> serde_json::Result<Value> {
    let mut json = serde_json::Deserializer::from_str(input);
    json.disable_recursion_limit();
    let value = Value::deserialize(serde_stacker::Deserializer::new(&mut json))?;
    json.end()?;
    Ok(value)
}

fn json_type(value: &Value) -> &'static str {
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

    #[test]
    fn test_wrapped_flat_shape() {
        let doc = LockDocument::parse(
            r#"{"name":"app","lockfileVersion":3,"packages":{"":{"name":"app"},
                "node_modules/a":{"version":"1.0.0","resolved":"https://r/a/-/a-1.0.0.tgz"}}}"#,
        )
        .unwrap();
        match doc {
            LockDocument::Flat(entries) => assert_eq!(entries.len(), 2),
            other => panic!("expected flat, got {}", other.shape()),
        }
    }

    #[test]
    fn test_bare_flat_shape() {
        let doc = LockDocument::parse(r#"{"node_modules/a":{"version":"1.0.0"}}"#).unwrap();
        assert_eq!(doc.shape(), "flat");
    }

    #[test]
    fn test_nested_shape() {
        let doc = LockDocument::parse(
            r#"{"lockfileVersion":1,"dependencies":{"a":{"version":"1.0.0"}}}"#,
        )
        .unwrap();
        assert_eq!(doc.shape(), "nested");
    }

    #[test]
    fn test_packages_wins_over_dependencies() {
        let doc = LockDocument::parse(r#"{"packages":{},"dependencies":{}}"#).unwrap();
        assert_eq!(doc.shape(), "flat");
    }

    #[test]
    fn test_rejects_non_json() {
        let err = LockDocument::parse("not json").unwrap_err();
        assert!(matches!(err, LockfileError::MalformedDocument(_)));
    }

    #[test]
    fn test_rejects_unknown_shape() {
        assert!(LockDocument::parse(r#"{"name":"app","version":"1.0.0"}"#).is_err());
        assert!(LockDocument::parse("[]").is_err());
        assert!(LockDocument::parse("{}").is_err());
    }

    #[test]
    fn test_rejects_non_object_dependencies() {
        let err = LockDocument::parse(r#"{"dependencies":[1,2]}"#).unwrap_err();
        assert!(err.to_string().contains("array"));
    }
}
