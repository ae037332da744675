//! Flatten a lock document into package descriptors.

use std::collections::HashSet;

use semver::Version;
use serde_json::{Map, Value};

use super::document::{FlatEntry, LockDocument, DEPENDENCIES_KEY};
use super::error::LockfileResult;
use super::types::PackageDescriptor;

/// Install path separator used by the flat schema.
const NODE_MODULES: &str = "node_modules/";

/// Extract a flat, deduplicated descriptor list from a lock document.
///
/// Entries without a `resolved` URL are skipped silently. Entries whose
/// version is not valid semver are dropped with a warning.
///
/// # Errors
///
/// Returns [`LockfileError::MalformedDocument`](super::LockfileError) when the
/// input is not JSON or matches neither supported shape.
pub fn extract(document: &str) -> LockfileResult<Vec<PackageDescriptor>> {
    let parsed = LockDocument::parse(document)?;
    let shape = parsed.shape();

    let candidates = match parsed {
        LockDocument::Flat(entries) => extract_flat(entries),
        LockDocument::Nested(root) => extract_nested(root),
    };

    let mut seen = HashSet::new();
    let descriptors: Vec<PackageDescriptor> = candidates
        .into_iter()
        .filter(|d| {
            if Version::parse(&d.version).is_err() {
                tracing::warn!(
                    package = %d.name,
                    version = %d.version,
                    path = %d.local_path,
                    "Dropping lock entry with invalid semantic version"
                );
                return false;
            }
            seen.insert((d.name.clone(), d.version.clone(), d.local_path.clone()))
        })
        .collect();

    tracing::debug!(shape, count = descriptors.len(), "Extracted lock graph");
    Ok(descriptors)
}

/// Trim whitespace and strip stray backticks from a `resolved` URL.
pub fn sanitize_resolved(raw: &str) -> String {
    raw.trim().chars().filter(|c| *c != '`').collect()
}

/// Package name implied by a flat install path.
///
/// `node_modules/a/node_modules/@s/b` → `@s/b`.
pub fn name_from_install_path(path: &str) -> &str {
    match path.rfind(NODE_MODULES) {
        Some(idx) => &path[idx + NODE_MODULES.len()..],
        None => path,
    }
}

fn extract_flat(
    entries: std::collections::BTreeMap<String, FlatEntry>,
) -> Vec<PackageDescriptor> {
    entries
        .into_iter()
        .filter_map(|(path, entry)| {
            let resolved = sanitize_resolved(entry.resolved.as_deref()?);
            if resolved.is_empty() {
                return None;
            }
            let version = entry.version?;
            let name = entry
                .name
                .unwrap_or_else(|| name_from_install_path(&path).to_string());
            Some(PackageDescriptor::new(name, version, resolved, path))
        })
        .collect()
}

/// Pre-order traversal of the nested tree using an explicit stack.
///
/// Each stack frame carries the install path of the node it describes, so a
/// child `b` of `a` lands at `node_modules/a/node_modules/b`.
fn extract_nested(root: Map<String, Value>) -> Vec<PackageDescriptor> {
    let mut out = Vec::new();
    let mut stack: Vec<(String, String, Value)> = root
        .into_iter()
        .rev()
        .map(|(name, node)| (format!("{}{}", NODE_MODULES, name), name, node))
        .collect();

    while let Some((path, name, node)) = stack.pop() {
        let Value::Object(mut fields) = node else {
            tracing::warn!(path = %path, "Skipping non-object dependency node");
            continue;
        };

        let resolved = fields
            .get("resolved")
            .and_then(Value::as_str)
            .map(sanitize_resolved)
            .filter(|r| !r.is_empty());
        let version = fields.get("version").and_then(Value::as_str);

        if let (Some(resolved), Some(version)) = (resolved, version) {
            out.push(PackageDescriptor::new(
                name.as_str(),
                version,
                resolved,
                path.as_str(),
            ));
        }

        if let Some(Value::Object(children)) = fields.remove(DEPENDENCIES_KEY) {
            // Reverse so the first child is popped first.
            for (child, child_node) in children.into_iter().rev() {
                let child_path = format!("{}/{}{}", path, NODE_MODULES, child);
                stack.push((child_path, child, child_node));
            }
        }
    }

    out
}
