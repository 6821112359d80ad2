//! Version ordering
//!
//! Bazel labels are close to semver but not quite: candidates are written
//! `6.0.0rc3`, some old tags have two components. Labels are normalized
//! before comparison so that `rc10` sorts after `rc9` and a release sorts
//! after its candidates and pre-releases.

use semver::Version;
use tracing::warn;

/// Parse a Bazel label into a comparable semver version
pub fn parse_lenient(label: &str) -> Option<Version> {
    let label = label.trim();
    let label = label.strip_prefix('v').unwrap_or(label);

    let normalized = match label.find("rc") {
        Some(idx) if !label.contains('-') => {
            format!("{}-rc.{}", &label[..idx], &label[idx + 2..])
        }
        _ => label.to_string(),
    };

    let (core, rest) = match normalized.find(|c: char| c == '-' || c == '+') {
        Some(idx) => normalized.split_at(idx),
        None => (normalized.as_str(), ""),
    };

    let components = core.split('.').count();
    let padded = match components {
        1 => format!("{}.0.0{}", core, rest),
        2 => format!("{}.0{}", core, rest),
        _ => normalized.clone(),
    };

    Version::parse(&padded).ok()
}

/// Whether `label` names a full release (no candidate or pre-release part)
pub fn is_release_label(label: &str) -> bool {
    !label.contains("rc")
        && !label.contains("pre")
        && parse_lenient(label).is_some_and(|v| v.pre.is_empty())
}

/// Sort labels in ascending version order.
///
/// Labels that do not parse sort first, in lexical order.
pub fn sort_ascending(labels: Vec<String>) -> Vec<String> {
    let mut keyed: Vec<(Option<Version>, String)> = labels
        .into_iter()
        .map(|label| {
            let parsed = parse_lenient(&label);
            if parsed.is_none() {
                warn!("Could not parse version: {}", label);
            }
            (parsed, label)
        })
        .collect();

    keyed.sort();
    keyed.into_iter().map(|(_, label)| label).collect()
}
