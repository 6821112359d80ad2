//! Incompatible flags
//!
//! Flags slated to flip in an upcoming release are tracked as GitHub issues
//! labelled `migration-<major>.<minor>`. The issue title starts with the flag
//! name; a `breaking-change-<release>` label names the release that flips it.

use crate::cache::MetadataCache;
use crate::error::{BazeliskError, BazeliskResult};
use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

const ISSUE_SEARCH_URL: &str =
    "https://api.github.com/search/issues?per_page=100&q=repo:bazelbuild/bazel+label:migration-";

/// Release shown when no issue label names one
const UNKNOWN_RELEASE: &str = "TBD";

/// An `--incompatible_*` flag and where it is tracked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFlag {
    /// Full flag, e.g. `--incompatible_strict_action_env`
    pub name: String,

    /// Release expected to flip the default
    pub release_to_flip: String,

    pub issue_url: String,
}

impl fmt::Display for MigrationFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Bazel {}: {})",
            self.name, self.release_to_flip, self.issue_url
        )
    }
}

/// Flags keyed (and therefore sorted) by name
pub type FlagSet = BTreeMap<String, MigrationFlag>;

/// Supplies the incompatible flags of a Bazel version
#[async_trait]
pub trait FlagProvider: Send + Sync {
    async fn incompatible_flags(&self, version: &str) -> BazeliskResult<FlagSet>;
}

#[derive(Debug, Deserialize)]
struct IssueLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Issue {
    title: String,
    html_url: String,
    #[serde(default)]
    labels: Vec<IssueLabel>,
}

#[derive(Debug, Deserialize)]
struct IssueList {
    #[serde(default)]
    items: Vec<Issue>,
}

/// Compiled patterns for version labels and issue titles
#[derive(Debug, Clone)]
pub struct FlagPatterns {
    major_minor: Regex,
    plain: Regex,
    starlark: Regex,
}

impl FlagPatterns {
    pub fn compile() -> BazeliskResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| BazeliskError::Internal(format!("pattern {}: {}", pattern, e)))
        };

        Ok(Self {
            major_minor: compile(r"^\d+\.\d+")?,
            plain: compile(r"^incompatible_\w+")?,
            starlark: compile(r"^//.*[^/]:incompatible_\w+")?,
        })
    }

    /// `major.minor` prefix of a version label, as used by migration labels
    pub fn migration_label_version<'v>(&self, version: &'v str) -> Option<&'v str> {
        self.major_minor.find(version).map(|m| m.as_str())
    }

    /// Extract flags from a GitHub issue search result
    pub fn scan_issues(&self, issues_json: &[u8]) -> BazeliskResult<FlagSet> {
        let issues: IssueList = serde_json::from_slice(issues_json)
            .map_err(|e| BazeliskError::invalid_json("JSON into list of issues", e))?;

        let mut flags = FlagSet::new();
        for issue in issues.items {
            let Some(found) = self
                .plain
                .find(&issue.title)
                .or_else(|| self.starlark.find(&issue.title))
            else {
                continue;
            };

            let name = format!("--{}", found.as_str());
            flags.insert(
                name.clone(),
                MigrationFlag {
                    name,
                    release_to_flip: breaking_release(&issue.labels),
                    issue_url: issue.html_url,
                },
            );
        }

        Ok(flags)
    }
}

/// Flag provider backed by the GitHub issue search
pub struct GitHubIssueFlags {
    cache: MetadataCache,
    patterns: FlagPatterns,
}

impl GitHubIssueFlags {
    pub fn new(cache: MetadataCache) -> BazeliskResult<Self> {
        Ok(Self {
            cache,
            patterns: FlagPatterns::compile()?,
        })
    }
}

#[async_trait]
impl FlagProvider for GitHubIssueFlags {
    async fn incompatible_flags(&self, version: &str) -> BazeliskResult<FlagSet> {
        let label_version = self
            .patterns
            .migration_label_version(version)
            .ok_or_else(|| BazeliskError::resolution(format!("invalid version {}", version)))?;

        let url = format!("{}{}", ISSUE_SEARCH_URL, label_version);
        let issues = self
            .cache
            .get_or_fetch(
                &format!("flags-{}", label_version),
                &url,
                "list of flags from GitHub",
            )
            .await
            .map_err(|e| e.context("could not get issues from GitHub"))?;

        self.patterns.scan_issues(&issues)
    }
}

fn breaking_release(labels: &[IssueLabel]) -> String {
    labels
        .iter()
        .find_map(|l| l.name.strip_prefix("breaking-change-"))
        .unwrap_or(UNKNOWN_RELEASE)
        .to_string()
}
