//! Version resolution
//!
//! Turns a parsed specifier into an absolute label by asking the repository
//! of the matching family. Absolute labels pass through without any network
//! access.

use crate::error::{BazeliskError, BazeliskResult};
use crate::repositories::{ReleaseFilter, Repositories};
use crate::version::order;
use crate::version::specifier::{split_candidate, Selector, VersionKind, VersionSpecifier};
use tracing::debug;

/// An absolute version label, ready for download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// Release tag, candidate label, rolling label or commit hash
    pub label: String,

    pub kind: VersionKind,

    /// GitHub organization publishing the binary
    pub fork: String,
}

impl ResolvedVersion {
    /// Whether the label is an unreleased build at a commit
    pub fn is_commit(&self) -> bool {
        self.kind == VersionKind::Commit
    }
}

/// Resolves specifiers against a set of repositories
pub struct VersionResolver<'a> {
    repos: &'a Repositories,
}

impl<'a> VersionResolver<'a> {
    pub fn new(repos: &'a Repositories) -> Self {
        Self { repos }
    }

    /// Resolve `spec` to an absolute label
    pub async fn resolve(&self, spec: &VersionSpecifier) -> BazeliskResult<ResolvedVersion> {
        let label = match &spec.selector {
            Selector::Absolute(label) => label.clone(),
            Selector::LastGreen => self.repos.commits.last_green_commit(false).await?,
            Selector::LastDownstreamGreen => self.repos.commits.last_green_commit(true).await?,
            Selector::LastRc => {
                let candidates = self.repos.candidates.candidate_versions().await?;
                highest_candidate(&candidates)?
            }
            Selector::Latest { offset } => {
                let available = self
                    .list(spec)
                    .await
                    .map_err(|e| e.context("unable to determine latest version"))?;
                select_latest(&available, *offset, &spec.value)?
            }
        };

        debug!("Resolved {} to {}", spec.value, label);
        Ok(ResolvedVersion {
            label,
            kind: spec.kind,
            fork: spec.fork.clone(),
        })
    }

    /// Ascending listing of the family `spec` selects from
    async fn list(&self, spec: &VersionSpecifier) -> BazeliskResult<Vec<String>> {
        let filter = ReleaseFilter {
            track: spec.track.clone(),
        };

        let versions = match spec.kind {
            VersionKind::ForkRelease => {
                let versions = self.repos.fork.fork_versions(&spec.fork).await?;
                versions.into_iter().filter(|v| filter.matches(v)).collect()
            }
            VersionKind::Rolling => self.repos.rolling.rolling_versions().await?,
            VersionKind::Candidate => self.repos.candidates.candidate_versions().await?,
            VersionKind::Commit => {
                return Err(BazeliskError::resolution(
                    "commits cannot be selected by offset",
                ))
            }
            VersionKind::Release => self.repos.releases.release_versions(&filter).await?,
        };

        Ok(order::sort_ascending(versions))
    }
}

/// Pick the version `offset` places below the newest one
pub fn select_latest(available: &[String], offset: usize, label: &str) -> BazeliskResult<String> {
    if offset >= available.len() {
        return Err(BazeliskError::NotEnoughVersions {
            label: label.to_string(),
            available: available.len(),
        });
    }

    Ok(available[available.len() - 1 - offset].clone())
}

/// Highest release candidate, compared by base version then ordinal
pub fn highest_candidate(candidates: &[String]) -> BazeliskResult<String> {
    if candidates.is_empty() {
        return Err(BazeliskError::resolution(
            "could not find any release candidates",
        ));
    }

    let mut best: Option<(semver::Version, u32, &String)> = None;
    for label in candidates {
        let Some((base, ordinal)) = split_candidate(label)? else {
            continue;
        };
        let Some(base) = order::parse_lenient(&base) else {
            continue;
        };

        let better = match &best {
            Some((best_base, best_ordinal, _)) => (&base, ordinal) > (best_base, *best_ordinal),
            None => true,
        };
        if better {
            best = Some((base, ordinal, label));
        }
    }

    best.map(|(_, _, label)| label.clone()).ok_or_else(|| {
        BazeliskError::resolution(format!(
            "could not find a release candidate among {}",
            candidates.join(", ")
        ))
    })
}
