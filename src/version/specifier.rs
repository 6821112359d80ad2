//! Version specifier parsing
//!
//! A specifier is what the user writes in `.bazelversion` or
//! `USE_BAZEL_VERSION`:
//!
//! | Specifier | Kind | Selector |
//! |-----------|------|----------|
//! | `latest`, `latest-2` | release | latest minus offset |
//! | `6.x`, `6.2.x` | release | latest on the track |
//! | `6.4.0` | release | absolute |
//! | `last_rc` | candidate | highest candidate |
//! | `7.0.0rc3` | candidate | absolute |
//! | `last_green`, `last_downstream_green` | commit | last green commit |
//! | 40-digit hex | commit | absolute |
//! | `rolling` | rolling | newest rolling release |
//! | `7.0.0-pre.20231011.2` | rolling | absolute |
//! | `<fork>/<any of the above>` | fork release | as above |

use crate::error::{BazeliskError, BazeliskResult};

/// GitHub organization of the default Bazel source
pub const UPSTREAM: &str = "bazelbuild";

/// Family of versions a specifier refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionKind {
    Release,
    Candidate,
    ForkRelease,
    Commit,
    Rolling,
}

/// Which version within the family is selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// A literal release tag, candidate label or commit hash
    Absolute(String),

    /// The newest version minus `offset`
    Latest { offset: usize },

    /// Most recent commit that passed CI
    LastGreen,

    /// Most recent commit that passed CI including downstream projects
    LastDownstreamGreen,

    /// Highest release candidate of the newest version
    LastRc,
}

/// A parsed version specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpecifier {
    /// Version part of the input, without the fork
    pub value: String,

    /// GitHub organization publishing the binary
    pub fork: String,

    pub kind: VersionKind,

    pub selector: Selector,

    /// Only consider releases whose label starts with this prefix
    pub track: Option<String>,
}

impl VersionSpecifier {
    /// Parse `[fork/]version`
    pub fn parse(raw: &str) -> BazeliskResult<Self> {
        let raw = raw.trim();
        let parts: Vec<&str> = raw.split('/').collect();

        let (fork, value) = match parts.as_slice() {
            [value] => (None, *value),
            [fork, value] => (Some(*fork), *value),
            _ => {
                return Err(BazeliskError::parse(
                    raw,
                    "could not parse version with more than one slash",
                ))
            }
        };

        if value.is_empty() {
            return Err(BazeliskError::parse(raw, "empty version"));
        }

        match fork {
            Some("") => Err(BazeliskError::parse(raw, "empty fork name")),
            Some(fork) if fork != UPSTREAM => Self::parse_fork(raw, fork, value),
            _ => Self::parse_upstream(raw, value),
        }
    }

    /// Whether the binary comes from the default Bazel source
    pub fn is_upstream(&self) -> bool {
        self.fork == UPSTREAM
    }

    fn parse_upstream(raw: &str, value: &str) -> BazeliskResult<Self> {
        let (kind, selector, track) = match value {
            "last_green" => (VersionKind::Commit, Selector::LastGreen, None),
            "last_downstream_green" => (VersionKind::Commit, Selector::LastDownstreamGreen, None),
            "last_rc" => (VersionKind::Candidate, Selector::LastRc, None),
            "rolling" => (VersionKind::Rolling, Selector::Latest { offset: 0 }, None),
            _ => {
                if let Some(offset) = parse_latest(raw, value)? {
                    (VersionKind::Release, Selector::Latest { offset }, None)
                } else if let Some(track) = parse_track(value) {
                    (VersionKind::Release, Selector::Latest { offset: 0 }, Some(track))
                } else if is_commit_hash(value) {
                    (VersionKind::Commit, absolute(value), None)
                } else if split_candidate(value)?.is_some() {
                    (VersionKind::Candidate, absolute(value), None)
                } else if value.contains("-pre.") {
                    (VersionKind::Rolling, absolute(value), None)
                } else {
                    (VersionKind::Release, absolute(value), None)
                }
            }
        };

        Ok(Self {
            value: value.to_string(),
            fork: UPSTREAM.to_string(),
            kind,
            selector,
            track,
        })
    }

    fn parse_fork(raw: &str, fork: &str, value: &str) -> BazeliskResult<Self> {
        if matches!(
            value,
            "last_green" | "last_downstream_green" | "last_rc" | "rolling"
        ) {
            return Err(BazeliskError::parse(
                raw,
                "forks do not support last_rc, last_green, last_downstream_green and rolling",
            ));
        }

        let (selector, track) = if let Some(offset) = parse_latest(raw, value)? {
            (Selector::Latest { offset }, None)
        } else if let Some(track) = parse_track(value) {
            (Selector::Latest { offset: 0 }, Some(track))
        } else {
            (absolute(value), None)
        };

        Ok(Self {
            value: value.to_string(),
            fork: fork.to_string(),
            kind: VersionKind::ForkRelease,
            selector,
            track,
        })
    }
}

fn absolute(value: &str) -> Selector {
    Selector::Absolute(value.to_string())
}

/// `latest` -> 0, `latest-3` -> 3, anything else -> `None`
fn parse_latest(raw: &str, value: &str) -> BazeliskResult<Option<usize>> {
    if value == "latest" {
        return Ok(Some(0));
    }

    match value.strip_prefix("latest-") {
        Some(offset) => offset.parse::<usize>().map(Some).map_err(|e| {
            BazeliskError::parse(raw, format!("could not parse offset: {}", e))
        }),
        None => Ok(None),
    }
}

/// `6.x` -> `6.`, `6.2.x` -> `6.2.`
fn parse_track(value: &str) -> Option<String> {
    let prefix = value.strip_suffix(".x")?;
    let components: Vec<&str> = prefix.split('.').collect();
    let numeric = components
        .iter()
        .all(|c| !c.is_empty() && c.chars().all(|ch| ch.is_ascii_digit()));

    if numeric && components.len() <= 2 {
        Some(format!("{}.", prefix))
    } else {
        None
    }
}

fn is_commit_hash(value: &str) -> bool {
    value.len() == 40 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Split a candidate label into its base version and ordinal.
///
/// `5.0.0rc3` -> `("5.0.0", 3)`. Labels without `rc` are not candidates and
/// yield `None`; a non-numeric ordinal is an error.
pub fn split_candidate(label: &str) -> BazeliskResult<Option<(String, u32)>> {
    let Some((base, ordinal)) = label.split_once("rc") else {
        return Ok(None);
    };

    if base.is_empty() || !base.starts_with(|c: char| c.is_ascii_digit()) {
        return Ok(None);
    }

    let ordinal = ordinal.parse::<u32>().map_err(|_| {
        BazeliskError::parse(label, format!("invalid release candidate number \"{}\"", ordinal))
    })?;

    Ok(Some((base.to_string(), ordinal)))
}
