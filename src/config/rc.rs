//! `.bazeliskrc` parsing
//!
//! The file holds `KEY=VALUE` lines. Lines starting with `#` and lines
//! without `=` are ignored; keys and values are whitespace-trimmed.

use crate::error::{BazeliskError, BazeliskResult};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;

/// Name of the rc file in the workspace root
pub const RC_FILE_NAME: &str = ".bazeliskrc";

/// Parse rc-file contents into a key/value map
pub fn parse_rc(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Read and parse an rc file. A missing file yields an empty map.
pub fn read_rc_file(path: &Path) -> BazeliskResult<HashMap<String, String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(parse_rc(&contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(BazeliskError::io(
            format!("reading {}", path.display()),
            e,
        )),
    }
}
