//! API key loading
//!
//! Keys come from a newline-delimited file, one key per line, loaded once at
//! startup. The order in the file is the pool's rotation order. Keys are
//! wrapped in `Secret` immediately so they never appear in Debug output; the
//! synthetic `key-N` ids exist purely for logging.

use std::path::Path;

use common::Secret;
use tracing::info;

use crate::error::{Error, Result};

/// One API key with a loggable identifier.
#[derive(Debug)]
pub struct ApiKey {
    /// Position-derived id (`key-0`, `key-1`, ...), safe to log.
    pub id: String,
    pub key: Secret<String>,
}

/// Load API keys from a newline-delimited file.
///
/// Blank lines and `#` comments are skipped. Fails if the file cannot be
/// read or contains no keys, since a pool of zero keys can never serve a
/// request.
pub fn load_keys(path: &Path) -> Result<Vec<ApiKey>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::KeyFile(format!("reading {}: {e}", path.display())))?;

    let keys: Vec<ApiKey> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .enumerate()
        .map(|(i, line)| ApiKey {
            id: format!("key-{i}"),
            key: Secret::new(line.to_owned()),
        })
        .collect();

    if keys.is_empty() {
        return Err(Error::KeyFile(format!(
            "no keys found in {}",
            path.display()
        )));
    }

    info!(path = %path.display(), keys = keys.len(), "loaded API keys");
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_keys_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.txt");
        std::fs::write(&path, "alpha\nbeta\ngamma\n").unwrap();

        let keys = load_keys(&path).unwrap();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[0].id, "key-0");
        assert_eq!(keys[0].key.expose(), "alpha");
        assert_eq!(keys[2].key.expose(), "gamma");
    }

    #[test]
    fn skips_blank_lines_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.txt");
        std::fs::write(&path, "# project keys\nalpha\n\n  \nbeta\n").unwrap();

        let keys = load_keys(&path).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].key.expose(), "beta");
    }

    #[test]
    fn empty_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.txt");
        std::fs::write(&path, "\n# nothing here\n").unwrap();

        let err = load_keys(&path).unwrap_err();
        assert!(err.to_string().contains("no keys found"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_keys(Path::new("/nonexistent/keys.txt")).unwrap_err();
        assert!(err.to_string().contains("key file error"));
    }
}
