use crate::config::expand_tilde;
use crate::config::parse::ConfigError;
use glob::glob;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// True when `pattern` contains glob metacharacters.
pub fn is_pattern(pattern: &str) -> bool {
    pattern.contains(&['*', '?', '['][..])
}

/// Resolve a configured `path_file` to concrete paths.
///
/// A literal path is returned as is, even if it does not exist yet. A
/// pattern returns its current regular-file matches, sorted, and may
/// return nothing.
pub fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>, ConfigError> {
    let expanded = expand_tilde(Path::new(pattern));

    if !is_pattern(pattern) {
        return Ok(vec![expanded]);
    }

    let pattern_text = expanded.to_string_lossy().into_owned();
    let entries = glob(&pattern_text).map_err(|e| ConfigError::Pattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let mut found = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => found.push(path),
            Ok(_) => {}
            Err(e) => error!(pattern = %pattern, error = %e, "Failed to read path while expanding pattern"),
        }
    }
    found.sort();

    if found.is_empty() {
        debug!(pattern = %pattern, "Pattern matched no files");
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_literal_path_kept_even_if_missing() {
        let paths = expand_pattern("/nonexistent/logrelay/app.log").unwrap();
        assert_eq!(paths, vec![PathBuf::from("/nonexistent/logrelay/app.log")]);
    }

    #[test]
    fn test_pattern_matches_files_only() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.log"), "").unwrap();
        fs::write(dir.path().join("b.log"), "").unwrap();
        fs::write(dir.path().join("c.txt"), "").unwrap();
        fs::create_dir(dir.path().join("d.log")).unwrap();

        let pattern = format!("{}/*.log", dir.path().display());
        let paths = expand_pattern(&pattern).unwrap();
        assert_eq!(paths, vec![dir.path().join("a.log"), dir.path().join("b.log")]);
    }

    #[test]
    fn test_recursive_pattern() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("x/y")).unwrap();
        fs::write(dir.path().join("x/y/deep.log"), "").unwrap();

        let pattern = format!("{}/**/*.log", dir.path().display());
        assert_eq!(expand_pattern(&pattern).unwrap(), vec![dir.path().join("x/y/deep.log")]);
    }

    #[test]
    fn test_unmatched_pattern_is_empty() {
        let dir = TempDir::new().unwrap();
        let pattern = format!("{}/*.log", dir.path().display());
        assert!(expand_pattern(&pattern).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_pattern() {
        let result = expand_pattern("/var/log/[.log");
        assert!(matches!(result, Err(ConfigError::Pattern { .. })));
    }
}
