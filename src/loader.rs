//! Table and suite config loader.
//!
//! Reads the test table and the optional suite configuration from disk.

use crate::schema::{SuiteConfig, TestCase};
use crate::table::{self, TableError};
use std::path::{Path, PathBuf};

/// Error type for loading operations.
#[derive(Debug)]
pub enum LoadError {
    /// Failed to read the file.
    Io(PathBuf, std::io::Error),
    /// Malformed test table.
    Table(PathBuf, TableError),
    /// Failed to parse YAML.
    Yaml(PathBuf, serde_yaml::Error),
    /// Failed to parse TOML.
    Toml(PathBuf, toml::de::Error),
    /// More than one suite config file in the same directory.
    Ambiguous(PathBuf, PathBuf),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(p, e) => write!(f, "failed to read {}: {e}", p.display()),
            LoadError::Table(p, e) => write!(f, "invalid test table {}: {e}", p.display()),
            LoadError::Yaml(p, e) => write!(f, "invalid YAML in {}: {e}", p.display()),
            LoadError::Toml(p, e) => write!(f, "invalid TOML in {}: {e}", p.display()),
            LoadError::Ambiguous(a, b) => write!(
                f,
                "found both {} and {}; keep only one suite config",
                a.display(),
                b.display()
            ),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io(_, e) => Some(e),
            LoadError::Table(_, e) => Some(e),
            LoadError::Yaml(_, e) => Some(e),
            LoadError::Toml(_, e) => Some(e),
            LoadError::Ambiguous(..) => None,
        }
    }
}

/// Default name of the test table.
pub const TABLE_FILENAME: &str = "goldtest.table";

/// Names of the suite configuration file, in lookup order.
pub const SUITE_CONFIG_FILENAMES: [&str; 2] = ["goldtest.yaml", "goldtest.toml"];

/// Load and parse a test table.
pub fn load_table(path: &Path) -> Result<Vec<TestCase>, LoadError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| LoadError::Io(path.to_path_buf(), e))?;
    table::parse_table(&contents).map_err(|e| LoadError::Table(path.to_path_buf(), e))
}

/// Load suite configuration from a directory.
///
/// Looks for `goldtest.yaml` or `goldtest.toml` in the given directory.
/// Returns `None` if neither exists, `Err` if one is invalid or both exist.
pub fn load_suite_config(dir: &Path) -> Result<Option<SuiteConfig>, LoadError> {
    let [yaml_path, toml_path] = SUITE_CONFIG_FILENAMES.map(|name| dir.join(name));

    match (yaml_path.exists(), toml_path.exists()) {
        (false, false) => Ok(None),
        (true, true) => Err(LoadError::Ambiguous(yaml_path, toml_path)),
        (true, false) => {
            let contents = std::fs::read_to_string(&yaml_path)
                .map_err(|e| LoadError::Io(yaml_path.clone(), e))?;
            // An empty YAML document deserializes as unit, not as a map.
            if contents.trim().is_empty() {
                return Ok(Some(SuiteConfig::default()));
            }
            let config = serde_yaml::from_str(&contents).map_err(|e| LoadError::Yaml(yaml_path, e))?;
            Ok(Some(config))
        }
        (false, true) => {
            let contents = std::fs::read_to_string(&toml_path)
                .map_err(|e| LoadError::Io(toml_path.clone(), e))?;
            let config = toml::from_str(&contents).map_err(|e| LoadError::Toml(toml_path, e))?;
            Ok(Some(config))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableErrorKind;
    use std::num::NonZeroU64;
    use tempfile::tempdir;

    #[test]
    fn load_valid_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(TABLE_FILENAME);
        std::fs::write(
            &path,
            "# comment\n./prog|0|in|out|err|||a b|first\n./prog|2|in|out|err||||second\n",
        )
        .unwrap();

        let cases = load_table(&path).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[1].expected_exit_code, 2);
    }

    #[test]
    fn load_missing_table() {
        let dir = tempdir().unwrap();
        let result = load_table(&dir.path().join("nope.table"));
        assert!(matches!(result, Err(LoadError::Io(..))));
    }

    #[test]
    fn load_malformed_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(TABLE_FILENAME);
        std::fs::write(&path, "./prog|x|in|out|err||||bad\n").unwrap();

        match load_table(&path) {
            Err(LoadError::Table(_, e)) => assert!(matches!(e.kind, TableErrorKind::ExitCode(_))),
            other => panic!("expected table error, got {other:?}"),
        }
    }

    #[test]
    fn load_suite_config_not_found() {
        let dir = tempdir().unwrap();
        let result = load_suite_config(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn load_suite_config_yaml() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("goldtest.yaml"),
            "timeout: 10\nassets_dir: fixtures\n",
        )
        .unwrap();

        let config = load_suite_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.timeout.map(NonZeroU64::get), Some(10));
        assert_eq!(config.assets_dir, Some(PathBuf::from("fixtures")));
    }

    #[test]
    fn load_suite_config_empty_yaml() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("goldtest.yaml"), "\n").unwrap();

        let config = load_suite_config(dir.path()).unwrap().unwrap();
        assert!(config.timeout.is_none());
    }

    #[test]
    fn load_suite_config_toml() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("goldtest.toml"),
            "timeout = 4\ndetails = true\n",
        )
        .unwrap();

        let config = load_suite_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.timeout.map(NonZeroU64::get), Some(4));
        assert_eq!(config.details, Some(true));
    }

    #[test]
    fn load_suite_config_invalid() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("goldtest.yaml"), "invalid: [yaml: {").unwrap();

        let result = load_suite_config(dir.path());
        assert!(matches!(result, Err(LoadError::Yaml(..))));
    }

    #[test]
    fn load_suite_config_both_formats() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("goldtest.yaml"), "timeout: 1\n").unwrap();
        std::fs::write(dir.path().join("goldtest.toml"), "timeout = 1\n").unwrap();

        let result = load_suite_config(dir.path());
        assert!(matches!(result, Err(LoadError::Ambiguous(..))));
    }
}
