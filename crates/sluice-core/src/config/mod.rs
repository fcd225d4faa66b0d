//! YAML configuration loading shared by the sluice binaries.
//!
//! Files are read, environment-interpolated (see [`interpolate`]) and then
//! deserialized. Validation of the resulting struct is left to its owner.

mod vars;

pub use vars::{interpolate, interpolate_with};

use serde::de::DeserializeOwned;
use snafu::prelude::*;
use std::path::Path;

use crate::error::{ConfigError, ReadFileSnafu, UnsupportedFormatSnafu, YamlParseSnafu};

/// Check if a path has a YAML extension.
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

/// Interpolate and parse a YAML document.
pub fn parse_yaml<T: DeserializeOwned>(contents: &str) -> Result<T, ConfigError> {
    let interpolated = interpolate(contents)?;
    serde_yaml::from_str(&interpolated).context(YamlParseSnafu)
}

/// Read, interpolate and parse a YAML configuration file.
pub fn load_yaml_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    ensure!(is_yaml_file(path), UnsupportedFormatSnafu { path });

    let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
    parse_yaml(&contents)
}

/// Fail with `EmptyUrl` when a required location is blank.
pub fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    ensure!(!value.trim().is_empty(), crate::error::EmptyUrlSnafu { field });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct Sample {
        url: String,
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "url: /tmp/staging").unwrap();

        let sample: Sample = load_yaml_file(file.path()).unwrap();
        assert_eq!(sample.url, "/tmp/staging");
    }

    #[test]
    fn test_rejects_non_yaml_extension() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        let err = load_yaml_file::<Sample>(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = load_yaml_file::<Sample>(Path::new("/nonexistent/sluice.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("storage.url", "gs://bucket").is_ok());
        let err = require_non_empty("storage.url", "  ").unwrap_err();
        assert_eq!(err.to_string(), "'storage.url' cannot be empty");
    }
}
