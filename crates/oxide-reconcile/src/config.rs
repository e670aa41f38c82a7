//! Reconciliation settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default path of the forward migration artifact.
pub const DEFAULT_FORWARD_ARTIFACT: &str = "schema_migration.sql";

/// Default path of the rollback artifact.
pub const DEFAULT_ROLLBACK_ARTIFACT: &str = "schema_rollback.sql";

/// How generated operations reach the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationMode {
    /// Execute every operation immediately, best-effort.
    #[default]
    Auto,
    /// Write operations to the forward artifact; apply it on the next start.
    File,
}

/// Settings for a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Application mode.
    pub mode: MigrationMode,
    /// Skip `CREATE TABLE` for tables that already exist instead of relying
    /// on `IF NOT EXISTS`.
    pub check_tables_exist: bool,
    /// Forward migration artifact, relative to the working directory.
    pub forward_artifact: PathBuf,
    /// Rollback artifact, relative to the working directory.
    pub rollback_artifact: PathBuf,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            mode: MigrationMode::Auto,
            check_tables_exist: false,
            forward_artifact: PathBuf::from(DEFAULT_FORWARD_ARTIFACT),
            rollback_artifact: PathBuf::from(DEFAULT_ROLLBACK_ARTIFACT),
        }
    }
}

impl ReconcileConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application mode.
    #[must_use]
    pub fn mode(mut self, mode: MigrationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enables the existing-table check.
    #[must_use]
    pub fn check_tables_exist(mut self, enabled: bool) -> Self {
        self.check_tables_exist = enabled;
        self
    }

    /// Places both artifacts in `dir`, keeping their file names.
    #[must_use]
    pub fn artifact_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.forward_artifact = dir.join(DEFAULT_FORWARD_ARTIFACT);
        self.rollback_artifact = dir.join(DEFAULT_ROLLBACK_ARTIFACT);
        self
    }

    /// Sets the forward artifact path.
    #[must_use]
    pub fn forward_artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.forward_artifact = path.into();
        self
    }

    /// Sets the rollback artifact path.
    #[must_use]
    pub fn rollback_artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.rollback_artifact = path.into();
        self
    }

    /// Parses a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is malformed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ReconcileConfig::default();
        assert_eq!(config.mode, MigrationMode::Auto);
        assert!(!config.check_tables_exist);
        assert_eq!(config.forward_artifact, PathBuf::from("schema_migration.sql"));
        assert_eq!(config.rollback_artifact, PathBuf::from("schema_rollback.sql"));
    }

    #[test]
    fn test_from_json_with_partial_fields() {
        let config = ReconcileConfig::from_json_str(r#"{"mode": "file"}"#).unwrap();
        assert_eq!(config.mode, MigrationMode::File);
        assert!(!config.check_tables_exist);
        assert_eq!(config.forward_artifact, PathBuf::from(DEFAULT_FORWARD_ARTIFACT));
    }

    #[test]
    fn test_from_json_rejects_unknown_mode() {
        assert!(ReconcileConfig::from_json_str(r#"{"mode": "manual"}"#).is_err());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"mode": "auto", "check_tables_exist": true, "rollback_artifact": "undo.sql"}}"#
        )
        .unwrap();

        let config = ReconcileConfig::from_json_file(file.path()).unwrap();
        assert!(config.check_tables_exist);
        assert_eq!(config.rollback_artifact, PathBuf::from("undo.sql"));
    }

    #[test]
    fn test_artifact_dir() {
        let config = ReconcileConfig::new().artifact_dir("/tmp/app");
        assert_eq!(
            config.forward_artifact,
            PathBuf::from("/tmp/app/schema_migration.sql")
        );
        assert_eq!(
            config.rollback_artifact,
            PathBuf::from("/tmp/app/schema_rollback.sql")
        );
    }
}
