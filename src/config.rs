use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::field::DEFAULT_MAX_LENGTH;
use crate::transition_log::{ExtraLogAttribute, LogShape, SubjectKind};

/// Main configuration structure for workflow-field
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowFieldConfig {
    /// Structured logging settings
    pub observability: ObservabilityConfig,
    /// Transition log settings
    pub logging: TransitionLogConfig,
    /// State field storage settings
    pub field: FieldConfig,
    /// Database settings (optional)
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransitionLogConfig {
    /// Disable to skip writing transition logs altogether
    pub enabled: bool,
    /// append_only keeps every transition, latest_only one row per record
    pub shape: LogShape,
    /// direct (id only) or generic (model label + id) subject references
    pub subject: SubjectKind,
    /// Transition arguments copied into each log entry
    #[serde(default)]
    pub extra_attributes: Vec<ExtraLogAttribute>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldConfig {
    /// Minimum storage width for state names
    pub default_max_length: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for WorkflowFieldConfig {
    fn default() -> Self {
        Self {
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json: true,
            },
            logging: TransitionLogConfig {
                enabled: true,
                shape: LogShape::AppendOnly,
                subject: SubjectKind::Generic,
                extra_attributes: Vec::new(),
            },
            field: FieldConfig {
                default_max_length: DEFAULT_MAX_LENGTH,
            },
            database: Some(DatabaseConfig {
                url: "sqlite://.workflow-field/workflow-field.db".to_string(),
                max_connections: 10,
                auto_migrate: true,
            }),
        }
    }
}

impl WorkflowFieldConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (workflow-field.toml, .workflow-field-rc)
    /// 3. Environment variables (prefixed with WORKFLOW_FIELD_)
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&WorkflowFieldConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if Path::new("workflow-field.toml").exists() {
            builder = builder.add_source(File::with_name("workflow-field"));
        }

        if Path::new(".workflow-field-rc").exists() {
            builder = builder.add_source(File::new(".workflow-field-rc", config::FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("WORKFLOW_FIELD")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<WorkflowFieldConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = WorkflowFieldConfig::load_env_file();
        WorkflowFieldConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static WorkflowFieldConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_roundtrip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflow-field.toml");
        let config = WorkflowFieldConfig::default();
        config.save_to_file(&path).unwrap();

        let loaded: WorkflowFieldConfig = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.field.default_max_length, DEFAULT_MAX_LENGTH);
        assert_eq!(loaded.logging.shape, LogShape::AppendOnly);
        assert_eq!(loaded.logging.subject, SubjectKind::Generic);
        assert!(loaded.database.unwrap().auto_migrate);
    }

    #[test]
    fn test_latest_only_shape_from_toml() {
        let logging: TransitionLogConfig = toml::from_str(
            r#"
            enabled = true
            shape = "latest_only"
            subject = "direct"

            [[extra_attributes]]
            db_field = "comment"
            kwarg = "comment"
            default = ""
            "#,
        )
        .unwrap();
        assert_eq!(logging.shape, LogShape::LatestOnly);
        assert_eq!(logging.subject, SubjectKind::Direct);
        assert_eq!(logging.extra_attributes[0].db_field, "comment");
    }
}
