use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::approvals::RoleClassifier;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub quota: QuotaConfig,
    pub workflow: WorkflowConfig,
    pub signing: SigningConfig,
    pub documents: DocumentsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct QuotaConfig {
    /// Seed for a new ledger entry when the year has no allotment row.
    pub default_annual_days: u32,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub top_level_role_markers: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct SigningConfig {
    pub secret: SecretString,
}

#[derive(Clone, Debug)]
pub struct DocumentsConfig {
    pub output_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub default_annual_days: Option<u32>,
    pub signing_secret: Option<String>,
    pub documents_output_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

const MIN_SIGNING_SECRET_LEN: usize = 16;

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://leaveflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            quota: QuotaConfig { default_annual_days: 12 },
            workflow: WorkflowConfig {
                top_level_role_markers: vec!["director".to_string(), "direktur".to_string()],
            },
            signing: SigningConfig { secret: String::new().into() },
            documents: DocumentsConfig { output_dir: PathBuf::from("documents") },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("leaveflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn role_classifier(&self) -> RoleClassifier {
        RoleClassifier::new(self.workflow.top_level_role_markers.iter().cloned())
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(quota) = patch.quota {
            if let Some(default_annual_days) = quota.default_annual_days {
                self.quota.default_annual_days = default_annual_days;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(markers) = workflow.top_level_role_markers {
                self.workflow.top_level_role_markers = markers;
            }
        }

        if let Some(signing) = patch.signing {
            if let Some(secret) = signing.secret {
                self.signing.secret = secret_value(secret);
            }
        }

        if let Some(documents) = patch.documents {
            if let Some(output_dir) = documents.output_dir {
                self.documents.output_dir = output_dir;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LEAVEFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("LEAVEFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("LEAVEFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LEAVEFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("LEAVEFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEAVEFLOW_QUOTA_DEFAULT_ANNUAL_DAYS") {
            self.quota.default_annual_days =
                parse_u32("LEAVEFLOW_QUOTA_DEFAULT_ANNUAL_DAYS", &value)?;
        }

        if let Some(value) = read_env("LEAVEFLOW_WORKFLOW_TOP_LEVEL_ROLE_MARKERS") {
            self.workflow.top_level_role_markers = value
                .split(',')
                .map(str::trim)
                .filter(|marker| !marker.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(value) = read_env("LEAVEFLOW_SIGNING_SECRET") {
            self.signing.secret = secret_value(value);
        }

        if let Some(value) = read_env("LEAVEFLOW_DOCUMENTS_OUTPUT_DIR") {
            self.documents.output_dir = PathBuf::from(value);
        }

        let log_level =
            read_env("LEAVEFLOW_LOGGING_LEVEL").or_else(|| read_env("LEAVEFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEAVEFLOW_LOGGING_FORMAT").or_else(|| read_env("LEAVEFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(default_annual_days) = overrides.default_annual_days {
            self.quota.default_annual_days = default_annual_days;
        }
        if let Some(signing_secret) = overrides.signing_secret {
            self.signing.secret = secret_value(signing_secret);
        }
        if let Some(output_dir) = overrides.documents_output_dir {
            self.documents.output_dir = output_dir;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_quota(&self.quota)?;
        validate_workflow(&self.workflow)?;
        validate_signing(&self.signing)?;
        validate_documents(&self.documents)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("leaveflow.toml"), PathBuf::from("config/leaveflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_quota(quota: &QuotaConfig) -> Result<(), ConfigError> {
    if quota.default_annual_days > 366 {
        return Err(ConfigError::Validation(
            "quota.default_annual_days must be in range 0..=366".to_string(),
        ));
    }
    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.top_level_role_markers.iter().all(|marker| marker.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "workflow.top_level_role_markers must contain at least one non-empty marker"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_signing(signing: &SigningConfig) -> Result<(), ConfigError> {
    let secret = signing.secret.expose_secret();
    if secret.trim().is_empty() {
        return Err(ConfigError::Validation(
            "signing.secret is required. Set it in leaveflow.toml or LEAVEFLOW_SIGNING_SECRET"
                .to_string(),
        ));
    }
    if secret.len() < MIN_SIGNING_SECRET_LEN {
        return Err(ConfigError::Validation(format!(
            "signing.secret must be at least {MIN_SIGNING_SECRET_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_documents(documents: &DocumentsConfig) -> Result<(), ConfigError> {
    if documents.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("documents.output_dir must not be empty".to_string()));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    quota: Option<QuotaPatch>,
    workflow: Option<WorkflowPatch>,
    signing: Option<SigningPatch>,
    documents: Option<DocumentsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct QuotaPatch {
    default_annual_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    top_level_role_markers: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct SigningPatch {
    secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DocumentsPatch {
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const SECRET: &str = "test-signing-secret-value";

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_LEAVEFLOW_SECRET", SECRET);

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leaveflow.toml");
            fs::write(
                &path,
                r#"
[signing]
secret = "${TEST_LEAVEFLOW_SECRET}"

[quota]
default_annual_days = 15

[workflow]
top_level_role_markers = ["chief", "direktur"]
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.signing.secret.expose_secret() == SECRET,
                "signing secret should be interpolated from environment",
            )?;
            ensure(config.quota.default_annual_days == 15, "file should set annual days")?;
            ensure(
                config.role_classifier().is_top_level("Chief Operating Officer"),
                "file markers should drive role classification",
            )?;
            ensure(
                !config.role_classifier().is_top_level("Finance Director"),
                "file markers replace the defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_LEAVEFLOW_SECRET"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEAVEFLOW_SIGNING_SECRET", SECRET);
        env::set_var("LEAVEFLOW_LOG_LEVEL", "warn");
        env::set_var("LEAVEFLOW_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["LEAVEFLOW_SIGNING_SECRET", "LEAVEFLOW_LOG_LEVEL", "LEAVEFLOW_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEAVEFLOW_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("LEAVEFLOW_SIGNING_SECRET", "env-signing-secret-value");
        env::set_var("LEAVEFLOW_QUOTA_DEFAULT_ANNUAL_DAYS", "14");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leaveflow.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[signing]
secret = "file-signing-secret-value"

[quota]
default_annual_days = 10

[documents]
output_dir = "from-file-docs"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.signing.secret.expose_secret() == "env-signing-secret-value",
                "env secret should win over file and defaults",
            )?;
            ensure(config.quota.default_annual_days == 14, "env annual days should win over file")?;
            ensure(
                config.documents.output_dir == PathBuf::from("from-file-docs"),
                "file output dir should win over defaults",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "LEAVEFLOW_DATABASE_URL",
            "LEAVEFLOW_SIGNING_SECRET",
            "LEAVEFLOW_QUOTA_DEFAULT_ANNUAL_DAYS",
        ]);
        result
    }

    #[test]
    fn env_markers_are_split_on_commas() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEAVEFLOW_SIGNING_SECRET", SECRET);
        env::set_var("LEAVEFLOW_WORKFLOW_TOP_LEVEL_ROLE_MARKERS", " president , ,kepala ");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(
                config.workflow.top_level_role_markers == vec!["president", "kepala"],
                "markers should be trimmed and empty entries dropped",
            )
        })();

        clear_vars(&["LEAVEFLOW_SIGNING_SECRET", "LEAVEFLOW_WORKFLOW_TOP_LEVEL_ROLE_MARKERS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEAVEFLOW_SIGNING_SECRET", "short");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("signing.secret")
            );
            ensure(has_message, "validation failure should mention signing.secret")
        })();

        clear_vars(&["LEAVEFLOW_SIGNING_SECRET"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEAVEFLOW_SIGNING_SECRET", SECRET);
        env::set_var("LEAVEFLOW_QUOTA_DEFAULT_ANNUAL_DAYS", "twelve");

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default()).err();
            ensure(
                matches!(
                    error,
                    Some(ConfigError::InvalidEnvOverride { ref key, .. })
                        if key == "LEAVEFLOW_QUOTA_DEFAULT_ANNUAL_DAYS"
                ),
                "non-numeric annual days should be rejected",
            )
        })();

        clear_vars(&["LEAVEFLOW_SIGNING_SECRET", "LEAVEFLOW_QUOTA_DEFAULT_ANNUAL_DAYS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEAVEFLOW_SIGNING_SECRET", "very-private-signing-key");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("very-private-signing-key"),
                "debug output should not contain the signing secret",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(config.quota.default_annual_days == 12, "default annual days should be 12")?;
            Ok(())
        })();

        clear_vars(&["LEAVEFLOW_SIGNING_SECRET"]);
        result
    }
}
