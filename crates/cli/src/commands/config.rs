use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use leaveflow_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let signing_secret = redact_secret(config.signing.secret.expose_secret());
    let fields: [(&str, String, &str); 9] = [
        ("database.url", config.database.url.clone(), "LEAVEFLOW_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "LEAVEFLOW_DATABASE_MAX_CONNECTIONS",
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "LEAVEFLOW_DATABASE_TIMEOUT_SECS",
        ),
        (
            "quota.default_annual_days",
            config.quota.default_annual_days.to_string(),
            "LEAVEFLOW_QUOTA_DEFAULT_ANNUAL_DAYS",
        ),
        (
            "workflow.top_level_role_markers",
            config.workflow.top_level_role_markers.join(","),
            "LEAVEFLOW_WORKFLOW_TOP_LEVEL_ROLE_MARKERS",
        ),
        ("signing.secret", signing_secret, "LEAVEFLOW_SIGNING_SECRET"),
        (
            "documents.output_dir",
            config.documents.output_dir.display().to_string(),
            "LEAVEFLOW_DOCUMENTS_OUTPUT_DIR",
        ),
        ("logging.level", config.logging.level.clone(), "LEAVEFLOW_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "LEAVEFLOW_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in &fields {
        let source = field_source(
            key,
            Some(*env_key),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(key, value, source));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("leaveflow.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/leaveflow.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &str) -> String {
    if secret.trim().is_empty() {
        return "<empty>".to_string();
    }
    format!("<redacted, {} chars>", secret.chars().count())
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_secret};

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc: toml::Value =
            "[signing]\nsecret = \"x\"\n[quota]\n".parse().expect("valid toml");

        assert!(contains_path(&doc, "signing.secret"));
        assert!(contains_path(&doc, "quota"));
        assert!(!contains_path(&doc, "quota.default_annual_days"));
    }

    #[test]
    fn secrets_never_render_verbatim() {
        assert_eq!(redact_secret("  "), "<empty>");
        assert_eq!(redact_secret("sixteen-char-key"), "<redacted, 16 chars>");
    }
}
