use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub crm: CrmConfig,
    pub email: EmailConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub base_url: String,
    pub access_token: SecretString,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub provider: EmailProviderKind,
    pub api_key: SecretString,
    pub from_email: String,
    pub default_recipient: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailProviderKind {
    Resend,
    Sendgrid,
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
    pub crm_base_url: Option<String>,
    pub crm_access_token: Option<String>,
    pub email_provider: Option<EmailProviderKind>,
    pub email_api_key: Option<String>,
    pub email_from_email: Option<String>,
    pub email_default_recipient: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub log_level: Option<String>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            crm: CrmConfig {
                base_url: "https://api.hubapi.com".to_string(),
                access_token: String::new().into(),
                timeout_secs: 30,
            },
            email: EmailConfig {
                provider: EmailProviderKind::Resend,
                api_key: String::new().into(),
                from_email: String::new(),
                default_recipient: None,
                base_url: None,
            },
            llm: LlmConfig {
                api_key: String::new().into(),
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for EmailProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "resend" => Ok(Self::Resend),
            "sendgrid" => Ok(Self::Sendgrid),
            other => Err(ConfigError::Validation(format!(
                "unsupported email provider `{other}` (expected resend|sendgrid)"
            ))),
        }
    }
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("dealflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(crm) = patch.crm {
            if let Some(base_url) = crm.base_url {
                self.crm.base_url = base_url;
            }
            if let Some(access_token_value) = crm.access_token {
                self.crm.access_token = secret_value(access_token_value);
            }
            if let Some(timeout_secs) = crm.timeout_secs {
                self.crm.timeout_secs = timeout_secs;
            }
        }

        if let Some(email) = patch.email {
            if let Some(provider) = email.provider {
                self.email.provider = provider;
            }
            if let Some(api_key_value) = email.api_key {
                self.email.api_key = secret_value(api_key_value);
            }
            if let Some(from_email) = email.from_email {
                self.email.from_email = from_email;
            }
            if let Some(default_recipient) = email.default_recipient {
                self.email.default_recipient = Some(default_recipient);
            }
            if let Some(base_url) = email.base_url {
                self.email.base_url = Some(base_url);
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key_value) = llm.api_key {
                self.llm.api_key = secret_value(api_key_value);
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
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
        if let Some(value) = read_env("DEALFLOW_CRM_BASE_URL") {
            self.crm.base_url = value;
        }
        if let Some(value) = read_env("DEALFLOW_CRM_ACCESS_TOKEN") {
            self.crm.access_token = secret_value(value);
        }
        if let Some(value) = read_env("DEALFLOW_CRM_TIMEOUT_SECS") {
            self.crm.timeout_secs = parse_u64("DEALFLOW_CRM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DEALFLOW_EMAIL_PROVIDER") {
            self.email.provider = value.parse()?;
        }
        if let Some(value) = read_env("DEALFLOW_EMAIL_API_KEY") {
            self.email.api_key = secret_value(value);
        }
        if let Some(value) = read_env("DEALFLOW_EMAIL_FROM_EMAIL") {
            self.email.from_email = value;
        }
        if let Some(value) = read_env("DEALFLOW_EMAIL_DEFAULT_RECIPIENT") {
            self.email.default_recipient = Some(value);
        }
        if let Some(value) = read_env("DEALFLOW_EMAIL_BASE_URL") {
            self.email.base_url = Some(value);
        }

        if let Some(value) = read_env("DEALFLOW_LLM_API_KEY") {
            self.llm.api_key = secret_value(value);
        }
        if let Some(value) = read_env("DEALFLOW_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("DEALFLOW_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("DEALFLOW_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("DEALFLOW_LLM_TIMEOUT_SECS", &value)?;
        }

        let log_level =
            read_env("DEALFLOW_LOGGING_LEVEL").or_else(|| read_env("DEALFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DEALFLOW_LOGGING_FORMAT").or_else(|| read_env("DEALFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(crm_base_url) = overrides.crm_base_url {
            self.crm.base_url = crm_base_url;
        }
        if let Some(crm_access_token) = overrides.crm_access_token {
            self.crm.access_token = secret_value(crm_access_token);
        }
        if let Some(email_provider) = overrides.email_provider {
            self.email.provider = email_provider;
        }
        if let Some(email_api_key) = overrides.email_api_key {
            self.email.api_key = secret_value(email_api_key);
        }
        if let Some(email_from_email) = overrides.email_from_email {
            self.email.from_email = email_from_email;
        }
        if let Some(email_default_recipient) = overrides.email_default_recipient {
            self.email.default_recipient = Some(email_default_recipient);
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = secret_value(llm_api_key);
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_crm(&self.crm)?;
        validate_email(&self.email)?;
        validate_llm(&self.llm)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("dealflow.toml"), PathBuf::from("config/dealflow.toml")]
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

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    if !crm.base_url.starts_with("http://") && !crm.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "crm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if crm.access_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "crm.access_token is required. Create a private app access token in your CRM portal"
                .to_string(),
        ));
    }

    if crm.timeout_secs == 0 || crm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "crm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_email(email: &EmailConfig) -> Result<(), ConfigError> {
    if email.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "email.api_key is required for the configured provider".to_string(),
        ));
    }

    if !email.from_email.contains('@') {
        return Err(ConfigError::Validation(
            "email.from_email must be a valid sender address".to_string(),
        ));
    }

    if let Some(recipient) = &email.default_recipient {
        if !recipient.contains('@') {
            return Err(ConfigError::Validation(
                "email.default_recipient must be a valid address when set".to_string(),
            ));
        }
    }

    if let Some(base_url) = &email.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "email.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation("llm.api_key is required".to_string()));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
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

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    crm: Option<CrmPatch>,
    email: Option<EmailPatch>,
    llm: Option<LlmPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    base_url: Option<String>,
    access_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EmailPatch {
    provider: Option<EmailProviderKind>,
    api_key: Option<String>,
    from_email: Option<String>,
    default_recipient: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
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
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, EmailProviderKind, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

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

    fn required_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DEALFLOW_CRM_ACCESS_TOKEN", "pat-test-token"),
            ("DEALFLOW_EMAIL_API_KEY", "re_test_key"),
            ("DEALFLOW_EMAIL_FROM_EMAIL", "bot@example.com"),
            ("DEALFLOW_LLM_API_KEY", "sk-test-key"),
        ]
    }

    fn set_required_env() {
        for (key, value) in required_env() {
            env::set_var(key, value);
        }
    }

    fn clear_required_env() {
        clear_vars(&required_env().iter().map(|(key, _)| *key).collect::<Vec<_>>());
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_env();
        env::set_var("TEST_CRM_TOKEN", "pat-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("dealflow.toml");
            fs::write(
                &path,
                r#"
[crm]
access_token = "${TEST_CRM_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            // Env overrides win over the file, so drop the env token to watch
            // the interpolated file value survive.
            env::remove_var("DEALFLOW_CRM_ACCESS_TOKEN");

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.crm.access_token.expose_secret() == "pat-from-env",
                "crm token should be interpolated from the environment",
            )?;
            Ok(())
        })();

        clear_required_env();
        clear_vars(&["TEST_CRM_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_env();
        env::set_var("DEALFLOW_LOG_LEVEL", "warn");
        env::set_var("DEALFLOW_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warn log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_required_env();
        clear_vars(&["DEALFLOW_LOG_LEVEL", "DEALFLOW_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_env();
        env::set_var("DEALFLOW_LLM_MODEL", "model-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("dealflow.toml");
            fs::write(
                &path,
                r#"
[llm]
model = "model-from-file"

[email]
provider = "sendgrid"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.model == "model-from-env", "env llm model should win over file")?;
            ensure(config.logging.level == "debug", "override log level should win over file")?;
            ensure(
                matches!(config.email.provider, EmailProviderKind::Sendgrid),
                "file email provider should win over defaults",
            )?;
            Ok(())
        })();

        clear_required_env();
        clear_vars(&["DEALFLOW_LLM_MODEL"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_env();
        env::remove_var("DEALFLOW_CRM_ACCESS_TOKEN");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("crm.access_token")
            );
            ensure(has_message, "validation failure should mention crm.access_token")
        })();

        clear_required_env();
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_env();
        env::set_var("DEALFLOW_CRM_ACCESS_TOKEN", "pat-secret-value");
        env::set_var("DEALFLOW_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("pat-secret-value"),
                "debug output should not contain the crm token",
            )?;
            ensure(
                !debug.contains("sk-secret-value"),
                "debug output should not contain the llm key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_required_env();
        result
    }

    #[test]
    fn missing_required_file_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_env();

        let result = (|| -> Result<(), String> {
            let missing = std::path::PathBuf::from("/nonexistent/dealflow.toml");
            let error = match AppConfig::load(LoadOptions {
                config_path: Some(missing.clone()),
                require_file: true,
                ..LoadOptions::default()
            }) {
                Ok(_) => return Err("expected missing-file failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::MissingConfigFile(ref path) if *path == missing),
                "missing config file error should carry the expected path",
            )
        })();

        clear_required_env();
        result
    }
}
