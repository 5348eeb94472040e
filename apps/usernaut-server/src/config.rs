//! Application configuration loading.
//!
//! One YAML file per environment (`config/<APP_ENV>.yaml`), with two
//! layers of indirection applied before deserialization:
//!
//! - `${VAR}` substitution across the raw file text
//! - secret resolution on string values: `env|NAME` reads the
//!   environment, `file|/path` reads a file (trailing newline trimmed)
//!
//! Missing required values fail fast at startup.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use usernaut_cache::{CacheDriver, RedisConfig};
use usernaut_connector::{BackendSettings, HttpClientConfig};
use usernaut_ldap::LdapSettings;
use usernaut_reconciler::PatternRule;

/// Error loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("failed to read secret file '{path}': {source}")]
    SecretFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid duration '{0}', expected forms like '24h', '30m', '90s'")]
    InvalidDuration(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root application configuration.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    pub ldap: LdapSettings,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub backends: Vec<BackendSettings>,
    /// Transformer rules per backend type, plus a `default` list.
    #[serde(default)]
    pub pattern: HashMap<String, Vec<PatternRule>>,
    #[serde(default, rename = "httpClient")]
    pub http_client: HttpClientConfig,
    #[serde(default, rename = "apiServer")]
    pub api_server: ApiServerSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// Duration syntax, e.g. "24h", "30m".
    pub usernaut_user_offboarding_job_interval: String,
    pub force_reconcile_label: Option<String>,
    /// How often every Group is re-enqueued without resource events.
    pub resync_interval: String,
    pub reconcile_workers: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "usernaut".to_string(),
            usernaut_user_offboarding_job_interval: "24h".to_string(),
            force_reconcile_label: None,
            resync_interval: "10h".to_string(),
            reconcile_workers: 4,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub driver: CacheDriver,
    pub redis: RedisConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiServerSection {
    pub listen: String,
    pub health_listen: String,
    pub basic_auth: Option<BasicAuthSection>,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ApiServerSection {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            health_listen: "0.0.0.0:8081".to_string(),
            basic_auth: None,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BasicAuthSection {
    pub username: String,
    pub password: String,
}

impl AppConfig {
    /// Resolve the config path from `APP_ENV` (default `development`).
    #[must_use]
    pub fn config_path() -> String {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        format!("config/{env}.yaml")
    }

    /// The namespace whose Group resources are watched.
    #[must_use]
    pub fn watched_namespace() -> String {
        std::env::var("WATCHED_NAMESPACE").unwrap_or_else(|_| "usernaut".to_string())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Read {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let substituted = substitute_env_vars(raw)?;
        let mut value: serde_yaml::Value = serde_yaml::from_str(&substituted)?;
        resolve_secrets(&mut value)?;
        let config: AppConfig = serde_yaml::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for backend in &self.backends {
            if backend.enabled && backend.connection.base_url.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "enabled backend '{}' is missing connection.base_url",
                    backend.backend_key()
                )));
            }
        }
        Ok(())
    }

    pub fn offboarding_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.app.usernaut_user_offboarding_job_interval)
    }

    pub fn resync_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.app.resync_interval)
    }
}

/// Replace `${VAR}` references with environment values. An unset
/// variable is a startup error, not an empty string.
fn substitute_env_vars(raw: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let name = &after[..end];
        let value =
            std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Walk the YAML tree resolving `env|NAME` and `file|/path` string
/// values in place.
fn resolve_secrets(value: &mut serde_yaml::Value) -> Result<(), ConfigError> {
    match value {
        serde_yaml::Value::String(s) => {
            if let Some(name) = s.strip_prefix("env|") {
                *s = std::env::var(name)
                    .map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
            } else if let Some(path) = s.strip_prefix("file|") {
                let contents =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::SecretFile {
                        path: path.to_string(),
                        source,
                    })?;
                *s = contents.trim_end_matches('\n').to_string();
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for item in seq {
                resolve_secrets(item)?;
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                resolve_secrets(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Parse durations in the `90s` / `30m` / `24h` / `1h30m` style.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ConfigError::InvalidDuration(input.to_string()));
    }

    let mut total = Duration::ZERO;
    let mut number = String::new();
    let mut matched_any = false;

    for ch in input.chars() {
        if ch.is_ascii_digit() {
            number.push(ch);
            continue;
        }
        let value: u64 = number
            .parse()
            .map_err(|_| ConfigError::InvalidDuration(input.to_string()))?;
        number.clear();
        let unit = match ch {
            's' => Duration::from_secs(value),
            'm' => Duration::from_secs(value * 60),
            'h' => Duration::from_secs(value * 3600),
            _ => return Err(ConfigError::InvalidDuration(input.to_string())),
        };
        total += unit;
        matched_any = true;
    }

    if !number.is_empty() || !matched_any {
        return Err(ConfigError::InvalidDuration(input.to_string()));
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
ldap:
  server: ldaps://ldap.corp.example.com
  baseDN: dc=example,dc=com
  userDN: uid={uid},ou=users,dc=example,dc=com
  baseUserDN: ou=users,dc=example,dc=com
  userSearchFilter: objectClass=person
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.app.name, "usernaut");
        assert_eq!(config.app.usernaut_user_offboarding_job_interval, "24h");
        assert!(config.backends.is_empty());
        assert_eq!(config.offboarding_interval().unwrap(), Duration::from_secs(86400));
    }

    #[test]
    fn test_full_config_with_backends_and_patterns() {
        let yaml = r#"
app:
  name: usernaut
  usernaut_user_offboarding_job_interval: 12h

ldap:
  server: ldaps://ldap.corp.example.com
  baseDN: dc=example,dc=com
  userDN: uid={uid},ou=users,dc=example,dc=com
  baseUserDN: ou=users,dc=example,dc=com
  userSearchFilter: objectClass=person

cache:
  driver: memory

backends:
  - name: ftA
    type: fivetran
    enabled: true
    connection:
      base_url: https://api.fivetran.com
      auth:
        method: basic
        username: key
        password: secret
  - name: git-main
    type: gitlab
    enabled: true
    depends_on:
      name: rover-main
      type: rover
    connection:
      base_url: https://gitlab.example.com
      params:
        parent_group_id: "42"

pattern:
  fivetran:
    - input: "^dataverse-(.*)$"
      output: "dv_$1"
  default:
    - input: "^(.*)$"
      output: "$1"

apiServer:
  listen: 0.0.0.0:9000
  basic_auth:
    username: usernaut
    password: hunter2
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[1].backend_key(), "git-main_gitlab");
        assert_eq!(
            config.backends[1].depends_on.as_ref().unwrap().backend_key(),
            "rover-main_rover"
        );
        assert_eq!(config.pattern["fivetran"].len(), 1);
        assert_eq!(config.api_server.listen, "0.0.0.0:9000");
        assert_eq!(config.offboarding_interval().unwrap(), Duration::from_secs(12 * 3600));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("USERNAUT_TEST_LDAP", "ldaps://from-env.example.com");
        let yaml = r#"
ldap:
  server: ${USERNAUT_TEST_LDAP}
  baseDN: dc=example,dc=com
  userDN: uid={uid},ou=users,dc=example,dc=com
  baseUserDN: ou=users,dc=example,dc=com
  userSearchFilter: objectClass=person
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.ldap.server, "ldaps://from-env.example.com");
    }

    #[test]
    fn test_missing_env_var_fails() {
        let yaml = r#"
ldap:
  server: ${USERNAUT_TEST_DEFINITELY_UNSET}
  baseDN: dc=example,dc=com
  userDN: uid={uid},ou=users,dc=example,dc=com
  baseUserDN: ou=users,dc=example,dc=com
  userSearchFilter: objectClass=person
"#;
        assert!(matches!(
            AppConfig::from_yaml(yaml),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn test_env_secret_resolution() {
        std::env::set_var("USERNAUT_TEST_TOKEN", "sekrit");
        let yaml = r#"
ldap:
  server: ldaps://ldap.example.com
  baseDN: dc=example,dc=com
  userDN: uid={uid},ou=users,dc=example,dc=com
  baseUserDN: ou=users,dc=example,dc=com
  userSearchFilter: objectClass=person

backends:
  - name: wh
    type: snowflake
    enabled: true
    connection:
      base_url: https://account.snowflakecomputing.com
      auth:
        method: bearer
        token: env|USERNAUT_TEST_TOKEN
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        match &config.backends[0].connection.auth {
            usernaut_connector::AuthConfig::Bearer { token } => assert_eq!(token, "sekrit"),
            other => panic!("expected bearer auth, got {other:?}"),
        }
    }

    #[test]
    fn test_file_secret_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("token");
        std::fs::write(&secret_path, "from-file\n").unwrap();

        let yaml = format!(
            r#"
ldap:
  server: ldaps://ldap.example.com
  baseDN: dc=example,dc=com
  userDN: uid={{uid}},ou=users,dc=example,dc=com
  baseUserDN: ou=users,dc=example,dc=com
  userSearchFilter: objectClass=person

backends:
  - name: wh
    type: snowflake
    enabled: true
    connection:
      base_url: https://account.snowflakecomputing.com
      auth:
        method: bearer
        token: file|{}
"#,
            secret_path.display()
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        match &config.backends[0].connection.auth {
            usernaut_connector::AuthConfig::Bearer { token } => assert_eq!(token, "from-file"),
            other => panic!("expected bearer auth, got {other:?}"),
        }
    }

    #[test]
    fn test_enabled_backend_without_base_url_fails_fast() {
        let yaml = r#"
ldap:
  server: ldaps://ldap.example.com
  baseDN: dc=example,dc=com
  userDN: uid={uid},ou=users,dc=example,dc=com
  baseUserDN: ou=users,dc=example,dc=com
  userSearchFilter: objectClass=person

backends:
  - name: broken
    type: fivetran
    enabled: true
"#;
        assert!(matches!(
            AppConfig::from_yaml(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
    }
}
