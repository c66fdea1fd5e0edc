//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is loaded from AZURE_CLIENT_SECRET or client_secret_file,
//! never stored in the TOML directly to avoid leaking secrets.

use common::SecretString;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub azure: AzureConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// App registration and Graph settings.
///
/// The camelCase aliases accept settings copied from an existing
/// `[azure]` section written for the Graph SDK samples.
#[derive(Debug, Deserialize)]
pub struct AzureConfig {
    #[serde(alias = "clientId")]
    pub client_id: String,
    #[serde(alias = "tenantId")]
    pub tenant_id: String,
    /// Space-separated, e.g. `"User.Read Mail.Read Mail.Send"`
    #[serde(alias = "graphUserScopes")]
    pub graph_user_scopes: String,
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,
    #[serde(default = "default_token_cache_path")]
    pub token_cache_path: PathBuf,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_device_code_timeout")]
    pub device_code_timeout_secs: u64,
    /// Path to a file containing the client secret (alternative to AZURE_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(skip)]
    pub client_secret: Option<SecretString>,
}

impl AzureConfig {
    pub fn scopes(&self) -> Vec<String> {
        self.graph_user_scopes
            .split_whitespace()
            .map(str::to_owned)
            .collect()
    }
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_authority_host() -> String {
    graph_auth::DEFAULT_AUTHORITY_HOST.to_string()
}

fn default_graph_base_url() -> String {
    graph_mail::DEFAULT_GRAPH_BASE_URL.to_string()
}

fn default_token_cache_path() -> PathBuf {
    PathBuf::from(graph_auth::DEFAULT_TOKEN_CACHE_FILE)
}

fn default_redirect_uri() -> String {
    "http://localhost:5000/getAToken".to_string()
}

fn default_device_code_timeout() -> u64 {
    graph_auth::DEFAULT_DEVICE_CODE_TIMEOUT.as_secs()
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn default_max_connections() -> usize {
    100
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. AZURE_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| common::Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        if let Ok(secret) = std::env::var("AZURE_CLIENT_SECRET") {
            config.azure.client_secret = SecretString::from_trimmed(&secret);
        } else if let Some(ref secret_file) = config.azure.client_secret_file {
            let secret =
                std::fs::read_to_string(secret_file).map_err(|source| common::Error::Read {
                    path: secret_file.clone(),
                    source,
                })?;
            config.azure.client_secret = SecretString::from_trimmed(&secret);
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        let azure = &self.azure;
        if azure.client_id.trim().is_empty() {
            return Err(common::Error::invalid("azure.client_id", "must not be empty"));
        }
        if azure.tenant_id.trim().is_empty() {
            return Err(common::Error::invalid("azure.tenant_id", "must not be empty"));
        }
        if azure.scopes().is_empty() {
            return Err(common::Error::invalid(
                "azure.graph_user_scopes",
                "must name at least one scope",
            ));
        }
        for (field, value) in [
            ("azure.authority_host", &azure.authority_host),
            ("azure.graph_base_url", &azure.graph_base_url),
            ("azure.redirect_uri", &azure.redirect_uri),
        ] {
            if !is_http_url(value) {
                return Err(common::Error::invalid(
                    field,
                    format_args!("must start with http:// or https://, got: {value}"),
                ));
            }
        }
        if azure.device_code_timeout_secs == 0 {
            return Err(common::Error::invalid(
                "azure.device_code_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::invalid(
                "server.max_connections",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("graph-mail-web.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn valid_toml() -> &'static str {
        r#"
[azure]
client_id = "11111111-2222-3333-4444-555555555555"
tenant_id = "common"
graph_user_scopes = "User.Read Mail.Read Mail.Send"

[server]
listen_addr = "127.0.0.1:8080"
"#
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_valid_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());
        unsafe { remove_env("AZURE_CLIENT_SECRET") };

        let config = Config::load(&path).unwrap();
        assert_eq!(config.azure.tenant_id, "common");
        assert_eq!(
            config.azure.scopes(),
            vec!["User.Read", "Mail.Read", "Mail.Send"]
        );
        assert_eq!(config.azure.authority_host, "https://login.microsoftonline.com");
        assert_eq!(config.azure.graph_base_url, "https://graph.microsoft.com/v1.0");
        assert_eq!(config.azure.token_cache_path, PathBuf::from("token_cache.json"));
        assert_eq!(config.azure.redirect_uri, "http://localhost:5000/getAToken");
        assert_eq!(config.azure.device_code_timeout_secs, 900);
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.server.max_connections, 100);
        assert!(config.azure.client_secret.is_none());
    }

    #[test]
    fn test_server_section_is_optional() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[azure]
client_id = "abc"
tenant_id = "contoso.onmicrosoft.com"
graph_user_scopes = "User.Read"
"#,
        );
        unsafe { remove_env("AZURE_CLIENT_SECRET") };

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:5000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_camel_case_keys_accepted() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[azure]
clientId = "abc"
tenantId = "common"
graphUserScopes = "User.Read Mail.Read"
"#,
        );
        unsafe { remove_env("AZURE_CLIENT_SECRET") };

        let config = Config::load(&path).unwrap();
        assert_eq!(config.azure.client_id, "abc");
        assert_eq!(config.azure.scopes().len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/path/config.toml")).unwrap_err();
        assert!(matches!(err, common::Error::Read { .. }), "got: {err:?}");
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(matches!(
            Config::load(&path).unwrap_err(),
            common::Error::Toml(_)
        ));
    }

    #[test]
    fn test_client_secret_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe { set_env("AZURE_CLIENT_SECRET", "env-secret-123") };
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.azure.client_secret.as_ref().unwrap().expose(),
            "env-secret-123"
        );
        unsafe { remove_env("AZURE_CLIENT_SECRET") };
    }

    #[test]
    fn test_client_secret_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("client_secret");
        std::fs::write(&secret_path, "file-secret-456\n").unwrap();
        let path = write_config(
            &dir,
            &format!(
                r#"
[azure]
client_id = "abc"
tenant_id = "common"
graph_user_scopes = "User.Read"
client_secret_file = "{}"
"#,
                secret_path.display()
            ),
        );

        unsafe { remove_env("AZURE_CLIENT_SECRET") };
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.azure.client_secret.as_ref().unwrap().expose(),
            "file-secret-456"
        );
    }

    #[test]
    fn test_client_secret_env_overrides_nonexistent_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[azure]
client_id = "abc"
tenant_id = "common"
graph_user_scopes = "User.Read"
client_secret_file = "/nonexistent/path/client_secret"
"#,
        );

        unsafe { set_env("AZURE_CLIENT_SECRET", "env-wins") };
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.azure.client_secret.as_ref().unwrap().expose(),
            "env-wins",
            "AZURE_CLIENT_SECRET must take precedence over client_secret_file"
        );
        unsafe { remove_env("AZURE_CLIENT_SECRET") };
    }

    #[test]
    fn test_client_secret_file_nonexistent_returns_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[azure]
client_id = "abc"
tenant_id = "common"
graph_user_scopes = "User.Read"
client_secret_file = "/nonexistent/path/client_secret"
"#,
        );

        unsafe { remove_env("AZURE_CLIENT_SECRET") };
        assert!(
            Config::load(&path).is_err(),
            "nonexistent client_secret_file must return an error"
        );
    }

    #[test]
    fn test_client_secret_file_whitespace_yields_none() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("client_secret");
        std::fs::write(&secret_path, "  \n  ").unwrap();
        let path = write_config(
            &dir,
            &format!(
                r#"
[azure]
client_id = "abc"
tenant_id = "common"
graph_user_scopes = "User.Read"
client_secret_file = "{}"
"#,
                secret_path.display()
            ),
        );

        unsafe { remove_env("AZURE_CLIENT_SECRET") };
        let config = Config::load(&path).unwrap();
        assert!(config.azure.client_secret.is_none());
    }

    #[test]
    fn test_empty_scopes_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[azure]
client_id = "abc"
tenant_id = "common"
graph_user_scopes = "   "
"#,
        );
        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("azure.graph_user_scopes"), "got: {err}");
    }

    #[test]
    fn test_empty_client_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[azure]
client_id = ""
tenant_id = "common"
graph_user_scopes = "User.Read"
"#,
        );
        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("azure.client_id"), "got: {err}");
    }

    #[test]
    fn test_invalid_graph_base_url_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[azure]
client_id = "abc"
tenant_id = "common"
graph_user_scopes = "User.Read"
graph_base_url = "graph.microsoft.com/v1.0"
"#,
        );
        let err = Config::load(&path).unwrap_err().to_string();
        assert!(
            err.contains("azure.graph_base_url must start with http"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn test_zero_device_code_timeout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[azure]
client_id = "abc"
tenant_id = "common"
graph_user_scopes = "User.Read"
device_code_timeout_secs = 0
"#,
        );
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_zero_max_connections_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[azure]
client_id = "abc"
tenant_id = "common"
graph_user_scopes = "User.Read"

[server]
max_connections = 0
"#,
        );
        assert!(Config::load(&path).is_err(), "max_connections = 0 must be rejected");
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("graph-mail-web.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }
}
