//! Client configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! auth_api_url = "https://auth.example.com"
//! core_api_url = "https://api.example.com"
//! refresh_interval_secs = 20
//! request_timeout_secs = 15
//! session_file = "dmp-session.json"
//!
//! [wallet]
//! rpc_url = "https://sepolia.base.org"
//! private_key = "$DMP_WALLET_KEY"
//! receipt_timeout_secs = 60
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to configuration file (default: `dmp.toml`)
//! - `DMP_AUTH_API_URL` - Override the auth API base URL
//! - `DMP_CORE_API_URL` - Override the core API base URL
//! - Wallet keys referenced by `$VAR` in the config file

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the auth API (default: `http://localhost:8081`).
    #[serde(default = "default_auth_api_url")]
    pub auth_api_url: String,

    /// Base URL of the core API (default: `http://localhost:8080`).
    #[serde(default = "default_core_api_url")]
    pub core_api_url: String,

    /// Seconds between access token refreshes (default: `20`).
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Per-request timeout in seconds. No timeout when absent.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Where the credential pair is persisted (default: `dmp-session.json`).
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,

    /// Wallet used to pay for products. Paying is refused when absent.
    #[serde(default)]
    pub wallet: Option<WalletConfig>,
}

/// Local-key wallet configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// HTTP RPC endpoint URL.
    pub rpc_url: String,

    /// Private key of the paying account (hex, with or without `0x` prefix).
    /// Supports `$VAR` / `${VAR}` for environment variable expansion.
    pub private_key: String,

    /// Seconds to wait for a payment receipt.
    #[serde(default)]
    pub receipt_timeout_secs: Option<u64>,
}

fn default_auth_api_url() -> String {
    "http://localhost:8081".to_owned()
}

fn default_core_api_url() -> String {
    "http://localhost:8080".to_owned()
}

const fn default_refresh_interval_secs() -> u64 {
    20
}

fn default_session_file() -> PathBuf {
    PathBuf::from("dmp-session.json")
}

impl ClientConfig {
    /// Loads configuration from the path given by the `CONFIG` environment
    /// variable, falling back to `dmp.toml` in the current directory.
    ///
    /// After loading, all string values with `$VAR` / `${VAR}` references
    /// are expanded from the process environment. `DMP_AUTH_API_URL` and
    /// `DMP_CORE_API_URL` override the file values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "dmp.toml".to_owned());
        let mut config = Self::load_from(&path)?;

        if let Ok(url) = std::env::var("DMP_AUTH_API_URL") {
            config.auth_api_url = url;
        }
        if let Ok(url) = std::env::var("DMP_CORE_API_URL") {
            config.core_api_url = url;
        }

        Ok(config)
    }

    /// Loads configuration from a specific file path, without env overrides.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let content = if path.exists() {
            std::fs::read_to_string(path)?
        } else {
            String::new()
        };

        let expanded = expand_env_vars(&content);
        Ok(toml::from_str(&expanded)?)
    }

    /// The keeper period.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// The per-request timeout, if configured.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Expands `$VAR` and `${VAR}` patterns in a string from environment variables.
///
/// Unresolved variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }

        let mut var_name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                closed = true;
                break;
            }
            if !braced && !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            var_name.push(c);
            chars.next();
        }

        match std::env::var(&var_name) {
            Ok(val) if !var_name.is_empty() => result.push_str(&val),
            _ => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&var_name);
                if closed {
                    result.push('}');
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        let dir = env!("CARGO_MANIFEST_DIR");
        assert_eq!(expand_env_vars("a=$CARGO_MANIFEST_DIR/x"), format!("a={dir}/x"));
        assert_eq!(expand_env_vars("${CARGO_MANIFEST_DIR}"), dir);
        assert_eq!(expand_env_vars("$DMP_SURELY_UNSET_VAR"), "$DMP_SURELY_UNSET_VAR");
        assert_eq!(expand_env_vars("${DMP_SURELY_UNSET_VAR}"), "${DMP_SURELY_UNSET_VAR}");
        assert_eq!(expand_env_vars("cost: $ 5"), "cost: $ 5");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ClientConfig::load_from("/nonexistent/dmp.toml").unwrap();

        assert_eq!(config.auth_api_url, "http://localhost:8081");
        assert_eq!(config.refresh_interval(), Duration::from_secs(20));
        assert_eq!(config.request_timeout(), None);
        assert!(config.wallet.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("dmp-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
core_api_url = "https://api.example.com"
request_timeout_secs = 15

[wallet]
rpc_url = "http://127.0.0.1:8545"
private_key = "$DMP_SURELY_UNSET_VAR"
"#,
        )
        .unwrap();

        let config = ClientConfig::load_from(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.core_api_url, "https://api.example.com");
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(15)));
        let wallet = config.wallet.unwrap();
        assert_eq!(wallet.private_key, "$DMP_SURELY_UNSET_VAR");
        assert_eq!(wallet.receipt_timeout_secs, None);
    }
}
