// ABOUTME: Credential configuration with flag, env, .env and TOML precedence.
// ABOUTME: The only place that reads the environment; signers get explicit values.

use crate::agent::SshAgentSigner;
use crate::error::{AuthError, Result};
use crate::key::KeyMaterial;
use crate::local::PrivateKeySigner;
use crate::signer::Signer;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One layer of credential settings; unset fields fall through to the next layer.
///
/// Also the shape of `~/.config/triton/auth.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthSettings {
    pub account: Option<String>,
    pub user: Option<String>,
    pub key_id: Option<String>,
    /// Private key file. When unset the SSH agent is used.
    pub key_material: Option<PathBuf>,
    pub agent_socket: Option<PathBuf>,
}

impl AuthSettings {
    /// Settings from process environment variables, then from a `.env` file
    /// in the working directory or one of its parents.
    ///
    /// `TRITON_*` names win over their legacy `SDC_*` equivalents. The
    /// process environment is never modified.
    pub fn from_env() -> Self {
        let dotenv = dotenvy::dotenv_iter()
            .map(dotenv_values)
            .unwrap_or_default();
        Self::from_lookup(|name| std::env::var(name).ok().or_else(|| dotenv.get(name).cloned()))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(name).filter(|v| !v.is_empty()))
        };

        Self {
            account: get(&["TRITON_ACCOUNT", "SDC_ACCOUNT"]),
            user: get(&["TRITON_USER", "SDC_USER"]),
            key_id: get(&["TRITON_KEY_ID", "SDC_KEY_ID"]),
            key_material: get(&["TRITON_KEY_MATERIAL"]).map(PathBuf::from),
            agent_socket: get(&["SSH_AUTH_SOCK"]).map(PathBuf::from),
        }
    }

    /// Settings from a TOML file.
    ///
    /// # Errors
    /// Returns `AuthError::Config` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AuthError::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| AuthError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Fill every unset field from `fallback`.
    pub fn or(self, fallback: AuthSettings) -> AuthSettings {
        AuthSettings {
            account: self.account.or(fallback.account),
            user: self.user.or(fallback.user),
            key_id: self.key_id.or(fallback.key_id),
            key_material: self.key_material.or(fallback.key_material),
            agent_socket: self.agent_socket.or(fallback.agent_socket),
        }
    }

    /// Check required fields and produce a usable configuration.
    ///
    /// # Errors
    /// Returns `AuthError::Config` if the account or key id is missing.
    pub fn resolve(self) -> Result<AuthConfig> {
        let account = self
            .account
            .ok_or_else(|| AuthError::Config("account is not set (TRITON_ACCOUNT)".to_string()))?;
        let key_id = self
            .key_id
            .ok_or_else(|| AuthError::Config("key id is not set (TRITON_KEY_ID)".to_string()))?;

        let key_source = match self.key_material {
            Some(path) => KeySource::File(path),
            None => KeySource::Agent(self.agent_socket),
        };

        Ok(AuthConfig {
            account,
            user: self.user,
            key_id,
            key_source,
        })
    }
}

fn dotenv_values<R: Read>(entries: dotenvy::Iter<R>) -> HashMap<String, String> {
    entries
        .filter_map(|entry| {
            entry
                .map_err(|e| debug!(error = %e, "skipping unreadable .env entry"))
                .ok()
        })
        .collect()
}

/// Where the signing key lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Private key file read into this process.
    File(PathBuf),
    /// SSH agent at the given socket, if one is configured.
    Agent(Option<PathBuf>),
}

/// Resolved credentials for signing requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub account: String,
    pub user: Option<String>,
    pub key_id: String,
    pub key_source: KeySource,
}

impl AuthConfig {
    /// Load configuration with precedence: overrides > env > .env > auth.toml.
    ///
    /// A missing or unparsable auth.toml is treated as empty.
    ///
    /// # Errors
    /// Returns `AuthError::Config` if required settings are missing.
    pub fn load(overrides: AuthSettings) -> Result<Self> {
        let file = default_config_path()
            .filter(|path| path.exists())
            .and_then(|path| match AuthSettings::from_file(&path) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    debug!(error = %e, "ignoring auth config file");
                    None
                }
            })
            .unwrap_or_default();

        overrides.or(AuthSettings::from_env()).or(file).resolve()
    }

    /// Construct the signer this configuration describes.
    ///
    /// # Errors
    /// Any construction error of [`PrivateKeySigner`] or [`SshAgentSigner`].
    pub fn build_signer(&self) -> Result<Box<dyn Signer>> {
        let user = self.user.as_deref();
        match &self.key_source {
            KeySource::File(path) => {
                let key = KeyMaterial::from_file(path)?;
                let signer =
                    PrivateKeySigner::from_key_material(&self.key_id, key, &self.account, user)?;
                Ok(Box::new(signer))
            }
            KeySource::Agent(socket) => {
                let signer =
                    SshAgentSigner::new(socket.as_deref(), &self.key_id, &self.account, user)?;
                Ok(Box::new(signer))
            }
        }
    }
}

/// Get ~/.config/triton/auth.toml (XDG convention).
/// Ignores empty or non-absolute XDG_CONFIG_HOME values.
pub fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("triton").join("auth.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_env_prefers_triton_over_sdc() {
        let settings = AuthSettings::from_lookup(lookup(&[
            ("TRITON_ACCOUNT", "acme"),
            ("SDC_ACCOUNT", "legacy"),
            ("SDC_KEY_ID", "fe:64"),
        ]));
        assert_eq!(settings.account.as_deref(), Some("acme"));
        assert_eq!(settings.key_id.as_deref(), Some("fe:64"));
    }

    #[test]
    fn test_env_ignores_empty_values() {
        let settings = AuthSettings::from_lookup(lookup(&[
            ("TRITON_USER", ""),
            ("SDC_USER", "deploy"),
            ("SSH_AUTH_SOCK", ""),
        ]));
        assert_eq!(settings.user.as_deref(), Some("deploy"));
        assert_eq!(settings.agent_socket, None);
    }

    #[test]
    fn test_dotenv_entries_feed_lookup() {
        let dotenv = dotenv_values(dotenvy::from_read_iter(
            "# credentials\nSDC_ACCOUNT=acme\nTRITON_KEY_ID=\"fe:64\"\nnot a line\n".as_bytes(),
        ));
        assert_eq!(dotenv.get("SDC_ACCOUNT").map(String::as_str), Some("acme"));

        let settings = AuthSettings::from_lookup(|name| dotenv.get(name).cloned());
        assert_eq!(settings.account.as_deref(), Some("acme"));
        assert_eq!(settings.key_id.as_deref(), Some("fe:64"));
    }

    #[test]
    fn test_or_keeps_first_set_value() {
        let flags = AuthSettings {
            account: Some("flag".to_string()),
            ..Default::default()
        };
        let env = AuthSettings {
            account: Some("env".to_string()),
            key_id: Some("fe:64".to_string()),
            ..Default::default()
        };

        let merged = flags.or(env);
        assert_eq!(merged.account.as_deref(), Some("flag"));
        assert_eq!(merged.key_id.as_deref(), Some("fe:64"));
    }

    #[test]
    fn test_resolve_prefers_key_file_over_agent() {
        let config = AuthSettings {
            account: Some("acme".to_string()),
            key_id: Some("fe:64".to_string()),
            key_material: Some(PathBuf::from("/keys/id_rsa")),
            agent_socket: Some(PathBuf::from("/tmp/agent.sock")),
            ..Default::default()
        }
        .resolve()
        .expect("should resolve");

        assert_eq!(config.key_source, KeySource::File(PathBuf::from("/keys/id_rsa")));
    }

    #[test]
    fn test_resolve_falls_back_to_agent() {
        let config = AuthSettings {
            account: Some("acme".to_string()),
            key_id: Some("fe:64".to_string()),
            ..Default::default()
        }
        .resolve()
        .expect("should resolve");

        assert_eq!(config.key_source, KeySource::Agent(None));
    }

    #[test]
    fn test_resolve_requires_account_and_key_id() {
        let missing_account = AuthSettings {
            key_id: Some("fe:64".to_string()),
            ..Default::default()
        };
        assert!(matches!(missing_account.resolve(), Err(AuthError::Config(_))));

        let missing_key = AuthSettings {
            account: Some("acme".to_string()),
            ..Default::default()
        };
        assert!(matches!(missing_key.resolve(), Err(AuthError::Config(_))));
    }

    #[test]
    fn test_agent_without_socket_is_unavailable() {
        let config = AuthConfig {
            account: "acme".to_string(),
            user: None,
            key_id: "fe:64".to_string(),
            key_source: KeySource::Agent(None),
        };
        assert!(matches!(
            config.build_signer().unwrap_err(),
            AuthError::AgentUnavailable
        ));
    }

    #[test]
    fn test_build_signer_from_key_file() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let key_path = dir.path().join("id_rsa");
        std::fs::write(&key_path, include_str!("../tests/fixtures/rsa2048.pem"))
            .expect("should write key");

        let config = AuthConfig {
            account: "acme".to_string(),
            user: None,
            key_id: "fe:64:fc:2c:5b:5d:ff:7c:79:7f:11:d3:6e:b6:f6:6b".to_string(),
            key_source: KeySource::File(key_path),
        };
        let signer = config.build_signer().expect("should build signer");
        assert_eq!(
            signer.key_fingerprint(),
            "fe:64:fc:2c:5b:5d:ff:7c:79:7f:11:d3:6e:b6:f6:6b"
        );
    }

    #[test]
    fn test_build_signer_missing_file_is_read_error() {
        let config = AuthConfig {
            account: "acme".to_string(),
            user: None,
            key_id: "fe:64".to_string(),
            key_source: KeySource::File(PathBuf::from("/nonexistent/id_rsa")),
        };
        assert!(matches!(
            config.build_signer().unwrap_err(),
            AuthError::ReadKey { .. }
        ));
    }

    #[test]
    fn test_from_file_parses_toml() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("auth.toml");
        std::fs::write(
            &path,
            "account = \"acme\"\nkey_id = \"fe:64\"\nkey_material = \"/keys/id_rsa\"\n",
        )
        .expect("should write config");

        let settings = AuthSettings::from_file(&path).expect("should parse");
        assert_eq!(settings.account.as_deref(), Some("acme"));
        assert_eq!(settings.key_material, Some(PathBuf::from("/keys/id_rsa")));
        assert_eq!(settings.user, None);
    }

    #[test]
    fn test_from_file_rejects_bad_toml() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("auth.toml");
        std::fs::write(&path, "account = [").expect("should write config");

        assert!(matches!(
            AuthSettings::from_file(&path),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn test_default_config_path_ends_with_auth_toml() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("triton/auth.toml"));
        }
    }
}
