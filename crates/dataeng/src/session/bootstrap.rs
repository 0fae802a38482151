use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use super::rest::{RestSession, StatementContext};
use crate::config::{
    RuntimeEnv, RuntimePaths, TargetOverrides, WorkspaceTarget, resolve_user_path,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    OAuth,
    ProgrammaticAccessToken,
    KeypairJwt,
}

impl TokenType {
    #[must_use]
    pub const fn header_value(self) -> &'static str {
        match self {
            Self::OAuth => "OAUTH",
            Self::ProgrammaticAccessToken => "PROGRAMMATIC_ACCESS_TOKEN",
            Self::KeypairJwt => "KEYPAIR_JWT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSource {
    /// Token issued to a running container service.
    Hosted,
    Profile { name: String, path: PathBuf },
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(
        "no active session and connections file not found: {path} (set SNOWFLAKE_HOME or pass --connections-file)"
    )]
    ConnectionsFileMissing { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("connection profile `{name}` not found in {path}")]
    ProfileMissing { name: String, path: PathBuf },

    #[error("connection profile `{name}` is invalid: {source}")]
    ProfileInvalid {
        name: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("connection profile `{name}` sets neither `account` nor `host`")]
    MissingHost { name: String },

    #[error(
        "connection profile `{name}` has no token; set `token` or `token_file_path` (password login is not supported by the SQL API)"
    )]
    MissingToken { name: String },

    #[error("connection profile `{name}` has an unusable token_file_path: {reason}")]
    TokenPath { name: String, reason: String },

    #[error("connection profile `{name}` uses unsupported authenticator `{authenticator}`")]
    UnsupportedAuthenticator { name: String, authenticator: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// One entry of `connections.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectionProfile {
    pub account: Option<String>,
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub warehouse: Option<String>,
    pub authenticator: Option<String>,
    pub token: Option<String>,
    pub token_file_path: Option<PathBuf>,
}

/// Everything needed to open a [`RestSession`].
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedConnection {
    pub source: SessionSource,
    pub base_url: String,
    pub token: String,
    pub token_type: TokenType,
    pub role: Option<String>,
    pub defaults: TargetOverrides,
}

impl std::fmt::Debug for ResolvedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedConnection")
            .field("source", &self.source)
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("role", &self.role)
            .field("defaults", &self.defaults)
            .finish()
    }
}

#[derive(Debug)]
pub struct BootstrappedSession {
    pub session: RestSession,
    pub target: WorkspaceTarget,
    pub source: SessionSource,
}

/// Obtains a session: the hosted context when one is active, otherwise the
/// named connection profile. No retry.
pub fn bootstrap(
    env: &RuntimeEnv,
    paths: &RuntimePaths,
    connection_override: Option<&str>,
    cli_overrides: &TargetOverrides,
    timeout: Duration,
) -> Result<BootstrappedSession, BootstrapError> {
    let resolved = resolve_connection(env, paths, connection_override)?;
    let target = WorkspaceTarget::default()
        .layered(&resolved.defaults)
        .layered(cli_overrides);
    let context = StatementContext {
        database: Some(target.database.clone()),
        schema: Some(target.schema.clone()),
        warehouse: target.warehouse.clone(),
        role: resolved.role.clone(),
    };

    let session = RestSession::new(
        resolved.base_url.clone(),
        resolved.token.clone(),
        resolved.token_type,
        context,
        timeout,
    )
    .map_err(BootstrapError::Client)?;

    info!(
        source = ?resolved.source,
        base_url = %resolved.base_url,
        database = %target.database,
        schema = %target.schema,
        "session established"
    );
    Ok(BootstrappedSession {
        session,
        target,
        source: resolved.source,
    })
}

pub fn resolve_connection(
    env: &RuntimeEnv,
    paths: &RuntimePaths,
    connection_override: Option<&str>,
) -> Result<ResolvedConnection, BootstrapError> {
    if let Some(hosted) = active_hosted_connection(env) {
        return Ok(hosted);
    }

    let name = connection_override
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| env.connection_name());
    let profile = load_profile(&paths.connections_file, name)?;
    profile_connection(name, paths, profile)
}

fn active_hosted_connection(env: &RuntimeEnv) -> Option<ResolvedConnection> {
    let host = env.hosted_host()?;
    let token_path = env.hosted_token_file();
    let token = match std::fs::read_to_string(token_path) {
        Ok(token) if !token.trim().is_empty() => token.trim().to_string(),
        Ok(_) => {
            debug!(path = %token_path.display(), "hosted token file is empty");
            return None;
        }
        Err(error) => {
            debug!(path = %token_path.display(), %error, "no hosted session token");
            return None;
        }
    };

    Some(ResolvedConnection {
        source: SessionSource::Hosted,
        base_url: base_url_for_host(&host),
        token,
        token_type: TokenType::OAuth,
        role: None,
        defaults: TargetOverrides {
            database: env.database.clone(),
            schema: env.schema.clone(),
            warehouse: env.warehouse.clone(),
            agent: None,
        },
    })
}

pub fn load_profile(path: &Path, name: &str) -> Result<ConnectionProfile, BootstrapError> {
    if !path.exists() {
        return Err(BootstrapError::ConnectionsFileMissing {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|source| BootstrapError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_profile(&text, name, path)
}

/// Accepts both `[name]` and `[connections.name]` layouts.
pub fn parse_profile(text: &str, name: &str, path: &Path) -> Result<ConnectionProfile, BootstrapError> {
    let table: toml::Table = text.parse().map_err(|source| BootstrapError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let entry = table
        .get(name)
        .or_else(|| {
            table
                .get("connections")
                .and_then(toml::Value::as_table)
                .and_then(|connections| connections.get(name))
        })
        .ok_or_else(|| BootstrapError::ProfileMissing {
            name: name.to_string(),
            path: path.to_path_buf(),
        })?;

    entry
        .clone()
        .try_into()
        .map_err(|source| BootstrapError::ProfileInvalid {
            name: name.to_string(),
            source,
        })
}

fn profile_connection(
    name: &str,
    paths: &RuntimePaths,
    profile: ConnectionProfile,
) -> Result<ResolvedConnection, BootstrapError> {
    let base_url = match (profile.host.as_deref(), profile.account.as_deref()) {
        (Some(host), _) if !host.trim().is_empty() => base_url_for_host(host.trim()),
        (_, Some(account)) if !account.trim().is_empty() => {
            format!("https://{}.snowflakecomputing.com", account.trim())
        }
        _ => {
            return Err(BootstrapError::MissingHost {
                name: name.to_string(),
            });
        }
    };

    let token_type = match profile
        .authenticator
        .as_deref()
        .map(|value| value.trim().to_ascii_lowercase())
        .as_deref()
    {
        None | Some("") | Some("programmatic_access_token") => TokenType::ProgrammaticAccessToken,
        Some("oauth") => TokenType::OAuth,
        Some("snowflake_jwt") => TokenType::KeypairJwt,
        Some(other) => {
            return Err(BootstrapError::UnsupportedAuthenticator {
                name: name.to_string(),
                authenticator: other.to_string(),
            });
        }
    };

    let token = match (profile.token.as_deref(), profile.token_file_path.as_deref()) {
        (Some(token), _) if !token.trim().is_empty() => token.trim().to_string(),
        (_, Some(token_path)) => {
            let token_path = resolve_user_path(token_path, &paths.home_dir, &paths.cwd)
                .map_err(|error| BootstrapError::TokenPath {
                    name: name.to_string(),
                    reason: error.to_string(),
                })?;
            debug!(path = %token_path.display(), "reading profile token file");
            std::fs::read_to_string(&token_path)
                .map_err(|source| BootstrapError::Read {
                    path: token_path.clone(),
                    source,
                })?
                .trim()
                .to_string()
        }
        _ => String::new(),
    };
    if token.is_empty() {
        return Err(BootstrapError::MissingToken {
            name: name.to_string(),
        });
    }

    Ok(ResolvedConnection {
        source: SessionSource::Profile {
            name: name.to_string(),
            path: paths.connections_file.clone(),
        },
        base_url,
        token,
        token_type,
        role: profile.role,
        defaults: TargetOverrides {
            database: profile.database,
            schema: profile.schema,
            warehouse: profile.warehouse,
            agent: None,
        },
    })
}

fn base_url_for_host(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", host.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::{BootstrapError, TokenType, parse_profile, profile_connection};
    use crate::config::RuntimePaths;
    use std::path::{Path, PathBuf};

    fn paths() -> RuntimePaths {
        RuntimePaths {
            home_dir: PathBuf::from("/home/engineer"),
            cwd: PathBuf::from("/work"),
            connections_file: PathBuf::from("/tmp/c.toml"),
        }
    }

    #[test]
    fn parses_top_level_and_nested_layouts() {
        let top_level = "[pm]\naccount = \"xy12345\"\ntoken = \"abc\"\n";
        let nested = "[connections.pm]\naccount = \"xy12345\"\ntoken = \"abc\"\n";

        for text in [top_level, nested] {
            let profile = parse_profile(text, "pm", Path::new("/tmp/connections.toml"))
                .expect("profile should parse");
            assert_eq!(profile.account.as_deref(), Some("xy12345"));
            assert_eq!(profile.token.as_deref(), Some("abc"));
        }
    }

    #[test]
    fn reports_missing_profile_name() {
        let err = parse_profile("[other]\naccount = \"a\"\n", "pm", Path::new("/tmp/c.toml"))
            .expect_err("missing profile must fail");
        assert!(matches!(err, BootstrapError::ProfileMissing { ref name, .. } if name == "pm"));
    }

    #[test]
    fn password_only_profile_is_rejected() {
        let profile = parse_profile(
            "[pm]\naccount = \"xy12345\"\nuser = \"me\"\npassword = \"secret\"\n",
            "pm",
            Path::new("/tmp/c.toml"),
        )
        .expect("profile should parse");

        let err = profile_connection("pm", &paths(), profile)
            .expect_err("password login must be rejected");
        assert!(err.to_string().contains("has no token"), "unexpected error: {err}");
    }

    #[test]
    fn account_derives_host_and_authenticator_selects_token_type() {
        let profile = parse_profile(
            "[pm]\naccount = \"xy12345\"\nauthenticator = \"OAUTH\"\ntoken = \"t\"\nrole = \"ENGINEER\"\ndatabase = \"RAW\"\n",
            "pm",
            Path::new("/tmp/c.toml"),
        )
        .expect("profile should parse");

        let resolved = profile_connection("pm", &paths(), profile)
            .expect("profile should resolve");
        assert_eq!(resolved.base_url, "https://xy12345.snowflakecomputing.com");
        assert_eq!(resolved.token_type, TokenType::OAuth);
        assert_eq!(resolved.role.as_deref(), Some("ENGINEER"));
        assert_eq!(resolved.defaults.database.as_deref(), Some("RAW"));
    }

    #[test]
    fn unknown_authenticator_is_rejected() {
        let profile = parse_profile(
            "[pm]\nhost = \"acme.snowflakecomputing.com\"\nauthenticator = \"externalbrowser\"\ntoken = \"t\"\n",
            "pm",
            Path::new("/tmp/c.toml"),
        )
        .expect("profile should parse");

        let err = profile_connection("pm", &paths(), profile)
            .expect_err("browser auth must be rejected");
        assert!(matches!(err, BootstrapError::UnsupportedAuthenticator { .. }));
    }
}
