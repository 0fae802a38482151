use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};

pub const CONNECTION_NAME_ENV: &str = "SNOWFLAKE_CONNECTION_NAME";
pub const DEFAULT_CONNECTION_NAME: &str = "pm";
pub const DEFAULT_HOSTED_TOKEN_FILE: &str = "/snowflake/session/token";

pub const DEFAULT_DATABASE: &str = "LEILA_APP";
pub const DEFAULT_SCHEMA: &str = "PUBLIC";
pub const DEFAULT_WAREHOUSE: &str = "LEILAAPP";
pub const DEFAULT_AGENT: &str = "DATA_ENGINEER_AGENT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    pub home_dir: PathBuf,
    pub cwd: PathBuf,
    pub connections_file: PathBuf,
}

pub fn resolve_runtime_paths(
    home_dir: &Path,
    cwd: &Path,
    snowflake_home: Option<&Path>,
    connections_override: Option<&Path>,
) -> Result<RuntimePaths> {
    if !home_dir.is_absolute() {
        bail!("home_dir must be absolute: {}", home_dir.display());
    }
    if !cwd.is_absolute() {
        bail!("cwd must be absolute: {}", cwd.display());
    }

    let home_dir = normalize_lexical(home_dir);
    let cwd = normalize_lexical(cwd);
    let connections_file = match (connections_override, snowflake_home) {
        (Some(path), _) => resolve_user_path(path, &home_dir, &cwd)?,
        (None, Some(dir)) => resolve_user_path(dir, &home_dir, &cwd)?.join("connections.toml"),
        (None, None) => home_dir.join(".snowflake").join("connections.toml"),
    };

    Ok(RuntimePaths {
        home_dir,
        cwd,
        connections_file: normalize_lexical(&connections_file),
    })
}

/// Process environment consulted during session bootstrap.
///
/// Captured once in `main` so bootstrap itself never reads `std::env`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeEnv {
    pub connection_name: Option<String>,
    pub snowflake_home: Option<PathBuf>,
    pub host: Option<String>,
    pub account: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub warehouse: Option<String>,
    pub token_file: Option<PathBuf>,
}

impl RuntimeEnv {
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            connection_name: env_text(CONNECTION_NAME_ENV),
            snowflake_home: env_text("SNOWFLAKE_HOME").map(PathBuf::from),
            host: env_text("SNOWFLAKE_HOST"),
            account: env_text("SNOWFLAKE_ACCOUNT"),
            database: env_text("SNOWFLAKE_DATABASE"),
            schema: env_text("SNOWFLAKE_SCHEMA"),
            warehouse: env_text("SNOWFLAKE_WAREHOUSE"),
            token_file: env_text("SNOWFLAKE_TOKEN_FILE").map(PathBuf::from),
        }
    }

    /// Profile name from the environment, falling back to `pm`.
    #[must_use]
    pub fn connection_name(&self) -> &str {
        self.connection_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_CONNECTION_NAME)
    }

    /// Host of the hosted context; `SNOWFLAKE_ACCOUNT` stands in when no host is set.
    #[must_use]
    pub fn hosted_host(&self) -> Option<String> {
        self.host.clone().or_else(|| {
            self.account
                .as_deref()
                .map(|account| format!("{account}.snowflakecomputing.com"))
        })
    }

    #[must_use]
    pub fn hosted_token_file(&self) -> &Path {
        self.token_file
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_HOSTED_TOKEN_FILE))
    }
}

fn env_text(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Database objects every command is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceTarget {
    pub database: String,
    pub schema: String,
    pub warehouse: Option<String>,
    pub agent: String,
}

impl Default for WorkspaceTarget {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            schema: DEFAULT_SCHEMA.to_string(),
            warehouse: Some(DEFAULT_WAREHOUSE.to_string()),
            agent: DEFAULT_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetOverrides {
    pub database: Option<String>,
    pub schema: Option<String>,
    pub warehouse: Option<String>,
    pub agent: Option<String>,
}

impl WorkspaceTarget {
    /// Applies one configuration layer; set values replace the current ones.
    #[must_use]
    pub fn layered(mut self, overrides: &TargetOverrides) -> Self {
        if let Some(database) = non_empty(overrides.database.as_deref()) {
            self.database = database;
        }
        if let Some(schema) = non_empty(overrides.schema.as_deref()) {
            self.schema = schema;
        }
        if let Some(warehouse) = non_empty(overrides.warehouse.as_deref()) {
            self.warehouse = Some(warehouse);
        }
        if let Some(agent) = non_empty(overrides.agent.as_deref()) {
            self.agent = agent;
        }
        self
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Expands `~/` against `home_dir` and anchors relative paths at `cwd`.
pub fn resolve_user_path(path: &Path, home_dir: &Path, cwd: &Path) -> Result<PathBuf> {
    let expanded = expand_tilde(path, home_dir)?;
    let resolved = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };

    Ok(normalize_lexical(&resolved))
}

fn expand_tilde(path: &Path, home_dir: &Path) -> Result<PathBuf> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => {
            let mut expanded = home_dir.to_path_buf();
            for component in components {
                expanded.push(component.as_os_str());
            }
            Ok(expanded)
        }
        Some(Component::Normal(first))
            if first
                .to_str()
                .is_some_and(|segment| segment.starts_with('~')) =>
        {
            bail!(
                "unsupported home expansion syntax (only `~` and `~/...` are supported): {}",
                path.display()
            )
        }
        _ => Ok(path.to_path_buf()),
    }
}

fn normalize_lexical(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            _ => normalized.push(component.as_os_str()),
        }
    }

    normalized
}
