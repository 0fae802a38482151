use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dataeng::config::{RuntimeEnv, RuntimePaths, TargetOverrides, resolve_runtime_paths};
use dataeng::session::bootstrap::{BootstrapError, SessionSource, TokenType, resolve_connection};
use dataeng::session::bootstrap::bootstrap as bootstrap_session;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after unix epoch")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{nanos}"));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn paths_with(connections_file: &Path, home: &Path) -> RuntimePaths {
    RuntimePaths {
        home_dir: home.to_path_buf(),
        cwd: home.to_path_buf(),
        connections_file: connections_file.to_path_buf(),
    }
}

const CONNECTIONS: &str = r#"
[pm]
account = "xy12345"
user = "ENGINEER"
role = "DATA_ENGINEER"
database = "ANALYTICS"
token = "pat-from-profile"

[connections.staging]
host = "staging.example.snowflakecomputing.com"
authenticator = "oauth"
token = "oauth-staging"
"#;

#[test]
fn hosted_context_wins_when_host_and_token_file_exist() {
    let temp = unique_temp_dir("dataeng-hosted");
    let token_file = temp.join("token");
    std::fs::write(&token_file, "hosted-token\n").expect("token should be writable");

    let env = RuntimeEnv {
        host: Some("acct.snowflakecomputing.com".to_string()),
        token_file: Some(token_file),
        database: Some("HOSTED_DB".to_string()),
        ..RuntimeEnv::default()
    };
    let paths = paths_with(&temp.join("missing.toml"), &temp);

    let resolved = resolve_connection(&env, &paths, None).expect("hosted context should resolve");
    assert_eq!(resolved.source, SessionSource::Hosted);
    assert_eq!(resolved.base_url, "https://acct.snowflakecomputing.com");
    assert_eq!(resolved.token, "hosted-token");
    assert_eq!(resolved.token_type, TokenType::OAuth);
    assert_eq!(resolved.defaults.database.as_deref(), Some("HOSTED_DB"));
}

#[test]
fn falls_back_to_default_pm_profile_without_hosted_token() {
    let temp = unique_temp_dir("dataeng-profile");
    let connections = temp.join("connections.toml");
    std::fs::write(&connections, CONNECTIONS).expect("connections should be writable");

    let env = RuntimeEnv {
        host: Some("acct.snowflakecomputing.com".to_string()),
        token_file: Some(temp.join("no-token")),
        ..RuntimeEnv::default()
    };
    let paths = paths_with(&connections, &temp);

    let resolved = resolve_connection(&env, &paths, None).expect("profile should resolve");
    assert_eq!(
        resolved.source,
        SessionSource::Profile {
            name: "pm".to_string(),
            path: connections.clone(),
        }
    );
    assert_eq!(resolved.base_url, "https://xy12345.snowflakecomputing.com");
    assert_eq!(resolved.token_type, TokenType::ProgrammaticAccessToken);
    assert_eq!(resolved.role.as_deref(), Some("DATA_ENGINEER"));
    assert!(!format!("{resolved:?}").contains("pat-from-profile"));
}

#[test]
fn environment_and_flag_select_other_profiles() {
    let temp = unique_temp_dir("dataeng-profile-named");
    let connections = temp.join("connections.toml");
    std::fs::write(&connections, CONNECTIONS).expect("connections should be writable");
    let paths = paths_with(&connections, &temp);

    let env = RuntimeEnv {
        connection_name: Some("staging".to_string()),
        ..RuntimeEnv::default()
    };
    let resolved = resolve_connection(&env, &paths, None).expect("staging should resolve");
    assert_eq!(resolved.token_type, TokenType::OAuth);
    assert_eq!(resolved.base_url, "https://staging.example.snowflakecomputing.com");

    let resolved = resolve_connection(&env, &paths, Some("pm")).expect("flag should win");
    assert_eq!(resolved.token, "pat-from-profile");
}

#[test]
fn missing_connections_file_is_a_bootstrap_error() {
    let temp = unique_temp_dir("dataeng-no-connections");
    let paths = paths_with(&temp.join("connections.toml"), &temp);

    let error = resolve_connection(&RuntimeEnv::default(), &paths, None)
        .expect_err("missing file should fail");
    assert!(matches!(error, BootstrapError::ConnectionsFileMissing { .. }));
    assert!(error.to_string().contains("--connections-file"));
}

#[test]
fn bootstrap_layers_profile_then_cli_overrides() {
    let temp = unique_temp_dir("dataeng-bootstrap");
    let connections = temp.join("connections.toml");
    std::fs::write(&connections, CONNECTIONS).expect("connections should be writable");
    let paths = paths_with(&connections, &temp);

    let overrides = TargetOverrides {
        schema: Some("RAW".to_string()),
        ..TargetOverrides::default()
    };
    let connected = bootstrap_session(
        &RuntimeEnv::default(),
        &paths,
        None,
        &overrides,
        Duration::from_secs(30),
    )
    .expect("bootstrap should succeed");

    assert_eq!(connected.target.database, "ANALYTICS");
    assert_eq!(connected.target.schema, "RAW");
    assert_eq!(connected.target.warehouse.as_deref(), Some("LEILAAPP"));
    assert_eq!(connected.target.agent, "DATA_ENGINEER_AGENT");
    assert_eq!(
        connected.session.base_url(),
        "https://xy12345.snowflakecomputing.com"
    );
}

#[test]
fn snowflake_home_locates_connections_file() {
    let paths = resolve_runtime_paths(
        Path::new("/home/engineer"),
        Path::new("/work"),
        Some(Path::new("~/custom-snowflake")),
        None,
    )
    .expect("paths should resolve");

    assert_eq!(
        paths.connections_file,
        PathBuf::from("/home/engineer/custom-snowflake/connections.toml")
    );
}

#[test]
fn hosted_context_derives_host_from_account() {
    let temp = unique_temp_dir("dataeng-hosted-account");
    let token_file = temp.join("token");
    std::fs::write(&token_file, "hosted-token").expect("token should be writable");

    let env = RuntimeEnv {
        account: Some("xy12345".to_string()),
        token_file: Some(token_file),
        ..RuntimeEnv::default()
    };
    let paths = paths_with(&temp.join("missing.toml"), &temp);

    let resolved = resolve_connection(&env, &paths, None).expect("account should seed the host");
    assert_eq!(resolved.source, SessionSource::Hosted);
    assert_eq!(resolved.base_url, "https://xy12345.snowflakecomputing.com");
}

#[test]
fn profile_token_file_follows_home_and_cwd_rules() {
    let temp = unique_temp_dir("dataeng-token-path");
    let home = temp.join("home");
    let cwd = temp.join("work");
    std::fs::create_dir_all(home.join(".snowflake")).expect("home should be creatable");
    std::fs::create_dir_all(&cwd).expect("cwd should be creatable");
    std::fs::write(home.join(".snowflake").join("pat"), "pat-from-home\n")
        .expect("token should be writable");
    std::fs::write(cwd.join("local.token"), "pat-from-cwd\n").expect("token should be writable");

    let connections = temp.join("connections.toml");
    std::fs::write(
        &connections,
        "[pm]\naccount = \"xy12345\"\ntoken_file_path = \"~/.snowflake/pat\"\n\n\
         [local]\naccount = \"xy12345\"\ntoken_file_path = \"./local.token\"\n",
    )
    .expect("connections should be writable");
    let paths = RuntimePaths {
        home_dir: home,
        cwd,
        connections_file: connections,
    };

    let resolved = resolve_connection(&RuntimeEnv::default(), &paths, None)
        .expect("tilde token path should resolve");
    assert_eq!(resolved.token, "pat-from-home");

    let resolved = resolve_connection(&RuntimeEnv::default(), &paths, Some("local"))
        .expect("relative token path should resolve");
    assert_eq!(resolved.token, "pat-from-cwd");
}
