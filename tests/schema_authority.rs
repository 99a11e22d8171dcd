#![cfg(unix)]

use std::time::Duration;

use chi_tui_lib::schema::{FieldKind, SchemaAuthority};
use chi_tui_lib::AppError;

#[path = "support.rs"]
mod support;
use serial_test::serial;
use support::fake_authority;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

const SCHEMA_SCRIPT: &str = r#"case "$1 $2" in
  "providers schema") echo '{"providers":[{"type":"ollama","fields":[{"name":"host","type":"string","default":"localhost"},{"name":"port","type":"int","default":11434}]},{"type":"openai","fields":[{"name":"api_key","type":"secret","required":true}]}]}' ;;
  "models list") echo '{"models":[{"id":"qwen3-1.7b","tags":["fast"],"downloaded":true,"recommended_ram_gb":3}],"available_ram_gb":16}' ;;
  *) echo "chi-llm 0.0-test" ;;
esac"#;

#[test]
fn missing_binary_is_fatal_at_startup() {
    let authority = SchemaAuthority::new("chi-llm-definitely-not-installed");
    let err = authority.check_available().expect_err("missing");
    assert!(err.is_fatal());
    assert!(err.to_string().contains("not found"));
}

#[test]
#[serial]
fn unresponsive_binary_times_out() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bin = fake_authority(dir.path(), "sleep 5");
    let authority = SchemaAuthority::new(bin.to_string_lossy().to_string())
        .with_timeout(Duration::from_millis(200));
    let err = authority.check_available().expect_err("timeout");
    assert!(matches!(err, AppError::StartupDependencyMissing { .. }));
}

#[test]
#[serial]
fn fetches_types_and_models_from_the_cli() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bin = fake_authority(dir.path(), SCHEMA_SCRIPT);
    let authority = SchemaAuthority::new(bin.to_string_lossy().to_string());
    authority.check_available().expect("available");

    let rt = runtime();
    let set = rt.block_on(authority.fetch_types()).expect("types");
    assert_eq!(set.type_names(), vec!["ollama", "openai"]);
    let key = set
        .get("openai")
        .and_then(|t| t.field("api_key"))
        .expect("api_key");
    assert_eq!(key.kind, FieldKind::Secret);
    assert!(key.required);

    let listing = rt.block_on(authority.fetch_models()).expect("models");
    assert_eq!(listing.models.len(), 1);
    assert_eq!(listing.models[0].name, "qwen3-1.7b");
    assert_eq!(listing.available_ram_gb, Some(16.0));
}

#[test]
#[serial]
fn failing_command_surfaces_stderr() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bin = fake_authority(dir.path(), "echo 'schema export broken' >&2; exit 3");
    let authority = SchemaAuthority::new(bin.to_string_lossy().to_string());

    let err = runtime()
        .block_on(authority.fetch_types())
        .expect_err("failure");
    assert!(matches!(err, AppError::SchemaFetch(_)));
    assert!(err.to_string().contains("schema export broken"));
}
