use serde_json::json;

use chi_tui_lib::activation::{self, Target};
use chi_tui_lib::catalog::{Catalog, Provider, DEFAULT_CATALOG_FILE};
use chi_tui_lib::{AppError, PROJECT_CONFIG_FILE};

#[path = "support.rs"]
mod support;
use serial_test::serial;
use support::{ensure_test_home, read_json};

#[test]
fn setting_default_persists_in_scratch_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(DEFAULT_CATALOG_FILE);
    std::fs::write(
        &path,
        r#"{"providers":[{"id":"p1","type":"local","tags":["fast"]}]}"#,
    )
    .expect("seed catalog");

    let mut catalog = Catalog::load(&path).expect("load");
    assert!(catalog.default_id().is_none());
    catalog.set_default("p1").expect("set default");
    assert!(catalog.is_dirty());
    catalog.save(&path, None).expect("save");

    let raw = std::fs::read_to_string(&path).expect("read back");
    assert!(raw.contains(r#""default_provider_id": "p1""#));
    let saved = read_json(&path);
    assert_eq!(saved["providers"][0]["tags"], json!(["fast"]));
    assert_eq!(saved["providers"][0]["type"], json!("local"));
}

fn provider_with(id: &str, provider_type: &str, tags: &[&str], config: serde_json::Value) -> Provider {
    let mut provider = Provider::new(id, id.to_uppercase(), provider_type);
    provider.tags = tags.iter().map(|t| t.to_string()).collect();
    if let serde_json::Value::Object(map) = config {
        provider.config = map.into_iter().collect();
    }
    provider
}

#[test]
fn save_then_load_returns_the_same_providers_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(DEFAULT_CATALOG_FILE);
    let providers = vec![
        provider_with(
            "p3",
            "ollama",
            &["fast", "local"],
            json!({"host": "localhost", "port": 11434, "model": "llama3.2"}),
        ),
        provider_with("p1", "local", &[], json!({"model": "qwen3-1.7b", "context_window": 8192})),
        provider_with(
            "p2",
            "openai",
            &["cloud"],
            json!({"api_key": "sk-abc", "temperature": 0.7, "stream": true, "type": "chat"}),
        ),
        provider_with("p7", "brand-new", &["x", "y", "z"], json!({"flag": false})),
    ];
    let mut catalog = Catalog::from_providers(providers.clone(), Some("p2".to_string()));
    catalog.save(&path, None).expect("save");

    let reloaded = Catalog::load(&path).expect("load");
    assert_eq!(reloaded.len(), providers.len());
    assert_eq!(reloaded.default_id(), Some("p2"));
    for (expected, actual) in providers.iter().zip(reloaded.providers()) {
        assert_eq!(actual.id, expected.id);
        assert_eq!(actual.provider_type, expected.provider_type);
        assert_eq!(actual.tags, expected.tags);
        assert_eq!(actual.config, expected.config, "config of {}", expected.id);
        let expected_keys: Vec<&String> = expected.config.keys().collect();
        let actual_keys: Vec<&String> = actual.config.keys().collect();
        assert_eq!(actual_keys, expected_keys);
    }
}

#[test]
fn unknown_top_level_keys_survive_a_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(DEFAULT_CATALOG_FILE);
    std::fs::write(
        &path,
        r#"{"providers":[],"ui_hint":{"width":3}}"#,
    )
    .expect("seed catalog");

    let mut catalog = Catalog::load(&path).expect("load");
    let id = catalog.add("ollama", None);
    catalog.save(&path, None).expect("save");

    let saved = read_json(&path);
    assert_eq!(saved["ui_hint"], json!({"width": 3}));
    assert_eq!(saved["providers"][0]["id"], json!(id));
}

#[test]
fn project_activation_holds_only_the_provider_block() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut catalog = Catalog::new();
    let id = catalog.add("ollama", None);
    catalog.update(&id, "host", json!("localhost")).expect("host");
    catalog.update(&id, "port", json!("11434")).expect("port");
    catalog.update(&id, "model", json!("llama3.2")).expect("model");
    catalog.update(&id, "num_ctx", json!(4096)).expect("extra");
    catalog.set_default(&id).expect("default");

    let path = activation::write(&catalog, None, Target::Project, dir.path()).expect("write");
    assert_eq!(path, dir.path().join(PROJECT_CONFIG_FILE));

    let written = read_json(&path);
    let top: Vec<&String> = written.as_object().expect("object").keys().collect();
    assert_eq!(top, vec!["provider"]);
    assert_eq!(
        written["provider"],
        json!({"type": "ollama", "host": "localhost", "port": 11434, "model": "llama3.2"})
    );
}

#[test]
fn override_wins_over_default_and_unknown_override_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut catalog = Catalog::new();
    let first = catalog.add("local", None);
    let second = catalog.add("lmstudio", None);
    catalog.set_default(&first).expect("default");

    let path = activation::write(&catalog, Some(&second), Target::Project, dir.path())
        .expect("write override");
    assert_eq!(read_json(&path)["provider"]["type"], json!("lmstudio"));

    let err = activation::write(&catalog, Some("p99"), Target::Project, dir.path())
        .expect_err("unknown id");
    assert!(matches!(err, AppError::Validation(_)));
}

#[test]
fn nothing_to_activate_without_a_default() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut catalog = Catalog::new();
    catalog.add("local", None);

    let err = activation::write(&catalog, None, Target::Project, dir.path())
        .expect_err("no default");
    assert!(err.to_string().contains("no default provider"));
    assert!(!dir.path().join(PROJECT_CONFIG_FILE).exists());
}

#[test]
#[serial]
fn global_activation_lands_under_home_cache() {
    let home = ensure_test_home();
    let cwd = tempfile::tempdir().expect("cwd");

    let mut catalog = Catalog::new();
    let id = catalog.add("openai", None);
    catalog.update(&id, "api_key", json!("sk-test-1234")).expect("key");
    catalog.set_default(&id).expect("default");

    let path = activation::write(&catalog, None, Target::Global, cwd.path()).expect("write");
    assert_eq!(
        path,
        home.path().join(".cache").join("chi_llm").join("model_config.json")
    );
    assert_eq!(read_json(&path)["provider"]["api_key"], json!("sk-test-1234"));
    assert!(!cwd.path().join(PROJECT_CONFIG_FILE).exists());
}
