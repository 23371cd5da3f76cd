//! Configuration loading feeding a client.

use std::sync::Arc;

use agentspan::telemetry::encoding::keys;
use agentspan::telemetry::{AttributeValue, InMemorySpanExporter};
use agentspan::{Client, ConfigLoader, EndState, TelemetryError};
use tempfile::TempDir;

use crate::integration::test_utils::with_xdg_env;

#[test]
fn project_file_configures_client() {
    let test_dir = TempDir::new().unwrap();
    with_xdg_env(&test_dir, || {
        let project = test_dir.path().join("project");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(
            project.join("agentspan.toml"),
            r#"
api_key = "project-key"
project_id = "proj-42"
default_tags = ["ci"]

[exporter]
batch_size = 8
base_delay_ms = 10
exit_on_signal = false
"#,
        )
        .unwrap();

        let config = ConfigLoader::load(&project).unwrap();
        assert_eq!(config.exporter.batch_size, 8);

        let memory = Arc::new(InMemorySpanExporter::new());
        let client = Client::with_exporter(config, memory.clone()).unwrap();
        let session = client.start_session(["run"], None).unwrap();
        assert_eq!(session.tags(), vec!["ci", "run"]);
        assert_eq!(session.project_id(), Some("proj-42"));
        session.end(EndState::Success, None);

        let root = &memory.spans()[0];
        assert_eq!(
            root.attribute(keys::PROJECT_ID).and_then(AttributeValue::as_str),
            Some("proj-42")
        );
    });
}

#[test]
fn missing_credential_fails_at_session_start() {
    let test_dir = TempDir::new().unwrap();
    with_xdg_env(&test_dir, || {
        let config = ConfigLoader::load(test_dir.path()).unwrap();
        assert!(config.api_key.is_none());

        let client =
            Client::with_exporter(config, Arc::new(InMemorySpanExporter::new())).unwrap();
        assert!(matches!(
            client.start_session(Vec::<String>::new(), None),
            Err(TelemetryError::InvalidConfiguration(_))
        ));
    });
}

#[test]
fn global_file_supplies_credential() {
    let test_dir = TempDir::new().unwrap();
    with_xdg_env(&test_dir, || {
        let global_dir = test_dir.path().join("agentspan");
        std::fs::create_dir_all(&global_dir).unwrap();
        std::fs::write(global_dir.join("config.toml"), "api_key = \"global-key\"\n").unwrap();

        let project = test_dir.path().join("empty-project");
        std::fs::create_dir_all(&project).unwrap();
        let config = ConfigLoader::load(&project).unwrap();
        assert_eq!(config.require_api_key().unwrap(), "global-key");
    });
}
