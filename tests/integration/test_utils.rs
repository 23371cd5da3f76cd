//! Shared test utilities for integration tests
//!
//! Test exporters, client construction helpers and XDG environment isolation.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use agentspan::telemetry::export::{ExportBatch, ExportResult, InMemorySpanExporter, SpanExporter};
use agentspan::telemetry::Span;
use agentspan::{AgentspanConfig, Client};
use async_trait::async_trait;
use parking_lot::Mutex as PlMutex;
use tempfile::TempDir;
use tokio::sync::Semaphore;

/// Global mutex to serialize XDG environment variable access across all tests
static XDG_ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Config with a test credential and fast retries.
pub fn test_config() -> AgentspanConfig {
    let mut config = AgentspanConfig::with_api_key("test-key");
    config.exporter.base_delay_ms = 10;
    config.exporter.flush_timeout_ms = 5_000;
    config.exporter.shutdown_timeout_ms = 5_000;
    config.exporter.exit_on_signal = false;
    config
}

pub fn memory_client() -> (Client, Arc<InMemorySpanExporter>) {
    memory_client_with(test_config())
}

pub fn memory_client_with(config: AgentspanConfig) -> (Client, Arc<InMemorySpanExporter>) {
    let memory = Arc::new(InMemorySpanExporter::new());
    let client = Client::with_exporter(config, memory.clone()).unwrap();
    (client, memory)
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Exporter that replays a fixed list of results, then succeeds.
pub struct ScriptedExporter {
    script: PlMutex<Vec<ExportResult>>,
    attempts: PlMutex<Vec<Instant>>,
    delivered: PlMutex<Vec<Span>>,
}

impl ScriptedExporter {
    pub fn new(script: Vec<ExportResult>) -> Self {
        Self {
            script: PlMutex::new(script.into_iter().rev().collect()),
            attempts: PlMutex::new(Vec::new()),
            delivered: PlMutex::new(Vec::new()),
        }
    }

    pub fn retryable_failures(count: usize) -> Self {
        Self::new(
            (0..count)
                .map(|_| ExportResult::Failure {
                    retryable: true,
                    reason: "503 service unavailable".to_string(),
                })
                .collect(),
        )
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }

    pub fn delivered(&self) -> Vec<Span> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl SpanExporter for ScriptedExporter {
    async fn export(&self, batch: &ExportBatch) -> ExportResult {
        self.attempts.lock().push(Instant::now());
        match self.script.lock().pop() {
            Some(result) => result,
            None => {
                self.delivered.lock().extend(batch.spans().iter().cloned());
                ExportResult::Success
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Exporter that holds every export until the gate is opened.
pub struct GatedExporter {
    gate: Arc<Semaphore>,
    inner: InMemorySpanExporter,
}

impl GatedExporter {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            inner: InMemorySpanExporter::new(),
        }
    }

    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    pub fn spans(&self) -> Vec<Span> {
        self.inner.spans()
    }
}

#[async_trait]
impl SpanExporter for GatedExporter {
    async fn export(&self, batch: &ExportBatch) -> ExportResult {
        match self.gate.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => {
                return ExportResult::Failure {
                    retryable: false,
                    reason: "gate closed".to_string(),
                }
            }
        }
        self.inner.export(batch).await
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// Environment variable state to restore after test
struct EnvState {
    vars: Vec<(&'static str, Option<String>)>,
}

const ISOLATED_VARS: [&str; 5] = [
    "HOME",
    "XDG_CONFIG_HOME",
    "AGENTSPAN_API_KEY",
    "AGENTSPAN_PROJECT_ID",
    "AGENTSPAN_ENV",
];

impl EnvState {
    fn capture() -> Self {
        Self {
            vars: ISOLATED_VARS
                .iter()
                .map(|key| (*key, std::env::var(key).ok()))
                .collect(),
        }
    }

    fn restore(self) {
        for (key, value) in self.vars {
            match value {
                Some(orig) => std::env::set_var(key, orig),
                None => std::env::remove_var(key),
            }
        }
    }
}

/// Run `f` with HOME and XDG_CONFIG_HOME pointed into `test_dir` and the
/// AGENTSPAN_* credential variables cleared.
pub fn with_xdg_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = XDG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture();

    let test_home = test_dir.path().join("home");
    std::fs::create_dir_all(&test_home).unwrap();

    std::env::set_var("HOME", test_home.to_str().unwrap());
    std::env::set_var("XDG_CONFIG_HOME", test_dir.path().to_str().unwrap());
    std::env::remove_var("AGENTSPAN_API_KEY");
    std::env::remove_var("AGENTSPAN_PROJECT_ID");
    std::env::remove_var("AGENTSPAN_ENV");

    let result = f();

    env_state.restore();

    result
}
