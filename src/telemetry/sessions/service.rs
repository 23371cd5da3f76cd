//! Session lifecycle service. Owns the registry, the processor and the export worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::AgentspanConfig;
use crate::error::TelemetryError;
use crate::telemetry::events::Event;
use crate::telemetry::export::{HttpSpanExporter, SpanExporter};
use crate::telemetry::processing::{PipelineStatsSnapshot, SpanProcessor};
use crate::telemetry::sessions::policy::EndState;
use crate::telemetry::sessions::registry::SessionRegistry;
use crate::telemetry::sessions::scope;
use crate::telemetry::sessions::session::{Session, SessionOptions};
use crate::telemetry::shutdown;
use crate::telemetry::types::SessionId;

/// Entry point of the pipeline. Cheap to clone; clones share one worker.
///
/// Dropping the last clone runs [`Client::shutdown`].
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

/// Non-owning handle used by the signal listener.
#[derive(Clone)]
pub(crate) struct WeakClient(Weak<ClientInner>);

impl WeakClient {
    pub(crate) fn upgrade(&self) -> Option<Client> {
        self.0.upgrade().map(|inner| Client { inner })
    }
}

struct ClientInner {
    config: AgentspanConfig,
    registry: Arc<SessionRegistry>,
    processor: Arc<SpanProcessor>,
    shut_down: AtomicBool,
    signals_installed: AtomicBool,
}

pub struct ClientBuilder {
    config: AgentspanConfig,
    exporter: Option<Arc<dyn SpanExporter>>,
    registry: Option<Arc<SessionRegistry>>,
}

impl ClientBuilder {
    pub fn exporter(mut self, exporter: Arc<dyn SpanExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validate the configuration and start the export worker.
    ///
    /// The HTTP exporter is used unless another one was supplied.
    pub fn build(self) -> Result<Client, TelemetryError> {
        let config = self.config.into_validated()?;
        let exporter: Arc<dyn SpanExporter> = match self.exporter {
            Some(exporter) => exporter,
            None => Arc::new(HttpSpanExporter::new(
                &config.endpoint,
                config.api_key.clone().unwrap_or_default(),
                config.exporter.request_timeout(),
            )?),
        };
        let processor = Arc::new(SpanProcessor::new(exporter.clone(), &config)?);
        info!(
            exporter = exporter.name(),
            endpoint = %config.endpoint,
            batch_size = config.exporter.batch_size,
            queue_capacity = config.exporter.queue_capacity,
            "Telemetry pipeline started"
        );
        Ok(Client {
            inner: Arc::new(ClientInner {
                config,
                registry: self.registry.unwrap_or_default(),
                processor,
                shut_down: AtomicBool::new(false),
                signals_installed: AtomicBool::new(false),
            }),
        })
    }
}

impl Client {
    pub fn builder(config: AgentspanConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            exporter: None,
            registry: None,
        }
    }

    /// Client exporting over HTTP to the configured endpoint.
    pub fn new(config: AgentspanConfig) -> Result<Self, TelemetryError> {
        Self::builder(config).build()
    }

    pub fn with_exporter(
        config: AgentspanConfig,
        exporter: Arc<dyn SpanExporter>,
    ) -> Result<Self, TelemetryError> {
        Self::builder(config).exporter(exporter).build()
    }

    /// Start a named trace.
    pub fn start_trace<I, S>(&self, name: &str, tags: I) -> Result<Session, TelemetryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start(SessionOptions {
            name: Some(name.to_string()),
            tags: tags.into_iter().map(Into::into).collect(),
            ..SessionOptions::default()
        })
    }

    /// Start a session, or attach to `inherited_id` when given.
    ///
    /// Attaching to an id registered in this process returns that handle.
    /// Otherwise the new handle shares the session's trace and root span but
    /// leaves emitting the root span to the process that owns it.
    pub fn start_session<I, S>(
        &self,
        tags: I,
        inherited_id: Option<SessionId>,
    ) -> Result<Session, TelemetryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start(SessionOptions {
            tags: tags.into_iter().map(Into::into).collect(),
            inherited_id,
            ..SessionOptions::default()
        })
    }

    fn start(&self, mut options: SessionOptions) -> Result<Session, TelemetryError> {
        self.inner.config.require_api_key()?;
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(TelemetryError::PipelineClosed);
        }

        if let Some(id) = options.inherited_id {
            if let Some(existing) = self.inner.registry.get(id) {
                debug!(session_id = %id, "Reusing registered session for inherited id");
                return Ok(existing);
            }
        }

        let mut tags = self.inner.config.default_tags.clone();
        tags.append(&mut options.tags);
        options.tags = tags;
        if options.project_id.is_none() {
            options.project_id = self.inner.config.project_id.clone();
        }

        let session = Session::new(options, self.inner.processor.clone(), &self.inner.registry);
        self.inner.registry.register(session.clone());
        session.activate();
        Ok(session)
    }

    /// End `session`; idempotent.
    pub fn end_trace(&self, session: &Session, end_state: EndState, reason: Option<&str>) {
        session.end(end_state, reason);
    }

    /// The session events without a handle go to: the innermost scoped
    /// session, else the single active one.
    pub fn current_session(&self) -> Result<Session, TelemetryError> {
        match scope::current() {
            Some(session) => Ok(session),
            None => self.inner.registry.resolve(None),
        }
    }

    /// Record into the current session.
    pub fn record(&self, event: Event) -> Result<(), TelemetryError> {
        self.current_session()?.try_record(event)
    }

    pub fn session(&self, id: SessionId) -> Option<Session> {
        self.inner.registry.get(id)
    }

    /// End every active session. Returns how many were ended.
    pub fn end_all_sessions(&self, end_state: EndState, reason: Option<&str>) -> usize {
        let sessions = self.inner.registry.all_active();
        for session in &sessions {
            session.end(end_state, reason);
        }
        sessions.len()
    }

    /// End every active session as `Indeterminate` and drain the worker, all
    /// within the configured shutdown timeout. Returns whether every span
    /// handed to the pipeline was delivered. Only the first call does work.
    pub fn shutdown(&self) -> bool {
        self.inner.shutdown(self.inner.config.exporter.shutdown_timeout(), None)
    }

    /// [`Client::shutdown`] with an explicit overall budget.
    pub fn shutdown_within(&self, timeout: Duration) -> bool {
        self.inner.shutdown(timeout, None)
    }

    /// Shutdown path taken when a termination signal arrives.
    pub(crate) fn interrupt(&self, signal: &str) -> bool {
        let reason = format!("interrupted by {}", signal);
        self.inner
            .shutdown(self.inner.config.exporter.shutdown_timeout(), Some(&reason))
    }

    /// Listen for SIGINT/SIGTERM (ctrl-c elsewhere) on a background thread.
    /// A signal ends all sessions as `Indeterminate`, flushes within the
    /// shutdown timeout, then exits the process when `exit_on_signal` is set.
    pub fn install_signal_handlers(&self) -> Result<(), TelemetryError> {
        if self.inner.signals_installed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = shutdown::install(
            WeakClient(Arc::downgrade(&self.inner)),
            self.inner.config.exporter.exit_on_signal,
        );
        if result.is_err() {
            self.inner.signals_installed.store(false, Ordering::SeqCst);
        }
        result
    }

    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.inner.processor.stats()
    }

    /// Forget all registered sessions without ending them.
    pub fn reset(&self) {
        let dropped = self.inner.registry.reset();
        if !dropped.is_empty() {
            debug!(sessions = dropped.len(), "Session registry reset");
        }
    }

    pub fn config(&self) -> &AgentspanConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.inner.registry
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }
}

impl ClientInner {
    fn shutdown(&self, timeout: Duration, reason: Option<&str>) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return true;
        }
        let deadline = Instant::now() + timeout;
        let sessions = self.registry.all_active();
        let mut delivered = true;
        for session in &sessions {
            let remaining = deadline.saturating_duration_since(Instant::now());
            delivered &= session.end_within(EndState::Indeterminate, reason, remaining);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        delivered &= self.processor.shutdown(remaining);
        if delivered {
            info!(sessions = sessions.len(), "Telemetry pipeline shut down");
        } else {
            warn!(
                sessions = sessions.len(),
                ?timeout,
                "Telemetry pipeline shut down before every span was delivered"
            );
        }
        delivered
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.shutdown(self.config.exporter.shutdown_timeout(), None);
    }
}
