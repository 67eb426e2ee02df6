//! The chat pipeline, from incoming message to reply.
//!
//! ```text
//! RECEIVED → HISTORY_LOADED → MODEL_INVOKED → SIGNAL_EXTRACTED → PERSISTED → RESPONDED
//! ```
//!
//! Only the model call can fail an invocation. A history read failure
//! degrades to an empty history; write failures are logged and swallowed.
//! Nothing serializes invocations on the same session: two concurrent
//! messages may both see the same history and their turns interleave.

use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};
use turnrelay_config::{AppConfig, PersistenceMode, Policy};
use turnrelay_core::error::{Error, Result};
use turnrelay_core::provider::{ModelInvoker, ModelRequest};
use turnrelay_core::store::{DEFAULT_HISTORY_LIMIT, DecisionLog, HistoryStore};
use turnrelay_core::turn::DecisionRecord;
use turnrelay_memory::Stores;
use uuid::Uuid;

use crate::assembler::{AssemblyInput, assemble};
use crate::recorder::{Exchange, RecordReport, TurnRecorder};
use crate::signal::{ExtractedReply, extract_escalation};

/// Progress markers of a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    HistoryLoaded,
    ModelInvoked,
    SignalExtracted,
    Persisted,
    Responded,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "RECEIVED",
            Stage::HistoryLoaded => "HISTORY_LOADED",
            Stage::ModelInvoked => "MODEL_INVOKED",
            Stage::SignalExtracted => "SIGNAL_EXTRACTED",
            Stage::Persisted => "PERSISTED",
            Stage::Responded => "RESPONDED",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One incoming message with its routing data.
#[derive(Debug, Clone, Default)]
pub struct ChatInput {
    pub session_id: String,
    pub user_id: String,
    pub query: String,
    pub model: String,
    /// Retrieved context to show the model, never stored.
    pub context: Option<String>,
    /// Caller-supplied routing metadata, copied into the decision record.
    pub flags: serde_json::Map<String, serde_json::Value>,
}

/// What the caller gets back.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    pub reply: ExtractedReply,
    /// `None` when writes were detached from the response.
    pub persisted: Option<RecordReport>,
}

pub struct ChatPipeline {
    invoker: Arc<dyn ModelInvoker>,
    history: Arc<dyn HistoryStore>,
    decisions: Option<Arc<dyn DecisionLog>>,
    recorder: TurnRecorder,
    policy: Policy,
    history_limit: usize,
    escalation_enabled: bool,
    persistence: PersistenceMode,
    context_label: String,
}

impl ChatPipeline {
    pub fn new(invoker: Arc<dyn ModelInvoker>, stores: Stores, policy: Policy) -> Self {
        Self {
            invoker,
            recorder: TurnRecorder::new(stores.history.clone()),
            history: stores.history,
            decisions: Some(stores.decisions),
            policy,
            history_limit: DEFAULT_HISTORY_LIMIT,
            escalation_enabled: true,
            persistence: PersistenceMode::default(),
            context_label: turnrelay_config::ServiceConfig::default().context_label,
        }
    }

    /// Wire a pipeline the way the configuration describes.
    pub fn from_config(
        config: &AppConfig,
        invoker: Arc<dyn ModelInvoker>,
        stores: Stores,
        policy: Policy,
    ) -> Self {
        let pipeline = Self::new(invoker, stores, policy)
            .with_history_limit(config.store.history_limit)
            .with_escalation(config.escalation.enabled)
            .with_persistence(config.store.persistence)
            .with_context_label(&config.service.context_label);
        if config.store.record_decisions {
            pipeline
        } else {
            pipeline.without_decision_log()
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// When disabled, replies pass through with markers intact.
    pub fn with_escalation(mut self, enabled: bool) -> Self {
        self.escalation_enabled = enabled;
        self
    }

    pub fn with_persistence(mut self, mode: PersistenceMode) -> Self {
        self.persistence = mode;
        self
    }

    pub fn with_context_label(mut self, label: impl Into<String>) -> Self {
        self.context_label = label.into();
        self
    }

    pub fn without_decision_log(mut self) -> Self {
        self.decisions = None;
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn invoker_name(&self) -> &str {
        self.invoker.name()
    }

    pub fn store_name(&self) -> &str {
        self.history.name()
    }

    /// Run one invocation.
    ///
    /// Errors only for a blank session id or a failed model call.
    pub async fn run(&self, input: ChatInput) -> Result<ChatOutcome> {
        if input.session_id.trim().is_empty() {
            return Err(Error::InvalidRequest("session_id must not be blank".into()));
        }

        let span = info_span!(
            "chat",
            invocation = %Uuid::new_v4(),
            session = %input.session_id,
            user = %input.user_id,
        );
        self.run_inner(input).instrument(span).await
    }

    async fn run_inner(&self, input: ChatInput) -> Result<ChatOutcome> {
        stage(Stage::Received);

        let history = match self
            .history
            .read_recent(&input.session_id, self.history_limit)
            .await
        {
            Ok(turns) => turns,
            Err(e) => {
                warn!(store = %self.history.name(), error = %e, "History unavailable, continuing without it");
                Vec::new()
            }
        };
        debug!(turns = history.len(), "History loaded");
        stage(Stage::HistoryLoaded);

        let messages = assemble(&AssemblyInput {
            history: &history,
            query: &input.query,
            context: input.context.as_deref(),
            label: &self.context_label,
        });
        let request = ModelRequest {
            model: input.model.clone(),
            system: self.policy.text.clone(),
            messages,
        };
        let raw = self.invoker.invoke(request).await.map_err(|e| {
            warn!(invoker = %self.invoker.name(), model = %input.model, error = %e, "Model call failed");
            Error::Model(e)
        })?;
        stage(Stage::ModelInvoked);

        let reply = if self.escalation_enabled {
            extract_escalation(&raw)
        } else {
            ExtractedReply::passthrough(raw)
        };
        if reply.escalation_needed {
            info!(reason = %reply.escalation_reason, "Escalation requested");
        }
        stage(Stage::SignalExtracted);

        let exchange = Exchange {
            session_id: input.session_id.clone(),
            user_id: input.user_id.clone(),
            query: input.query,
            model: input.model.clone(),
            reply: reply.text.clone(),
        };
        let decision = DecisionRecord {
            session_id: input.session_id,
            user_id: input.user_id,
            model_used: input.model,
            flags: input.flags,
            escalation_needed: reply.escalation_needed,
            escalation_reason: reply.escalation_reason.clone(),
            policy: self.policy.label(),
            timestamp: chrono::Utc::now(),
        };
        let writes = persist(self.recorder.clone(), self.decisions.clone(), exchange, decision);
        let persisted = match self.persistence {
            PersistenceMode::Awaited => Some(writes.await),
            PersistenceMode::Detached => {
                tokio::spawn(writes.in_current_span());
                None
            }
        };
        stage(Stage::Persisted);

        stage(Stage::Responded);
        Ok(ChatOutcome { reply, persisted })
    }
}

fn stage(stage: Stage) {
    debug!(stage = %stage, "Pipeline stage");
}

async fn persist(
    recorder: TurnRecorder,
    decisions: Option<Arc<dyn DecisionLog>>,
    exchange: Exchange,
    decision: DecisionRecord,
) -> RecordReport {
    let report = recorder.record(exchange).await;
    if let Some(log) = decisions
        && let Err(e) = log.record(decision).await
    {
        warn!(error = %e, "Failed to record decision");
    }
    report
}
