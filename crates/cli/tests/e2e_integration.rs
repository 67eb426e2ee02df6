//! End-to-end tests for the turnrelay HTTP relay.
//!
//! These drive `POST /chat` through the real router and pipeline, with
//! either a scripted invoker or a local stand-in for the Anthropic API,
//! and check what ends up in the history store.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use turnrelay_agent::ChatPipeline;
use turnrelay_config::{AppConfig, Policy};
use turnrelay_core::error::{ModelError, PersistenceError};
use turnrelay_core::message::Role;
use turnrelay_core::provider::{ModelInvoker, ModelRequest};
use turnrelay_core::store::{DecisionLog, HistoryStore};
use turnrelay_core::turn::{DecisionRecord, Turn};
use turnrelay_gateway::{AppState, build_router};
use turnrelay_memory::{InMemoryStore, SqliteStore, Stores};
use turnrelay_providers::AnthropicInvoker;

// ── Test doubles ─────────────────────────────────────────────────────────

/// Returns one fixed reply and records every request.
struct ScriptedInvoker {
    reply: String,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedInvoker {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.into(),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ModelInvoker for ScriptedInvoker {
    fn name(&self) -> &str {
        "e2e_scripted"
    }

    async fn invoke(&self, request: ModelRequest) -> Result<String, ModelError> {
        self.requests.lock().unwrap().push(request);
        Ok(self.reply.clone())
    }
}

/// A store whose reads and/or writes fail.
struct FlakyStore {
    inner: InMemoryStore,
    fail_reads: bool,
    fail_writes: bool,
}

#[async_trait::async_trait]
impl HistoryStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn read_recent(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, PersistenceError> {
        if self.fail_reads {
            return Err(PersistenceError::QueryFailed("store unreachable".into()));
        }
        self.inner.read_recent(session_id, limit).await
    }

    async fn append(&self, turn: Turn) -> Result<(), PersistenceError> {
        if self.fail_writes {
            return Err(PersistenceError::Storage("store unreachable".into()));
        }
        self.inner.append(turn).await
    }
}

#[async_trait::async_trait]
impl DecisionLog for FlakyStore {
    async fn record(&self, record: DecisionRecord) -> Result<(), PersistenceError> {
        if self.fail_writes {
            return Err(PersistenceError::Storage("store unreachable".into()));
        }
        self.inner.record(record).await
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn policy() -> Policy {
    Policy {
        name: "e2e".into(),
        version: "1.0.0".into(),
        description: None,
        text: "Answer briefly. Escalate with <!-- ESCALATE: reason --> when needed.".into(),
    }
}

fn app_with(invoker: Arc<dyn ModelInvoker>, stores: Stores) -> axum::Router {
    let config = AppConfig::default();
    let pipeline = ChatPipeline::from_config(&config, invoker, stores, policy());
    build_router(Arc::new(AppState::new(&config, pipeline)))
}

async fn post_chat(app: axum::Router, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri("/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ── Chat flow ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_chat_extracts_escalation_and_records_two_turns() {
    let store = Arc::new(InMemoryStore::new());
    let app = app_with(
        ScriptedInvoker::new("Buenas <!-- ESCALATE: test -->"),
        Stores::shared(store.clone()),
    );

    let (status, body) = post_chat(app, json!({"query": "hola", "session_id": "s1"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "Buenas");
    assert_eq!(body["escalation_needed"], true);
    assert_eq!(body["escalation_reason"], "test");
    assert_eq!(body["confidence"], 0.85);
    assert_eq!(body["memory_updated"], true);

    let turns = store.turns("s1").await;
    assert_eq!(turns.len(), 2);
    assert_eq!((turns[0].role, turns[0].content.as_str()), (Role::User, "hola"));
    assert_eq!((turns[1].role, turns[1].content.as_str()), (Role::Assistant, "Buenas"));
}

#[tokio::test]
async fn e2e_read_failure_still_calls_model() {
    let invoker = ScriptedInvoker::new("todo bien");
    let store = Arc::new(FlakyStore {
        inner: InMemoryStore::new(),
        fail_reads: true,
        fail_writes: false,
    });
    let app = app_with(invoker.clone(), Stores::shared(store.clone()));

    let (status, body) = post_chat(app, json!({"query": "hola", "session_id": "s1"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "todo bien");

    let requests = invoker.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].messages.len(), 1);
    assert_eq!(store.inner.turns("s1").await.len(), 2);
}

#[tokio::test]
async fn e2e_write_failure_returns_cleaned_reply() {
    let store = Arc::new(FlakyStore {
        inner: InMemoryStore::new(),
        fail_reads: false,
        fail_writes: true,
    });
    let app = app_with(
        ScriptedInvoker::new("Estoy aquí. <!-- ESCALATE: risk -->"),
        Stores::shared(store),
    );

    let (status, body) = post_chat(app, json!({"query": "hola", "session_id": "s1"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "Estoy aquí.");
    assert_eq!(body["memory_updated"], true);
}

#[tokio::test]
async fn e2e_context_reaches_model_but_not_transcript() {
    let invoker = ScriptedInvoker::new("ok");
    let store = Arc::new(InMemoryStore::new());
    let app = app_with(invoker.clone(), Stores::shared(store.clone()));

    let (status, _) = post_chat(
        app,
        json!({
            "query": "¿Qué dice la sección 2?",
            "session_id": "s1",
            "corpus_context": "Sección 2: visitas los fines de semana."
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let sent = &invoker.requests()[0].messages[0].content;
    assert_eq!(
        sent,
        "Sección 2: visitas los fines de semana.\n\n---\n\n**Paty's message:**\n¿Qué dice la sección 2?"
    );
    assert_eq!(store.turns("s1").await[0].content, "¿Qué dice la sección 2?");
}

#[tokio::test]
async fn e2e_history_flows_into_next_request() {
    let invoker = ScriptedInvoker::new("ok");
    let store = Arc::new(InMemoryStore::new());

    for query in ["uno", "dos"] {
        let app = app_with(invoker.clone(), Stores::shared(store.clone()));
        let (status, _) = post_chat(app, json!({"query": query, "session_id": "s1"})).await;
        assert_eq!(status, StatusCode::OK);
    }

    let second = &invoker.requests()[1];
    let contents: Vec<&str> = second.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["uno", "ok", "dos"]);
    assert_eq!(second.system, policy().text);
}

// ── Full stack: Anthropic stand-in + SQLite ──────────────────────────────

type Captured = Arc<Mutex<Vec<Value>>>;

/// Serves `POST /v1/messages`, recording each body and replying with a
/// numbered text block.
async fn fake_anthropic(captured: Captured) -> String {
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::post;

    async fn messages(
        State(captured): State<Captured>,
        headers: HeaderMap,
        axum::Json(body): axum::Json<Value>,
    ) -> (StatusCode, axum::Json<Value>) {
        if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some("sk-e2e") {
            return (StatusCode::UNAUTHORIZED, axum::Json(json!({"error": "bad key"})));
        }
        let n = {
            let mut seen = captured.lock().unwrap();
            seen.push(body);
            seen.len()
        };
        let text = if n == 1 {
            "Hola Paty <!-- ESCALATE: first contact -->".to_string()
        } else {
            format!("reply {n}")
        };
        (
            StatusCode::OK,
            axum::Json(json!({
                "id": format!("msg_{n}"),
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": text}],
                "stop_reason": "end_turn"
            })),
        )
    }

    let app = axum::Router::new()
        .route("/v1/messages", post(messages))
        .with_state(captured);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn e2e_full_stack_with_sqlite_history() {
    let captured = Captured::default();
    let base_url = fake_anthropic(captured.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    let db = format!("sqlite://{}", dir.path().join("relay.db").display());
    let store = Arc::new(SqliteStore::open(&db).await.unwrap());
    let invoker = Arc::new(AnthropicInvoker::new(Some("sk-e2e".into())).with_base_url(base_url));

    let (status, first) = post_chat(
        app_with(invoker.clone(), Stores::shared(store.clone())),
        json!({"query": "hola", "session_id": "s1", "route": "default"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["response"], "Hola Paty");
    assert_eq!(first["escalation_reason"], "first contact");

    let (status, second) = post_chat(
        app_with(invoker, Stores::shared(store.clone())),
        json!({"query": "¿cómo estás?", "session_id": "s1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["response"], "reply 2");
    assert_eq!(second["escalation_needed"], false);

    let bodies = captured.lock().unwrap().clone();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[1]["model"], "claude-sonnet-4-5-20250929");
    assert_eq!(bodies[1]["max_tokens"], 4096);
    assert_eq!(bodies[1]["system"], policy().text);
    let roles: Vec<&str> = bodies[1]["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, ["user", "assistant", "user"]);
    // The stored assistant turn is the cleaned text.
    assert_eq!(bodies[1]["messages"][1]["content"], "Hola Paty");

    let turns = store.read_recent("s1", 20).await.unwrap();
    let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, ["hola", "Hola Paty", "¿cómo estás?", "reply 2"]);
    assert_eq!(store.decision_count("s1").await.unwrap(), 2);
}

#[tokio::test]
async fn e2e_missing_api_key_fails_without_network() {
    let captured = Captured::default();
    let base_url = fake_anthropic(captured.clone()).await;
    let store = Arc::new(InMemoryStore::new());
    let invoker = Arc::new(AnthropicInvoker::new(None).with_base_url(base_url));

    let (status, body) = post_chat(
        app_with(invoker, Stores::shared(store.clone())),
        json!({"query": "hola", "session_id": "s1"}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("ANTHROPIC_API_KEY"));
    assert!(captured.lock().unwrap().is_empty());
    assert!(store.turns("s1").await.is_empty());
}

#[tokio::test]
async fn e2e_upstream_rejection_propagates_status() {
    let captured = Captured::default();
    let base_url = fake_anthropic(captured).await;
    let invoker = Arc::new(AnthropicInvoker::new(Some("wrong-key".into())).with_base_url(base_url));

    let (status, body) = post_chat(
        app_with(invoker, Stores::shared(Arc::new(InMemoryStore::new()))),
        json!({"query": "hola"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("bad key"));
}
