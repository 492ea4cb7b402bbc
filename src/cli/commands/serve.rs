//! HTTP service for the product, outlet and chat endpoints.
//!
//! The lookup tools call `/products` and `/outlets`; `/chat` runs agent turns
//! for browser clients, one memory per session id.

use crate::agent::Agent;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::memory::SessionStore;
use crate::orchestrator::Orchestrator;
use crate::outlets::Text2Sql;
use crate::products;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;

/// Shared application state.
///
/// A capability whose setup failed at startup is `None` for the process lifetime.
struct AppState {
    agent: Option<Agent>,
    text2sql: Option<Text2Sql>,
    sessions: SessionStore,
}

/// Run the HTTP service.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);

    let orchestrator = Orchestrator::new(settings.clone())?;

    let agent = match preflight::check(Operation::Chat, &settings).and_then(|_| orchestrator.build_agent()) {
        Ok(agent) => Some(agent),
        Err(e) => {
            error!("Chat disabled: {}", e);
            Output::warning(&format!("Chat disabled: {}", e));
            None
        }
    };

    let text2sql = match preflight::check(Operation::Outlets, &settings)
        .and_then(|_| orchestrator.build_text2sql())
    {
        Ok(text2sql) => Some(text2sql),
        Err(e) => {
            error!("Outlet queries disabled: {}", e);
            Output::warning(&format!("Outlet queries disabled: {}", e));
            None
        }
    };

    let state = Arc::new(AppState {
        agent,
        text2sql,
        sessions: SessionStore::new(orchestrator.retention()).with_limits(
            settings.server.max_sessions,
            Duration::from_secs(settings.server.session_idle_secs),
        ),
    });

    let app = router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Barista API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Status", "GET  /");
    Output::kv("Products", "GET  /products?query=...");
    Output::kv("Outlets", "GET  /outlets?query=...");
    Output::kv("Chat", "POST /chat");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(status))
        .route("/products", get(get_products))
        .route("/outlets", get(get_outlets))
        .route("/chat", post(chat))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct LookupParams {
    query: String,
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<Uuid>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    session_id: Uuid,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

// === Handlers ===

async fn status() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "API is running", "message": "Welcome!" }))
}

async fn get_products(Query(params): Query<LookupParams>) -> impl IntoResponse {
    info!("Product query: {}", params.query);
    Json(products::summarize(&params.query))
}

async fn get_outlets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LookupParams>,
) -> Response {
    let Some(text2sql) = state.text2sql.as_ref() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Text2SQL system is not available.",
        );
    };

    match text2sql.answer(&params.query).await {
        Ok(answer) => Json(answer).into_response(),
        Err(e) => {
            error!("Outlet query failed: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "An error occurred while processing your request.",
            )
        }
    }
}

async fn chat(State(state): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> Response {
    let Some(agent) = state.agent.as_ref() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Chat is not available.");
    };

    let session = state.sessions.get_or_create(req.session_id).await;
    let mut session = session.lock().await;
    let outcome = agent.run_turn(&mut session, &req.message).await;

    Json(ChatResponse {
        response: outcome.answer,
        session_id: session.id(),
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{LookupService, LookupTool, Tool};
    use crate::llm::scripted::ScriptedModel;
    use crate::llm::ModelReply;
    use crate::memory::Retention;
    use crate::outlets::OutletStore;

    fn sample_store() -> OutletStore {
        crate::outlets::store::tests::sample_store()
    }

    fn state_with(agent: Option<Agent>, text2sql: Option<Text2Sql>) -> Arc<AppState> {
        Arc::new(AppState {
            agent,
            text2sql,
            sessions: SessionStore::new(Retention::Unbounded),
        })
    }

    fn text2sql_replying(reply: &str) -> Text2Sql {
        let orchestrator = Orchestrator::new(Settings::default()).unwrap();
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::text(reply)]));
        orchestrator.build_text2sql_with(model, sample_store()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_sql_injection_keeps_status_ok() {
        let state = state_with(
            None,
            Some(text2sql_replying(
                "SELECT outlet_name FROM outlets WHERE address LIKE '%Kuala Lumpur%'; SELECT name FROM sqlite_master WHERE type='table';",
            )),
        );

        let response = get_outlets(
            State(state),
            Query(LookupParams {
                query: "Find outlets in KL; SELECT name FROM sqlite_master WHERE type='table';"
                    .to_string(),
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let sql = body["sql_query"].as_str().unwrap().to_lowercase();
        assert!(!sql.contains("sqlite_master"));
        assert!(!sql.contains("union"));
        let results = body["results"].as_str().unwrap().to_lowercase();
        assert!(results.contains("mid valley") || results.contains("suria klcc"));
    }

    #[tokio::test]
    async fn test_outlets_unavailable_without_database() {
        let response = get_outlets(
            State(state_with(None, None)),
            Query(LookupParams {
                query: "outlets in PJ".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_chat_keeps_memory_per_session() {
        let orchestrator = Orchestrator::new(Settings::default()).unwrap();
        let agent_model = Arc::new(ScriptedModel::new(vec![
            ModelReply::text("Which area are you in?"),
            ModelReply::text("There is an outlet in SS2."),
            ModelReply::text("Hello, new visitor!"),
        ]));
        let agent = orchestrator
            .build_agent_with(agent_model.clone(), Arc::new(ScriptedModel::new(vec![])))
            .unwrap();
        let state = state_with(Some(agent), None);

        let first = body_json(
            chat(
                State(state.clone()),
                Json(ChatRequest {
                    message: "Any outlets near me?".to_string(),
                    session_id: None,
                }),
            )
            .await,
        )
        .await;
        let session_id: Uuid = first["session_id"].as_str().unwrap().parse().unwrap();

        let second = body_json(
            chat(
                State(state.clone()),
                Json(ChatRequest {
                    message: "Petaling Jaya".to_string(),
                    session_id: Some(session_id),
                }),
            )
            .await,
        )
        .await;
        assert_eq!(second["response"], "There is an outlet in SS2.");
        assert_eq!(second["session_id"], session_id.to_string());

        let third = body_json(
            chat(
                State(state.clone()),
                Json(ChatRequest {
                    message: "Hi".to_string(),
                    session_id: None,
                }),
            )
            .await,
        )
        .await;
        assert_ne!(third["session_id"], session_id.to_string());

        let requests = agent_model.requests();
        // system + 2 remembered messages + new user message
        assert_eq!(requests[1].messages.len(), 4);
        // A fresh session sees only the system prompt and its own message.
        assert_eq!(requests[2].messages.len(), 2);
        assert_eq!(state.sessions.len().await, 2);
    }

    #[tokio::test]
    async fn test_chat_ignores_client_chosen_session_id() {
        let orchestrator = Orchestrator::new(Settings::default()).unwrap();
        let agent = orchestrator
            .build_agent_with(
                Arc::new(ScriptedModel::new(vec![ModelReply::text("Hello!")])),
                Arc::new(ScriptedModel::new(vec![])),
            )
            .unwrap();
        let state = state_with(Some(agent), None);

        let chosen = Uuid::new_v4();
        let body = body_json(
            chat(
                State(state.clone()),
                Json(ChatRequest {
                    message: "Hi".to_string(),
                    session_id: Some(chosen),
                }),
            )
            .await,
        )
        .await;

        assert_eq!(body["response"], "Hello!");
        assert_ne!(body["session_id"], chosen.to_string());
        assert_eq!(state.sessions.len().await, 1);
    }

    #[tokio::test]
    async fn test_lookup_tools_against_running_service() {
        let state = state_with(
            None,
            Some(text2sql_replying(
                "SELECT outlet_name, operating_hours FROM outlets WHERE address LIKE '%Petaling Jaya%'",
            )),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        let client = reqwest::Client::new();
        let products = LookupTool::new(
            client.clone(),
            &format!("http://{}/products", addr),
            LookupService::Products,
        )
        .unwrap();
        assert!(products.call("ZUS tumbler").await.contains("Tumbler"));

        let outlets = LookupTool::new(
            client,
            &format!("http://{}/outlets", addr),
            LookupService::Outlets,
        )
        .unwrap();
        assert_eq!(
            outlets.call("outlets in PJ").await,
            "[('ZUS Coffee SS2', '7:00 AM - 9:00 PM')]"
        );
    }
}
