pub mod page;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use validator::Validate;

use crate::llm::{RagChain, RagError, SourceRef};
use page::Outcome;

const MAX_CONCURRENT_REQUESTS: usize = 32;
const MAX_QUESTION_CHARS: usize = 2000;

#[derive(Clone)]
pub struct AppState {
    chain: Arc<RagChain>,
    title: Arc<str>,
    subtitle: Arc<str>,
}

impl AppState {
    pub fn new(chain: Arc<RagChain>, title: &str, subtitle: &str) -> Self {
        Self {
            chain,
            title: Arc::from(title),
            subtitle: Arc::from(subtitle),
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct QuestionForm {
    #[serde(default)]
    #[validate(length(max = 2000))]
    question: String,
}

#[derive(Deserialize, Validate)]
pub struct AskRequest {
    #[validate(length(min = 1, max = 2000))]
    question: String,
}

#[derive(Serialize)]
pub struct AskResponse {
    answer: String,
    sources: Vec<SourceRef>,
}

#[derive(Serialize)]
struct ApiResponse {
    status: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiResponse>)>;

fn api_error(code: StatusCode, status: impl Into<String>) -> (StatusCode, Json<ApiResponse>) {
    (code, Json(ApiResponse { status: status.into() }))
}

/// Create and configure the web router
pub fn create_api(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/", get(index_handler).post(question_handler))
        .route("/api/ask", post(ask_handler))
        .route("/health", get(health_check))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(cors)
        .with_state(state)
}

async fn index_handler(State(state): State<AppState>) -> Html<String> {
    Html(page::render(&state.title, &state.subtitle, "", None))
}

async fn question_handler(State(state): State<AppState>, Form(form): Form<QuestionForm>) -> Html<String> {
    let question = form.question.trim();
    if form.validate().is_err() {
        let outcome = Outcome::Warning(format!("Questions are limited to {} characters", MAX_QUESTION_CHARS));
        return Html(page::render(&state.title, &state.subtitle, question, Some(&outcome)));
    }
    let result = state.chain.invoke(question).await;
    if let Err(e) = &result {
        if !matches!(e, RagError::EmptyQuestion) {
            log::error!("Failed to answer question: {}", e);
        }
    }
    let outcome = Outcome::from_result(result);
    Html(page::render(&state.title, &state.subtitle, question, Some(&outcome)))
}

async fn ask_handler(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> ApiResult<AskResponse> {
    let Json(request) = payload.map_err(|rejection| {
        api_error(StatusCode::BAD_REQUEST, format!("Invalid request: {}", rejection.body_text()))
    })?;
    if let Err(e) = request.validate() {
        return Err(api_error(StatusCode::BAD_REQUEST, format!("Invalid request: {}", e)));
    }

    match state.chain.invoke(&request.question).await {
        Ok(answer) => Ok(Json(AskResponse {
            answer: answer.text,
            sources: answer.sources,
        })),
        Err(RagError::EmptyQuestion) => Err(api_error(StatusCode::BAD_REQUEST, RagError::EmptyQuestion.to_string())),
        Err(e) => {
            log::error!("Failed to answer question: {}", e);
            Err(api_error(StatusCode::BAD_GATEWAY, format!("Error occurred: {}", e)))
        }
    }
}

async fn health_check() -> Response {
    Json(ApiResponse {
        status: "healthy".to_string(),
    })
    .into_response()
}
