//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/collection` | Read a collection by date, date range, or full scan |
//! | `POST` | `/api/review` | Mark one document reviewed |
//! | `POST` | `/api/uploads` | Register an uploaded file as a group post |
//! | `GET`  | `/api/posts?member=` | Posts visible to a member |
//! | `POST` | `/api/posts/search` | Posts visible to a user in one category |
//! | `GET`  | `/api/groups` | All groups with their users |
//! | `POST` | `/api/groups/permissions` | Add a member to a group and its posts |
//! | `POST` | `/api/members` | Register a member in an organization |
//! | `POST` | `/api/onboarding` | Create an organization owned by a user |
//! | `POST` | `/api/users/{user_id}` | Merge profile fields into a user |
//! | `POST` | `/api/users/search` | Page through users by name |
//! | `POST` | `/api/requests/update` | Change a support request |
//! | `DELETE` | `/api/requests` | Delete a support request |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": "unauthorized collection: users", "code": "unauthorized_collection" }
//! ```
//!
//! Validation and allow-list failures are 400, missing records the endpoint
//! depends on are 404, and store failures are 500 with the store's message.
//! Unsupported methods on a known path are 405.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use review_desk_core::allow_list::AllowList;
use review_desk_core::collection::{load_collection, CollectionRequest};
use review_desk_core::members::{self, AddMember, Onboarding, UserSearch};
use review_desk_core::posts::{self, UploadRegistration};
use review_desk_core::requests::{self, RequestUpdate};
use review_desk_core::review::{mark_reviewed, ReviewRequest};
use review_desk_core::store::DocumentStore;
use review_desk_core::{DeskError, Document};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Shared state passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub read_allow: Arc<AllowList>,
    pub review_allow: Arc<AllowList>,
    pub full_scan_limit: usize,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self {
            store,
            read_allow: Arc::new(config.collections.read_allow()),
            review_allow: Arc::new(config.collections.review_allow()),
            full_scan_limit: config.collections.full_scan_limit,
        }
    }
}

/// Builds the router over any store.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/collection", get(handle_collection))
        .route("/api/review", post(handle_review))
        .route("/api/uploads", post(handle_upload))
        .route("/api/posts", get(handle_member_posts))
        .route("/api/posts/search", post(handle_post_search))
        .route("/api/groups", get(handle_groups))
        .route("/api/groups/permissions", post(handle_permissions))
        .route("/api/members", post(handle_add_member))
        .route("/api/onboarding", post(handle_onboarding))
        .route("/api/users/search", post(handle_user_search))
        .route("/api/users/{user_id}", post(handle_user_update))
        .route("/api/requests/update", post(handle_request_update))
        .route("/api/requests", delete(handle_request_delete))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the server on `[server].bind` over the configured SQLite store.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::new(pool));
    let state = AppState::new(store, config);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(
        bind = %config.server.bind,
        read = state.read_allow.len(),
        review = state.review_allow.len(),
        "review desk listening"
    );
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: String,
}

/// Error type that converts into an HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            code: self.code.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<DeskError> for AppError {
    fn from(err: DeskError) -> Self {
        let status = match err {
            DeskError::NotFound(_) => StatusCode::NOT_FOUND,
            DeskError::UnauthorizedCollection(_)
            | DeskError::InvalidPayload(_)
            | DeskError::Conflict(_) => StatusCode::BAD_REQUEST,
        };
        AppError {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<DeskError>() {
            Ok(desk) => desk.into(),
            Err(other) => {
                tracing::error!(error = %format!("{:#}", other), "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message: other.to_string(),
                }
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Collection read and review ============

async fn handle_collection(
    State(state): State<AppState>,
    params: Result<Query<CollectionRequest>, QueryRejection>,
) -> ApiResult<Vec<Document>> {
    let Query(request) = params?;
    let docs = load_collection(
        state.store.as_ref(),
        &state.read_allow,
        &request,
        state.full_scan_limit,
    )
    .await?;
    Ok(Json(docs))
}

async fn handle_review(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(body) = body?;
    let request = ReviewRequest::from_json(&body)?;
    let receipt = mark_reviewed(state.store.as_ref(), &state.review_allow, &request).await?;
    Ok(Json(json!({ "reviewedAt": receipt.reviewed_at })))
}

// ============ Uploads, posts, groups ============

async fn handle_upload(
    State(state): State<AppState>,
    body: Result<Json<UploadRegistration>, JsonRejection>,
) -> ApiResult<posts::RegisteredUpload> {
    let Json(upload) = body?;
    Ok(Json(posts::register_upload(state.store.as_ref(), &upload).await?))
}

#[derive(Deserialize)]
struct MemberParams {
    member: Option<String>,
}

async fn handle_member_posts(
    State(state): State<AppState>,
    params: Result<Query<MemberParams>, QueryRejection>,
) -> ApiResult<Vec<Document>> {
    let Query(params) = params?;
    let member = params
        .member
        .filter(|m| !m.is_empty())
        .ok_or_else(|| bad_request("`member` is required"))?;
    Ok(Json(posts::member_posts(state.store.as_ref(), &member).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostSearch {
    user_name: String,
    #[serde(default)]
    categories: Value,
}

async fn handle_post_search(
    State(state): State<AppState>,
    body: Result<Json<PostSearch>, JsonRejection>,
) -> ApiResult<Vec<posts::PostSummary>> {
    let Json(search) = body?;
    Ok(Json(
        posts::posts_by_category(state.store.as_ref(), &search.user_name, &search.categories)
            .await?,
    ))
}

async fn handle_groups(State(state): State<AppState>) -> ApiResult<Vec<posts::GroupSummary>> {
    Ok(Json(posts::list_groups(state.store.as_ref()).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermissionBody {
    group_id: String,
    member: Value,
}

async fn handle_permissions(
    State(state): State<AppState>,
    body: Result<Json<PermissionBody>, JsonRejection>,
) -> ApiResult<posts::PermissionGrant> {
    let Json(body) = body?;
    if body.group_id.is_empty() || body.member.is_null() {
        return Err(bad_request("`groupId` and `member` are required"));
    }
    Ok(Json(
        posts::grant_permission(state.store.as_ref(), &body.group_id, &body.member).await?,
    ))
}

// ============ Members and users ============

async fn handle_add_member(
    State(state): State<AppState>,
    body: Result<Json<AddMember>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = body?;
    let uid = members::add_member(state.store.as_ref(), &req).await?;
    Ok(Json(json!({ "message": "Member added successfully", "uid": uid })))
}

async fn handle_onboarding(
    State(state): State<AppState>,
    body: Result<Json<Onboarding>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(req) = body?;
    let org_id = members::complete_onboarding(state.store.as_ref(), &req).await?;
    Ok(Json(json!({
        "message": "Onboarding completed successfully",
        "organizationId": org_id,
    })))
}

async fn handle_user_update(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(body) = body?;
    let updated = members::update_user(state.store.as_ref(), &user_id, &body).await?;
    Ok(Json(json!({ "message": "User updated successfully", "updated": updated })))
}

async fn handle_user_search(
    State(state): State<AppState>,
    body: Result<Json<UserSearch>, JsonRejection>,
) -> ApiResult<Vec<Document>> {
    let Json(search) = body?;
    Ok(Json(members::search_users(state.store.as_ref(), &search).await?))
}

// ============ Support requests ============

async fn handle_request_update(
    State(state): State<AppState>,
    body: Result<Json<RequestUpdate>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(update) = body?;
    requests::update_request(state.store.as_ref(), &update).await?;
    Ok(Json(json!({ "message": "Request updated successfully" })))
}

#[derive(Deserialize)]
struct DeleteBody {
    #[serde(default)]
    id: String,
}

async fn handle_request_delete(
    State(state): State<AppState>,
    body: Result<Json<DeleteBody>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(body) = body?;
    requests::delete_request(state.store.as_ref(), &body.id).await?;
    Ok(Json(json!({ "message": "Request deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desk_errors_map_to_status() {
        let e: AppError = DeskError::UnauthorizedCollection("users".into()).into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.code, "unauthorized_collection");

        let e: AppError = DeskError::NotFound("Group not found".into()).into();
        assert_eq!(e.status, StatusCode::NOT_FOUND);

        let e: AppError = DeskError::Conflict("No members in the group".into()).into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_other_errors_are_internal() {
        let e: AppError = anyhow::anyhow!("no document to update: c/x").into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.message, "no document to update: c/x");

        let wrapped: anyhow::Error = DeskError::InvalidPayload("bad".into()).into();
        let e: AppError = wrapped.into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
    }
}
