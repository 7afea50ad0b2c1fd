//! REST endpoints adapting the lifecycle controller, neutralization engine,
//! and meeting chat. No business logic lives here; handlers unwrap request
//! bodies, call the core, and map the error taxonomy onto status codes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::agent::chat::ChatTurn;
use crate::agent::{MeetingChat, Neutralizer};
use crate::error::{Error, MeetingError, QuotaError, StoreError, TaskError};
use crate::meetings::MeetingLifecycle;
use crate::meetings::model::{Actor, NewMeeting, NewTask, TaskStatus};

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<MeetingLifecycle>,
    pub neutralizer: Arc<Neutralizer>,
    pub chat: Arc<MeetingChat>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Store(StoreError::NotFound { .. }) | Error::Task(TaskError::NotFound { .. }) => {
                StatusCode::NOT_FOUND
            }
            Error::Store(StoreError::Conflict { .. })
            | Error::Task(TaskError::NeutralizationInFlight { .. })
            | Error::Meeting(MeetingError::SummaryInProgress { .. }) => StatusCode::CONFLICT,
            Error::Quota(QuotaError::Exhausted { .. }) => StatusCode::TOO_MANY_REQUESTS,
            Error::Meeting(MeetingError::InvalidTransition { .. })
            | Error::Meeting(MeetingError::NoAudio { .. })
            | Error::Meeting(MeetingError::SummaryNotReady { .. })
            | Error::Task(TaskError::AlreadyComplete { .. })
            | Error::Task(TaskError::InvalidTransition { .. }) => StatusCode::BAD_REQUEST,
            Error::Inference(_) => StatusCode::BAD_GATEWAY,
            Error::Task(TaskError::NeutralizationFailed { .. })
            | Error::Config(_)
            | Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/meetings", post(create_meeting).get(list_meetings))
        .route("/api/meetings/tasks/all", get(all_tasks))
        .route("/api/meetings/{meeting_id}", get(get_meeting))
        .route("/api/meetings/{meeting_id}/join", post(join_meeting))
        .route("/api/meetings/{meeting_id}/end", post(end_meeting))
        .route("/api/meetings/{meeting_id}/audio", post(attach_audio))
        .route(
            "/api/meetings/{meeting_id}/summary",
            get(summary_status).post(trigger_summary),
        )
        .route("/api/meetings/{meeting_id}/tasks", post(add_task))
        .route(
            "/api/meetings/{meeting_id}/tasks/{task_id}/status",
            patch(update_task_status),
        )
        .route(
            "/api/meetings/{meeting_id}/tasks/{task_id}/neutralize",
            post(neutralize_task),
        )
        .route("/api/meetings/{meeting_id}/chat", post(chat_with_meeting))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

async fn create_meeting(
    State(state): State<AppState>,
    Json(params): Json<NewMeeting>,
) -> Result<impl IntoResponse, Error> {
    let meeting = state.lifecycle.create(params).await?;
    Ok((StatusCode::CREATED, Json(meeting)))
}

async fn list_meetings(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    Ok(Json(state.lifecycle.list().await?))
}

async fn get_meeting(
    State(state): State<AppState>,
    Path(meeting_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    Ok(Json(state.lifecycle.get(meeting_id).await?))
}

async fn all_tasks(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    Ok(Json(state.lifecycle.all_tasks().await?))
}

async fn join_meeting(
    State(state): State<AppState>,
    Path(meeting_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    Ok(Json(state.lifecycle.join(meeting_id).await?))
}

async fn end_meeting(
    State(state): State<AppState>,
    Path(meeting_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    Ok(Json(state.lifecycle.end(meeting_id).await?))
}

#[derive(Deserialize)]
struct AttachAudioBody {
    artifact_path: String,
}

async fn attach_audio(
    State(state): State<AppState>,
    Path(meeting_id): Path<Uuid>,
    Json(body): Json<AttachAudioBody>,
) -> Result<impl IntoResponse, Error> {
    let meeting = state
        .lifecycle
        .attach_audio(meeting_id, &body.artifact_path)
        .await?;
    Ok(Json(serde_json::json!({
        "message": "Audio attached. Summary generation started.",
        "audio_path": meeting.audio_path,
    })))
}

async fn summary_status(
    State(state): State<AppState>,
    Path(meeting_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    Ok(Json(state.lifecycle.summary_status(meeting_id).await?))
}

async fn trigger_summary(
    State(state): State<AppState>,
    Path(meeting_id): Path<Uuid>,
) -> Result<impl IntoResponse, Error> {
    Ok(Json(state.lifecycle.trigger_summary(meeting_id).await?))
}

async fn add_task(
    State(state): State<AppState>,
    Path(meeting_id): Path<Uuid>,
    Json(params): Json<NewTask>,
) -> Result<impl IntoResponse, Error> {
    let task = state.lifecycle.add_task(meeting_id, params).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[derive(Deserialize)]
struct UpdateStatusBody {
    status: TaskStatus,
}

async fn update_task_status(
    State(state): State<AppState>,
    Path((meeting_id, task_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateStatusBody>,
) -> Result<impl IntoResponse, Error> {
    let task = state
        .lifecycle
        .update_task_status(meeting_id, task_id, body.status)
        .await?;
    Ok(Json(task))
}

/// Actor identity resolved by the (external) auth layer and forwarded here.
#[derive(Deserialize)]
struct NeutralizeBody {
    actor_id: String,
    actor_name: String,
}

async fn neutralize_task(
    State(state): State<AppState>,
    Path((meeting_id, task_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<NeutralizeBody>,
) -> Result<impl IntoResponse, Error> {
    let actor = Actor::new(body.actor_id, body.actor_name);
    let task = state
        .neutralizer
        .neutralize(meeting_id, task_id, &actor)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "task": task })))
}

#[derive(Deserialize)]
struct ChatBody {
    message: String,
    #[serde(default)]
    history: Vec<ChatTurn>,
}

async fn chat_with_meeting(
    State(state): State<AppState>,
    Path(meeting_id): Path<Uuid>,
    Json(body): Json<ChatBody>,
) -> Result<Response, Error> {
    if body.message.trim().is_empty() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Message is required" })),
        )
            .into_response());
    }
    let reply = state
        .chat
        .ask(meeting_id, &body.message, &body.history)
        .await?;
    Ok(Json(serde_json::json!({ "reply": reply })).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = Error::from(StoreError::meeting_not_found(Uuid::new_v4()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn quota_maps_to_429() {
        let err = Error::from(QuotaError::Exhausted {
            actor_id: "u1".into(),
        });
        assert_eq!(err.into_response().status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = Error::from(TaskError::NeutralizationInFlight {
            task_id: Uuid::new_v4(),
        });
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn terminal_failure_maps_to_500() {
        let err = Error::from(TaskError::NeutralizationFailed {
            task_id: Uuid::new_v4(),
        });
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
