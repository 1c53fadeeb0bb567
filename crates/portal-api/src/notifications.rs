use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{debug, info};

use portal_db::models::NewNotification;
use portal_types::api::{
    ActionResponse, Claims, CreateNotificationRequest, CreateNotificationResponse,
    MarkAllReadRequest, MarkReadRequest, NotificationsResponse,
};
use portal_types::models::is_privileged;

use crate::auth::AppState;
use crate::convert;
use crate::error::ApiError;
use crate::run_db;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub action: String,
}

/// GET /notifications?action=check: everything addressed to the caller
/// that they have not dismissed.
pub async fn check(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<NotificationsResponse>, ApiError> {
    if query.action != "check" {
        return Err(ApiError::validation("Invalid action"));
    }

    let user_id = claims.sub;
    let role = claims.role.clone();
    let rows = run_db(&state, move |db| db.unread_notifications(user_id, &role)).await?;

    let notifications: Vec<_> = rows.into_iter().map(convert::notification_from_row).collect();
    Ok(Json(NotificationsResponse {
        success: true,
        count: notifications.len(),
        notifications,
    }))
}

/// POST /notifications?action=mark_read|mark_all_read|create
///
/// Marking is idempotent: repeating it, or marking something already gone,
/// still succeeds.
pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<NotificationQuery>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    match query.action.as_str() {
        "mark_read" => {
            let req: MarkReadRequest = parse_body(body)?;
            mark_read(&state, &claims, req).await.map(IntoResponse::into_response)
        }
        "mark_all_read" => {
            let req: MarkAllReadRequest = parse_body(body)?;
            mark_all_read(&state, &claims, req).await.map(IntoResponse::into_response)
        }
        "create" => {
            let req: CreateNotificationRequest = parse_body(body)?;
            create(&state, &claims, req).await.map(IntoResponse::into_response)
        }
        _ => Err(ApiError::validation("Invalid action")),
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: serde_json::Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| {
        debug!("Bad notification request body: {}", e);
        ApiError::validation("Invalid request body")
    })
}

async fn mark_read(
    state: &AppState,
    claims: &Claims,
    req: MarkReadRequest,
) -> Result<Json<ActionResponse>, ApiError> {
    if req.notification_id <= 0 {
        return Err(ApiError::validation("Invalid notification"));
    }

    let user_id = claims.sub;
    let role = claims.role.clone();
    let changed = run_db(state, move |db| {
        db.mark_notification_read(user_id, &role, req.notification_id)
    })
    .await?;

    if !changed {
        debug!("Notification {} already read by {}", req.notification_id, user_id);
    }
    Ok(Json(ActionResponse::ok()))
}

async fn mark_all_read(
    state: &AppState,
    claims: &Claims,
    req: MarkAllReadRequest,
) -> Result<Json<ActionResponse>, ApiError> {
    if req.kind != "all" {
        return Err(ApiError::validation("Unsupported type"));
    }

    let user_id = claims.sub;
    let role = claims.role.clone();
    let marked = run_db(state, move |db| db.mark_all_notifications_read(user_id, &role)).await?;

    debug!("User {} dismissed {} notifications", user_id, marked);
    Ok(Json(ActionResponse::ok()))
}

async fn create(
    state: &AppState,
    claims: &Claims,
    req: CreateNotificationRequest,
) -> Result<(StatusCode, Json<CreateNotificationResponse>), ApiError> {
    if !is_privileged(&claims.role) {
        return Err(ApiError::Forbidden);
    }
    if req.title.trim().is_empty() || req.message.trim().is_empty() {
        return Err(ApiError::validation("Title and message are required"));
    }
    let category = match req.category.trim() {
        "" => "announcement".to_string(),
        other => other.to_string(),
    };

    let author = claims.username.clone();
    let id = run_db(state, move |db| {
        db.insert_notification(&NewNotification {
            user_id: req.user_id,
            target_role: req.target_role.as_deref(),
            category: &category,
            title: req.title.trim(),
            message: req.message.trim(),
            url: req.url.as_deref(),
        })
    })
    .await?;

    info!("{} created notification {}", author, id);
    Ok((
        StatusCode::CREATED,
        Json(CreateNotificationResponse { success: true, id }),
    ))
}
