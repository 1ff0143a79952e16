use axum::{extract::State, Json};

use crate::{chat::chat_dto::ApiResponse, error::Result, extract::ApiQuery, state::AppState};

use super::{
    stats_dto::{TimelineQuery, TimelineResponse},
    stats_models::OverviewStats,
};

/// Aggregate counts across users, appointments and chat
#[utoipa::path(
    get,
    path = "/api/admin/stats/overview",
    tag = "admin",
    responses(
        (status = 200, description = "Overview counts", body = OverviewStats),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_overview(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<OverviewStats>>> {
    let overview = state.stats_service.overview().await?;
    Ok(Json(ApiResponse::data(overview)))
}

/// New appointments or users per day, week or month
#[utoipa::path(
    get,
    path = "/api/admin/stats/timeline",
    tag = "admin",
    params(TimelineQuery),
    responses(
        (status = 200, description = "Zero-filled buckets, oldest first", body = TimelineResponse),
        (status = 400, description = "Invalid range"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_timeline(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TimelineQuery>,
) -> Result<Json<ApiResponse<TimelineResponse>>> {
    let timeline = state.stats_service.timeline(query).await?;
    Ok(Json(ApiResponse::data(timeline)))
}
