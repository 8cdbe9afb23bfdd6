use axum::{
    Json, Router,
    extract::State,
    routing::get,
};

use crate::{
    error::AppResult,
    dto::slots::SlotList,
    response::ApiResponse,
    routes::{extract::ApiQuery, params::SlotQuery},
    services::slot_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_slots))
}

#[utoipa::path(
    get,
    path = "/api/slots",
    params(SlotQuery),
    responses(
        (status = 200, description = "The day's eight delivery windows with remaining capacity", body = ApiResponse<SlotList>),
        (status = 400, description = "Missing or invalid date"),
        (status = 503, description = "Availability check failed, safe to retry"),
    ),
    tag = "Slots"
)]
pub async fn get_slots(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SlotQuery>,
) -> AppResult<Json<ApiResponse<SlotList>>> {
    let slots = slot_service::get_slots(&state, query.date.as_deref()).await?;
    Ok(Json(ApiResponse::ok("Delivery slots", SlotList { slots })))
}
