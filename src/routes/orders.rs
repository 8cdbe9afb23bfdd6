use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::orders::{CreateOrderRequest, CreateOrderResponse, OrderDetail},
    error::AppResult,
    response::ApiResponse,
    routes::extract::{ApiJson, ApiPath},
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/{id}", get(get_order))
}

#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<CreateOrderResponse>),
        (status = 400, description = "Malformed body or invalid items, delivery method, address or slot"),
        (status = 404, description = "Unknown product"),
        (status = 409, description = "Insufficient stock or slot full"),
        (status = 503, description = "Store unavailable, safe to retry"),
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateOrderRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<CreateOrderResponse>>)> {
    let created = order_service::create_order(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Order created", created)),
    ))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with items and status history", body = ApiResponse<OrderDetail>),
        (status = 400, description = "Malformed order id"),
        (status = 404, description = "Not Found"),
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<ApiResponse<OrderDetail>>> {
    let detail = order_service::get_order(&state, id).await?;
    Ok(Json(ApiResponse::ok("OK", detail)))
}
