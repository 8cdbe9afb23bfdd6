use axum::{Json, Router, routing::post};

use crate::{
    dto::address::{AddressInput, AddressValidation},
    error::AppResult,
    response::ApiResponse,
    routes::extract::ApiJson,
    services::address_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/validate", post(validate_address))
}

/// 200 for any well-formed body; the verdict is in the body.
#[utoipa::path(
    post,
    path = "/api/address/validate",
    request_body = AddressInput,
    responses(
        (status = 200, description = "Validation verdict", body = ApiResponse<AddressValidation>),
        (status = 400, description = "Body is not a JSON address object"),
    ),
    tag = "Address"
)]
pub async fn validate_address(
    ApiJson(payload): ApiJson<AddressInput>,
) -> AppResult<Json<ApiResponse<AddressValidation>>> {
    let verdict = address_service::check_address(&payload);
    Ok(Json(ApiResponse::ok("Address checked", verdict)))
}
