use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::leads::CreateLeadRequest,
    error::AppResult,
    models::Lead,
    response::ApiResponse,
    services::lead_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(create_lead))
}

#[utoipa::path(
    post,
    path = "/api/leads",
    request_body = CreateLeadRequest,
    responses(
        (status = 200, description = "Lead stored", body = ApiResponse<Lead>),
        (status = 400, description = "Missing company, contact or a bad email"),
    ),
    tag = "Leads"
)]
pub async fn create_lead(
    State(state): State<AppState>,
    Json(payload): Json<CreateLeadRequest>,
) -> AppResult<Json<ApiResponse<Lead>>> {
    let resp = lead_service::create_lead(&state, payload).await?;
    Ok(Json(resp))
}
