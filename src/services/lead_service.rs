use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, QueryOrder, QuerySelect, Set};
use uuid::Uuid;

use crate::{
    audit,
    dto::leads::{CreateLeadRequest, LeadList},
    entity::leads::{ActiveModel as LeadActive, Column as LeadCol, Entity as Leads},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Lead,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::convert::lead_from_entity,
    state::AppState,
};

fn required(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn validate_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_ascii_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if !valid {
        return Err(AppError::BadRequest("email is invalid".into()));
    }
    Ok(email)
}

pub async fn create_lead(
    state: &AppState,
    payload: CreateLeadRequest,
) -> AppResult<ApiResponse<Lead>> {
    let company_name = required(&payload.company_name, "company_name")?;
    let contact_name = required(&payload.contact_name, "contact_name")?;
    let email = validate_email(&payload.email)?;

    let lead = LeadActive {
        id: Set(Uuid::new_v4()),
        company_name: Set(company_name),
        contact_name: Set(contact_name),
        email: Set(email),
        phone: Set(optional(payload.phone)),
        city: Set(optional(payload.city)),
        message: Set(optional(payload.message)),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(lead_id = %lead.id, company = %lead.company_name, "lead captured");
    audit::record(
        &state.pool,
        None,
        "lead_create",
        "leads",
        serde_json::json!({ "lead_id": lead.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Lead received",
        lead_from_entity(lead),
        Some(Meta::empty()),
    ))
}

pub async fn list_leads(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<LeadList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Leads::find().order_by_desc(LeadCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(lead_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Leads",
        LeadList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert_eq!(
            validate_email(" Compras@Restaurante.co ").expect("valid"),
            "compras@restaurante.co"
        );
        for bad in ["", "compras", "@restaurante.co", "compras@localhost", "a@.co"] {
            assert!(validate_email(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn blank_optional_fields_are_dropped() {
        assert_eq!(optional(Some("  ".into())), None);
        assert_eq!(optional(Some(" Medellín ".into())).as_deref(), Some("Medellín"));
        assert!(required("   ", "company_name").is_err());
    }
}
