use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Lead;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLeadRequest {
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LeadList {
    pub items: Vec<Lead>,
}
