use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::services::picking::{PickTask, TaskSnapshot};

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct OpenSessionRequest {
    pub cell: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectCellRequest {
    pub cell: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CellList {
    pub items: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionView {
    pub session_id: Uuid,
    pub snapshot: TaskSnapshot,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PickConfirmation {
    pub session_id: Uuid,
    pub picked: PickTask,
}
