use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppResult,
    services::store::{OrderStore, PickRow},
};

/// A pending pick shown on the terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PickTask {
    pub item_id: Uuid,
    pub order_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub picked_quantity: i32,
    pub unit: String,
    pub customer_name: String,
}

impl PickTask {
    /// Quantity already gathered, or `None` when nothing has been picked yet.
    pub fn already_picked(&self) -> Option<i32> {
        (self.picked_quantity > 0).then_some(self.picked_quantity)
    }

    pub fn remaining(&self) -> i32 {
        self.quantity - self.picked_quantity
    }
}

/// Pending tasks for `cell`, ordered by product name (case-insensitive,
/// stable on ties).
pub fn project_tasks(rows: Vec<PickRow>, cell: &str) -> Vec<PickTask> {
    let mut tasks: Vec<PickTask> = rows
        .into_iter()
        .filter(|row| {
            row.order_status.is_pickable()
                && row.category == cell
                && row.picked_quantity < row.quantity
        })
        .map(|row| PickTask {
            item_id: row.item_id,
            order_id: row.order_id,
            product_name: row.product_name,
            quantity: row.quantity,
            picked_quantity: row.picked_quantity,
            unit: row.unit,
            customer_name: row.customer_name,
        })
        .collect();

    tasks.sort_by_cached_key(|task| task.product_name.to_lowercase());
    tasks
}

pub async fn load_tasks(store: &dyn OrderStore, cell: &str) -> AppResult<Vec<PickTask>> {
    let rows = store.pick_rows(cell).await?;
    Ok(project_tasks(rows, cell))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;

    fn row(name: &str, category: &str, status: OrderStatus, qty: i32, picked: i32) -> PickRow {
        PickRow {
            item_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            order_status: status,
            customer_name: "Tienda La 14".into(),
            product_name: name.into(),
            category: category.into(),
            unit: "kg".into(),
            quantity: qty,
            picked_quantity: picked,
        }
    }

    #[test]
    fn keeps_only_pending_lines_of_pickable_orders_in_cell() {
        let rows = vec![
            row("Mango", "Frutas", OrderStatus::Approved, 10, 0),
            row("Papaya", "Frutas", OrderStatus::Processing, 4, 1),
            row("Banano", "Frutas", OrderStatus::PendingApproval, 3, 0),
            row("Pera", "Frutas", OrderStatus::Cancelled, 3, 0),
            row("Uva", "Frutas", OrderStatus::Approved, 5, 5),
            row("Tomate", "Verduras", OrderStatus::Approved, 8, 0),
        ];

        let names: Vec<_> = project_tasks(rows, "Frutas")
            .into_iter()
            .map(|t| t.product_name)
            .collect();
        assert_eq!(names, vec!["Mango", "Papaya"]);
    }

    #[test]
    fn sorts_case_insensitively_and_stably() {
        let first = row("aguacate", "Frutas", OrderStatus::Approved, 2, 0);
        let second = row("Aguacate", "Frutas", OrderStatus::Approved, 3, 0);
        let rows = vec![
            row("Zapote", "Frutas", OrderStatus::Approved, 1, 0),
            first.clone(),
            row("mora", "Frutas", OrderStatus::Approved, 1, 0),
            second.clone(),
        ];

        let tasks = project_tasks(rows, "Frutas");
        let ids: Vec<_> = tasks.iter().map(|t| t.item_id).collect();
        assert_eq!(ids[0], first.item_id);
        assert_eq!(ids[1], second.item_id);
        assert_eq!(tasks[2].product_name, "mora");
        assert_eq!(tasks[3].product_name, "Zapote");
    }

    #[test]
    fn fully_picked_line_is_excluded_and_untouched_line_hides_picked() {
        let rows = vec![
            row("Mango", "Frutas", OrderStatus::Approved, 10, 10),
            row("Lulo", "Frutas", OrderStatus::Approved, 6, 0),
            row("Fresa", "Frutas", OrderStatus::Approved, 6, 2),
        ];
        let tasks = project_tasks(rows, "Frutas");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].product_name, "Fresa");
        assert_eq!(tasks[0].already_picked(), Some(2));
        assert_eq!(tasks[0].remaining(), 4);
        assert_eq!(tasks[1].product_name, "Lulo");
        assert_eq!(tasks[1].already_picked(), None);
    }

    #[test]
    fn empty_cell_projects_to_empty_list() {
        assert!(project_tasks(Vec::new(), "Frutas").is_empty());
    }
}
