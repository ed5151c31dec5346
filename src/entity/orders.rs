use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_name: String,
    pub company_id: Option<Uuid>,
    pub status: String,
    pub delivery_date: Option<Date>,
    pub total_amount: i64,
    pub currency: String,
    pub billing_cut_id: Option<Uuid>,
    pub gateway_transaction_id: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::billing_cuts::Entity",
        from = "Column::BillingCutId",
        to = "super::billing_cuts::Column::Id"
    )]
    BillingCuts,
    #[sea_orm(has_many = "super::order_items::Entity")]
    OrderItems,
}

impl Related<super::billing_cuts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BillingCuts.def()
    }
}

impl Related<super::order_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
