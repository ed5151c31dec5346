pub mod billing_cuts;
pub mod leads;
pub mod order_items;
pub mod orders;
pub mod products;

pub use billing_cuts::Entity as BillingCuts;
pub use leads::Entity as Leads;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use products::Entity as Products;
