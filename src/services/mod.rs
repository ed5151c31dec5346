pub mod admin_service;
pub mod catalog_service;
pub mod checkout_service;
pub(crate) mod convert;
pub mod lead_service;
pub mod payments;
pub mod picking;
pub mod store;
