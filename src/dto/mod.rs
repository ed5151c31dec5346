pub mod admin;
pub mod catalog;
pub mod checkout;
pub mod leads;
pub mod orders;
pub mod payments;
pub mod picking;
