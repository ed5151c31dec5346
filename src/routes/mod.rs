use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod catalog;
pub mod checkout;
pub mod doc;
pub mod health;
pub mod leads;
pub mod params;
pub mod payments;
pub mod picking;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/products", catalog::router())
        .nest("/checkout", checkout::router())
        .nest("/leads", leads::router())
        .nest("/picking", picking::router())
        .nest("/admin", admin::router())
        .merge(payments::router())
}
