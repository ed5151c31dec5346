use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        admin::{BillingCutList, BillingCutWithOrders, CreateBillingCutRequest, UpdateOrderStatusRequest},
        catalog::{CreateProductRequest, ProductList, UpdateProductRequest},
        checkout::{CheckoutLine, CheckoutRequest, CheckoutResponse},
        leads::{CreateLeadRequest, LeadList},
        orders::{OrderList, OrderWithItems},
        payments::{
            EventSignature, GatewayTransaction, IntegrityRequest, IntegrityResponse,
            PaymentResultView, ResultState, WebhookAck, WebhookData, WebhookEvent,
        },
        picking::{CellList, OpenSessionRequest, PickConfirmation, SelectCellRequest, SessionView},
    },
    models::{BillingCut, Lead, Order, OrderItem, OrderStatus, Product},
    response::{ApiResponse, Meta},
    routes::{admin, catalog, checkout, health, leads, params, payments, picking},
    services::picking::{PickTask, TaskSnapshot},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        catalog::list_products,
        catalog::get_product,
        checkout::checkout,
        leads::create_lead,
        payments::integrity,
        payments::webhook,
        payments::checkout_result,
        payments::sandbox_checkout,
        payments::sandbox_status,
        picking::list_cells,
        picking::open_session,
        picking::get_session,
        picking::select_cell,
        picking::deselect_cell,
        picking::session_events,
        picking::confirm_pick,
        picking::close_session,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::create_product,
        admin::update_product,
        admin::create_billing_cut,
        admin::list_billing_cuts,
        admin::get_billing_cut,
        admin::list_leads
    ),
    components(
        schemas(
            Product,
            Order,
            OrderItem,
            OrderStatus,
            BillingCut,
            Lead,
            ProductList,
            CreateProductRequest,
            UpdateProductRequest,
            OrderList,
            OrderWithItems,
            UpdateOrderStatusRequest,
            CreateBillingCutRequest,
            BillingCutList,
            BillingCutWithOrders,
            CheckoutLine,
            CheckoutRequest,
            CheckoutResponse,
            CreateLeadRequest,
            LeadList,
            IntegrityRequest,
            IntegrityResponse,
            GatewayTransaction,
            WebhookData,
            EventSignature,
            WebhookEvent,
            WebhookAck,
            ResultState,
            PaymentResultView,
            OpenSessionRequest,
            SelectCellRequest,
            CellList,
            SessionView,
            PickConfirmation,
            PickTask,
            TaskSnapshot,
            params::Pagination,
            params::SortOrder,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<CheckoutResponse>,
            ApiResponse<SessionView>,
            ApiResponse<BillingCutWithOrders>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Checkout", description = "Order creation and payment redirect"),
        (name = "Payments", description = "Integrity signing, gateway webhook and result lookup"),
        (name = "Sandbox", description = "In-process stand-in for the hosted checkout"),
        (name = "Picking", description = "Warehouse picking terminal"),
        (name = "Leads", description = "Wholesale contact form"),
        (name = "Admin", description = "Back office endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
