//! Payment handshake with the external gateway: integrity signing before the
//! redirect, webhook consumption, and result lookups.

pub mod poller;
pub mod sandbox;
pub mod signer;
pub mod webhook;

pub use poller::{HttpTransactionLookup, TransactionLookup, resolve_result, result_state};
pub use sandbox::SandboxGateway;
pub use signer::IntegritySigner;
pub use webhook::{EventVerifier, WebhookOutcome, handle_event};
