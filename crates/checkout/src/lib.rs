//! Exactly-once checkout.
//!
//! The [`CheckoutOrchestrator`] turns a purchase intent into a committed
//! order inside one unit of work:
//! 1. Look up or register the idempotency key
//! 2. Conditionally decrement stock
//! 3. Price the order from the locked row
//! 4. Insert the order linked to the key
//!
//! Retried requests that carry the same token replay the original order
//! instead of executing again.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod pricing;
pub mod request;
pub mod token;

pub use config::CheckoutConfig;
pub use error::CheckoutError;
pub use orchestrator::CheckoutOrchestrator;
pub use outcome::CheckoutOutcome;
pub use pricing::order_total;
pub use request::{CheckoutRequest, Quantity};
pub use token::{IdempotencyToken, derive_legacy_key};
