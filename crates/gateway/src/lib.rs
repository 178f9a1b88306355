//! Gateway side of session identity resolution and existence notification.
//!
//! Lifecycle:
//! 1. Build a [`GatewayState`] from config
//! 2. Register one [`SessionExistsHandler`] per library
//! 3. Drive it from the protocol layer through the [`notifier`] entry points
//! 4. [`GatewayState::shutdown`] closes every library proxy
//!
//! Each attached library gets a [`LibraryProxy`] with its own bounded queue
//! and delivery worker, so libraries never wait on each other.

pub mod error;
pub mod handler;
pub mod ledger;
pub mod library;
pub mod notifier;
pub mod state;

pub use {
    error::GatewayError,
    handler::{LibraryRef, SessionExistsHandler, handler_fn},
    library::{DeliverySnapshot, LibraryProxy},
    notifier::LogoutReason,
    state::GatewayState,
};
