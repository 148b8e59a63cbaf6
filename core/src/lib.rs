//! # Ember Core
//!
//! Lifecycle primitives shared by the ember graphics layer: safe owner
//! back-references, the deferred trash queue and bounded lock retry.

pub mod back_ref;
pub mod retry;
pub mod trash;

pub use back_ref::{BackRef, BackRefHold, WeakBackRef};
pub use retry::RetryPolicy;
pub use trash::{CollectStats, TrashItem, TrashQueue};

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
