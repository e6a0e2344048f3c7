//! Alert storage.
//!
//! [`AlertStore`] is the abstract interface; [`InMemoryAlertStore`] is the
//! thread-safe in-process implementation.

mod memory;
mod traits;

pub use memory::InMemoryAlertStore;
pub use traits::{AlertStore, StoreError};
