pub mod api;
pub mod autofill;
pub mod config;
pub mod error;
pub mod services;

pub use error::{GenericError, SmartFillError, StoreError};
