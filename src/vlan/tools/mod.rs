pub mod accounting;
pub mod batch;
pub mod config;
pub mod error;
pub mod io;
pub mod model;
pub mod reconcile;
pub mod store;
pub mod validate;

pub use error::{Result, ToolError};
