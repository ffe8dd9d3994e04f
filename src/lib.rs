#![deny(dead_code)]

pub mod app;
pub mod cleanup;
pub mod cli;
pub mod domains;
pub mod errors;
pub mod infrastructure;
pub mod shared;
pub mod status_api;

pub use errors::{MaestroError, Result};
