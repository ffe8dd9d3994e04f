#![deny(dead_code)]

pub mod error;
pub mod host;

pub use crate::error::{PtyHostError, Result};
pub use crate::host::{EventSink, NullSink, PtyHost, SpawnOptions, SpawnResponse};
