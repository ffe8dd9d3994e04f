pub mod config;
pub mod events;
pub mod logging;
pub mod port;
pub mod pty;

pub use events::{emit_event, log_emitter, EventEmitter, LogEmitter, MaestroEvent};
pub use port::{find_and_bind, PortLease};
