pub mod capability;
pub mod manager;
pub mod types;


pub use capability::PtySpawner;
pub use manager::{GridControl, LaunchProfile, SlotManager};
pub use types::{
    BranchTarget, LaunchCommand, SessionHandle, SessionMode, SessionSlot, SlotCounts, SlotId,
    SlotView, SpawnSpec, MAX_SLOTS,
};
