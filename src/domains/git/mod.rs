pub mod capability;
pub mod libgit;
pub mod worktrees;

pub use capability::{GitWorktrees, WorktreeRecord, WorktreeTarget};
pub use libgit::Git2Worktrees;
pub use worktrees::WorktreeAllocator;
