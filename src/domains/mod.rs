pub mod git;
pub mod permissions;
pub mod sessions;
pub mod settings;
pub mod workspace;
