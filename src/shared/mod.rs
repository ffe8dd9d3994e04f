pub mod path_key;

pub use path_key::{hash_fragment, sanitize_segment};
