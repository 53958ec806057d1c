// Tangle common library - main library exports

pub mod hash;
pub mod messages;
pub mod types;

// Flattened re-exports
pub use self::hash::Hash;
pub use self::types::*;
