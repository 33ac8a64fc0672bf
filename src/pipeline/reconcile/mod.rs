pub mod types;
pub mod reconciler;

pub use types::*;
pub use reconciler::*;
