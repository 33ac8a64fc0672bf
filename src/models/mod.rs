pub mod action;
pub mod enums;
pub mod patch;
pub mod structure;

pub use action::*;
pub use enums::*;
pub use patch::*;
pub use structure::*;
