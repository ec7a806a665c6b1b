pub mod enums;
pub mod sync;
pub mod workout;

pub use enums::*;
pub use sync::*;
pub use workout::*;
