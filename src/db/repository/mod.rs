//! Repository layer: table-scoped database operations.
//!
//! Plain functions over `&Connection`. Callers run them on the
//! settings context (see `db::context`).

mod pending_upload;
mod settings;

pub use pending_upload::*;
pub use settings::*;
