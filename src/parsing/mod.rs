//! The decode pipeline: directory walking, layout planning and record
//! stream decoding.

pub mod directory;
pub mod extract;
pub mod layout;
pub mod records;

pub use directory::{DEFAULT_HOP_LIMIT, Directory, TraversalGuard};
pub use layout::RecordLayoutPlan;
pub use records::decode_records;
