//! Core types for the mobility report engine: the canonical long-format schema, reshaping
//! helpers, name crosswalks, and the cross-provider merge.

/// Sparse raw-name to canonical-name lookups.
pub mod crosswalk;
/// Outer join of provider tables and the views derived from it.
pub mod merge;
/// Canonical keys, rows and tables shared by all providers.
pub mod model;
/// Normalizer trait and the shared error type.
pub mod ports;
/// Raw string tables and the melt/pivot reshapes.
pub mod table;

pub use crosswalk::*;
pub use merge::*;
pub use model::*;
pub use ports::*;
pub use table::*;
