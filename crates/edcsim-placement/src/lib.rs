//! Rack-aware chunk placement and the code-specific data-loss/cross-rack-
//! traffic oracle that operates over it.
//!
//! A `Placement` is generated once per iteration from a fresh PRNG stream
//! and never mutated afterwards: `stripes_location` (stripe -> ordered
//! disk ids) and its reverse index `stripes_per_disk` are built together
//! in `Placement::generate` and read-only from then on.

mod code;
mod lrc;
mod placement;

pub use code::Code;
pub use lrc::{ChunkRole, LrcLayout};
pub use placement::{FailedStatus, Placement, RepairPlan};
