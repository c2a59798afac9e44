//! The block-restore planner (component A, §4.A) and its delta-map sibling.

pub mod cursor;
pub mod delta;
pub mod plan;

pub use cursor::{PlanCursor, Write};
pub use delta::hash_existing_file;
pub use plan::{apply_block_size, build_plan, BlockOut, Plan, Read};
