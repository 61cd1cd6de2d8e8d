//! Flash layout planning: the part of device init that actually has arithmetic in it.
//!
//! Per boot, the planning pipeline runs exactly once, in order:
//!
//! 1. [`bootsize::classify`] inspects the self-describing image header and picks the size tier
//!    of the bootloader's own partition.
//! 2. [`redundant::plan`] works out how large each of the two firmware image slots may be, given
//!    the space reserved at both ends of the medium, and stages the slot offsets into the
//!    configuration store if they moved.
//! 3. [`table::build`] turns the descriptor, tier, and plan into ordered partition tables, which
//!    the caller hands to the device registry (raw whole-device view first, named view second).
//!
//! The tables are transient: once registered they are not retained here, and everything is
//! recomputed from scratch on the next boot.

pub mod bootsize;
pub mod redundant;
pub mod table;

pub use bootsize::{classify, ImageSizeTier};
pub use redundant::{plan, RedundancyPlan, RedundancyScheme};
pub use table::{
    build, build_nand_data, build_nand_kernel, build_rom_boot, PartitionEntry, PartitionTable,
};
