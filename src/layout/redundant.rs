//! Sizing the redundant ("dual") firmware image slots.
//!
//! When a redundancy scheme is enabled, the space between the reserved head and tail of the
//! medium is split into two equal image slots, so a failed upgrade always leaves one bootable
//! image. The slot offsets are also mirrored into the configuration store for the OS-side
//! updater; computing and persisting are decoupled so the expensive flash commit happens at most
//! once per boot, in the caller.

use crate::flash::{FlashKind, StorageDescriptor};
use crate::nvram::{keys, NvStore};

/// NAND reserves a fixed region at the start of the chip for boot and OS images; everything past
/// it belongs to general-purpose storage.
pub const NAND_OS_REGION: u64 = 32 * 1024 * 1024;

/// Which configuration key gates the two-slot layout.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RedundancyScheme {
    /// Two equal, independently bootable slots
    Dual,

    /// A known-good slot plus an upgrade-target slot
    Failsafe,
}

impl RedundancyScheme {
    fn enable_key(self) -> &'static str {
        match self {
            RedundancyScheme::Dual => keys::IMAGE_BOOT,
            RedundancyScheme::Failsafe => keys::BOOT_PARTITION,
        }
    }
}

/// The computed slot layout.
///
/// `image_size == 0` whenever the scheme is disabled. When enabled,
/// `primary_offset == reserved_begin` and `secondary_offset == primary_offset + image_size`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RedundancyPlan {
    pub enabled: bool,
    pub image_size: u64,
    pub primary_offset: u64,
    pub secondary_offset: u64,

    /// True if either persisted offset no longer matches and a store commit is pending
    pub needs_persist: bool,
}

impl RedundancyPlan {
    /// The plan used when no redundancy scheme is configured
    pub const DISABLED: Self = Self {
        enabled: false,
        image_size: 0,
        primary_offset: 0,
        secondary_offset: 0,
        needs_persist: false,
    };
}

const fn floor_align(value: u64, align: u64) -> u64 {
    value - value % align
}

/// Compute the maximum image slot size and both slot offsets.
///
/// `reserved_begin`/`reserved_end` are the byte counts already spoken for at the head and tail
/// of the medium. Oversized results are impossible by construction: the candidate is truncated
/// down to the alignment boundary rather than rejected.
pub fn plan(
    desc: &StorageDescriptor,
    scheme: RedundancyScheme,
    reserved_begin: u64,
    reserved_end: u64,
    store: &mut dyn NvStore,
) -> RedundancyPlan {
    if store.get(scheme.enable_key()).is_none() {
        return RedundancyPlan::DISABLED;
    }

    let image_size = if let Some(setting) = store.get(keys::IMAGE_SIZE) {
        // An explicit override (in KiB) is taken verbatim, with no alignment applied; the
        // store is external input, so the scale-up must not wrap
        setting.parse::<u64>().unwrap_or(0).saturating_mul(1024)
    } else if desc.kind == FlashKind::Nand {
        // NAND image slots split the fixed OS region; 64 KiB alignment matches the
        // rootfs search stride
        floor_align(
            NAND_OS_REGION.saturating_sub(reserved_begin) / 2,
            64 * 1024,
        )
    } else {
        // NOR/serial splits whatever the reserved regions leave over; erase blocks are
        // coarser here, hence the 128 KiB alignment
        let available = desc
            .capacity
            .saturating_sub(reserved_begin + reserved_end);
        floor_align(available / 2, 128 * 1024)
    };

    let primary_offset = reserved_begin;
    let secondary_offset = reserved_begin.saturating_add(image_size);

    let mut needs_persist = false;
    let mut persist_offset = |key: &str, name: &str, offset: u64| {
        let value = offset.to_string();
        if !store.matches(key, &value) {
            println!(
                "{name} image offset moved to {value} ({offset:#x}), was {:?}",
                store.get(key),
            );
            store.set(key, &value);
            needs_persist = true;
        }
    };
    persist_offset(keys::IMAGE_FIRST_OFFSET, "primary", primary_offset);
    persist_offset(keys::IMAGE_SECOND_OFFSET, "secondary", secondary_offset);

    RedundancyPlan {
        enabled: true,
        image_size,
        primary_offset,
        secondary_offset,
        needs_persist,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvram::SimNvram;

    const MIB: u64 = 1024 * 1024;
    const KIB: u64 = 1024;

    fn nor_16m() -> StorageDescriptor {
        StorageDescriptor {
            kind: FlashKind::SerialFlash,
            base: 0x1c00_0000,
            block_size: 128 * 1024,
            capacity: 16 * MIB,
        }
    }

    #[test]
    fn disabled_without_enable_key() {
        let mut store = SimNvram::new();
        let plan = plan(&nor_16m(), RedundancyScheme::Dual, 256 * KIB, 128 * KIB, &mut store);
        assert_eq!(plan, RedundancyPlan::DISABLED);
        assert_eq!(store.get(keys::IMAGE_FIRST_OFFSET), None);
    }

    #[test]
    fn nor_split_is_halved_and_aligned() {
        let mut store = SimNvram::with([(keys::IMAGE_BOOT, "1")]);
        let plan = plan(&nor_16m(), RedundancyScheme::Dual, 256 * KIB, 128 * KIB, &mut store);

        // (16 MiB - 256 KiB - 128 KiB) / 2, floored to 128 KiB
        assert_eq!(plan.image_size, 7936 * KIB);
        assert_eq!(plan.image_size % (128 * KIB), 0);
        assert_eq!(plan.primary_offset, 256 * KIB);
        assert_eq!(plan.secondary_offset, 8192 * KIB);
        assert_eq!(plan.primary_offset + plan.image_size, plan.secondary_offset);
        assert!(plan.needs_persist);
    }

    #[test]
    fn nand_split_uses_fixed_os_region() {
        let desc = StorageDescriptor {
            kind: FlashKind::Nand,
            base: 0x1000_0000,
            block_size: 128 * 1024,
            capacity: 128 * MIB,
        };
        let mut store = SimNvram::with([(keys::IMAGE_BOOT, "1")]);
        let plan = plan(&desc, RedundancyScheme::Dual, 4 * MIB, 0, &mut store);

        assert_eq!(plan.image_size, 14 * MIB);
        assert_eq!(plan.image_size % (64 * KIB), 0);
        assert_eq!(plan.primary_offset, 4 * MIB);
        assert_eq!(plan.secondary_offset, 18 * MIB);
    }

    #[test]
    fn explicit_override_is_verbatim() {
        // 5000 KiB is not 128 KiB-aligned; the override must not be rounded
        let mut store = SimNvram::with([(keys::IMAGE_BOOT, "1"), (keys::IMAGE_SIZE, "5000")]);
        let plan = plan(&nor_16m(), RedundancyScheme::Dual, 256 * KIB, 128 * KIB, &mut store);
        assert_eq!(plan.image_size, 5000 * KIB);
    }

    #[test]
    fn absurd_override_does_not_wrap() {
        // A garbage persisted image_size must not overflow the KiB scale-up
        let huge = u64::MAX.to_string();
        let mut store = SimNvram::with([(keys::IMAGE_BOOT, "1"), (keys::IMAGE_SIZE, huge.as_str())]);
        let plan = plan(&nor_16m(), RedundancyScheme::Dual, 256 * KIB, 128 * KIB, &mut store);
        assert_eq!(plan.image_size, u64::MAX);
        assert_eq!(plan.secondary_offset, u64::MAX);

        // Not parseable at all: treated as zero
        let mut store = SimNvram::with([(keys::IMAGE_BOOT, "1"), (keys::IMAGE_SIZE, "junk")]);
        let plan = super::plan(&nor_16m(), RedundancyScheme::Dual, 256 * KIB, 128 * KIB, &mut store);
        assert_eq!(plan.image_size, 0);
    }

    #[test]
    fn failsafe_scheme_has_its_own_key() {
        let mut store = SimNvram::with([(keys::BOOT_PARTITION, "boot")]);
        assert!(!plan(&nor_16m(), RedundancyScheme::Dual, 0, 0, &mut store).enabled);
        assert!(plan(&nor_16m(), RedundancyScheme::Failsafe, 0, 0, &mut store).enabled);
    }

    #[test]
    fn persisted_offsets_round_trip() {
        let mut store = SimNvram::with([(keys::IMAGE_BOOT, "1")]);
        let first = plan(&nor_16m(), RedundancyScheme::Dual, 256 * KIB, 128 * KIB, &mut store);
        assert!(first.needs_persist);
        assert_eq!(
            store.get(keys::IMAGE_FIRST_OFFSET).as_deref(),
            Some((256 * KIB).to_string().as_str()),
        );

        // Identical inputs on the next pass: nothing left to persist
        let second = plan(&nor_16m(), RedundancyScheme::Dual, 256 * KIB, 128 * KIB, &mut store);
        assert!(!second.needs_persist);
        assert_eq!(second.image_size, first.image_size);
    }
}
