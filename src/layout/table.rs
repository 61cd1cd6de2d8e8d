//! Building the ordered partition tables that get handed to the device registry.
//!
//! Two tables are produced per device: a *raw* table with no entries, under which the driver
//! exposes the whole chip for erase/program, and an *operational* table carrying the canonical
//! partition names the loaders look up. The raw registration always happens first so whole-chip
//! access survives even if named-partition setup later goes wrong.
//!
//! The shape of the operational table differs by technology. NAND pads its boot partition for
//! bad-block remapping and keeps the configuration store right behind it; NOR and serial flash
//! have no bad-block concept and put the configuration store at the very end of the chip.
//!
//! Partition names are an external contract; downstream loaders open `trx`/`trx2` to validate an
//! image header and then read `os`/`os2`.

use crate::flash::{FlashKind, StorageDescriptor};
use crate::layout::bootsize::ImageSizeTier;
use crate::layout::redundant::{RedundancyPlan, NAND_OS_REGION};

/// NAND region holding the bootloader and the configuration store
pub const NAND_BOOT_REGION: u64 = 4 * 1024 * 1024;

/// Size of the header preceding a compressed firmware payload
pub const TRX_HDR_SIZE: u64 = 28;

/// Board metadata record region
pub const BDINFO_SIZE: u64 = 64 * 1024;

/// Backup metadata region
pub const BACKUP_SIZE: u64 = 64 * 1024;

/// Capacity of the persistent configuration store
pub const NVRAM_SPACE: u64 = 128 * 1024;

/// Environment area kept when the bootloader runs from mask ROM
pub const ROM_ENVRAM_SPACE: u64 = 8 * 1024;

/// One named region of the medium.
///
/// `size == 0` is the wildcard sentinel: the entry extends to the end of the device. It is only
/// legal on the final entry of a table.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PartitionEntry {
    pub name: &'static str,
    pub size: u64,
}

/// An ordered partition table, tied to the device it was computed for.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PartitionTable {
    entries: Vec<PartitionEntry>,
}

impl PartitionTable {
    pub fn entries(&self) -> &[PartitionEntry] {
        &self.entries
    }

    /// Is this the whole-device (unpartitioned) view?
    pub fn is_raw(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all fixed entry sizes (the wildcard contributes nothing)
    pub fn fixed_total(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Append an entry, upholding the table invariants: names are unique, and only the trailing
    /// entry may be the wildcard. Violations are builder bugs.
    fn push(&mut self, name: &'static str, size: u64) {
        assert!(
            self.entries.iter().all(|e| e.name != name),
            "duplicate partition name {name:?}",
        );
        assert!(
            self.entries.last().map_or(true, |e| e.size != 0),
            "entry {name:?} added after wildcard",
        );
        self.entries.push(PartitionEntry { name, size });
    }
}

/// Build the table for a device, in either the raw or the operational variant.
pub fn build(
    desc: &StorageDescriptor,
    tier: ImageSizeTier,
    plan: &RedundancyPlan,
    raw: bool,
) -> PartitionTable {
    if raw {
        return PartitionTable::default();
    }

    match desc.kind {
        FlashKind::Nand => nand_table(desc, tier, plan),
        FlashKind::SerialFlash | FlashKind::ParallelFlash => nor_table(desc, tier, plan, false),
    }
}

/// Like [`build`], but for a NOR-booted board whose bootloader was itself mask-ROM-booted; the
/// table then carries an extra `envram` region.
pub fn build_rom_boot(
    desc: &StorageDescriptor,
    tier: ImageSizeTier,
    plan: &RedundancyPlan,
) -> PartitionTable {
    nor_table(desc, tier, plan, true)
}

/// Boot partition sizing for NAND: double the tier for bad-block headroom when it spans more
/// than one erase block, otherwise occupy exactly one block.
fn nand_boot_size(tier: ImageSizeTier, block_size: u32) -> u64 {
    let block_size = u64::from(block_size);
    if tier.bytes() > block_size {
        tier.bytes() * 2
    } else {
        block_size
    }
}

/// Metadata regions get the same bad-block padding treatment as the boot partition.
fn nand_meta_size(nominal: u64, block_size: u32) -> u64 {
    let block_size = u64::from(block_size);
    if nominal > block_size {
        nominal * 2
    } else {
        block_size
    }
}

fn nand_table(
    desc: &StorageDescriptor,
    tier: ImageSizeTier,
    plan: &RedundancyPlan,
) -> PartitionTable {
    let boot = nand_boot_size(tier, desc.block_size);

    let mut table = PartitionTable::default();
    table.push("boot", boot);

    // A doubled 2 MiB boot partition consumes the whole boot region; the configuration store
    // then lives elsewhere and gets no entry here
    let nvram = NAND_BOOT_REGION.saturating_sub(boot);
    if nvram > 0 {
        table.push("nvram", nvram);
    }

    table.push("trx", TRX_HDR_SIZE);
    if plan.image_size > 0 {
        table.push("os", plan.image_size - TRX_HDR_SIZE);
        table.push("trx2", TRX_HDR_SIZE);
        table.push("os2", plan.image_size);
    } else {
        table.push("os", NAND_OS_REGION - NAND_BOOT_REGION - TRX_HDR_SIZE);
    }

    table.push("bdinfo", nand_meta_size(BDINFO_SIZE, desc.block_size));
    table.push("backup", nand_meta_size(BACKUP_SIZE, desc.block_size));

    // Whatever is left is general-purpose NAND storage
    table.push("brcmnand", 0);

    table
}

/// The table for a NAND chip that holds only the OS image (board boots from NOR but keeps the
/// kernel in NAND). The image must start a partition, so the trx header gets its own slot.
pub fn build_nand_kernel(plan: &RedundancyPlan) -> PartitionTable {
    let mut table = PartitionTable::default();
    table.push("trx", TRX_HDR_SIZE);
    if plan.image_size > 0 {
        table.push("os", plan.image_size - TRX_HDR_SIZE);
        table.push("trx2", TRX_HDR_SIZE);
        table.push("os2", plan.image_size);
    } else {
        table.push("os", NAND_OS_REGION - TRX_HDR_SIZE);
    }
    table.push("brcmnand", 0);

    table
}

/// The table for a NAND chip that carries neither the bootloader nor the OS image: the whole
/// device is general-purpose storage.
pub fn build_nand_data() -> PartitionTable {
    let mut table = PartitionTable::default();
    table.push("brcmnand", 0);
    table
}

fn nor_table(
    desc: &StorageDescriptor,
    tier: ImageSizeTier,
    plan: &RedundancyPlan,
    rom_boot: bool,
) -> PartitionTable {
    let boot = tier.bytes();
    let envram = if rom_boot { ROM_ENVRAM_SPACE } else { 0 };

    // The fixed regions pinned at the end of the chip
    let tail = envram + BDINFO_SIZE + BACKUP_SIZE + NVRAM_SPACE;

    let mut table = PartitionTable::default();
    table.push("boot", boot);

    table.push("trx", TRX_HDR_SIZE);
    if plan.image_size > 0 {
        table.push("os", plan.image_size - TRX_HDR_SIZE);
        table.push("trx2", TRX_HDR_SIZE);
        // The second slot also absorbs any slack left between the slots and the tail
        let os2 = desc
            .capacity
            .saturating_sub(boot + plan.image_size + TRX_HDR_SIZE + tail);
        table.push("os2", os2);
    } else {
        let os = desc.capacity.saturating_sub(boot + TRX_HDR_SIZE + tail);
        table.push("os", os);
    }

    if rom_boot {
        table.push("envram", ROM_ENVRAM_SPACE);
    }
    table.push("bdinfo", BDINFO_SIZE);
    table.push("backup", BACKUP_SIZE);
    table.push("nvram", NVRAM_SPACE);

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::redundant::RedundancyPlan;

    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;

    fn desc(kind: FlashKind, block_size: u32, capacity: u64) -> StorageDescriptor {
        StorageDescriptor {
            kind,
            base: 0x1c00_0000,
            block_size,
            capacity,
        }
    }

    fn dual_plan(reserved_begin: u64, image_size: u64) -> RedundancyPlan {
        RedundancyPlan {
            enabled: true,
            image_size,
            primary_offset: reserved_begin,
            secondary_offset: reserved_begin + image_size,
            needs_persist: false,
        }
    }

    fn names(table: &PartitionTable) -> Vec<&'static str> {
        table.entries().iter().map(|e| e.name).collect()
    }

    fn assert_invariants(table: &PartitionTable) {
        let entries = table.entries();
        for (i, entry) in entries.iter().enumerate() {
            assert!(
                entries[..i].iter().all(|e| e.name != entry.name),
                "duplicate name {:?}",
                entry.name,
            );
            if entry.size == 0 {
                assert_eq!(i, entries.len() - 1, "wildcard {:?} not last", entry.name);
            }
        }
    }

    #[test]
    fn raw_variant_is_empty() {
        let d = desc(FlashKind::Nand, 128 * 1024, 128 * MIB);
        let table = build(&d, ImageSizeTier::K256, &RedundancyPlan::DISABLED, true);
        assert!(table.is_raw());
    }

    #[test]
    fn nand_boot_padding() {
        // Tier larger than one erase block: doubled for bad-block headroom
        assert_eq!(nand_boot_size(ImageSizeTier::K512, 128 * 1024), 1024 * KIB);

        // Tier within one block: exactly one block
        assert_eq!(nand_boot_size(ImageSizeTier::K128, 128 * 1024), 128 * KIB);
        assert_eq!(nand_boot_size(ImageSizeTier::K256, 256 * 1024), 256 * KIB);
    }

    #[test]
    fn nand_table_with_redundancy() {
        let d = desc(FlashKind::Nand, 128 * 1024, 128 * MIB);
        let plan = dual_plan(NAND_BOOT_REGION, 14 * MIB);
        let table = build(&d, ImageSizeTier::K256, &plan, false);

        assert_invariants(&table);
        assert_eq!(
            names(&table),
            ["boot", "nvram", "trx", "os", "trx2", "os2", "bdinfo", "backup", "brcmnand"],
        );

        let entries = table.entries();
        // 256 KiB tier > 128 KiB block: doubled for bad-block headroom
        assert_eq!(entries[0].size, 512 * KIB);
        assert_eq!(entries[0].size + entries[1].size, NAND_BOOT_REGION);
        assert_eq!(entries[2].size, TRX_HDR_SIZE);
        assert_eq!(entries[3].size, 14 * MIB - TRX_HDR_SIZE);
        assert_eq!(entries[4].size, TRX_HDR_SIZE);
        assert_eq!(entries[5].size, 14 * MIB);

        // 64 KiB metadata regions fit inside one 128 KiB block
        assert_eq!(entries[6].size, 128 * KIB);
        assert_eq!(entries[7].size, 128 * KIB);
        assert_eq!(entries[8].size, 0);
    }

    #[test]
    fn nand_table_without_redundancy_fills_os_region() {
        let d = desc(FlashKind::Nand, 16 * 1024, 128 * MIB);
        let table = build(&d, ImageSizeTier::K256, &RedundancyPlan::DISABLED, false);

        assert_invariants(&table);
        assert_eq!(
            names(&table),
            ["boot", "nvram", "trx", "os", "bdinfo", "backup", "brcmnand"],
        );

        let entries = table.entries();
        // 256 KiB tier > 16 KiB block, so the boot partition is doubled
        assert_eq!(entries[0].size, 512 * KIB);

        // trx + os end exactly at the OS region boundary
        let through_os: u64 = entries[..4].iter().map(|e| e.size).sum();
        assert_eq!(through_os, NAND_OS_REGION);

        // 64 KiB metadata > 16 KiB block: doubled, not block-pinned
        assert_eq!(entries[4].size, 2 * BDINFO_SIZE);
    }

    #[test]
    fn nand_kernel_table() {
        let plan = dual_plan(0, 16 * MIB);
        let table = build_nand_kernel(&plan);

        assert_invariants(&table);
        assert_eq!(names(&table), ["trx", "os", "trx2", "os2", "brcmnand"]);
        assert_eq!(table.entries()[1].size, 16 * MIB - TRX_HDR_SIZE);

        let table = build_nand_kernel(&RedundancyPlan::DISABLED);
        assert_eq!(names(&table), ["trx", "os", "brcmnand"]);
        assert_eq!(table.entries()[1].size, NAND_OS_REGION - TRX_HDR_SIZE);
    }

    #[test]
    fn nand_m2_tier_fills_boot_region() {
        // A doubled 2 MiB boot partition is exactly the boot region; no nvram entry remains
        let d = desc(FlashKind::Nand, 128 * 1024, 128 * MIB);
        let plan = dual_plan(NAND_BOOT_REGION, 14 * MIB);
        let table = build(&d, ImageSizeTier::M2, &plan, false);

        assert_invariants(&table);
        assert_eq!(
            names(&table),
            ["boot", "trx", "os", "trx2", "os2", "bdinfo", "backup", "brcmnand"],
        );
        assert_eq!(table.entries()[0].size, NAND_BOOT_REGION);
    }

    #[test]
    fn nand_data_table_is_wildcard_only() {
        let table = build_nand_data();
        assert_invariants(&table);
        assert_eq!(names(&table), ["brcmnand"]);
        assert_eq!(table.entries()[0].size, 0);
    }

    #[test]
    fn nor_table_sums_to_capacity() {
        let d = desc(FlashKind::SerialFlash, 128 * 1024, 16 * MIB);
        let plan = dual_plan(256 * KIB, 7936 * KIB);
        let table = build(&d, ImageSizeTier::K256, &plan, false);

        assert_invariants(&table);
        assert_eq!(
            names(&table),
            ["boot", "trx", "os", "trx2", "os2", "bdinfo", "backup", "nvram"],
        );

        // No wildcard: every byte of the chip is accounted for explicitly
        assert_eq!(table.fixed_total(), d.capacity);

        let entries = table.entries();
        assert_eq!(entries[0].size, 256 * KIB);
        assert_eq!(entries[2].size, 7936 * KIB - TRX_HDR_SIZE);
        assert_eq!(entries[7].size, NVRAM_SPACE);
        assert_eq!(entries[7].name, "nvram"); // config store last on NOR
    }

    #[test]
    fn nor_table_without_redundancy() {
        let d = desc(FlashKind::ParallelFlash, 128 * 1024, 8 * MIB);
        let table = build(&d, ImageSizeTier::K512, &RedundancyPlan::DISABLED, false);

        assert_invariants(&table);
        assert_eq!(names(&table), ["boot", "trx", "os", "bdinfo", "backup", "nvram"]);
        assert_eq!(table.entries()[0].size, 512 * KIB); // no doubling on NOR
        assert_eq!(table.fixed_total(), d.capacity);
    }

    #[test]
    fn nor_rom_boot_carries_envram() {
        let d = desc(FlashKind::SerialFlash, 128 * 1024, 16 * MIB);
        let table = build_rom_boot(&d, ImageSizeTier::K256, &RedundancyPlan::DISABLED);

        assert_invariants(&table);
        assert_eq!(
            names(&table),
            ["boot", "trx", "os", "envram", "bdinfo", "backup", "nvram"],
        );
        assert_eq!(table.entries()[3].size, ROM_ENVRAM_SPACE);
        assert_eq!(table.fixed_total(), d.capacity);
    }
}
