//! An inspection tool for the flash layout planner.
//!
//! This is not a unit test because it's meant for eyeballing the computed partition tables for
//! arbitrary board configurations, without real hardware: it runs the full device-init sequence
//! against simulated flash, SoC, and configuration store, then prints every table that would
//! have been registered.

use anyhow::Result;
use clap::Parser;

use board_bringup::board::device_init;
use board_bringup::flash::{FlashGeometry, FlashKind, SimFlash};
use board_bringup::layout::bootsize::{BISZ_MAGIC, BISZ_OFFSET};
use board_bringup::layout::RedundancyScheme;
use board_bringup::nvram::{keys, NvStore, SimNvram};
use board_bringup::probe::SimSoc;
use board_bringup::registry::RecordingRegistry;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Cli {
    /// Storage technology of the boot device (nand, sflash, pflash)
    #[clap(long, default_value = "sflash")]
    kind: FlashKind,

    /// Total capacity of the boot device, in bytes
    #[clap(long, default_value_t = 16 * 1024 * 1024)]
    capacity: u64,

    /// Erase block size, in bytes
    #[clap(long, default_value_t = 128 * 1024)]
    block_size: u32,

    /// Base physical address of the chip
    #[clap(long, default_value_t = 0x1c00_0000)]
    base: u64,

    /// Synthesize a self-describing header claiming this image size, in bytes
    #[clap(long)]
    image_size: Option<u32>,

    /// Enable the dual-image scheme
    #[clap(long, group = "scheme")]
    dual: bool,

    /// Enable the failsafe-upgrade scheme
    #[clap(long, group = "scheme")]
    failsafe: bool,

    /// Pretend the bootloader was mask-ROM-booted
    #[clap(long)]
    rom_boot: bool,

    /// Keep the OS image in NAND while booting from NOR
    #[clap(long)]
    kernel_in_nand: bool,

    /// Seed the simulated configuration store (KEY=VALUE, repeatable)
    #[clap(long = "set")]
    settings: Vec<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let mut store = SimNvram::new();
    if args.dual {
        store.set(keys::IMAGE_BOOT, "1");
    }
    if args.failsafe {
        store.set(keys::BOOT_PARTITION, "boot");
    }
    for setting in &args.settings {
        let (key, value) = setting
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected KEY=VALUE, got {setting:?}"))?;
        store.set(key, value);
    }

    let geometry = FlashGeometry {
        base: args.base,
        block_size: args.block_size,
        capacity: args.capacity,
    };
    let mut soc = SimSoc::booting_from(args.kind);
    soc.rom_booted = args.rom_boot;
    match args.kind {
        FlashKind::Nand => soc.nand = Some(geometry),
        FlashKind::SerialFlash => soc.serial = Some(geometry),
        FlashKind::ParallelFlash => soc.parallel = geometry,
    }
    if args.kernel_in_nand {
        soc.kernel_device = FlashKind::Nand;
    }

    let mut flash = SimFlash::new(4096);
    if let Some(isz) = args.image_size {
        let text_start: u32 = 0x8000_0400;
        let words = [BISZ_MAGIC, text_start, 0, 0, text_start + isz];
        let mut bytes = Vec::new();
        for word in words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        flash.fill(BISZ_OFFSET as usize, &bytes);
    }

    let scheme = match args.failsafe {
        true => RedundancyScheme::Failsafe,
        false => RedundancyScheme::Dual,
    };

    let mut registry = RecordingRegistry::new();
    device_init(&mut soc, &flash, &mut store, &mut registry, scheme)?;

    for reg in &registry.registered {
        println!();
        println!(
            "{} @ {:#x} (instance {})",
            reg.driver, reg.base, reg.instance
        );
        if reg.table.is_raw() {
            println!("  (whole device)");
            continue;
        }
        for entry in reg.table.entries() {
            match entry.size {
                0 => println!("  {:10} (rest of device)", entry.name),
                size => println!("  {:10} {size:>10} ({size:#x})", entry.name),
            }
        }
    }

    Ok(())
}
