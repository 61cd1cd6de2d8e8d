//! Board device initialization.
//!
//! This is the run-to-completion sequence executed once per boot, on one core, with no scheduler
//! underneath: probe the boot flash, size the bootloader partition, plan the redundant image
//! slots, and register the partition tables with the driver layer. Everything hardware-shaped is
//! reached through capability traits so the sequence can run against simulated devices.

pub mod autoboot;
pub mod bdinfo;
pub mod led;
pub mod recovery;

use crate::flash::{FlashKind, FlashRead, StorageDescriptor};
use crate::layout::{
    self,
    table::{NAND_BOOT_REGION, NVRAM_SPACE, ROM_ENVRAM_SPACE},
    ImageSizeTier, RedundancyPlan, RedundancyScheme,
};
use crate::nvram::NvStore;
use crate::probe::{probe, Soc};
use crate::registry::DeviceRegistry;

/// Console multiplexer capability: UART registration and primary-console selection.
pub trait Console {
    fn add_uart(&mut self, base: u64, baud_base: u32, reg_shift: u32);

    /// Switch the active console to the named device; `false` if it does not exist.
    fn set_primary(&mut self, name: &str) -> bool;
}

#[derive(Debug, Copy, Clone)]
pub struct UartPort {
    pub base: u64,
    pub baud_base: u32,
    pub reg_shift: u32,
}

/// Register every UART the chip exposes and promote `uart0` to primary console.
pub fn console_init(console: &mut impl Console, ports: &[UartPort]) {
    for port in ports {
        console.add_uart(port.base, port.baud_base, port.reg_shift);
    }

    if !console.set_primary("uart0") {
        println!("uart0 not present; console stays on the buffer device");
    }
}

/// How much space is spoken for at the head and tail of the boot medium, before the image slots.
fn reserved_space(desc: &StorageDescriptor, tier: ImageSizeTier, rom_booted: bool) -> (u64, u64) {
    match desc.kind {
        // The NAND boot region covers both the bootloader and the configuration store
        FlashKind::Nand => (NAND_BOOT_REGION, 0),
        _ => {
            let envram = if rom_booted { ROM_ENVRAM_SPACE } else { 0 };
            (tier.bytes(), NVRAM_SPACE + envram)
        }
    }
}

/// Probe the boot device, compute its layout, and register it (raw view first, named second).
///
/// On a NOR boot any NAND present is brought up as a second device: with its own kernel-image
/// table if the OS image lives there, otherwise as pure data storage. Unlike the boot device,
/// its absence is never fatal. The configuration store is committed at most once, at the very
/// end, and only if a slot offset actually moved.
pub fn device_init(
    soc: &mut impl Soc,
    flash: &impl FlashRead,
    store: &mut dyn NvStore,
    registry: &mut dyn DeviceRegistry,
    scheme: RedundancyScheme,
) -> anyhow::Result<()> {
    let desc = probe(soc)?;
    println!("Boot device: {} at {:#x}", desc.kind, desc.base);

    let tier = layout::classify(flash);
    println!("Boot partition size = {0} ({0:#x})", tier.bytes());

    let rom_booted = soc.rom_booted();
    let kernel_in_nand = desc.kind != FlashKind::Nand && soc.kernel_device() == FlashKind::Nand;

    // When the OS image lives on the other chip, the boot medium carries no image slots
    let (reserved_begin, reserved_end) = reserved_space(&desc, tier, rom_booted);
    let plan = if kernel_in_nand {
        RedundancyPlan::DISABLED
    } else {
        layout::plan(&desc, scheme, reserved_begin, reserved_end, store)
    };
    let mut need_commit = plan.needs_persist;

    let driver = desc.kind.driver();
    registry.register(driver, desc.base, 0, &layout::build(&desc, tier, &plan, true))?;

    let named = if rom_booted && desc.kind != FlashKind::Nand {
        layout::build_rom_boot(&desc, tier, &plan)
    } else {
        layout::build(&desc, tier, &plan, false)
    };
    registry.register(driver, desc.base, 0, &named)?;

    if desc.kind != FlashKind::Nand {
        match soc.attach_nand() {
            // Missing NAND is fatal nowhere on a NOR boot, but losing the OS image is worth a line
            None if kernel_in_nand => println!("OS-image NAND flash not found"),
            None => {}
            Some(geometry) => {
                let nand = StorageDescriptor::new(FlashKind::Nand, geometry);
                let driver = nand.kind.driver();
                registry.register(
                    driver,
                    nand.base,
                    1,
                    &layout::build(&nand, tier, &RedundancyPlan::DISABLED, true),
                )?;

                let named = if kernel_in_nand {
                    let nand_plan = layout::plan(&nand, scheme, 0, 0, store);
                    need_commit |= nand_plan.needs_persist;
                    layout::build_nand_kernel(&nand_plan)
                } else {
                    // The kernel stays on the boot NOR; the NAND is pure data storage
                    layout::build_nand_data()
                };
                registry.register(driver, nand.base, 1, &named)?;
            }
        }
    }

    if need_commit {
        println!("Committing image offsets...");
        store.commit()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::{FlashGeometry, SimFlash};
    use crate::nvram::{keys, SimNvram};
    use crate::probe::SimSoc;
    use crate::registry::RecordingRegistry;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn init_registers_raw_before_named() {
        let mut soc = SimSoc::booting_from(FlashKind::SerialFlash);
        soc.nand = None;
        let flash = SimFlash::new(4096);
        let mut store = SimNvram::with([(keys::IMAGE_BOOT, "1")]);
        let mut registry = RecordingRegistry::new();

        device_init(
            &mut soc,
            &flash,
            &mut store,
            &mut registry,
            RedundancyScheme::Dual,
        )
        .unwrap();

        let regs = &registry.registered;
        assert_eq!(regs.len(), 2);
        assert!(regs[0].table.is_raw());
        assert!(!regs[1].table.is_raw());
        assert_eq!(regs[0].driver, "sflash");
        assert_eq!(regs[0].base, regs[1].base);

        // Offsets moved on a fresh store: exactly one commit
        assert_eq!(store.commits, 1);
        assert_eq!(
            store.get(keys::IMAGE_FIRST_OFFSET).as_deref(),
            Some((256 * 1024).to_string().as_str()),
        );
    }

    #[test]
    fn init_second_pass_commits_nothing() {
        let mut soc = SimSoc::booting_from(FlashKind::SerialFlash);
        let flash = SimFlash::new(4096);
        let mut store = SimNvram::with([(keys::IMAGE_BOOT, "1")]);

        let mut registry = RecordingRegistry::new();
        device_init(&mut soc, &flash, &mut store, &mut registry, RedundancyScheme::Dual).unwrap();
        assert_eq!(store.commits, 1);

        let mut registry = RecordingRegistry::new();
        device_init(&mut soc, &flash, &mut store, &mut registry, RedundancyScheme::Dual).unwrap();
        assert_eq!(store.commits, 1, "identical inputs must not re-commit");
    }

    #[test]
    fn init_kernel_in_nand_registers_second_device() {
        let mut soc = SimSoc::booting_from(FlashKind::SerialFlash);
        soc.kernel_device = FlashKind::Nand;
        soc.nand = Some(FlashGeometry {
            base: 0x1000_0000,
            block_size: 128 * 1024,
            capacity: 128 * MIB,
        });
        let flash = SimFlash::new(4096);
        let mut store = SimNvram::with([(keys::IMAGE_BOOT, "1")]);
        let mut registry = RecordingRegistry::new();

        device_init(&mut soc, &flash, &mut store, &mut registry, RedundancyScheme::Dual).unwrap();

        let regs = &registry.registered;
        assert_eq!(regs.len(), 4);
        assert_eq!(regs[2].driver, "nflash");
        assert_eq!(regs[2].instance, 1);
        assert!(regs[2].table.is_raw());

        // The boot NOR has no image slots; the NAND kernel table has both
        let nor_names: Vec<_> = regs[1].table.entries().iter().map(|e| e.name).collect();
        assert!(!nor_names.contains(&"os2"));
        let nand_names: Vec<_> = regs[3].table.entries().iter().map(|e| e.name).collect();
        assert_eq!(nand_names, ["trx", "os", "trx2", "os2", "brcmnand"]);

        assert_eq!(store.commits, 1);
    }

    #[test]
    fn init_data_nand_registered_on_nor_boot() {
        // Kernel stays on the boot NOR, but the NAND still comes up as general-purpose storage
        let mut soc = SimSoc::booting_from(FlashKind::SerialFlash);
        let flash = SimFlash::new(4096);
        let mut store = SimNvram::new();
        let mut registry = RecordingRegistry::new();

        device_init(&mut soc, &flash, &mut store, &mut registry, RedundancyScheme::Dual).unwrap();

        let regs = &registry.registered;
        assert_eq!(regs.len(), 4);
        assert_eq!(regs[2].driver, "nflash");
        assert_eq!(regs[2].instance, 1);
        assert!(regs[2].table.is_raw());

        let nand_names: Vec<_> = regs[3].table.entries().iter().map(|e| e.name).collect();
        assert_eq!(nand_names, ["brcmnand"]);

        // No image slots were planned for the data NAND
        assert_eq!(store.get(keys::IMAGE_FIRST_OFFSET), None);
        assert_eq!(store.commits, 0);
    }

    #[test]
    fn init_missing_kernel_nand_is_not_fatal() {
        let mut soc = SimSoc::booting_from(FlashKind::SerialFlash);
        soc.kernel_device = FlashKind::Nand;
        soc.nand = None;
        let flash = SimFlash::new(4096);
        let mut store = SimNvram::new();
        let mut registry = RecordingRegistry::new();

        device_init(&mut soc, &flash, &mut store, &mut registry, RedundancyScheme::Dual).unwrap();
        assert_eq!(registry.registered.len(), 2);
    }

    #[test]
    fn init_without_boot_device_aborts() {
        let mut soc = SimSoc::booting_from(FlashKind::Nand);
        soc.nand = None;
        let flash = SimFlash::new(4096);
        let mut store = SimNvram::new();
        let mut registry = RecordingRegistry::new();

        let result = device_init(&mut soc, &flash, &mut store, &mut registry, RedundancyScheme::Dual);
        assert!(result.is_err());
        assert!(registry.registered.is_empty());
    }

    #[test]
    fn init_rom_booted_nor_carries_envram() {
        let mut soc = SimSoc::booting_from(FlashKind::SerialFlash);
        soc.rom_booted = true;
        let flash = SimFlash::new(4096);
        let mut store = SimNvram::new();
        let mut registry = RecordingRegistry::new();

        device_init(&mut soc, &flash, &mut store, &mut registry, RedundancyScheme::Dual).unwrap();
        let names: Vec<_> = registry.registered[1]
            .table
            .entries()
            .iter()
            .map(|e| e.name)
            .collect();
        assert!(names.contains(&"envram"));
    }

    #[derive(Default)]
    struct SimConsole {
        uarts: Vec<u64>,
        primary: Option<String>,
    }

    impl Console for SimConsole {
        fn add_uart(&mut self, base: u64, _baud_base: u32, _reg_shift: u32) {
            self.uarts.push(base);
        }
        fn set_primary(&mut self, name: &str) -> bool {
            if name == "uart0" && !self.uarts.is_empty() {
                self.primary = Some(name.to_owned());
                true
            } else {
                false
            }
        }
    }

    #[test]
    fn console_init_promotes_uart0() {
        let mut console = SimConsole::default();
        console_init(
            &mut console,
            &[UartPort {
                base: 0x1800_0300,
                baud_base: 115_200,
                reg_shift: 0,
            }],
        );
        assert_eq!(console.uarts, [0x1800_0300]);
        assert_eq!(console.primary.as_deref(), Some("uart0"));

        // No UARTs at all: nothing to promote, but no failure either
        let mut console = SimConsole::default();
        console_init(&mut console, &[]);
        assert_eq!(console.primary, None);
    }
}
