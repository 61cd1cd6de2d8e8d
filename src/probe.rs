//! Boot-device probing.
//!
//! The mask ROM latches which storage technology it booted from; this module turns that
//! indicator into a [`StorageDescriptor`] by bringing up the matching flash controller. This is
//! the one place in the crate where failure is fatal: with no boot storage there is no image to
//! load and no fallback to escalate to.

use thiserror::Error;

use crate::flash::{FlashGeometry, FlashKind, StorageDescriptor};

/// Chip-level services the probe needs from the SoC.
///
/// Implementations wrap the silicon backplane handle; tests use [`SimSoc`].
pub trait Soc {
    /// Which storage technology the mask ROM booted from, per the strap/status register.
    ///
    /// `None` means the register holds no recognizable indicator.
    fn boot_device(&self) -> Option<FlashKind>;

    /// Which device holds the OS image (may differ from the boot device).
    fn kernel_device(&self) -> FlashKind;

    /// Was the bootloader itself executed out of mask ROM?
    fn rom_booted(&self) -> bool;

    /// Bring up the NAND controller; `None` if no NAND chip answers.
    fn attach_nand(&mut self) -> Option<FlashGeometry>;

    /// Bring up the serial flash controller; `None` if no chip answers.
    fn attach_serial(&mut self) -> Option<FlashGeometry>;

    /// Read parallel NOR geometry from the chip-common config registers.
    ///
    /// Parallel NOR has no discovery handshake, so there is no way to report absence here; the
    /// registers are read unconditionally from the fixed base.
    fn parallel_geometry(&mut self) -> FlashGeometry;
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ProbeError {
    #[error("mask ROM reports no usable boot device")]
    NoBootDevice,

    #[error("{0} controller failed to initialize")]
    ControllerMissing(FlashKind),
}

/// Identify the boot device and obtain its geometry.
pub fn probe(soc: &mut impl Soc) -> Result<StorageDescriptor, ProbeError> {
    let kind = soc.boot_device().ok_or(ProbeError::NoBootDevice)?;

    let geometry = match kind {
        FlashKind::Nand => soc
            .attach_nand()
            .ok_or(ProbeError::ControllerMissing(kind))?,
        FlashKind::SerialFlash => soc
            .attach_serial()
            .ok_or(ProbeError::ControllerMissing(kind))?,
        FlashKind::ParallelFlash => soc.parallel_geometry(),
    };

    Ok(StorageDescriptor::new(kind, geometry))
}

/// A canned SoC, for testing purposes
#[derive(Debug, Clone)]
pub struct SimSoc {
    pub boot_device: Option<FlashKind>,
    pub kernel_device: FlashKind,
    pub rom_booted: bool,
    pub nand: Option<FlashGeometry>,
    pub serial: Option<FlashGeometry>,
    pub parallel: FlashGeometry,
}

impl SimSoc {
    /// A SoC strapped to boot from `kind`, with every controller present.
    pub fn booting_from(kind: FlashKind) -> Self {
        let geometry = |base| FlashGeometry {
            base,
            block_size: 128 * 1024,
            capacity: 16 * 1024 * 1024,
        };

        Self {
            boot_device: Some(kind),
            kernel_device: kind,
            rom_booted: false,
            nand: Some(geometry(0x1000_0000)),
            serial: Some(geometry(0x1c00_0000)),
            parallel: geometry(0x1c00_0000),
        }
    }
}

impl Soc for SimSoc {
    fn boot_device(&self) -> Option<FlashKind> {
        self.boot_device
    }
    fn kernel_device(&self) -> FlashKind {
        self.kernel_device
    }
    fn rom_booted(&self) -> bool {
        self.rom_booted
    }
    fn attach_nand(&mut self) -> Option<FlashGeometry> {
        self.nand
    }
    fn attach_serial(&mut self) -> Option<FlashGeometry> {
        self.serial
    }
    fn parallel_geometry(&mut self) -> FlashGeometry {
        self.parallel
    }
}

#[test]
fn test_probe_selects_boot_device() {
    let mut soc = SimSoc::booting_from(FlashKind::SerialFlash);
    let desc = probe(&mut soc).unwrap();
    assert_eq!(desc.kind, FlashKind::SerialFlash);
    assert_eq!(desc.base, 0x1c00_0000);
    assert_eq!(desc.capacity, 16 * 1024 * 1024);
}

#[test]
fn test_probe_missing_controller_is_fatal() {
    let mut soc = SimSoc::booting_from(FlashKind::Nand);
    soc.nand = None;
    assert_eq!(
        probe(&mut soc),
        Err(ProbeError::ControllerMissing(FlashKind::Nand))
    );

    let mut soc = SimSoc::booting_from(FlashKind::SerialFlash);
    soc.serial = None;
    assert_eq!(
        probe(&mut soc),
        Err(ProbeError::ControllerMissing(FlashKind::SerialFlash))
    );
}

#[test]
fn test_probe_no_indicator() {
    let mut soc = SimSoc::booting_from(FlashKind::Nand);
    soc.boot_device = None;
    assert_eq!(probe(&mut soc), Err(ProbeError::NoBootDevice));
}

#[test]
fn test_probe_parallel_has_no_absence_signal() {
    // Parallel NOR geometry comes straight from chip-common registers; the probe cannot fail.
    let mut soc = SimSoc::booting_from(FlashKind::ParallelFlash);
    soc.nand = None;
    soc.serial = None;
    let desc = probe(&mut soc).unwrap();
    assert_eq!(desc.kind, FlashKind::ParallelFlash);
}
