//! Abstractions for the boot storage medium.
//!
//! The actual flash drivers live outside this crate; everything here only needs to know what
//! technology the chip is, where it sits in the physical address map, and how to read a handful
//! of bytes out of it (for the self-describing image header).

use std::fmt;
use std::str::FromStr;

/// The storage technologies a board can boot from.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FlashKind {
    Nand,
    SerialFlash,
    ParallelFlash,
}

impl FlashKind {
    /// The registry name of the driver serving this technology.
    pub fn driver(self) -> &'static str {
        match self {
            FlashKind::Nand => "nflash",
            FlashKind::SerialFlash => "sflash",
            FlashKind::ParallelFlash => "flash",
        }
    }
}

impl fmt::Display for FlashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlashKind::Nand => "NAND flash",
            FlashKind::SerialFlash => "serial flash",
            FlashKind::ParallelFlash => "parallel flash",
        })
    }
}

/// Parse the short names used on the command line
impl FromStr for FlashKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "nand" => Ok(FlashKind::Nand),
            "sflash" => Ok(FlashKind::SerialFlash),
            "pflash" => Ok(FlashKind::ParallelFlash),
            other => Err(anyhow::anyhow!("unknown flash kind {other:?}")),
        }
    }
}

/// Geometry as reported by a flash controller once it has been brought up.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FlashGeometry {
    /// Base physical address of the chip
    pub base: u64,

    /// Erase block size, in bytes (a power of two)
    pub block_size: u32,

    /// Total capacity, in bytes
    pub capacity: u64,
}

/// Everything downstream layout code needs to know about the probed boot device.
///
/// Built once by [`crate::probe::probe`] and never mutated afterwards.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct StorageDescriptor {
    pub kind: FlashKind,
    pub base: u64,
    pub block_size: u32,
    pub capacity: u64,
}

impl StorageDescriptor {
    pub fn new(kind: FlashKind, geometry: FlashGeometry) -> Self {
        Self {
            kind,
            base: geometry.base,
            block_size: geometry.block_size,
            capacity: geometry.capacity,
        }
    }
}

/// Read capability over the boot flash, relative to the chip base.
///
/// This is the only storage access the planning code performs; reads past the end of the device
/// must fail rather than wrap.
pub trait FlashRead {
    fn read(&self, offset: u64, buf: &mut [u8]) -> anyhow::Result<()>;
}

/// A simulated in-memory flash, for testing purposes
#[derive(Debug, Clone)]
pub struct SimFlash {
    data: Vec<u8>,
}

impl SimFlash {
    /// Create an erased (all-1s) flash of the given size
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0xFF; size],
        }
    }

    /// Overwrite bytes starting at `offset`
    pub fn fill(&mut self, offset: usize, content: &[u8]) {
        self.data[offset..offset + content.len()].copy_from_slice(content);
    }
}

impl FlashRead for SimFlash {
    fn read(&self, offset: u64, buf: &mut [u8]) -> anyhow::Result<()> {
        let offset = offset as usize;
        let end = offset
            .checked_add(buf.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| anyhow::anyhow!("read past end of flash"))?;
        buf.copy_from_slice(&self.data[offset..end]);
        Ok(())
    }
}

#[test]
fn test_sim_flash_read() {
    let mut flash = SimFlash::new(64);
    flash.fill(8, &[1, 2, 3, 4]);

    let mut buf = [0u8; 4];
    flash.read(8, &mut buf).unwrap();
    assert_eq!(buf, [1, 2, 3, 4]);

    flash.read(0, &mut buf).unwrap();
    assert_eq!(buf, [0xFF; 4]);

    assert!(flash.read(62, &mut buf).is_err());
    assert!(flash.read(u64::MAX, &mut buf).is_err());
}

#[test]
fn test_kind_from_str() {
    assert_eq!("nand".parse::<FlashKind>().unwrap(), FlashKind::Nand);
    assert_eq!(
        "sflash".parse::<FlashKind>().unwrap(),
        FlashKind::SerialFlash
    );
    assert!("mmc".parse::<FlashKind>().is_err());
}
