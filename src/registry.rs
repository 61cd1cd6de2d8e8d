//! Capability trait for the driver-layer device registry.
//!
//! Once a partition table is registered, its entries become addressable by name ("open `trx`").
//! The same base address may be registered multiple times with different tables; later
//! registrations add views rather than replacing earlier ones, which is what makes the
//! raw-then-named two-call sequence work.

use crate::layout::PartitionTable;

pub trait DeviceRegistry {
    fn register(
        &mut self,
        driver: &str,
        base: u64,
        instance: u32,
        table: &PartitionTable,
    ) -> anyhow::Result<()>;
}

/// A registry that just records every call, for testing purposes
#[derive(Debug, Default)]
pub struct RecordingRegistry {
    pub registered: Vec<Registration>,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub driver: String,
    pub base: u64,
    pub instance: u32,
    pub table: PartitionTable,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Default::default()
    }
}

impl DeviceRegistry for RecordingRegistry {
    fn register(
        &mut self,
        driver: &str,
        base: u64,
        instance: u32,
        table: &PartitionTable,
    ) -> anyhow::Result<()> {
        self.registered.push(Registration {
            driver: driver.to_owned(),
            base,
            instance,
            table: table.clone(),
        });
        Ok(())
    }
}
