//! Capability trait for the persistent key-value configuration store.
//!
//! The store itself lives in a reserved flash region and is managed by external code; this crate
//! only reads a few settings, stages the recomputed image offsets, and asks for a single commit
//! at the end of device init. Committing is an erase/program cycle on flash, so callers batch all
//! pending writes and call [`NvStore::commit`] at most once per boot.

use std::collections::HashMap;

/// Key names shared with the OS-side tooling; these are part of the external contract and must
/// not be renamed.
pub mod keys {
    /// Enables the dual-image scheme when present
    pub const IMAGE_BOOT: &str = "image_boot";

    /// Enables the failsafe-upgrade scheme when present
    pub const BOOT_PARTITION: &str = "bootpartition";

    /// Explicit image size override, in KiB
    pub const IMAGE_SIZE: &str = "image_size";

    /// Byte offset of the primary image slot, decimal
    pub const IMAGE_FIRST_OFFSET: &str = "image_first_offset";

    /// Byte offset of the secondary image slot, decimal
    pub const IMAGE_SECOND_OFFSET: &str = "image_second_offset";

    pub const LAN_IPADDR: &str = "lan_ipaddr";
    pub const LAN_NETMASK: &str = "lan_netmask";
    pub const WAIT_TIME: &str = "wait_time";
    pub const BOOT_CONFIG: &str = "boot_config";
    pub const BOOT_SERVER: &str = "boot_server";
    pub const BOOT_FILE: &str = "boot_file";
    pub const RESET_GPIO: &str = "reset_gpio";
}

pub trait NvStore {
    /// Look up a key; `None` if absent.
    fn get(&self, key: &str) -> Option<String>;

    /// Stage a value. Not durable until [`NvStore::commit`].
    fn set(&mut self, key: &str, value: &str);

    /// Does `key` hold exactly `value`?
    fn matches(&self, key: &str, value: &str) -> bool {
        self.get(key).as_deref() == Some(value)
    }

    /// Flush staged values back to flash.
    fn commit(&mut self) -> anyhow::Result<()>;
}

/// An in-memory store, for testing purposes
#[derive(Debug, Default, Clone)]
pub struct SimNvram {
    values: HashMap<String, String>,

    /// How many times commit() has been called
    pub commits: u32,
}

impl SimNvram {
    pub fn new() -> Self {
        Default::default()
    }

    /// Build a store preloaded with the given pairs
    pub fn with<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut store = Self::new();
        for (key, value) in pairs {
            store.set(key, value);
        }
        store
    }
}

impl NvStore for SimNvram {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_owned(), value.to_owned());
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        self.commits += 1;
        Ok(())
    }
}

#[test]
fn test_sim_nvram() {
    let mut store = SimNvram::with([(keys::IMAGE_BOOT, "1")]);
    assert_eq!(store.get(keys::IMAGE_BOOT).as_deref(), Some("1"));
    assert!(store.matches(keys::IMAGE_BOOT, "1"));
    assert!(!store.matches(keys::IMAGE_BOOT, "0"));
    assert!(!store.matches(keys::IMAGE_SIZE, ""));

    store.set(keys::IMAGE_SIZE, "8192");
    assert!(store.matches(keys::IMAGE_SIZE, "8192"));

    store.commit().unwrap();
    assert_eq!(store.commits, 1);
}
