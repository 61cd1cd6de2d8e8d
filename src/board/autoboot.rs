//! Assembly of the autoboot command strings.
//!
//! No network code lives here: these functions only build the exact command lines the shell
//! layer will execute after device init, from settings in the configuration store and the
//! already-computed layout. The string formats are consumed by external tooling and scripts, so
//! they are reproduced byte-for-byte.

use crate::nvram::{keys, NvStore};

const MIN_WAIT_TIME: u32 = 3;
const MAX_WAIT_TIME: u32 = 20;
const ROM_BOOT_RETRIES: u32 = 10;

/// Where a fetched boot script is staged in RAM
const SCRIPT_LOAD_ADDR: u32 = 0x0000_8000;
const MAX_SCRIPT_SIZE: u32 = 10240;
const MAX_IMAGE_SIZE: u32 = 0x0500_0000;

const DEFAULT_BOOT_SERVER: &str = "192.168.1.1";

/// The startup script buffer is fixed-size; an overlong boot_config is dropped, not truncated
const STARTUP_CAPACITY: usize = 512;
const GO_COMMAND: &str = "go;";

/// TFTP retry budget in seconds, from the `wait_time` setting clamped to 3..=20.
///
/// A ROM-booted loader with no setting retries for 10; otherwise `None` keeps the stack default.
pub fn tftp_max_retries(store: &dyn NvStore, rom_booted: bool) -> Option<u32> {
    match store.get(keys::WAIT_TIME) {
        Some(value) => {
            let seconds = value.parse().unwrap_or(0);
            Some(seconds.clamp(MIN_WAIT_TIME, MAX_WAIT_TIME))
        }
        None if rom_booted => Some(ROM_BOOT_RETRIES),
        None => None,
    }
}

/// The `eth0` configuration command: static when both address settings exist, else auto.
pub fn ifconfig_command(store: &dyn NvStore) -> String {
    match (store.get(keys::LAN_IPADDR), store.get(keys::LAN_NETMASK)) {
        (Some(addr), Some(mask)) => format!("ifconfig eth0 -addr={addr} -mask={mask}"),
        _ => "ifconfig eth0 -auto".to_owned(),
    }
}

/// The ROM-boot netboot command sequence.
///
/// A configured boot file is dispatched on its suffix: `cfesh` scripts are fetched in raw mode
/// and batched, `elf`/`raw` images are booted directly. With no file configured, all three
/// defaults are tried in order.
pub fn netboot_commands(store: &dyn NvStore) -> String {
    let server = store
        .get(keys::BOOT_SERVER)
        .unwrap_or_else(|| DEFAULT_BOOT_SERVER.to_owned());

    let batch = |file: &str| {
        format!(
            "batch -raw -tftp -addr={SCRIPT_LOAD_ADDR:#x} -max={MAX_SCRIPT_SIZE:#x} {server}:{file};"
        )
    };
    let boot_elf = |file: &str| format!("boot -elf -tftp -max={MAX_IMAGE_SIZE:#x} {server}:{file};");
    let boot_raw = |file: &str| {
        format!(
            "boot -raw -z -tftp -addr=0x00008000 -max={MAX_IMAGE_SIZE:#x} {server}:{file};"
        )
    };

    let mut script = String::new();
    match store.get(keys::BOOT_FILE) {
        Some(file) => {
            if file.len() > 5 && file.ends_with("cfesh") {
                script.push_str(&batch(&file));
            }
            if file.len() > 3 {
                if file.ends_with("elf") {
                    script.push_str(&boot_elf(&file));
                }
                if file.ends_with("raw") {
                    script.push_str(&boot_raw(&file));
                }
            }
        }
        None => {
            // Last effort: try the conventional names in order
            script.push_str(&batch("cfe_script.cfesh"));
            script.push_str(&boot_elf("boot_file.elf"));
            script.push_str(&boot_raw("boot_file.raw"));
        }
    }

    script
}

/// The STARTUP script: the optional `boot_config` command string, then the boot command.
pub fn startup_script(store: &dyn NvStore) -> String {
    let mut script = String::new();

    if let Some(config) = store.get(keys::BOOT_CONFIG) {
        if config.len() < STARTUP_CAPACITY - GO_COMMAND.len() - 1 {
            script.push_str(&config);
            script.push(';');
        } else {
            println!("boot_config too long, skipping to autoboot");
        }
    }

    script.push_str(GO_COMMAND);
    script
}

#[cfg(test)]
use crate::nvram::SimNvram;

#[test]
fn test_tftp_retries_clamped() {
    let budget = |value| {
        let store = SimNvram::with([(keys::WAIT_TIME, value)]);
        tftp_max_retries(&store, false)
    };

    assert_eq!(budget("7"), Some(7));
    assert_eq!(budget("1"), Some(MIN_WAIT_TIME));
    assert_eq!(budget("999"), Some(MAX_WAIT_TIME));
    assert_eq!(budget("junk"), Some(MIN_WAIT_TIME));

    assert_eq!(tftp_max_retries(&SimNvram::new(), false), None);
    assert_eq!(tftp_max_retries(&SimNvram::new(), true), Some(ROM_BOOT_RETRIES));
}

#[test]
fn test_ifconfig_command() {
    let store = SimNvram::with([
        (keys::LAN_IPADDR, "192.168.1.1"),
        (keys::LAN_NETMASK, "255.255.255.0"),
    ]);
    assert_eq!(
        ifconfig_command(&store),
        "ifconfig eth0 -addr=192.168.1.1 -mask=255.255.255.0",
    );

    // Either setting missing: fall back to auto configuration
    let store = SimNvram::with([(keys::LAN_IPADDR, "192.168.1.1")]);
    assert_eq!(ifconfig_command(&store), "ifconfig eth0 -auto");
}

#[test]
fn test_netboot_by_suffix() {
    let commands = |file| {
        let store = SimNvram::with([(keys::BOOT_SERVER, "10.0.0.2"), (keys::BOOT_FILE, file)]);
        netboot_commands(&store)
    };

    assert_eq!(
        commands("setup.cfesh"),
        "batch -raw -tftp -addr=0x8000 -max=0x2800 10.0.0.2:setup.cfesh;",
    );
    assert_eq!(
        commands("vmlinux.elf"),
        "boot -elf -tftp -max=0x5000000 10.0.0.2:vmlinux.elf;",
    );
    assert_eq!(
        commands("image.raw"),
        "boot -raw -z -tftp -addr=0x00008000 -max=0x5000000 10.0.0.2:image.raw;",
    );
}

#[test]
fn test_netboot_default_sequence() {
    let script = netboot_commands(&SimNvram::new());
    assert_eq!(
        script,
        "batch -raw -tftp -addr=0x8000 -max=0x2800 192.168.1.1:cfe_script.cfesh;\
         boot -elf -tftp -max=0x5000000 192.168.1.1:boot_file.elf;\
         boot -raw -z -tftp -addr=0x00008000 -max=0x5000000 192.168.1.1:boot_file.raw;",
    );
}

#[test]
fn test_startup_script() {
    assert_eq!(startup_script(&SimNvram::new()), "go;");

    let store = SimNvram::with([(keys::BOOT_CONFIG, "flash -noheader nvram")]);
    assert_eq!(startup_script(&store), "flash -noheader nvram;go;");

    // Overlong boot_config is skipped entirely
    let long = "x".repeat(600);
    let store = SimNvram::with([(keys::BOOT_CONFIG, long.as_str())]);
    assert_eq!(startup_script(&store), "go;");
}
