//! Reset and recovery button handling.
//!
//! The recovery button forces a network reflash: if it is held at power-on, the boot sequence
//! assigns a fixed address to `eth0` and pulls a recovery image from a well-known server. The
//! reset button is only waited on after a factory-defaults restore, so the user has a chance to
//! let go before the board reboots.

use std::time::Duration;

use super::led::Gpio;
use crate::nvram::{keys, NvStore};

/// GPIO pin wired to the recovery button (input, active low)
pub const RECOVERY_BUTTON: u32 = 11;

const RECOVERY_SERVER_IP: &str = "192.168.1.88";
const RECOVERY_NET_IP: &str = "192.168.1.1";
const RECOVERY_NETMASK: &str = "255.255.255.0";
const RECOVERY_IMAGE: &str = "recovery.bin";

/// Both button reads must agree across this window before a release is believed
pub const RESET_DEBOUNCE: Duration = Duration::from_millis(500);

/// Put the recovery button pin in input mode.
pub fn recovery_button_init(gpio: &mut impl Gpio) {
    gpio.set_output(1 << RECOVERY_BUTTON, false);
}

/// Is the recovery button held down right now?
pub fn recovery_button_pressed(gpio: &impl Gpio) -> bool {
    gpio.read() & (1 << RECOVERY_BUTTON) == 0
}

/// The command sequence run when recovery mode triggers.
pub fn recovery_commands() -> [String; 2] {
    [
        format!("ifconfig eth0 -addr={RECOVERY_NET_IP} -mask={RECOVERY_NETMASK}"),
        format!("hccmd {RECOVERY_SERVER_IP}:{RECOVERY_IMAGE}"),
    ]
}

/// Block until the reset button is released, with debounce.
///
/// The pin number comes from the configuration store; boards without a configured reset GPIO
/// return immediately. There is deliberately no timeout: the board must not come back up with
/// the button still held, and nothing else is running yet.
pub fn wait_reset_release(gpio: &mut impl Gpio, store: &dyn NvStore) {
    let Some(pin) = store
        .get(keys::RESET_GPIO)
        .and_then(|value| value.parse::<u32>().ok())
    else {
        return;
    };

    // Button is active low: a high level means released
    let mask = 1u32 << pin;
    loop {
        if gpio.read() & mask != 0 {
            gpio.delay(RESET_DEBOUNCE);

            if gpio.read() & mask != 0 {
                break;
            }
        }
    }
}

#[cfg(test)]
use super::led::SimGpio;
#[cfg(test)]
use crate::nvram::SimNvram;

#[test]
fn test_recovery_button() {
    let mut gpio = SimGpio::default();
    recovery_button_init(&mut gpio);
    assert_eq!(gpio.output_mask & (1 << RECOVERY_BUTTON), 0);

    gpio.input = 0;
    assert!(recovery_button_pressed(&gpio)); // active low

    gpio.input = 1 << RECOVERY_BUTTON;
    assert!(!recovery_button_pressed(&gpio));
}

#[test]
fn test_recovery_commands() {
    let [ifconfig, fetch] = recovery_commands();
    assert_eq!(ifconfig, "ifconfig eth0 -addr=192.168.1.1 -mask=255.255.255.0");
    assert_eq!(fetch, "hccmd 192.168.1.88:recovery.bin");
}

#[test]
fn test_wait_reset_release() {
    // No reset GPIO configured: returns immediately, no delay taken
    let mut gpio = SimGpio::default();
    wait_reset_release(&mut gpio, &SimNvram::new());
    assert!(gpio.delays.is_empty());

    // Button already released: one debounce pass and done
    let store = SimNvram::with([(keys::RESET_GPIO, "3")]);
    let mut gpio = SimGpio {
        input: 1 << 3,
        ..Default::default()
    };
    wait_reset_release(&mut gpio, &store);
    assert_eq!(gpio.delays, [RESET_DEBOUNCE]);
}
