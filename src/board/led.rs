//! Front-panel LED glue.
//!
//! Pure register-poking: configure the LED pins as outputs and drive them to show boot and
//! flash-operation progress. The GPIO block itself is external, reached through [`Gpio`].

use std::thread;
use std::time::Duration;

/// GPIO block capability.
pub trait Gpio {
    /// Configure the pins in `mask` as outputs (`true`) or inputs (`false`).
    fn set_output(&mut self, mask: u32, output: bool);

    /// Drive the pins in `mask` to the corresponding bits of `value`.
    fn write(&mut self, mask: u32, value: u32);

    /// Sample the pin levels.
    fn read(&self) -> u32;

    /// Early-boot delay. Nothing else runs this early, so sleeping in place is acceptable.
    fn delay(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

pub const LED_WLAN2G: u32 = 4;
pub const LED_WLAN5G: u32 = 5;
pub const LED_INTERNET: u32 = 6;
pub const LED_SYS: u32 = 7;

const fn all_leds() -> u32 {
    1 << LED_WLAN2G | 1 << LED_WLAN5G | 1 << LED_INTERNET | 1 << LED_SYS
}

/// Put every LED pin in output mode.
pub fn leds_init(gpio: &mut impl Gpio) {
    gpio.set_output(all_leds(), true);
}

pub fn leds_on(gpio: &mut impl Gpio) {
    gpio.write(all_leds(), all_leds());
}

/// Turn the panel off, keeping the system LED lit.
pub fn leds_off(gpio: &mut impl Gpio) {
    let mask = 1 << LED_WLAN2G | 1 << LED_WLAN5G | 1 << LED_INTERNET;
    gpio.write(mask, 0);
}

/// Stages of a flash write shown on the front panel, one LED per stage.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FlashOpStage {
    Idle,
    Erase,
    Program,
    Verify,
}

impl FlashOpStage {
    fn pin(self) -> u32 {
        match self {
            FlashOpStage::Idle => LED_SYS,
            FlashOpStage::Erase => LED_INTERNET,
            FlashOpStage::Program => LED_WLAN2G,
            FlashOpStage::Verify => LED_WLAN5G,
        }
    }
}

/// Light exactly the LED for the current stage.
pub fn flash_op_led(gpio: &mut impl Gpio, stage: FlashOpStage) {
    gpio.set_output(all_leds(), true);
    gpio.write(all_leds(), 1 << stage.pin());
}

/// A GPIO block that just latches writes, for testing purposes
#[derive(Debug, Default, Clone)]
pub struct SimGpio {
    /// Pins currently configured as outputs
    pub output_mask: u32,

    /// Last driven levels
    pub levels: u32,

    /// Levels presented on the input pins
    pub input: u32,

    /// Delays requested, instead of actually sleeping
    pub delays: Vec<Duration>,
}

impl Gpio for SimGpio {
    fn set_output(&mut self, mask: u32, output: bool) {
        if output {
            self.output_mask |= mask;
        } else {
            self.output_mask &= !mask;
        }
    }

    fn write(&mut self, mask: u32, value: u32) {
        self.levels = (self.levels & !mask) | (value & mask);
    }

    fn read(&self) -> u32 {
        self.input
    }

    fn delay(&mut self, duration: Duration) {
        self.delays.push(duration);
    }
}

#[test]
fn test_led_states() {
    let mut gpio = SimGpio::default();

    leds_init(&mut gpio);
    assert_eq!(gpio.output_mask, all_leds());

    leds_on(&mut gpio);
    assert_eq!(gpio.levels, all_leds());

    leds_off(&mut gpio);
    assert_eq!(gpio.levels, 1 << LED_SYS, "system LED must stay lit");
}

#[test]
fn test_flash_op_led_one_at_a_time() {
    let mut gpio = SimGpio::default();

    for stage in [
        FlashOpStage::Idle,
        FlashOpStage::Erase,
        FlashOpStage::Program,
        FlashOpStage::Verify,
    ] {
        flash_op_led(&mut gpio, stage);
        let lit = gpio.levels & all_leds();
        assert_eq!(lit.count_ones(), 1, "{stage:?}");
        assert_eq!(lit, 1 << stage.pin());
    }
}
