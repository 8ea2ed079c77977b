//! GPIO LED driver: single-LED control plus group and animation helpers.
//!
//! The animation helpers are blocking: they spin on the system timer until
//! the cycle completes. They suit simple applications; anything that must
//! stay responsive should drive [`Toggle`] from its own scheduler instead.

use crate::hal::{
    gpio::OutputPin,
    led::Toggle,
    time::{Milliseconds, Now},
};

/// Steps per ramp of the software-PWM breathe effect.
const BREATHE_STEPS: u32 = 100;

#[derive(Copy, Clone)]
pub enum Logic {
    /// Logical high equals "on"
    Direct,
    /// Logical high equals "off"
    Inverted,
}

/// Solid single-color LED. Starts off.
pub struct MonochromeLed<Pin: OutputPin> {
    pin: Pin,
    is_on: bool,
    logic: Logic,
}

// Extension trait to ensure LED pins are correctly
// operated based on the led's direct or inverted logic
trait LedPin: OutputPin {
    fn off(&mut self, logic: Logic) {
        if let Logic::Direct = logic {
            self.set_low();
        } else {
            self.set_high();
        }
    }

    fn on(&mut self, logic: Logic) {
        if let Logic::Direct = logic {
            self.set_high();
        } else {
            self.set_low();
        }
    }
}

// Blanket implementation of LedPin for all output pins
impl<Pin: OutputPin> LedPin for Pin {}

impl<Pin: OutputPin> MonochromeLed<Pin> {
    pub fn new(mut pin: Pin, logic: Logic) -> Self {
        pin.off(logic);
        Self { pin, is_on: false, logic }
    }

    pub fn is_on(&self) -> bool { self.is_on }

    /// One blink cycle (toggle, half a period, toggle back, half a period).
    /// Blocking.
    pub fn blink<T: Now>(&mut self, period: Milliseconds, systick: &T) {
        blink(self, period, systick);
    }

    /// One breathe cycle (dark to bright to dark, software PWM). Blocking.
    pub fn breathe<T: Now>(&mut self, period: Milliseconds, systick: &T) {
        if period.0 < 2 {
            return;
        }
        let step = (period.0 / (2 * BREATHE_STEPS)).max(1);
        for duty in 0..BREATHE_STEPS {
            self.pulse(duty, step, systick);
        }
        for duty in (0..BREATHE_STEPS).rev() {
            self.pulse(duty, step, systick);
        }
    }

    fn pulse<T: Now>(&mut self, duty: u32, step_ms: u32, systick: &T) {
        let on_time = (duty * step_ms) / (BREATHE_STEPS - 1);
        let off_time = step_ms - on_time;
        if on_time > 0 {
            self.on();
            spin_wait(systick, Milliseconds(on_time));
        }
        if off_time > 0 {
            self.off();
            spin_wait(systick, Milliseconds(off_time));
        }
    }
}

impl<Pin: OutputPin> Toggle for MonochromeLed<Pin> {
    fn on(&mut self) {
        if !self.is_on {
            self.pin.on(self.logic);
        }
        self.is_on = true;
    }

    fn off(&mut self) {
        if self.is_on {
            self.pin.off(self.logic);
        }
        self.is_on = false;
    }

    fn toggle(&mut self) {
        if self.is_on {
            self.off();
        } else {
            self.on();
        }
    }
}

pub fn on_all<L: Toggle>(leds: &mut [L]) {
    leds.iter_mut().for_each(|led| led.on());
}

pub fn off_all<L: Toggle>(leds: &mut [L]) {
    leds.iter_mut().for_each(|led| led.off());
}

pub fn toggle_all<L: Toggle>(leds: &mut [L]) {
    leds.iter_mut().for_each(|led| led.toggle());
}

/// One synchronized blink cycle for a group. Blocking.
pub fn blink_all<L: Toggle, T: Now>(leds: &mut [L], period: Milliseconds, systick: &T) {
    if period.0 == 0 {
        return;
    }
    toggle_all(leds);
    spin_wait(systick, Milliseconds(period.0 / 2));
    toggle_all(leds);
    spin_wait(systick, Milliseconds(period.0 / 2));
}

/// Lights each LED in turn for `step` milliseconds, one full sweep. Blocking.
pub fn chase<L: Toggle, T: Now>(leds: &mut [L], step: Milliseconds, systick: &T) {
    if step.0 == 0 {
        return;
    }
    for led in leds.iter_mut() {
        led.on();
        spin_wait(systick, step);
        led.off();
    }
}

fn blink<L: Toggle, T: Now>(led: &mut L, period: Milliseconds, systick: &T) {
    if period.0 == 0 {
        return;
    }
    led.toggle();
    spin_wait(systick, Milliseconds(period.0 / 2));
    led.toggle();
    spin_wait(systick, Milliseconds(period.0 / 2));
}

fn spin_wait<T: Now>(systick: &T, duration: Milliseconds) {
    let start = systick.now();
    while systick.now() - start < duration {}
}
