//! Key input engine: software debounce and gesture recognition.
//!
//! Each configured key owns a private state record. A periodic, non-blocking
//! [`scan`](Keypad::scan) pass (every 5-20ms from a timer or the main loop)
//! samples the raw pin level of every key and advances its state machine,
//! emitting semantic [`Event`]s through a per-key callback or the default
//! handler. No pass ever waits: debouncing and the gesture windows are
//! expressed purely as comparisons against the monotonic clock, so a scan
//! does a fixed amount of work per key and returns.
//!
//! The per-key state machine has three phases: released and idle, pressed,
//! and released while a click waits out the double-click window. A raw level
//! change restarts the debounce timer; a level that has stayed put for the
//! debounce interval becomes the new stable state, producing `Press` or
//! `Release` edges. Short press/release cycles defer their `Click` until the
//! double-click window closes, so a second release inside the window can be
//! merged into a single `DoubleClick`. Holding a key past the long-press
//! threshold emits one `LongPress`, and the release that follows is never
//! also counted as a click.
//!
//! Key polarity is not hardcoded: the level sampled at construction is taken
//! as the idle level, so the engine works for active-low and active-high
//! wiring alike. That makes "no key is held during construction" a caller
//! precondition.
//!
//! The engine assumes exactly one execution context calls `scan`, and runs
//! handlers inline; a handler that blocks stalls the debounce timing of every
//! key scanned after it in that pass.

use crate::hal::{
    gpio::InputPin,
    time::{Instant, Milliseconds, Now},
};
use static_assertions::const_assert;

/// Default minimum duration a raw level must hold before it is accepted
/// as the new stable level. Typically 10-50ms for mechanical keys.
pub const DEBOUNCE: Milliseconds = Milliseconds(20);
/// Default held duration after which a press becomes a long press.
pub const LONG_PRESS: Milliseconds = Milliseconds(600);
/// Default maximum gap between two releases merged into a double click.
pub const DOUBLE_CLICK: Milliseconds = Milliseconds(200);

const_assert!(DEBOUNCE.0 < DOUBLE_CLICK.0);
const_assert!(DOUBLE_CLICK.0 < LONG_PRESS.0);

/// Semantic key events, in the order a key produces them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Debounced press edge.
    Press,
    /// Debounced release edge.
    Release,
    /// Short press/release cycle, after its double-click window expired.
    Click,
    /// Two short cycles whose releases fell within the double-click window.
    DoubleClick,
    /// Key held past the long-press threshold. Fires once per press.
    LongPress,
}

/// Event sink, called synchronously from `scan` with the key index.
/// Must not block.
pub type Callback = fn(usize, Event);

/// Debounce and gesture windows, applied uniformly to all keys.
#[derive(Copy, Clone, Debug)]
pub struct Timings {
    pub debounce: Milliseconds,
    pub long_press: Milliseconds,
    pub double_click: Milliseconds,
}

impl Default for Timings {
    fn default() -> Self {
        Self { debounce: DEBOUNCE, long_press: LONG_PRESS, double_click: DOUBLE_CLICK }
    }
}

struct Key<P, I> {
    pin: P,
    /// Level read at construction, assumed unpressed.
    idle_level: bool,
    /// Debounced state. True while pressed.
    stable_pressed: bool,
    /// Most recent raw sample, only used to spot edges.
    last_raw: bool,
    /// Debounce timer anchor: when the raw level last changed.
    last_change: I,
    pressed_at: Option<I>,
    released_at: Option<I>,
    /// A click happened and waits for the double-click window to close.
    click_pending: bool,
    /// Long press already reported for the current press.
    long_reported: bool,
}

impl<P: InputPin, I: Instant> Key<P, I> {
    fn at_rest(pin: P, now: I) -> Self {
        let idle_level = pin.is_high();
        Self {
            pin,
            idle_level,
            stable_pressed: false,
            last_raw: idle_level,
            last_change: now,
            pressed_at: None,
            released_at: None,
            click_pending: false,
            long_reported: false,
        }
    }

    fn step(&mut self, now: I, timings: &Timings, mut emit: impl FnMut(Event)) {
        let raw = self.pin.is_high();
        let pressed = raw != self.idle_level;

        // Any raw edge restarts the debounce timer; nothing else happens
        // this tick.
        if raw != self.last_raw {
            self.last_raw = raw;
            self.last_change = now;
            return;
        }

        // Still settling.
        if now - self.last_change < timings.debounce {
            return;
        }

        if pressed != self.stable_pressed {
            self.stable_pressed = pressed;
            if pressed {
                self.pressed_at = Some(now);
                self.long_reported = false;
                emit(Event::Press);
            } else {
                // Keep the previous release around: the double-click window
                // is measured between consecutive releases.
                let previous_release = self.released_at.replace(now);
                emit(Event::Release);

                let held = self.pressed_at.map_or(Milliseconds(0), |at| now - at);
                if held < timings.long_press {
                    let double = self.click_pending
                        && previous_release.map_or(false, |at| now - at <= timings.double_click);
                    if double {
                        self.click_pending = false;
                        emit(Event::DoubleClick);
                    } else {
                        // Defer the click until the window closes.
                        self.click_pending = true;
                    }
                } else {
                    // Releasing a long press is not a click.
                    self.click_pending = false;
                }
            }
        } else if pressed {
            if !self.long_reported
                && self.pressed_at.map_or(false, |at| now - at >= timings.long_press)
            {
                self.long_reported = true;
                emit(Event::LongPress);
            }
        } else if self.click_pending
            && self.released_at.map_or(false, |at| now - at > timings.double_click)
        {
            // Window expired with no second release; the deferred click
            // is final.
            self.click_pending = false;
            emit(Event::Click);
        }
    }
}

/// Debounce and gesture engine over `N` keys.
pub struct Keypad<P, T, const N: usize>
where
    P: InputPin,
    T: Now,
{
    keys: [Key<P, T::I>; N],
    systick: T,
    timings: Timings,
    default_handler: Callback,
    callbacks: [Option<Callback>; N],
}

impl<P, T, const N: usize> Keypad<P, T, N>
where
    P: InputPin,
    T: Now,
{
    /// Builds the engine with default timing windows, sampling every pin
    /// once to learn its idle level. No key may be held while this runs.
    pub fn new(pins: [P; N], systick: T) -> Self {
        Self::with_timings(pins, systick, Timings::default())
    }

    pub fn with_timings(pins: [P; N], systick: T, timings: Timings) -> Self {
        let now = systick.now();
        Self {
            keys: pins.map(|pin| Key::at_rest(pin, now)),
            systick,
            timings,
            default_handler: |_, _| {},
            callbacks: [None; N],
        }
    }

    /// Advances every key's state machine and dispatches the events
    /// recognized this tick. Non-blocking; call every 5-20ms.
    ///
    /// The clock is sampled once per pass so relative timing stays
    /// consistent across keys scanned in the same tick.
    pub fn scan(&mut self) {
        let now = self.systick.now();
        for (index, key) in self.keys.iter_mut().enumerate() {
            let handler = self.callbacks[index].unwrap_or(self.default_handler);
            key.step(now, &self.timings, |event| handler(index, event));
        }
    }

    /// Routes `key`'s events to `callback` instead of the default handler.
    /// Out-of-range indices are ignored.
    pub fn register_callback(&mut self, key: usize, callback: Callback) {
        if let Some(slot) = self.callbacks.get_mut(key) {
            *slot = Some(callback);
        }
    }

    /// Reverts `key`'s events to the default handler. Out-of-range indices
    /// are ignored.
    pub fn unregister_callback(&mut self, key: usize) {
        if let Some(slot) = self.callbacks.get_mut(key) {
            *slot = None;
        }
    }

    /// Sink for events of keys without a registered callback. Replaces the
    /// initial no-op handler.
    pub fn set_default_handler(&mut self, handler: Callback) { self.default_handler = handler; }

    /// Debounced state of a key; false for out-of-range indices.
    pub fn is_pressed(&self, key: usize) -> bool {
        self.keys.get(key).map_or(false, |key| key.stable_pressed)
    }
}
