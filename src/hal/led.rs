//! LED interface.

/// Interface to a LED's direct on/off/toggle operations.
pub trait Toggle {
    fn on(&mut self);
    fn off(&mut self);
    fn toggle(&mut self);
}
