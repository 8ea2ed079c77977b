//! Time units and the monotonic clock interface.
use core::ops::{Add as Adds, Sub as Subtracts};

/// Abstract point in time.
///
/// Subtracting two instants yields a span of milliseconds; adding
/// milliseconds to an instant yields a later instant. Implementers own the
/// wraparound policy: subtraction must be performed in wrapping arithmetic
/// so that `now - earlier` stays correct across a counter rollover, which
/// is what lets every timing comparison in this crate take the
/// `now - timestamp >= threshold` form without special cases.
pub trait Instant
where
    Self: Copy + Clone,
    Self: Subtracts<Output = Milliseconds>,
    Self: Adds<Milliseconds, Output = Self>,
{
}

/// Source of the current instant (a systick counter, a hardware timer...).
pub trait Now {
    type I: Instant;
    fn now(&self) -> Self::I;
}

#[derive(Clone, Copy, Debug, PartialOrd, PartialEq, Eq)]
pub struct Milliseconds(pub u32);

#[derive(Clone, Copy, Debug, PartialOrd, PartialEq, Eq)]
pub struct Seconds(pub u32);

/// Extension trait that adds convenience methods to the `u32` type
pub trait U32Ext {
    /// Wrap in `Milliseconds`
    fn ms(self) -> Milliseconds;

    /// Wrap in `Seconds`
    fn s(self) -> Seconds;
}

impl U32Ext for u32 {
    fn ms(self) -> Milliseconds { Milliseconds(self) }

    fn s(self) -> Seconds { Seconds(self) }
}

impl From<Seconds> for Milliseconds {
    fn from(seconds: Seconds) -> Self { Milliseconds(seconds.0 * 1_000) }
}
