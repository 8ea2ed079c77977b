use crate::hal::time::{self, Milliseconds};
use std::{cell::Cell, rc::Rc};

/// Point on the mock millisecond timeline. Subtraction wraps, mirroring a
/// free-running hardware tick counter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MockInstant(pub u32);

impl time::Instant for MockInstant {}

impl core::ops::Sub for MockInstant {
    type Output = Milliseconds;
    fn sub(self, rhs: Self) -> Milliseconds { Milliseconds(self.0.wrapping_sub(rhs.0)) }
}

impl<T: Into<Milliseconds>> core::ops::Add<T> for MockInstant {
    type Output = Self;
    fn add(self, rhs: T) -> Self { MockInstant(self.0.wrapping_add(rhs.into().0)) }
}

/// Millisecond clock under test control. Clones share the counter, so the
/// test keeps a handle while the code under test owns another.
#[derive(Clone, Debug, Default)]
pub struct MockSysTick {
    counter: Rc<Cell<u32>>,
    auto_advance: u32,
}

impl MockSysTick {
    pub fn starting_at(ms: u32) -> Self {
        let systick = Self::default();
        systick.counter.set(ms);
        systick
    }

    /// A clock that moves `ms` forward on every `now()` call. Required when
    /// testing code that spin-waits on the clock, which would otherwise
    /// never observe time passing.
    pub fn with_auto_advance(ms: u32) -> Self {
        Self { counter: Rc::new(Cell::new(0)), auto_advance: ms }
    }

    pub fn advance(&self, ms: u32) { self.counter.set(self.counter.get().wrapping_add(ms)); }

    pub fn set(&self, ms: u32) { self.counter.set(ms); }
}

impl time::Now for MockSysTick {
    type I = MockInstant;
    fn now(&self) -> MockInstant {
        let now = self.counter.get();
        self.counter.set(now.wrapping_add(self.auto_advance));
        MockInstant(now)
    }
}
