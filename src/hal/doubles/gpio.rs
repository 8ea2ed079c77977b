use crate::hal::gpio::{InputPin, OutputPin};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

/// Shared-handle pin double. Clones observe the same line, so a test can
/// drive the level an `InputPin` consumer will read, or inspect the history
/// of levels an `OutputPin` consumer has written.
#[derive(Clone, Debug, Default)]
pub struct MockPin {
    line: Rc<Line>,
}

#[derive(Debug, Default)]
struct Line {
    state: Cell<bool>,
    changes: RefCell<Vec<bool>>,
}

impl MockPin {
    pub fn with_level(level: bool) -> Self {
        let pin = Self::default();
        pin.drive(level);
        pin
    }

    /// External stimulus; does not show up in `changes`.
    pub fn drive(&self, level: bool) { self.line.state.set(level); }

    pub fn level(&self) -> bool { self.line.state.get() }

    /// Every level written through the `OutputPin` interface, oldest first.
    pub fn changes(&self) -> Vec<bool> { self.line.changes.borrow().clone() }
}

impl InputPin for MockPin {
    fn is_high(&self) -> bool { self.line.state.get() }

    fn is_low(&self) -> bool { !self.line.state.get() }
}

impl OutputPin for MockPin {
    fn set_low(&mut self) {
        self.line.state.set(false);
        self.line.changes.borrow_mut().push(false);
    }

    fn set_high(&mut self) {
        self.line.state.set(true);
        self.line.changes.borrow_mut().push(true);
    }
}
