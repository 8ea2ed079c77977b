//! Hand-rolled test doubles for the `hal` trait seams. Host builds only.

pub mod gpio;
pub mod qspi;
pub mod time;
