//! Generic flash memory interfaces.
use crate::utilities::memory::Address;
use core::fmt;

/// Abstract mass erase.
pub trait BulkErase {
    type Error;
    fn erase(&mut self) -> nb::Result<(), Self::Error>;
}

/// Reads a range of bytes, generic over an address.
pub trait Read {
    type Error: Clone + Copy + fmt::Debug;
    type Address: Address;
    fn read(&mut self, address: Self::Address, bytes: &mut [u8]) -> nb::Result<(), Self::Error>;
    fn readable_range(&self) -> (Self::Address, Self::Address);
}

/// Writes a range of bytes, generic over an address.
///
/// Write granularity (pages, alignment, whether the range must be erased
/// beforehand) is an implementer contract; see the concrete driver.
pub trait Write {
    type Error: Clone + Copy + fmt::Debug;
    type Address: Address;
    fn write(&mut self, address: Self::Address, bytes: &[u8]) -> nb::Result<(), Self::Error>;
    fn writable_range(&self) -> (Self::Address, Self::Address);
}
