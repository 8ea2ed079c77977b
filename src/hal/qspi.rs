//! Quad SPI interfaces.

/// Quad SPI configured in indirect mode.
///
/// Indirect mode forces all communication to occur through explicit
/// command transactions (instruction, optional address, optional data,
/// dummy cycles).
pub trait Indirect {
    type Error;

    fn write(
        &mut self,
        instruction: Option<u8>,
        address: Option<u32>,
        data: Option<&[u8]>,
        dummy_cycles: u8,
    ) -> nb::Result<(), Self::Error>;

    fn read(
        &mut self,
        instruction: Option<u8>,
        address: Option<u32>,
        data: &mut [u8],
        dummy_cycles: u8,
    ) -> nb::Result<(), Self::Error>;
}

/// Quad SPI peripherals that can additionally expose the external device
/// contents directly in the MCU address space (read only).
pub trait MemoryMapped: Indirect {
    /// Switches the peripheral to memory mapped mode, issuing `instruction`
    /// with `dummy_cycles` wait states for every bus read.
    ///
    /// The returned slice aliases the device contents and stays valid until
    /// [`unmap`](Self::unmap) is called; no indirect-mode command may be
    /// issued while the mapping is active.
    fn map(
        &mut self,
        instruction: Option<u8>,
        dummy_cycles: u8,
    ) -> nb::Result<&'static [u8], Self::Error>;

    /// Returns the peripheral to indirect mode.
    fn unmap(&mut self) -> nb::Result<(), Self::Error>;
}
