//! Device driver for the Winbond W25Q256JV QSPI NOR flash (32 MiB).
//!
//! Generic over a QSPI peripheral programmed in indirect mode. Reads and
//! page programs run in 1-4-4 / 1-1-4 quad modes; where the peripheral also
//! supports memory mapping, the whole array can be exposed as a read-only
//! byte slice (the mode the font store builds on).
//!
//! Erase granularities and their typical/maximum datasheet timings:
//! 4 KiB sector 45ms/400ms, 64 KiB block 150ms/2000ms, whole chip
//! 80s/400s. Writes must land on erased flash; the driver splits them
//! along page boundaries but performs no erase of its own.
use crate::{
    hal::{
        flash::{BulkErase, Read, Write},
        qspi, time,
    },
    kb, mb,
    utilities::{bitwise::BitFlags, memory::Region},
};
use core::ops::Add;
use nb::block;
use static_assertions::const_assert_eq;

/// W25Q256JV JEDEC id (manufacturer, memory type, capacity).
const JEDEC_ID: u32 = 0x00EF_4019;

/// Wait states for the 1-4-4 fast read command.
const FAST_READ_DUMMY_CYCLES: u8 = 6;

/// Address into the flash array.
#[derive(Default, Copy, Clone, Debug, PartialOrd, PartialEq)]
pub struct Address(pub u32);
impl Add<usize> for Address {
    type Output = Self;
    fn add(self, rhs: usize) -> Address { Address(self.0 + rhs as u32) }
}

pub struct MemoryMap {}
pub struct Block(pub usize);
pub struct Sector(pub usize);
pub struct Page(pub usize);

impl MemoryMap {
    pub fn blocks() -> impl Iterator<Item = Block> { (0..NUMBER_OF_BLOCKS).map(Block) }
    pub fn sectors() -> impl Iterator<Item = Sector> { (0..NUMBER_OF_SECTORS).map(Sector) }
    pub fn pages() -> impl Iterator<Item = Page> { (0..NUMBER_OF_PAGES).map(Page) }
    pub const fn location() -> Address { BASE_ADDRESS }
    pub const fn end() -> Address { Address(BASE_ADDRESS.0 + MEMORY_SIZE as u32) }
    pub const fn size() -> usize { MEMORY_SIZE }
}

impl Block {
    pub fn sectors(&self) -> impl Iterator<Item = Sector> {
        ((self.0 * SECTORS_PER_BLOCK)..((1 + self.0) * SECTORS_PER_BLOCK)).map(Sector)
    }
    pub fn location(&self) -> Address { BASE_ADDRESS + self.0 * Self::size() }
    pub fn end(&self) -> Address { self.location() + Self::size() }
    pub const fn size() -> usize { BLOCK_SIZE }
}

impl Sector {
    pub fn pages(&self) -> impl Iterator<Item = Page> {
        ((self.0 * PAGES_PER_SECTOR)..((1 + self.0) * PAGES_PER_SECTOR)).map(Page)
    }
    pub fn location(&self) -> Address { BASE_ADDRESS + self.0 * Self::size() }
    pub fn end(&self) -> Address { self.location() + Self::size() }
    pub const fn size() -> usize { SECTOR_SIZE }
}

impl Page {
    pub fn location(&self) -> Address { BASE_ADDRESS + self.0 * Self::size() }
    pub fn end(&self) -> Address { self.location() + Self::size() }
    pub const fn size() -> usize { PAGE_SIZE }
}

impl Region<Address> for MemoryMap {
    fn contains(&self, address: Address) -> bool {
        (address >= Self::location()) && (address < Self::end())
    }
}

impl Region<Address> for Block {
    fn contains(&self, address: Address) -> bool {
        (address >= self.location()) && (address < self.end())
    }
}

impl Region<Address> for Sector {
    fn contains(&self, address: Address) -> bool {
        (address >= self.location()) && (address < self.end())
    }
}

impl Region<Address> for Page {
    fn contains(&self, address: Address) -> bool {
        (address >= self.location()) && (address < self.end())
    }
}

const BASE_ADDRESS: Address = Address(0x0000_0000);

const PAGE_SIZE: usize = 256;
const PAGES_PER_SECTOR: usize = 16;
const SECTORS_PER_BLOCK: usize = 16;

const SECTOR_SIZE: usize = PAGE_SIZE * PAGES_PER_SECTOR;
const BLOCK_SIZE: usize = SECTOR_SIZE * SECTORS_PER_BLOCK;
const MEMORY_SIZE: usize = NUMBER_OF_BLOCKS * BLOCK_SIZE;

const NUMBER_OF_BLOCKS: usize = 512;
const NUMBER_OF_SECTORS: usize = NUMBER_OF_BLOCKS * SECTORS_PER_BLOCK;
const NUMBER_OF_PAGES: usize = NUMBER_OF_SECTORS * PAGES_PER_SECTOR;

const_assert_eq!(SECTOR_SIZE, kb!(4));
const_assert_eq!(BLOCK_SIZE, kb!(64));
const_assert_eq!(MEMORY_SIZE, mb!(32));

/// W25Q256JV driver, generic over a QSPI programmed in indirect mode.
pub struct W25q256jv<QSPI, NOW>
where
    QSPI: qspi::Indirect,
    NOW: time::Now,
{
    qspi: QSPI,
    timeout: Option<(time::Milliseconds, NOW)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    TimeOut,
    QspiError,
    WrongJedecId,
    MisalignedAccess,
    AddressOutOfRange,
}

#[derive(Debug, Clone, Copy)]
enum Command {
    WriteEnable = 0x06,
    ReadStatus = 0x05,
    SectorErase = 0x21,
    QuadPageProgram = 0x34,
    EnableReset = 0x66,
    ResetDevice = 0x99,
    JedecId = 0x9F,
    ChipErase = 0xC7,
    BlockErase = 0xDC,
    FastReadQuadIo = 0xEC,
}

struct Status {
    busy: bool,
    _write_enable_latch: bool,
}

enum CommandData<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
    None,
}

impl<QSPI, NOW> BulkErase for W25q256jv<QSPI, NOW>
where
    QSPI: qspi::Indirect,
    NOW: time::Now,
{
    type Error = Error;

    /// Whole-chip erase. Datasheet maximum is 400 seconds; size any
    /// configured timeout accordingly.
    fn erase(&mut self) -> nb::Result<(), Self::Error> {
        // Early yield if flash is not ready for writing
        if Self::status(&mut self.qspi)?.busy {
            Err(nb::Error::WouldBlock)
        } else {
            Self::execute_command(&mut self.qspi, Command::WriteEnable, None, CommandData::None, 0)?;
            Self::execute_command(&mut self.qspi, Command::ChipErase, None, CommandData::None, 0)?;
            Ok(block!(self.wait_until_ready())?)
        }
    }
}

impl<QSPI, NOW> Read for W25q256jv<QSPI, NOW>
where
    QSPI: qspi::Indirect,
    NOW: time::Now,
{
    type Error = Error;
    type Address = Address;

    fn read(&mut self, address: Address, bytes: &mut [u8]) -> nb::Result<(), Self::Error> {
        if !(MemoryMap {}.contains(address)) || (address + bytes.len() > MemoryMap::end()) {
            Err(nb::Error::Other(Error::AddressOutOfRange))
        } else if Self::status(&mut self.qspi)?.busy {
            Err(nb::Error::WouldBlock)
        } else {
            Self::execute_command(
                &mut self.qspi,
                Command::FastReadQuadIo,
                Some(address),
                CommandData::Read(bytes),
                FAST_READ_DUMMY_CYCLES,
            )
        }
    }

    fn readable_range(&self) -> (Address, Address) { (MemoryMap::location(), MemoryMap::end()) }
}

impl<QSPI, NOW> Write for W25q256jv<QSPI, NOW>
where
    QSPI: qspi::Indirect,
    NOW: time::Now,
{
    type Error = Error;
    type Address = Address;

    /// Programs an arbitrary range, split along page boundaries. The range
    /// must have been erased beforehand.
    fn write(&mut self, address: Address, bytes: &[u8]) -> nb::Result<(), Self::Error> {
        if !(MemoryMap {}.contains(address)) || (address + bytes.len() > MemoryMap::end()) {
            return Err(nb::Error::Other(Error::AddressOutOfRange));
        }
        let mut written = 0;
        while written < bytes.len() {
            let start = address + written;
            let page_remaining = PAGE_SIZE - (start.0 as usize % PAGE_SIZE);
            let chunk = page_remaining.min(bytes.len() - written);
            block!(self.program_page(start, &bytes[written..written + chunk]))?;
            written += chunk;
        }
        Ok(())
    }

    fn writable_range(&self) -> (Address, Address) { (MemoryMap::location(), MemoryMap::end()) }
}

impl<QSPI, NOW> W25q256jv<QSPI, NOW>
where
    QSPI: qspi::Indirect,
    NOW: time::Now,
{
    /// Resets the device, then blocks until the JEDEC id read checks out.
    pub fn new(qspi: QSPI) -> Result<Self, Error> {
        let mut flash = Self { qspi, timeout: None };
        block!(flash.reset())?;
        block!(flash.verify_id())?;
        Ok(flash)
    }

    /// Same as [`new`](Self::new), with all busy-waits bounded by `timeout`.
    pub fn with_timeout(
        qspi: QSPI,
        timeout: time::Milliseconds,
        systick: NOW,
    ) -> Result<Self, Error> {
        let mut flash = Self { qspi, timeout: Some((timeout, systick)) };
        block!(flash.reset())?;
        block!(flash.verify_id())?;
        Ok(flash)
    }

    /// Software reset (enable-reset followed by reset-device).
    pub fn reset(&mut self) -> nb::Result<(), Error> {
        Self::execute_command(&mut self.qspi, Command::EnableReset, None, CommandData::None, 0)?;
        block!(self.wait_until_ready())?;
        Self::execute_command(&mut self.qspi, Command::ResetDevice, None, CommandData::None, 0)?;
        Ok(block!(self.wait_until_ready())?)
    }

    /// Erases the 4 KiB sector at `address` (must be sector aligned).
    pub fn erase_sector(&mut self, address: Address) -> nb::Result<(), Error> {
        if !(MemoryMap {}.contains(address)) {
            return Err(nb::Error::Other(Error::AddressOutOfRange));
        }
        if address.0 as usize % SECTOR_SIZE != 0 {
            return Err(nb::Error::Other(Error::MisalignedAccess));
        }
        Self::execute_command(&mut self.qspi, Command::WriteEnable, None, CommandData::None, 0)?;
        Self::execute_command(
            &mut self.qspi,
            Command::SectorErase,
            Some(address),
            CommandData::None,
            0,
        )?;
        Ok(block!(self.wait_until_ready())?)
    }

    /// Erases the 64 KiB block at `address` (must be block aligned). The
    /// fastest option per erased byte.
    pub fn erase_block(&mut self, address: Address) -> nb::Result<(), Error> {
        if !(MemoryMap {}.contains(address)) {
            return Err(nb::Error::Other(Error::AddressOutOfRange));
        }
        if address.0 as usize % BLOCK_SIZE != 0 {
            return Err(nb::Error::Other(Error::MisalignedAccess));
        }
        Self::execute_command(&mut self.qspi, Command::WriteEnable, None, CommandData::None, 0)?;
        Self::execute_command(
            &mut self.qspi,
            Command::BlockErase,
            Some(address),
            CommandData::None,
            0,
        )?;
        Ok(block!(self.wait_until_ready())?)
    }

    fn program_page(&mut self, address: Address, bytes: &[u8]) -> nb::Result<(), Error> {
        Self::execute_command(&mut self.qspi, Command::WriteEnable, None, CommandData::None, 0)?;
        Self::execute_command(
            &mut self.qspi,
            Command::QuadPageProgram,
            Some(address),
            CommandData::Write(bytes),
            0,
        )?;
        Ok(block!(self.wait_until_ready())?)
    }

    fn wait_until_ready(&mut self) -> nb::Result<(), Error> {
        if let Some((timeout, systick)) = &self.timeout {
            let start = systick.now();
            while Self::status(&mut self.qspi)?.busy {
                if systick.now() - start > *timeout {
                    return Err(nb::Error::Other(Error::TimeOut));
                }
            }
        }

        if Self::status(&mut self.qspi)?.busy {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(())
        }
    }

    // Low level helper for executing flash commands
    fn execute_command(
        qspi: &mut QSPI,
        command: Command,
        address: Option<Address>,
        data: CommandData,
        dummy_cycles: u8,
    ) -> nb::Result<(), Error> {
        match data {
            CommandData::Write(buffer) => block!(qspi.write(
                Some(command as u8),
                address.map(|a| a.0),
                Some(buffer),
                dummy_cycles
            )),
            CommandData::Read(buffer) => block!(qspi.read(
                Some(command as u8),
                address.map(|a| a.0),
                buffer,
                dummy_cycles
            )),
            CommandData::None => {
                block!(qspi.write(Some(command as u8), address.map(|a| a.0), None, dummy_cycles))
            }
        }
        .map_err(|_| nb::Error::Other(Error::QspiError))
    }

    fn verify_id(&mut self) -> nb::Result<(), Error> {
        let mut response = [0u8; 3];
        Self::execute_command(
            &mut self.qspi,
            Command::JedecId,
            None,
            CommandData::Read(&mut response),
            0,
        )?;
        let id = u32::from_be_bytes([0, response[0], response[1], response[2]]);
        if id == JEDEC_ID {
            Ok(())
        } else {
            #[cfg(feature = "defmt")]
            defmt::warn!("unexpected flash JEDEC id: {=u32:x}", id);
            Err(nb::Error::Other(Error::WrongJedecId))
        }
    }

    fn status(qspi: &mut QSPI) -> nb::Result<Status, Error> {
        let mut response = [0u8; 1];
        Self::execute_command(qspi, Command::ReadStatus, None, CommandData::Read(&mut response), 0)?;
        let response = response[0];
        Ok(Status { busy: response.is_set(0), _write_enable_latch: response.is_set(1) })
    }
}

impl<QSPI, NOW> W25q256jv<QSPI, NOW>
where
    QSPI: qspi::MemoryMapped,
    NOW: time::Now,
{
    /// Resets the device and switches the bus to memory mapped mode, serving
    /// the whole array through 1-4-4 fast reads. Read only: call
    /// [`unmap`](Self::unmap) before issuing any other command.
    pub fn memory_mapped(&mut self) -> nb::Result<&'static [u8], Error> {
        block!(self.reset())?;
        match self.qspi.map(Some(Command::FastReadQuadIo as u8), FAST_READ_DUMMY_CYCLES) {
            Ok(contents) => Ok(contents),
            Err(nb::Error::WouldBlock) => Err(nb::Error::WouldBlock),
            Err(nb::Error::Other(_)) => Err(nb::Error::Other(Error::QspiError)),
        }
    }

    /// Leaves memory mapped mode, returning the bus to indirect commands.
    pub fn unmap(&mut self) -> nb::Result<(), Error> {
        match self.qspi.unmap() {
            Ok(()) => Ok(()),
            Err(nb::Error::WouldBlock) => Err(nb::Error::WouldBlock),
            Err(nb::Error::Other(_)) => Err(nb::Error::Other(Error::QspiError)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hal::doubles::{qspi::MockQspi, time::MockSysTick};
    use crate::hal::time::Milliseconds;

    type FlashToTest = W25q256jv<MockQspi, MockSysTick>;

    fn flash_to_test() -> FlashToTest {
        let mut qspi = MockQspi::default();
        // Two ready polls for the reset sequence, then the JEDEC id.
        qspi.to_read.push_back(vec![0]);
        qspi.to_read.push_back(vec![0]);
        qspi.to_read.push_back(vec![0xEF, 0x40, 0x19]);
        let mut flash = FlashToTest::new(qspi).unwrap();
        assert_eq!(flash.qspi.write_records[0].instruction, Some(Command::EnableReset as u8));
        assert_eq!(flash.qspi.write_records[1].instruction, Some(Command::ResetDevice as u8));
        assert_eq!(flash.qspi.read_records[2].instruction, Some(Command::JedecId as u8));
        flash.qspi.clear();
        flash
    }

    #[test]
    fn various_memory_map_iterations() {
        assert_eq!(MemoryMap::blocks().count(), NUMBER_OF_BLOCKS);
        assert_eq!(MemoryMap::sectors().count(), NUMBER_OF_SECTORS);
        assert_eq!(MemoryMap::pages().count(), NUMBER_OF_PAGES);

        let expected_address = Address((2 * BLOCK_SIZE + 3 * SECTOR_SIZE) as u32);
        let expected_index = 2 * SECTORS_PER_BLOCK + 3;
        let sector = MemoryMap::blocks().nth(2).unwrap().sectors().nth(3).unwrap();
        assert_eq!(expected_address, sector.location());
        assert_eq!(sector.0, expected_index);

        let expected_address = Address((1 * BLOCK_SIZE + 2 * SECTOR_SIZE + 3 * PAGE_SIZE) as u32);
        let expected_index = 1 * PAGES_PER_SECTOR * SECTORS_PER_BLOCK + 2 * PAGES_PER_SECTOR + 3;
        let page =
            MemoryMap::blocks().nth(1).unwrap().sectors().nth(2).unwrap().pages().nth(3).unwrap();
        assert_eq!(expected_address, page.location());
        assert_eq!(page.0, expected_index);
    }

    #[test]
    fn initialisation_succeeds_for_correct_jedec_id() {
        const WRONG_JEDEC_ID: [u8; 3] = [0xEF, 0x40, 0x18];
        let mut qspi = MockQspi::default();
        qspi.to_read.push_back(vec![0]);
        qspi.to_read.push_back(vec![0]);
        qspi.to_read.push_back(WRONG_JEDEC_ID.to_vec());

        // Then
        assert!(FlashToTest::new(qspi).is_err());

        // Given
        let mut qspi = MockQspi::default();
        qspi.to_read.push_back(vec![0]);
        qspi.to_read.push_back(vec![0]);
        qspi.to_read.push_back(vec![0xEF, 0x40, 0x19]);

        // Then
        assert!(FlashToTest::new(qspi).is_ok());
    }

    #[test]
    fn chip_erase_sets_write_enable_and_sends_the_command() {
        // Given
        let mut flash = flash_to_test();

        // When
        flash.erase().unwrap();

        // Then
        assert_eq!(flash.qspi.read_records[0].instruction, Some(Command::ReadStatus as u8));
        assert_eq!(flash.qspi.write_records[0].instruction, Some(Command::WriteEnable as u8));
        assert_eq!(flash.qspi.write_records[1].instruction, Some(Command::ChipErase as u8));
    }

    #[test]
    fn write_capable_commands_yield_if_device_busy() {
        // Given
        const BUSY_WRITING_STATUS: u8 = 1;
        let mut flash = flash_to_test();
        flash.qspi.to_read.push_back(vec![BUSY_WRITING_STATUS]);

        // Then
        assert_eq!(flash.erase(), Err(nb::Error::WouldBlock));
    }

    #[test]
    fn sector_erase_command_sequence() {
        // Given
        let mut flash = flash_to_test();
        let address = Address((3 * SECTOR_SIZE) as u32);

        // When
        flash.erase_sector(address).unwrap();

        // Then
        assert_eq!(flash.qspi.write_records[0].instruction, Some(Command::WriteEnable as u8));
        assert_eq!(flash.qspi.write_records[1].instruction, Some(Command::SectorErase as u8));
        assert_eq!(flash.qspi.write_records[1].address, Some(address.0));
    }

    #[test]
    fn misaligned_erase_is_rejected() {
        // Given
        let mut flash = flash_to_test();

        // Then
        assert_eq!(
            flash.erase_sector(Address(42)),
            Err(nb::Error::Other(Error::MisalignedAccess))
        );
        assert_eq!(
            flash.erase_block(Address((SECTOR_SIZE) as u32)),
            Err(nb::Error::Other(Error::MisalignedAccess))
        );
    }

    #[test]
    fn single_page_program_command_sequence() {
        // Given
        let mut flash = flash_to_test();
        let address = Address(0x0000);
        let data = [0xAAu8; PAGE_SIZE];

        // When
        flash.write(address, &data).unwrap();

        // Then
        assert_eq!(flash.qspi.write_records[0].instruction, Some(Command::WriteEnable as u8));
        assert_eq!(flash.qspi.write_records[1].instruction, Some(Command::QuadPageProgram as u8));
        assert_eq!(flash.qspi.write_records[1].data, data.to_vec());
    }

    #[test]
    fn unaligned_writes_split_along_page_boundaries() {
        // Given (a write that starts halfway into a page)
        let mut flash = flash_to_test();
        let address = Address((PAGE_SIZE / 2) as u32);
        let data = [0x55u8; PAGE_SIZE];

        // When
        flash.write(address, &data).unwrap();

        // Then (two programs: the tail of the first page, the head of the next)
        assert_eq!(flash.qspi.write_records[1].instruction, Some(Command::QuadPageProgram as u8));
        assert_eq!(flash.qspi.write_records[1].address, Some(address.0));
        assert_eq!(flash.qspi.write_records[1].data.len(), PAGE_SIZE / 2);
        assert_eq!(flash.qspi.write_records[3].instruction, Some(Command::QuadPageProgram as u8));
        assert_eq!(flash.qspi.write_records[3].address, Some(PAGE_SIZE as u32));
        assert_eq!(flash.qspi.write_records[3].data.len(), PAGE_SIZE / 2);
    }

    #[test]
    fn reads_use_quad_fast_read_with_dummy_cycles() {
        // Given
        let mut flash = flash_to_test();
        flash.qspi.to_read.push_back(vec![0]);
        flash.qspi.to_read.push_back(vec![9, 8, 7, 6]);
        let mut buffer = [0u8; 4];

        // When
        flash.read(Address(4), &mut buffer).unwrap();

        // Then
        assert_eq!(flash.qspi.read_records[0].instruction, Some(Command::ReadStatus as u8));
        assert_eq!(flash.qspi.read_records[1].instruction, Some(Command::FastReadQuadIo as u8));
        assert_eq!(flash.qspi.read_records[1].address, Some(4));
        assert_eq!(flash.qspi.read_records[1].dummy_cycles, FAST_READ_DUMMY_CYCLES);
        assert_eq!(buffer, [9, 8, 7, 6]);
    }

    #[test]
    fn access_past_the_array_is_rejected() {
        // Given
        let mut flash = flash_to_test();
        let mut buffer = [0u8; 4];

        // Then
        assert_eq!(
            flash.read(MemoryMap::end(), &mut buffer),
            Err(nb::Error::Other(Error::AddressOutOfRange))
        );
        assert_eq!(
            flash.write(Address((MEMORY_SIZE - 2) as u32), &[0; 4]),
            Err(nb::Error::Other(Error::AddressOutOfRange))
        );
    }

    #[test]
    fn configured_timeout_bounds_the_ready_wait() {
        // Given (a device that reports busy forever)
        let mut qspi = MockQspi::default();
        qspi.to_read.push_back(vec![0]);
        qspi.to_read.push_back(vec![0]);
        qspi.to_read.push_back(vec![0xEF, 0x40, 0x19]);
        let systick = MockSysTick::with_auto_advance(5);
        let mut flash = FlashToTest::with_timeout(qspi, Milliseconds(10), systick).unwrap();
        flash.qspi.clear();
        for _ in 0..4 {
            flash.qspi.to_read.push_back(vec![1]);
        }

        // When / Then
        assert_eq!(
            flash.erase_sector(Address(0)),
            Err(nb::Error::Other(Error::TimeOut))
        );
    }

    #[test]
    fn memory_mapping_resets_the_device_and_serves_its_contents() {
        // Given
        let mut flash = flash_to_test();
        flash.qspi.mapped_contents = vec![1, 2, 3, 4];
        flash.qspi.to_read.push_back(vec![0]);
        flash.qspi.to_read.push_back(vec![0]);

        // When
        let contents = flash.memory_mapped().unwrap();

        // Then
        assert_eq!(flash.qspi.write_records[0].instruction, Some(Command::EnableReset as u8));
        assert_eq!(flash.qspi.write_records[1].instruction, Some(Command::ResetDevice as u8));
        assert_eq!(
            flash.qspi.map_records[0],
            (Some(Command::FastReadQuadIo as u8), FAST_READ_DUMMY_CYCLES)
        );
        assert_eq!(contents, &[1, 2, 3, 4]);
        assert!(flash.qspi.mapped);

        // When
        flash.unmap().unwrap();

        // Then
        assert!(!flash.qspi.mapped);
    }
}
