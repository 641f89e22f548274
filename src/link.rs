//! Transport boundary to the FPGA's standard SPI slave.

use embedded_hal::spi::SpiDevice;

/// SPI opcode: a Wishbone command stream follows.
pub(crate) const SPI_CMD_WISHBONE: u8 = 0xF0;
/// SPI opcode: 5-byte button state report.
pub(crate) const SPI_CMD_BUTTON_REPORT: u8 = 0xF4;
/// SPI opcode: read back the response to the previous command.
pub(crate) const SPI_CMD_RESP_ACK: u8 = 0xFE;

/// Duplex byte link to the FPGA.
///
/// The link is single-owner at any instant: no two transactions may
/// interleave on the same physical bus, and callers serialize access
/// externally. Blocking, timeout and cancellation policy belong to the
/// transport underneath; this layer defines no timeout and never retries.
///
/// Implemented for every [`embedded_hal::spi::SpiDevice`], so the badge
/// firmware hands in its iCE40 SPI channel directly.
pub trait FpgaLink {
    type Error;

    /// Fire-and-forget transmit.
    fn send(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Half-duplex exchange: clock out `buf` while reading the reply back
    /// into the same region.
    ///
    /// Must run as a single bus transaction — the FPGA's slave interface
    /// keys its internal state off the chip-select frame.
    fn transact(&mut self, buf: &mut [u8]) -> Result<(), Self::Error>;
}

impl<S: SpiDevice<u8>> FpgaLink for S {
    type Error = S::Error;

    fn send(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.write(bytes)
    }

    fn transact(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.transfer_in_place(buf)
    }
}
