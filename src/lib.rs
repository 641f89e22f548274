//! # mch2022-fpga
//!
//! FPGA co-processor link layer for the MCH2022 badge.
//!
//! Bitstreams loaded on the badge's iCE40UP5K expose a standard SPI slave
//! with a Wishbone bridge behind it. This crate speaks that slave's command
//! protocol:
//! - **Wishbone transactions**: [`Transaction`] batches register reads and
//!   writes into one SPI byte stream, executes it, and scatters the read
//!   results back out through [`ReadSlot`] handles.
//! - **IRQ monitor**: [`FpgaIrq`] latches the FPGA's interrupt line for
//!   polling from task context.
//! - **Button relay**: [`ButtonRelay`] folds RP2040 input events into a
//!   16-bit state bitmask and reports every change to the FPGA.
//!
//! The crate is `no_std` and generic over [`FpgaLink`], with a blanket
//! implementation for every [`embedded_hal::spi::SpiDevice`] — on the badge
//! that is the iCE40's SPI channel, in tests a scripted fake.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use mch2022_fpga::Transaction;
//!
//! let mut txn = Transaction::new(4)?;
//! txn.queue_write(2, 0x1000, 0xDEAD_BEEF)?;
//! let slot = txn.queue_read(2, 0x1004)?;
//! let resp = txn.execute(&mut spi)?;
//! let value = resp[slot];
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod buttons;
mod error;
mod irq;
mod link;
pub mod wishbone;

pub use buttons::{
    ButtonRelay,
    EventSource,
    InputEvent,
    InputId,
};
pub use error::{
    CmdError,
    Error,
};
pub use irq::FpgaIrq;
pub use link::FpgaLink;
pub use wishbone::{
    ReadSlot,
    ReadSlots,
    Response,
    Transaction,
    read_reg,
    write_reg,
};
