//! Wishbone command buffers: batched register access over the SPI bridge.
//!
//! A [`Transaction`] accumulates register operations into the exact byte
//! stream the FPGA's SPI slave expects, then [`execute`](Transaction::execute)
//! sends it and, if any reads were queued, runs one read-back exchange and
//! decodes the results. Each queued read hands back a [`ReadSlot`] (burst
//! reads a [`ReadSlots`] range) used to index the [`Response`].
//!
//! All multi-byte fields on the wire are big-endian. Addresses are
//! word-aligned 26-bit: the encoder emits bits \[25:2\] as three MSB-first
//! bytes, so the low two address bits are implicitly zero.

use alloc::vec::Vec;
use core::ops::Index;

use crate::error::{
    CmdError,
    Error,
};
use crate::link::{
    FpgaLink,
    SPI_CMD_RESP_ACK,
    SPI_CMD_WISHBONE,
};

/// Most operations one transaction can carry.
pub const MAX_OPS: usize = 511;
/// Most read-back slots one transaction can carry.
pub const MAX_READS: usize = 64;

/// Worst-case encoded frame: 1 mode byte + 3 address bytes + 4 data bytes.
const FRAME_MAX: usize = 8;
/// Read-back exchange header preceding the result words.
const RESP_HEADER: usize = 2;

// Mode byte layout: bit 7 = write, bit 6 = re-address (clear on bursts),
// bit 5 = burst auto-increment, bits 3:0 = device selector.
const MODE_WRITE: u8 = 0x80;
const MODE_READDR: u8 = 0x40;
const MODE_INC: u8 = 0x20;

/// Handle to one pending read, handed out by [`Transaction::queue_read`].
///
/// Indexes the [`Response`] of the transaction that issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReadSlot(usize);

/// Contiguous range of pending reads from [`Transaction::queue_read_burst`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReadSlots {
    first: usize,
    len: usize,
}

impl ReadSlots {
    /// Number of words the burst reads.
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slot for the `i`-th word of the burst.
    pub const fn get(&self, i: usize) -> Option<ReadSlot> {
        if i < self.len {
            Some(ReadSlot(self.first + i))
        } else {
            None
        }
    }
}

/// One Wishbone transaction under construction.
///
/// Created per logical transaction with a declared maximum operation count,
/// populated through the `queue_*` methods, executed at most once (enforced
/// by [`execute`](Transaction::execute) consuming `self`), then discarded.
///
/// A rejected queue call never partially encodes a frame: the buffer is
/// byte-identical to what it was before the call. Queuing a burst seals the
/// transaction — a burst runs to the end of the SPI frame by protocol
/// convention, so nothing may follow it.
pub struct Transaction {
    buf: Vec<u8>,
    capacity: usize,
    sealed: bool,
    reads: usize,
}

impl Transaction {
    /// Allocate a command buffer for up to `max_ops` operations.
    ///
    /// Reserves `1 + 8 * max_ops` bytes (one leading opcode byte plus the
    /// worst-case frame per operation) in a single contiguous allocation.
    /// Fails with [`CmdError::TooManyOps`] past [`MAX_OPS`].
    pub fn new(max_ops: usize) -> Result<Self, CmdError> {
        if max_ops > MAX_OPS {
            return Err(CmdError::TooManyOps);
        }

        let capacity = 1 + max_ops * FRAME_MAX;
        let mut buf = Vec::with_capacity(capacity);
        buf.push(SPI_CMD_WISHBONE);

        Ok(Self {
            buf,
            capacity,
            sealed: false,
            reads: 0,
        })
    }

    /// Queue a single register write.
    ///
    /// `dev` selects the Wishbone device; only its low 4 bits go on the
    /// wire, higher bits are silently dropped.
    pub fn queue_write(&mut self, dev: u8, addr: u32, value: u32) -> Result<(), CmdError> {
        self.check_open()?;
        if self.remaining() < FRAME_MAX {
            return Err(CmdError::Overflow);
        }

        self.buf.push(MODE_WRITE | MODE_READDR | (dev & 0xF));
        self.push_addr(addr);
        self.buf.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Queue a single register read.
    ///
    /// The frame carries a 4-byte placeholder; the value arrives in the
    /// read-back exchange and lands in the returned slot of the
    /// [`Response`].
    pub fn queue_read(&mut self, dev: u8, addr: u32) -> Result<ReadSlot, CmdError> {
        self.check_open()?;
        if self.remaining() < FRAME_MAX {
            return Err(CmdError::Overflow);
        }
        if self.reads >= MAX_READS {
            return Err(CmdError::TooManyReads);
        }

        self.buf.push(MODE_READDR | (dev & 0xF));
        self.push_addr(addr);
        self.buf.extend_from_slice(&[0; 4]);

        let slot = ReadSlot(self.reads);
        self.reads += 1;
        Ok(slot)
    }

    /// Queue a burst write of `values` starting at `addr`.
    ///
    /// With `auto_increment` the bridge steps the address one word per
    /// value; without it every value hits the same register (FIFO-style
    /// targets). Seals the transaction on success.
    pub fn queue_write_burst(
        &mut self,
        dev: u8,
        addr: u32,
        values: &[u32],
        auto_increment: bool,
    ) -> Result<(), CmdError> {
        self.check_open()?;
        if self.remaining() < 4 * (values.len() + 1) {
            return Err(CmdError::Overflow);
        }

        let inc = if auto_increment { MODE_INC } else { 0 };
        self.buf.push(MODE_WRITE | inc | (dev & 0xF));
        self.push_addr(addr);
        for value in values {
            self.buf.extend_from_slice(&value.to_be_bytes());
        }

        self.sealed = true;
        Ok(())
    }

    /// Queue a burst read of `n` words starting at `addr`.
    ///
    /// Claims `n` read slots (fails with [`CmdError::TooManyReads`] if that
    /// would pass [`MAX_READS`] in total). Seals the transaction on success.
    pub fn queue_read_burst(
        &mut self,
        dev: u8,
        addr: u32,
        n: usize,
        auto_increment: bool,
    ) -> Result<ReadSlots, CmdError> {
        self.check_open()?;
        if self.remaining() < 4 * (n + 1) {
            return Err(CmdError::Overflow);
        }
        if self.reads + n > MAX_READS {
            return Err(CmdError::TooManyReads);
        }

        let inc = if auto_increment { MODE_INC } else { 0 };
        self.buf.push(inc | (dev & 0xF));
        self.push_addr(addr);
        for _ in 0..n {
            self.buf.extend_from_slice(&[0; 4]);
        }

        let slots = ReadSlots {
            first: self.reads,
            len: n,
        };
        self.reads += n;
        self.sealed = true;
        Ok(slots)
    }

    /// Encoded byte stream so far, leading opcode included.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of read slots claimed so far.
    pub const fn pending_reads(&self) -> usize {
        self.reads
    }

    /// True once a burst has been queued; every later queue call fails.
    pub const fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Run the transaction over `link`.
    ///
    /// Sends the command stream, and if any reads are pending performs one
    /// half-duplex exchange of `2 + 4 * reads` bytes (leading byte rewritten
    /// to the response-ack opcode) and decodes the result words in queuing
    /// order. A transport failure at either phase aborts immediately; the
    /// transaction is not retried and must be rebuilt from scratch.
    pub fn execute<L: FpgaLink>(mut self, link: &mut L) -> Result<Response, Error<L::Error>> {
        #[cfg(feature = "defmt")]
        defmt::trace!(
            "wishbone exec: {} bytes, {} reads",
            self.buf.len(),
            self.reads
        );

        link.send(&self.buf).map_err(Error::Link)?;

        if self.reads == 0 {
            return Ok(Response { values: Vec::new() });
        }

        // Every read op encodes at least 4 bytes past its own share of the
        // response, so the request buffer always covers the response length.
        let resp_len = RESP_HEADER + 4 * self.reads;
        self.buf[0] = SPI_CMD_RESP_ACK;
        link.transact(&mut self.buf[..resp_len]).map_err(Error::Link)?;

        let mut values = Vec::with_capacity(self.reads);
        for chunk in self.buf[RESP_HEADER..resp_len].chunks_exact(4) {
            values.push(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        Ok(Response { values })
    }

    // ── Internal helpers ────────────────────────────────────────────────

    fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    const fn check_open(&self) -> Result<(), CmdError> {
        if self.sealed {
            Err(CmdError::Sealed)
        } else {
            Ok(())
        }
    }

    /// Append address bits [25:2], MSB first.
    fn push_addr(&mut self, addr: u32) {
        self.buf.push((addr >> 18) as u8);
        self.buf.push((addr >> 10) as u8);
        self.buf.push((addr >> 2) as u8);
    }
}

/// Decoded read results of an executed transaction, indexed by the
/// [`ReadSlot`]s / [`ReadSlots`] handed out at queue time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    values: Vec<u32>,
}

impl Response {
    /// Number of result words.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Index<ReadSlot> for Response {
    type Output = u32;

    fn index(&self, slot: ReadSlot) -> &u32 {
        &self.values[slot.0]
    }
}

impl Index<ReadSlots> for Response {
    type Output = [u32];

    fn index(&self, slots: ReadSlots) -> &[u32] {
        &self.values[slots.first..slots.first + slots.len]
    }
}

/// One-shot single register write.
pub fn write_reg<L: FpgaLink>(
    link: &mut L,
    dev: u8,
    addr: u32,
    value: u32,
) -> Result<(), Error<L::Error>> {
    let mut txn = Transaction::new(1)?;
    txn.queue_write(dev, addr, value)?;
    txn.execute(link)?;
    Ok(())
}

/// One-shot single register read.
pub fn read_reg<L: FpgaLink>(link: &mut L, dev: u8, addr: u32) -> Result<u32, Error<L::Error>> {
    let mut txn = Transaction::new(1)?;
    let slot = txn.queue_read(dev, addr)?;
    let resp = txn.execute(link)?;
    Ok(resp[slot])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{
        CmdError,
        Error,
    };
    use crate::link::FpgaLink;

    #[derive(Debug, PartialEq)]
    enum Call {
        Send(Vec<u8>),
        Transact(Vec<u8>),
    }

    #[derive(Debug, PartialEq, Eq)]
    struct LinkFault;

    /// Link double: records every call as the bytes it was handed, answers
    /// `transact` from a scripted reply, and fails on demand.
    #[derive(Default)]
    struct ScriptedLink {
        calls: Vec<Call>,
        reply: Vec<u8>,
        fail_send: bool,
        fail_transact: bool,
    }

    impl ScriptedLink {
        fn replying(reply: &[u8]) -> Self {
            Self {
                reply: reply.to_vec(),
                ..Self::default()
            }
        }
    }

    impl FpgaLink for ScriptedLink {
        type Error = LinkFault;

        fn send(&mut self, bytes: &[u8]) -> Result<(), LinkFault> {
            self.calls.push(Call::Send(bytes.to_vec()));
            if self.fail_send { Err(LinkFault) } else { Ok(()) }
        }

        fn transact(&mut self, buf: &mut [u8]) -> Result<(), LinkFault> {
            self.calls.push(Call::Transact(buf.to_vec()));
            if self.fail_transact {
                return Err(LinkFault);
            }
            for (dst, src) in buf.iter_mut().zip(&self.reply) {
                *dst = *src;
            }
            Ok(())
        }
    }

    #[test]
    fn single_write_frame() {
        let mut txn = Transaction::new(1).unwrap();
        txn.queue_write(2, 0x1000, 0xDEAD_BEEF).unwrap();
        assert_eq!(
            txn.bytes(),
            [0xF0, 0xC2, 0x00, 0x04, 0x00, 0xDE, 0xAD, 0xBE, 0xEF]
        );
    }

    #[test]
    fn single_read_frame_claims_slot() {
        let mut txn = Transaction::new(1).unwrap();
        let slot = txn.queue_read(2, 0x1004).unwrap();
        assert_eq!(
            txn.bytes(),
            [0xF0, 0x42, 0x00, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(slot, ReadSlot(0));
        assert_eq!(txn.pending_reads(), 1);
    }

    #[test]
    fn address_truncates_to_word_aligned_26_bits() {
        // Low 2 bits and bits above 25 never reach the wire.
        let mut txn = Transaction::new(1).unwrap();
        txn.queue_write(0, 0xFFFF_FFFF, 0).unwrap();
        assert_eq!(&txn.bytes()[2..5], [0xFF, 0xFF, 0xFF]);

        let mut txn = Transaction::new(1).unwrap();
        txn.queue_write(0, 0x0400_0003, 0).unwrap();
        assert_eq!(&txn.bytes()[2..5], [0x00, 0x00, 0x00]);
    }

    #[test]
    fn device_selector_masked_to_4_bits() {
        let mut txn = Transaction::new(1).unwrap();
        txn.queue_write(0x72, 0, 0).unwrap();
        assert_eq!(txn.bytes()[1], 0xC2);
    }

    #[test]
    fn burst_write_frame_and_seal() {
        let mut txn = Transaction::new(4).unwrap();
        txn.queue_write_burst(3, 0x100, &[1, 2], true).unwrap();
        assert_eq!(
            txn.bytes(),
            [
                0xF0, 0xA3, 0x00, 0x00, 0x40, // mode + address
                0x00, 0x00, 0x00, 0x01, // value 0
                0x00, 0x00, 0x00, 0x02, // value 1
            ]
        );
        assert!(txn.is_sealed());
        assert_eq!(txn.queue_write(0, 0, 0), Err(CmdError::Sealed));
        assert_eq!(txn.queue_read(0, 0).unwrap_err(), CmdError::Sealed);
        assert_eq!(
            txn.queue_write_burst(0, 0, &[], false),
            Err(CmdError::Sealed)
        );
    }

    #[test]
    fn burst_read_frame_claims_slot_range() {
        let mut txn = Transaction::new(4).unwrap();
        let slots = txn.queue_read_burst(5, 0x200, 3, false).unwrap();
        assert_eq!(
            txn.bytes()[..5],
            [0xF0, 0x05, 0x00, 0x00, 0x80] // no write, no increment bits
        );
        assert_eq!(txn.bytes().len(), 5 + 3 * 4);
        assert!(txn.bytes()[5..].iter().all(|&b| b == 0));
        assert_eq!(slots.len(), 3);
        assert_eq!(slots.get(0), Some(ReadSlot(0)));
        assert_eq!(slots.get(3), None);
        assert!(txn.is_sealed());
    }

    #[test]
    fn empty_burst_still_seals() {
        let mut txn = Transaction::new(1).unwrap();
        txn.queue_write_burst(1, 0x40, &[], true).unwrap();
        assert_eq!(txn.bytes(), [0xF0, 0xA1, 0x00, 0x00, 0x10]);
        assert!(txn.is_sealed());
    }

    #[test]
    fn overflow_leaves_buffer_untouched() {
        let mut txn = Transaction::new(1).unwrap();
        txn.queue_write(0, 0, 0x11).unwrap();
        let before = txn.bytes().to_vec();

        assert_eq!(txn.queue_write(0, 4, 0x22), Err(CmdError::Overflow));
        assert_eq!(txn.queue_read(0, 4).unwrap_err(), CmdError::Overflow);
        assert_eq!(
            txn.queue_write_burst(0, 4, &[1], false),
            Err(CmdError::Overflow)
        );
        assert_eq!(txn.bytes(), before);
        assert_eq!(txn.pending_reads(), 0);
        assert!(!txn.is_sealed());
    }

    #[test]
    fn read_slot_limit_wins_over_remaining_capacity() {
        let mut txn = Transaction::new(MAX_OPS).unwrap();
        for i in 0..MAX_READS {
            txn.queue_read(0, (i as u32) << 2).unwrap();
        }
        let before = txn.bytes().to_vec();

        // Byte capacity remains, the slot table is what is full.
        assert_eq!(txn.queue_read(0, 0).unwrap_err(), CmdError::TooManyReads);
        assert_eq!(txn.bytes(), before);
        assert_eq!(txn.pending_reads(), MAX_READS);

        // A burst that would pass the limit is rejected whole.
        let mut txn = Transaction::new(MAX_OPS).unwrap();
        txn.queue_read(0, 0).unwrap();
        assert_eq!(
            txn.queue_read_burst(0, 0, MAX_READS, true).unwrap_err(),
            CmdError::TooManyReads
        );
        assert_eq!(txn.pending_reads(), 1);
        assert!(!txn.is_sealed());
    }

    #[test]
    fn op_count_limit() {
        assert!(Transaction::new(MAX_OPS).is_ok());
        assert_eq!(
            Transaction::new(MAX_OPS + 1).map(|_| ()).unwrap_err(),
            CmdError::TooManyOps
        );
    }

    #[test]
    fn execute_without_reads_skips_read_back() {
        let mut link = ScriptedLink::default();
        let mut txn = Transaction::new(2).unwrap();
        txn.queue_write(1, 0x10, 0xAA).unwrap();
        txn.queue_write(1, 0x14, 0xBB).unwrap();
        let sent = txn.bytes().to_vec();

        let resp = txn.execute(&mut link).unwrap();
        assert!(resp.is_empty());
        assert_eq!(link.calls, [Call::Send(sent)]);
    }

    #[test]
    fn execute_with_read_runs_one_read_back() {
        // The worked example: one write, one read, 6-byte read-back.
        let mut link = ScriptedLink::replying(&[0x00, 0x00, 0x12, 0x34, 0x56, 0x78]);
        let mut txn = Transaction::new(4).unwrap();
        txn.queue_write(2, 0x1000, 0xDEAD_BEEF).unwrap();
        let slot = txn.queue_read(2, 0x1004).unwrap();
        let sent = txn.bytes().to_vec();
        assert_eq!(sent.len(), 17);

        let resp = txn.execute(&mut link).unwrap();
        assert_eq!(resp[slot], 0x1234_5678);
        assert_eq!(link.calls.len(), 2);
        assert_eq!(link.calls[0], Call::Send(sent.clone()));
        // Read-back: first 6 bytes of the request, opcode rewritten.
        let Call::Transact(out) = &link.calls[1] else {
            panic!("expected a transact call");
        };
        assert_eq!(out.len(), 6);
        assert_eq!(out[0], 0xFE);
        assert_eq!(out[1..], sent[1..6]);
    }

    #[test]
    fn results_scatter_in_queue_order() {
        // Interleaved single reads, a write, and a burst read; values land
        // in the order the read frames appear, not grouped by type.
        let mut reply = vec![0u8, 0];
        for v in [10u32, 20, 30, 40] {
            reply.extend_from_slice(&v.to_be_bytes());
        }
        let mut link = ScriptedLink::replying(&reply);

        let mut txn = Transaction::new(8).unwrap();
        let a = txn.queue_read(0, 0x00).unwrap();
        txn.queue_write(0, 0x04, 0xFF).unwrap();
        let b = txn.queue_read(0, 0x08).unwrap();
        let rest = txn.queue_read_burst(0, 0x0C, 2, true).unwrap();

        let resp = txn.execute(&mut link).unwrap();
        assert_eq!(resp.len(), 4);
        assert_eq!(resp[a], 10);
        assert_eq!(resp[b], 20);
        assert_eq!(resp[rest], [30, 40]);
        let Call::Transact(out) = &link.calls[1] else {
            panic!("expected a transact call");
        };
        assert_eq!(out.len(), 2 + 4 * 4);
    }

    #[test]
    fn send_failure_aborts() {
        let mut link = ScriptedLink {
            fail_send: true,
            ..ScriptedLink::default()
        };
        let mut txn = Transaction::new(1).unwrap();
        txn.queue_read(0, 0).unwrap();
        assert_eq!(txn.execute(&mut link).unwrap_err(), Error::Link(LinkFault));
        assert_eq!(link.calls.len(), 1);
    }

    #[test]
    fn read_back_failure_aborts() {
        let mut link = ScriptedLink {
            fail_transact: true,
            ..ScriptedLink::default()
        };
        let mut txn = Transaction::new(1).unwrap();
        txn.queue_read(0, 0).unwrap();
        assert_eq!(txn.execute(&mut link).unwrap_err(), Error::Link(LinkFault));
        assert_eq!(link.calls.len(), 2);
    }

    #[test]
    fn one_shot_helpers() {
        let mut link = ScriptedLink::default();
        write_reg(&mut link, 4, 0x20, 0x0102_0304).unwrap();
        assert_eq!(
            link.calls,
            [Call::Send(vec![
                0xF0, 0xC4, 0x00, 0x00, 0x08, 0x01, 0x02, 0x03, 0x04
            ])]
        );

        let mut link = ScriptedLink::replying(&[0, 0, 0xCA, 0xFE, 0xBA, 0xBE]);
        let value = read_reg(&mut link, 4, 0x20).unwrap();
        assert_eq!(value, 0xCAFE_BABE);
    }
}
