//! Error types for the FPGA link layer.

use core::fmt;

/// Errors from building a Wishbone command buffer.
///
/// A rejected queue call never partially encodes a frame: the buffer is
/// byte-identical to what it was before the call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CmdError {
    /// More operations requested at creation than one transaction can carry
    /// ([`MAX_OPS`](crate::wishbone::MAX_OPS)).
    TooManyOps,
    /// The frame does not fit in the space left in the command buffer.
    Overflow,
    /// Every read-back slot of the transaction is taken
    /// ([`MAX_READS`](crate::wishbone::MAX_READS)).
    TooManyReads,
    /// A burst operation already sealed the transaction.
    Sealed,
}

impl fmt::Display for CmdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyOps => write!(f, "operation count over the transaction limit"),
            Self::Overflow => write!(f, "command buffer full"),
            Self::TooManyReads => write!(f, "all read-back slots taken"),
            Self::Sealed => write!(f, "transaction sealed by a burst"),
        }
    }
}

impl core::error::Error for CmdError {}

/// Errors from driving the FPGA link.
///
/// `E` is the transport's own error type, `()` for links that cannot fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The command buffer rejected an operation.
    Cmd(CmdError),
    /// The SPI transport failed. The in-flight transaction is aborted, never
    /// retried here, and must be rebuilt from scratch by the caller.
    Link(E),
}

impl<E> From<CmdError> for Error<E> {
    fn from(err: CmdError) -> Self {
        Self::Cmd(err)
    }
}

impl<E: fmt::Display> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cmd(err) => write!(f, "{err}"),
            Self::Link(err) => write!(f, "FPGA link transport failed: {err}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> core::error::Error for Error<E> {}
