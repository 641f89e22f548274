//! FPGA interrupt line monitor.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embedded_hal_async::digital::Wait;

/// Latched FPGA interrupt flag.
///
/// One binary event with at-most-one-pending semantics: repeated
/// [`raise`](FpgaIrq::raise) calls before a poll collapse into a single
/// pending indication. The set side is safe from interrupt context and
/// never blocks; the poll side runs in task context.
///
/// Const-constructible, so the usual home is a `static` shared between the
/// pin watcher task and whoever owns the FPGA link:
///
/// ```rust,ignore
/// static FPGA_IRQ: FpgaIrq = FpgaIrq::new();
/// ```
pub struct FpgaIrq {
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl FpgaIrq {
    pub const fn new() -> Self {
        Self {
            signal: Signal::new(),
        }
    }

    /// Record one pending interrupt.
    pub fn raise(&self) {
        self.signal.signal(());
    }

    /// True iff the line fired since the last poll. Clears the flag.
    pub fn triggered(&self) -> bool {
        self.signal.try_take().is_some()
    }

    /// Wait for the next interrupt, or return at once if one is pending.
    /// Clears the flag.
    pub async fn wait(&self) {
        self.signal.wait().await;
    }

    /// Drive the flag from the interrupt pin.
    ///
    /// Raises the flag on every falling edge — the FPGA pulls the line low,
    /// so configure the pin with a pull-up. Owning the returned future is
    /// owning the edge handler: dropping it releases the pin and stops
    /// monitoring. Only a pin fault ends the loop.
    pub async fn watch<P: Wait>(&self, mut pin: P) -> Result<core::convert::Infallible, P::Error> {
        loop {
            pin.wait_for_falling_edge().await?;
            #[cfg(feature = "defmt")]
            defmt::trace!("fpga irq edge");
            self.raise();
        }
    }
}

impl Default for FpgaIrq {
    fn default() -> Self {
        Self::new()
    }
}
