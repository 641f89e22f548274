//! Button state relay: RP2040 input events folded into FPGA reports.
//!
//! The RP2040 front-board controller queues input events on the ESP32; while
//! a bitstream owns the FPGA link those events are forwarded to it as 5-byte
//! state reports so the gateware can react to the buttons directly.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{
    Channel,
    Receiver,
};

use crate::link::{
    FpgaLink,
    SPI_CMD_BUTTON_REPORT,
};

/// Input lines of the RP2040 front-board controller.
///
/// Eleven of these are buttons and joystick directions with a fixed bit in
/// the report bitmask; the remaining board lines arrive on the same queue
/// but are never reported to the FPGA.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputId {
    JoystickDown,
    JoystickUp,
    JoystickLeft,
    JoystickRight,
    JoystickPress,
    Home,
    Menu,
    Select,
    Start,
    Accept,
    Back,
    /// FPGA configuration-done line; not a button.
    FpgaCdone,
    /// Battery charger status line; not a button.
    BatteryCharging,
}

impl InputId {
    /// Mask of this input's bit in the report bitmask, if it has one.
    const fn mask(self) -> Option<u16> {
        let bit = match self {
            Self::JoystickDown => 0,
            Self::JoystickUp => 1,
            Self::JoystickLeft => 2,
            Self::JoystickRight => 3,
            Self::JoystickPress => 4,
            Self::Home => 5,
            Self::Menu => 6,
            Self::Select => 7,
            Self::Start => 8,
            Self::Accept => 9,
            Self::Back => 10,
            Self::FpgaCdone | Self::BatteryCharging => return None,
        };
        Some(1 << bit)
    }
}

/// One press or release of an input line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InputEvent {
    pub id: InputId,
    pub pressed: bool,
}

/// Non-blocking source of input events.
///
/// Implemented for `embassy-sync` channels so the RP2040 driver task feeds
/// events straight through; test code supplies its own.
pub trait EventSource {
    /// The next queued event, or `None` right away if the queue is empty.
    fn try_next(&mut self) -> Option<InputEvent>;
}

impl<M: RawMutex, const N: usize> EventSource for &Channel<M, InputEvent, N> {
    fn try_next(&mut self) -> Option<InputEvent> {
        self.try_receive().ok()
    }
}

impl<M: RawMutex, const N: usize> EventSource for Receiver<'_, M, InputEvent, N> {
    fn try_next(&mut self) -> Option<InputEvent> {
        self.try_receive().ok()
    }
}

/// Accumulated button state for one FPGA session.
///
/// Holds the 16-bit bitmask the reports are built from. Create one per
/// session and [`reset`](ButtonRelay::reset) it whenever ownership of the
/// FPGA link is reacquired, so a fresh bitstream never sees stale state.
pub struct ButtonRelay {
    state: u16,
}

impl ButtonRelay {
    pub const fn new() -> Self {
        Self { state: 0 }
    }

    /// Clear the accumulated state without notifying the FPGA.
    pub fn reset(&mut self) {
        self.state = 0;
    }

    /// Current 16-bit button bitmask.
    pub const fn state(&self) -> u16 {
        self.state
    }

    /// Drain `events` without blocking and report every mapped change.
    ///
    /// Each mapped event sets or clears its bit and immediately sends
    /// `[0xF4, state_hi, state_lo, mask_hi, mask_lo]`. Unmapped inputs
    /// change no state and send nothing. A transport failure aborts the
    /// drain and surfaces; state changes already applied stay applied.
    pub fn forward<L, S>(&mut self, link: &mut L, events: &mut S) -> Result<(), L::Error>
    where
        L: FpgaLink,
        S: EventSource,
    {
        while let Some(event) = events.try_next() {
            let Some(mask) = event.id.mask() else {
                continue;
            };

            if event.pressed {
                self.state |= mask;
            } else {
                self.state &= !mask;
            }

            let [state_hi, state_lo] = self.state.to_be_bytes();
            let [mask_hi, mask_lo] = mask.to_be_bytes();
            link.send(&[SPI_CMD_BUTTON_REPORT, state_hi, state_lo, mask_hi, mask_lo])?;
        }
        Ok(())
    }
}

impl Default for ButtonRelay {
    fn default() -> Self {
        Self::new()
    }
}
