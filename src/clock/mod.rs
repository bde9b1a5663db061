//! Slot clock and timing utilities.
//!
//! A hardware timer fires once per slot boundary and calls
//! [`SlotClock::on_timer`]. The scheduling task arms a countdown for the next
//! slot it needs with [`SlotClock::arm_at`] and then polls
//! [`SlotClock::wait`], which becomes ready exactly once when the countdown
//! reaches zero. There is no continuous drift correction: a slave hard-resets
//! its phase with [`SlotClock::resync`] on every announce or `Sync` header.
//!
//! Two ways of driving the clock are provided:
//! - `timer-isr` (default): `global_slot_clock_tick` and `tick_slot_clock!()` for a timer
//!   interrupt, with a jittered reload per slot
//! - `delay-loop`: `run_slot_clock_loop` drives the clock from an
//!   `embedded_hal::delay::DelayNs`
//!
//! Slot duration with the default constants:
//!
//! | Timer clock | Packet ticks | Guard ticks | Slot      |
//! |-------------|--------------|-------------|-----------|
//! | 1.6 MHz     | 26 000       | 6 400 ± 800 | ~20.25 ms |

use core::cell::Cell;
use core::convert::Infallible;

use critical_section::Mutex;
use libm::ceil;
use rand_core::RngCore;

use crate::consts::{
    FRAME_SIZE, GUARD_TICKS, JITTER_TICKS, PACKET_TICKS, SLOTS_PER_PERIOD, TIMER_CLOCK_HZ,
};

#[cfg(feature = "delay-loop")]
mod delay;
#[cfg_attr(feature = "delay-loop", allow(unused_imports))]
#[cfg(feature = "delay-loop")]
pub use delay::*;

#[cfg(feature = "timer-isr")]
mod isr;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use isr::*;

#[cfg(feature = "timer-isr")]
mod macros;

/// Hardware timer generating the slot boundaries.
pub trait SlotTimer {
    /// Restarts the current slot so that the next boundary fires after
    /// `remaining_ticks` timer ticks. Used for phase resets.
    fn restart(&mut self, remaining_ticks: u32);

    /// Sets the length (in timer ticks) of the slot that starts at the next boundary.
    fn set_reload(&mut self, ticks: u32);
}

/// Slot geometry expressed in timer ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct SlotTiming {
    /// Timer clock frequency (Hz).
    pub timer_hz: u32,
    /// Ticks needed to send one frame, turnaround included.
    pub packet_ticks: u32,
    /// Nominal idle guard appended to every slot.
    pub guard_ticks: u32,
    /// Maximum random deviation of the guard, in either direction.
    pub jitter_ticks: u32,
}

impl Default for SlotTiming {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotTiming {
    /// Timing built from the protocol constants.
    pub const fn new() -> Self {
        Self {
            timer_hz: TIMER_CLOCK_HZ,
            packet_ticks: PACKET_TICKS,
            guard_ticks: GUARD_TICKS,
            jitter_ticks: JITTER_TICKS,
        }
    }

    /// Derives the packet time from the radio bit rate.
    ///
    /// # Arguments
    /// - `timer_hz`: slot timer clock (Hz)
    /// - `bitrate`: radio bit rate (bits per second)
    /// - `preamble_len`: preamble length in bytes
    /// - `turnaround_us`: transceiver switching time added to every packet
    ///
    /// The on-air time covers preamble, the 4-byte sync word and one frame,
    /// rounded up to a whole tick. Guard and jitter keep their default ratio
    /// to the packet time.
    pub fn from_bitrate(timer_hz: u32, bitrate: u32, preamble_len: u8, turnaround_us: u32) -> Self {
        let bits = (u32::from(preamble_len) + 4 + FRAME_SIZE as u32) * 8;
        let airtime_ticks = bits as f64 * timer_hz as f64 / bitrate as f64
            + turnaround_us as f64 * timer_hz as f64 / 1_000_000.0;
        let packet_ticks = ceil(airtime_ticks) as u32;
        let scaled = |ticks: u32| {
            let wide = u64::from(packet_ticks) * u64::from(ticks) / u64::from(PACKET_TICKS);
            u32::try_from(wide).unwrap_or(u32::MAX)
        };
        Self {
            timer_hz,
            packet_ticks,
            guard_ticks: scaled(GUARD_TICKS),
            jitter_ticks: scaled(JITTER_TICKS),
        }
    }

    /// Nominal slot length in timer ticks.
    pub const fn slot_ticks(&self) -> u32 {
        self.packet_ticks.saturating_add(self.guard_ticks)
    }

    /// Slot length with a random guard deviation in `-jitter..=jitter`,
    /// never below zero.
    pub fn jittered_slot_ticks<G: RngCore>(&self, rng: &mut G) -> u32 {
        if self.jitter_ticks == 0 {
            return self.slot_ticks();
        }
        let span = self.jitter_ticks.saturating_mul(2).saturating_add(1);
        let offset = rng.next_u32() % span;
        self.slot_ticks()
            .saturating_sub(self.jitter_ticks)
            .saturating_add(offset)
    }

    /// Converts timer ticks to microseconds, rounding up.
    pub const fn ticks_to_us(&self, ticks: u32) -> u32 {
        ((ticks as u64 * 1_000_000).div_ceil(self.timer_hz as u64)) as u32
    }

    /// Nominal slot length in microseconds.
    pub const fn slot_us(&self) -> u32 {
        self.ticks_to_us(self.slot_ticks())
    }

    /// How long a node listens in a slot for its peer (one packet time plus half a guard).
    pub const fn listen_timeout_us(&self) -> u32 {
        self.ticks_to_us(self.packet_ticks + self.guard_ticks / 2)
    }

    /// Ticks left in a slot once a frame sent at its start has been fully received.
    /// This is the fixed phase offset applied on resynchronization.
    pub const fn resync_remaining_ticks(&self) -> u32 {
        self.guard_ticks
    }
}

#[derive(Debug, Clone, Copy)]
struct ClockState {
    slot: u16,
    period: u16,
    countdown: i32,
    released: bool,
    elapsed: u32,
}

/// Slot counter shared between the timer interrupt and the scheduling task.
///
/// All methods take `&self` and are safe to call from an interrupt; declare the
/// clock as a `static`.
///
/// # Example
/// ```rust
/// use geode::clock::SlotClock;
///
/// static CLOCK: SlotClock = SlotClock::new();
///
/// CLOCK.arm_at(2);
/// CLOCK.on_timer(); // slot 1
/// assert!(CLOCK.wait().is_err());
/// CLOCK.on_timer(); // slot 2
/// assert_eq!(CLOCK.wait(), Ok(2));
/// ```
pub struct SlotClock {
    state: Mutex<Cell<ClockState>>,
}

impl core::fmt::Debug for SlotClock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = critical_section::with(|cs| self.state.borrow(cs).get());
        f.debug_struct("SlotClock")
            .field("slot", &state.slot)
            .field("period", &state.period)
            .finish_non_exhaustive()
    }
}

impl Default for SlotClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotClock {
    /// Creates a clock at slot 0 of a full-size period, disarmed.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(ClockState {
                slot: 0,
                period: SLOTS_PER_PERIOD,
                countdown: 0,
                released: false,
                elapsed: 0,
            })),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut ClockState) -> T) -> T {
        critical_section::with(|cs| {
            let cell = self.state.borrow(cs);
            let mut state = cell.get();
            let out = f(&mut state);
            cell.set(state);
            out
        })
    }

    /// Sets the period length in slots. The current slot is wrapped into the new period.
    pub fn set_period(&self, period: u16) {
        self.with(|s| {
            s.period = period.max(1);
            s.slot %= s.period;
        });
    }

    /// Period length in slots.
    pub fn period(&self) -> u16 {
        self.with(|s| s.period)
    }

    /// Current slot number.
    pub fn slot(&self) -> u16 {
        self.with(|s| s.slot)
    }

    /// Slot boundaries seen since creation.
    pub fn elapsed(&self) -> u32 {
        self.with(|s| s.elapsed)
    }

    /// Slot boundary. Call from the timer interrupt.
    ///
    /// Advances the slot number and decrements the countdown; the semaphore is
    /// released on the boundary where the countdown reaches zero, never again
    /// until the clock is re-armed. A disarmed clock keeps its countdown at zero.
    pub fn on_timer(&self) {
        self.with(|s| {
            s.slot = (s.slot + 1) % s.period;
            s.elapsed = s.elapsed.wrapping_add(1);
            if s.countdown > 0 {
                s.countdown -= 1;
                if s.countdown == 0 {
                    s.released = true;
                }
            }
        });
    }

    /// Arms the countdown for `slots` boundaries from now.
    pub fn arm(&self, slots: i32) {
        self.with(|s| {
            s.countdown = slots;
            s.released = false;
        });
    }

    /// Arms the countdown for the next start of `target`. If `target` is the
    /// current slot, waits a full period.
    pub fn arm_at(&self, target: u16) {
        self.with(|s| {
            let target = target % s.period;
            let distance = (target + s.period - s.slot) % s.period;
            s.countdown = if distance == 0 {
                i32::from(s.period)
            } else {
                i32::from(distance)
            };
            s.released = false;
        });
    }

    /// Takes the semaphore if it has been released, returning the current slot.
    pub fn wait(&self) -> nb::Result<u16, Infallible> {
        self.with(|s| {
            if s.released {
                s.released = false;
                Ok(s.slot)
            } else {
                Err(nb::Error::WouldBlock)
            }
        })
    }

    /// Hard phase reset: the current slot becomes `slot`. Any armed countdown
    /// is discarded.
    pub fn resync(&self, slot: u16) {
        self.with(|s| {
            s.slot = slot % s.period;
            s.countdown = 0;
            s.released = false;
        });
    }
}
