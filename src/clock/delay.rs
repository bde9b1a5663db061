use super::{SlotClock, SlotTiming};
use embedded_hal::delay::DelayNs;

/// Advances `clock` by `slots` boundaries, sleeping one nominal slot before each.
///
/// # Arguments
/// - `clock`: The slot clock shared with the scheduling task.
/// - `delay`: A delay provider implementing `DelayNs`, typically from the HAL.
/// - `timing`: Slot geometry; its nominal slot length is used, without jitter.
/// - `slots`: Number of slot boundaries to generate.
pub fn drive_slot_clock<D: DelayNs>(
    clock: &SlotClock,
    delay: &mut D,
    timing: &SlotTiming,
    slots: u32,
) {
    let slot_us = timing.slot_us();
    for _ in 0..slots {
        delay.delay_us(slot_us);
        clock.on_timer();
    }
}

/// Runs a blocking loop that generates slot boundaries forever.
///
/// For targets without a spare hardware timer. Run it on its own thread.
///
/// # Notes
/// - This loop will never return.
/// - Code executed between delays stretches every slot; prefer the
///   interrupt-driven clock when peers use it.
pub fn run_slot_clock_loop<D: DelayNs>(clock: &SlotClock, delay: &mut D, timing: &SlotTiming) -> ! {
    loop {
        drive_slot_clock(clock, delay, timing, 1);
    }
}
