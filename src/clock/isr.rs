use core::cell::RefCell;

use critical_section::Mutex;
use rand_core::RngCore;

use super::{SlotClock, SlotTimer, SlotTiming};

/// Used to initialize the global static slot timer for use with
/// `critical_section`.
///
/// # Returns
/// * An empty mutable ref-cell
///
/// # Example
/// ```rust,ignore
/// use core::cell::RefCell;
/// use critical_section::Mutex;
/// use some_hal::Tim2;
///
/// static SLOT_TIMER: Mutex<RefCell<Option<Tim2>>> = global_slot_timer_init::<Tim2>();
/// ```
pub const fn global_slot_timer_init<T: SlotTimer>() -> Mutex<RefCell<Option<T>>> {
    Mutex::new(RefCell::new(None))
}

/// Moves the hardware timer into the global static.
///
/// # Arguments
/// * The global static timer
/// * The timer, already configured to interrupt on update
/// * The slot timing whose nominal slot length is loaded first
pub fn global_slot_timer_setup<T: SlotTimer>(
    global_timer: &'static Mutex<RefCell<Option<T>>>,
    mut timer: T,
    timing: &SlotTiming,
) {
    timer.set_reload(timing.slot_ticks());
    critical_section::with(|cs| {
        let _ = global_timer.borrow(cs).replace(Some(timer));
    });
}

/// Handles one slot boundary.
///
/// Advances the clock and loads a jittered length for the next slot.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIM2() {
///     global_slot_clock_tick(&SLOT_CLOCK, &SLOT_TIMER, &TIMING, &mut rng);
/// }
/// ```
pub fn global_slot_clock_tick<T: SlotTimer, G: RngCore>(
    clock: &SlotClock,
    global_timer: &'static Mutex<RefCell<Option<T>>>,
    timing: &SlotTiming,
    rng: &mut G,
) {
    clock.on_timer();
    let ticks = timing.jittered_slot_ticks(rng);
    critical_section::with(|cs| {
        if let Some(timer) = global_timer.borrow(cs).borrow_mut().as_mut() {
            timer.set_reload(ticks);
        }
    });
}

/// Lets the scheduling task share the timer owned by the interrupt.
impl<T: SlotTimer> SlotTimer for &'static Mutex<RefCell<Option<T>>> {
    fn restart(&mut self, remaining_ticks: u32) {
        critical_section::with(|cs| {
            if let Some(timer) = self.borrow(cs).borrow_mut().as_mut() {
                timer.restart(remaining_ticks);
            }
        });
    }

    fn set_reload(&mut self, ticks: u32) {
        critical_section::with(|cs| {
            if let Some(timer) = self.borrow(cs).borrow_mut().as_mut() {
                timer.set_reload(ticks);
            }
        });
    }
}
