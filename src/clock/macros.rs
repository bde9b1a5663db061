/// Declares the static `SLOT_CLOCK` and `SLOT_TIMER` singletons used by a
/// timer interrupt.
///
/// # Arguments
/// - `$timer`: The concrete hardware timer type (must implement `SlotTimer`)
///
/// # Example
/// ```rust,ignore
/// init_slot_clock!(MyTimerType);
/// ```
#[macro_export]
macro_rules! init_slot_clock {
    ( $timer:ty ) => {
        pub static SLOT_CLOCK: $crate::clock::SlotClock = $crate::clock::SlotClock::new();
        pub static SLOT_TIMER: $crate::critical_section::Mutex<
            core::cell::RefCell<Option<$timer>>,
        > = $crate::critical_section::Mutex::new(core::cell::RefCell::new(None));
    };
}

/// Handles a slot boundary on the singletons declared by `init_slot_clock!`.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIM2() {
///     tick_slot_clock!(&TIMING, &mut RNG);
/// }
/// ```
///
/// # Notes
/// - Safe to call before `global_slot_timer_setup`; the reload is skipped until
///   the timer is installed.
#[macro_export]
macro_rules! tick_slot_clock {
    ( $timing:expr, $rng:expr ) => {
        $crate::clock::global_slot_clock_tick(&SLOT_CLOCK, &SLOT_TIMER, $timing, $rng)
    };
}
