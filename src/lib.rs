//! # geode
//!
//! A portable, no_std Rust implementation of GEODE, a TDMA point-to-multipoint
//! link protocol for half-duplex sub-GHz FSK radios. One master serves up to
//! 128 slaves in a fixed slot schedule, broadcasting a byte stream to all of
//! them and receiving a private byte stream from each.
//!
//! The crate provides:
//! - a [`Radio`](radio::Radio) trait for the transceiver, and a
//!   [`SlotTimer`](clock::SlotTimer) trait for the hardware timer
//! - a [`SlotClock`](clock::SlotClock) driven from a timer interrupt or a delay loop
//! - the master and slave state machines, run by a single scheduling task
//! - a [`Link`] holding the buffers the application reads and writes
//!   from any thread, guarded by `critical-section`
//!
//! ## Crate features
//! | Feature               | Description |
//! |-----------------------|-------------|
//! | `std`                 | Builds against `std` |
//! | `delay-loop`          | Drives the slot clock from an `embedded_hal::delay::DelayNs` |
//! | `timer-isr` (default) | Drives the slot clock from a timer interrupt |
//! | `defmt-0-3`           | Uses `defmt` logging |
//! | `log`                 | Uses `log` logging |
//!
//! ## Protocol
//!
//! - Period of `3 + n` slots: announce, header, broadcast, then one uplink
//!   slot per connection
//! - 18-byte frames: one flag byte, then either a 16-byte fragment with its
//!   length, a 128-bit ack bitmap, or an announcement
//! - One-bit sequence numbers with bitmap acknowledgement; the broadcast only
//!   advances once every connected slave has acknowledged it
//! - Three hop channels, changed once per period
//! - Slaves resynchronize their slot phase on every announce and `Sync` header
//!
//! ## Usage
//!
//! ```rust,ignore
//! use geode::{Config, Link, Mode, NodeType, ReadSlot};
//! use geode::clock::SlotClock;
//!
//! static LINK: Link<128> = Link::new();
//! static CLOCK: SlotClock = SlotClock::new();
//!
//! geode::radio::init(&mut radio, &Default::default())?;
//! let node = geode::start(NodeType::Master, &LINK, &CLOCK, radio, timer, Config::default())?;
//! LINK.announce(50, "pump-room")?;
//!
//! // scheduling task
//! node.run();
//!
//! // application task
//! LINK.write(b"setpoint=21", Mode::Block)?;
//! let mut buf = [0u8; 4];
//! let from = LINK.read(ReadSlot::Any, &mut buf, Mode::Block)?;
//! ```
//!
//! ## Integration Notes
//!
//! - The timer interrupt must call [`SlotClock::on_timer`](clock::SlotClock::on_timer)
//!   (or `tick_slot_clock!`) at every slot boundary
//! - Only the scheduling task touches the radio; application code only uses the [`Link`]
//! - Blocking calls spin; give the scheduling task a higher priority than the application

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub use critical_section;
pub use heapless;

#[macro_use]
mod logging;

pub mod bitmap;
pub mod clock;
pub mod config;
pub mod consts;
pub(crate) mod crc;
pub mod error;
pub mod frame;
pub mod link;
pub mod master;
pub mod node;
pub mod radio;
pub mod ring;
pub mod scan;
pub mod slave;
pub mod table;

#[cfg(test)]
mod mock;

pub use config::Config;
pub use crc::derive_sync_word;
pub use error::Error;
pub use link::{Link, Mode, ReadSlot};
pub use node::{Node, NodeType, SlaveArgs, SlotState, start};
pub use scan::{Beacon, ScanConfig, scan};
