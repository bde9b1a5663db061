//! Constants used across the GEODE protocol implementation.
//!
//! This module defines the protocol-wide constants used for frame layout,
//! slot layout, buffer sizing, admission bookkeeping and timing.
//!
//! ## Key Concepts
//!
//! - **Frames**: every packet on air is exactly [`FRAME_SIZE`] bytes.
//! - **Fragments**: at most [`FRAGMENT_SIZE`] bytes of application payload per data frame.
//! - **Period**: [`CONTROL_SLOTS`] master-only slots followed by one slot per connection.
//! - **Sync words**: announce frames are sent with [`DISCOVERY_SYNC_WORD`], everything else
//!   with the sync word derived by the master.
//!
//! These values must match on every node of a network; they are part of the wire contract.

/// Size (in bytes) of every frame sent over the air.
pub const FRAME_SIZE: usize = 18;

/// Maximum size (in bytes) of the application payload carried by one data frame.
pub const FRAGMENT_SIZE: usize = 16;

/// Maximum number of slaves a master can serve, one slot each.
pub const MAX_CONNECTIONS: usize = 128;

/// Number of master-only slots at the start of every period
/// (announce, header, broadcast data).
pub const CONTROL_SLOTS: u16 = 3;

/// Slot carrying the announce frame.
pub const ANNOUNCE_SLOT: u16 = 0;

/// Slot carrying the master header frame.
pub const HEADER_SLOT: u16 = 1;

/// Slot carrying the broadcast data fragment.
pub const BROADCAST_SLOT: u16 = 2;

/// Length of a period (in slots) when all [`MAX_CONNECTIONS`] are configured.
pub const SLOTS_PER_PERIOD: u16 = CONTROL_SLOTS + MAX_CONNECTIONS as u16;

/// Slot value meaning "no slot" in header frames.
pub const NO_SLOT: u8 = 0xff;

/// Number of channels in the frequency hop rotation.
pub const CHANNEL_COUNT: usize = 3;

/// Default hop rotation (Hz).
pub const DEFAULT_CHANNELS: [u32; CHANNEL_COUNT] = [868_100_000, 868_300_000, 868_500_000];

/// Fixed sync word used by announce frames so that any node can discover any master.
pub const DISCOVERY_SYNC_WORD: u32 = 0x930b_51de;

/// Capacity (in bytes) of the outbound ring buffer of a node.
pub const TX_BUFFER_SIZE: usize = 200;

/// Capacity (in bytes) of each per-connection receive ring buffer.
pub const RX_BUFFER_SIZE: usize = 200;

/// Size of the scratch buffer used by [`Link::printf`](crate::link::Link::printf).
pub const PRINTF_BUFFER_SIZE: usize = 128;

/// Length (in bytes) of the free-text comment carried in announce frames.
pub const COMMENT_LEN: usize = 10;

/// Maximum number of distinct masters collected by one scan.
pub const MAX_BEACONS: usize = 16;

/// A `Sync` command is asserted in the header every this many periods.
pub const SYNC_INTERVAL_PERIODS: u16 = 8;

/// A pending admission on the master is dropped after this many periods without a confirm.
pub const ADMISSION_TIMEOUT_PERIODS: u8 = 4;

/// A slave returns to scanning after this many periods without an admission ack.
pub const MAX_ADMISSION_ATTEMPTS: u8 = 8;

/// Frequency of the slot timer clock (Hz).
pub const TIMER_CLOCK_HZ: u32 = 1_600_000;

/// Timer ticks needed to send one frame, radio turnaround included.
pub const PACKET_TICKS: u32 = 26_000;

/// Timer ticks of idle guard appended to every slot.
pub const GUARD_TICKS: u32 = 6_400;

/// Maximum random deviation (in timer ticks) applied to the guard of a slot.
pub const JITTER_TICKS: u32 = 800;
