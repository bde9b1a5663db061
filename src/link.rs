//! Application-facing side of a GEODE node.
//!
//! A [`Link`] owns every buffer shared between application code and the
//! scheduling task: the outbound ring buffer, one receive ring buffer per
//! peer, the per-peer ready flags, the pending announce and disconnect
//! requests, and the traffic counters. It is meant to live in a `static`:
//!
//! ```rust
//! use geode::link::{Link, Mode, ReadSlot};
//!
//! static LINK: Link<1> = Link::new();
//!
//! LINK.write(b"hello", Mode::NonBlock).unwrap();
//! let mut buf = [0u8; 4];
//! assert!(LINK.read(ReadSlot::Any, &mut buf, Mode::NonBlock).is_err());
//! ```
//!
//! Every call takes a short critical section; blocking variants spin on the
//! non-blocking ones with [`nb::block!`].

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;
use heapless::{Deque, String, Vec};
use nb::block;

use crate::bitmap::ConnectionBits;
use crate::consts::{
    COMMENT_LEN, FRAGMENT_SIZE, MAX_CONNECTIONS, PRINTF_BUFFER_SIZE, RX_BUFFER_SIZE,
    TX_BUFFER_SIZE,
};
use crate::error::Error;
use crate::frame::truncate;
use crate::node::{Stats, Tally};
use crate::ring::RingBuffer;

/// Whether a call may wait for buffer space or data.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Mode {
    /// Spin until the call can complete.
    #[default]
    Block,
    /// Fail with [`Error::BufFull`] / [`Error::BufEmpty`] instead of waiting.
    NonBlock,
}

/// Source of a [`Link::read`].
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ReadSlot {
    /// A specific connection slot.
    Slot(u8),
    /// Whichever peer has enough data first.
    Any,
}

impl ReadSlot {
    /// Wire value used for [`ReadSlot::Any`].
    pub const ANY: u8 = 0xff;
}

impl From<u8> for ReadSlot {
    fn from(slot: u8) -> Self {
        if slot == Self::ANY {
            ReadSlot::Any
        } else {
            ReadSlot::Slot(slot)
        }
    }
}

/// Role a link was started with.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Role {
    /// Serves up to 128 peers, one receive buffer each.
    Master,
    /// Talks to one master through a single receive buffer.
    Slave,
}

#[derive(Debug)]
struct Announcement {
    remaining: u16,
    comment: String<COMMENT_LEN>,
}

#[derive(Debug)]
struct Shared<const PEERS: usize> {
    role: Option<Role>,
    own_slot: Option<u8>,
    outbound: RingBuffer<TX_BUFFER_SIZE>,
    inbound: [RingBuffer<RX_BUFFER_SIZE>; PEERS],
    ready: ConnectionBits,
    ready_order: Deque<u8, MAX_CONNECTIONS>,
    announcement: Option<Announcement>,
    disconnects: ConnectionBits,
    stats: Stats,
}

impl<const PEERS: usize> Shared<PEERS> {
    fn index(&self, slot: u8) -> Result<usize, Error> {
        match self.role {
            Some(Role::Slave) if self.own_slot == Some(slot) => Ok(0),
            Some(Role::Slave) => Err(Error::InvalidSlot(slot)),
            _ if usize::from(slot) < PEERS => Ok(usize::from(slot)),
            _ => Err(Error::InvalidSlot(slot)),
        }
    }

    fn slot_of(&self, index: usize) -> u8 {
        match (self.role, self.own_slot) {
            (Some(Role::Slave), Some(slot)) => slot,
            _ => index as u8,
        }
    }

    fn mark_ready(&mut self, index: usize) {
        let key = index as u8;
        if !self.ready.get(key) {
            self.ready.set(key, true);
            let _ = self.ready_order.push_back(key);
        }
    }

    fn clear_ready(&mut self, index: usize) {
        let key = index as u8;
        if !self.ready.get(key) {
            return;
        }
        self.ready.set(key, false);
        for _ in 0..self.ready_order.len() {
            if let Some(k) = self.ready_order.pop_front() {
                if k != key {
                    let _ = self.ready_order.push_back(k);
                }
            }
        }
    }
}

/// Buffers shared between application threads and the scheduling task.
///
/// `PEERS` is the number of receive buffers: [`MAX_CONNECTIONS`] (or the
/// configured connection count) for a master, `1` for a slave.
pub struct Link<const PEERS: usize> {
    shared: Mutex<RefCell<Shared<PEERS>>>,
}

impl<const PEERS: usize> fmt::Debug for Link<PEERS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("peers", &PEERS)
            .finish_non_exhaustive()
    }
}

impl<const PEERS: usize> Default for Link<PEERS> {
    fn default() -> Self {
        Self::new()
    }
}

fn non_blocking<T>(result: nb::Result<T, Error>, would_block: Error) -> Result<T, Error> {
    result.map_err(|e| match e {
        nb::Error::WouldBlock => would_block,
        nb::Error::Other(e) => e,
    })
}

impl<const PEERS: usize> Link<PEERS> {
    /// Creates an unbound link with empty buffers.
    pub const fn new() -> Self {
        Self {
            shared: Mutex::new(RefCell::new(Shared {
                role: None,
                own_slot: None,
                outbound: RingBuffer::new(),
                inbound: [const { RingBuffer::new() }; PEERS],
                ready: ConnectionBits::new(),
                ready_order: Deque::new(),
                announcement: None,
                disconnects: ConnectionBits::new(),
                stats: Stats {
                    frames_sent: 0,
                    frames_received: 0,
                    fragments_delivered: 0,
                    fragments_refused: 0,
                },
            })),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut Shared<PEERS>) -> T) -> T {
        critical_section::with(|cs| f(&mut self.shared.borrow_ref_mut(cs)))
    }

    /// Role the link was started with, if any.
    pub fn role(&self) -> Option<Role> {
        self.with(|s| s.role)
    }

    /// Connection slot of a joined slave.
    pub fn own_slot(&self) -> Option<u8> {
        self.with(|s| s.own_slot)
    }

    /// Number of bytes waiting to be sent.
    pub fn outbound_len(&self) -> usize {
        self.with(|s| s.outbound.len())
    }

    /// Number of bytes buffered from `slot`.
    ///
    /// # Errors
    /// [`Error::InvalidSlot`] if this node has no buffer for `slot`.
    pub fn available(&self, slot: u8) -> Result<usize, Error> {
        self.with(|s| {
            let index = s.index(slot)?;
            Ok(s.inbound[index].len())
        })
    }

    /// Appends `data` to the outbound stream without waiting.
    ///
    /// Returns `WouldBlock` while fewer than `data.len()` bytes are free; nothing
    /// is written in that case.
    pub fn try_write(&self, data: &[u8]) -> nb::Result<(), Error> {
        if data.len() > TX_BUFFER_SIZE {
            return Err(nb::Error::Other(Error::Oversized));
        }
        self.with(|s| s.outbound.write(data))
            .map_err(|_| nb::Error::WouldBlock)
    }

    /// Appends `data` to the outbound stream.
    ///
    /// For a master the stream is broadcast to every peer; for a slave it is
    /// the private uplink.
    ///
    /// # Errors
    /// - [`Error::BufFull`] in [`Mode::NonBlock`] when the data does not fit yet
    /// - [`Error::Oversized`] when `data` is larger than the whole buffer
    pub fn write(&self, data: &[u8], mode: Mode) -> Result<(), Error> {
        match mode {
            Mode::Block => block!(self.try_write(data)),
            Mode::NonBlock => non_blocking(self.try_write(data), Error::BufFull),
        }
    }

    /// Formats `args` into a scratch buffer and writes the result.
    /// See also [`geode_printf!`](crate::geode_printf).
    ///
    /// # Returns
    /// The number of bytes written.
    ///
    /// # Errors
    /// [`Error::Format`] if the text exceeds [`PRINTF_BUFFER_SIZE`], otherwise as
    /// [`write`](Self::write).
    pub fn printf(&self, mode: Mode, args: fmt::Arguments<'_>) -> Result<usize, Error> {
        let mut scratch: String<PRINTF_BUFFER_SIZE> = String::new();
        fmt::write(&mut scratch, args).map_err(|_| Error::Format)?;
        self.write(scratch.as_bytes(), mode)?;
        Ok(scratch.len())
    }

    /// Takes exactly `buf.len()` bytes from `slot` without waiting.
    ///
    /// With [`ReadSlot::Any`], peers are tried in the order they became ready
    /// and the first one holding enough bytes is consumed.
    ///
    /// # Returns
    /// The slot the bytes came from.
    pub fn try_read(&self, slot: ReadSlot, buf: &mut [u8]) -> nb::Result<u8, Error> {
        if buf.len() > RX_BUFFER_SIZE {
            return Err(nb::Error::Other(Error::Oversized));
        }
        self.with(|s| {
            let index = match slot {
                ReadSlot::Slot(slot) => s.index(slot).map_err(nb::Error::Other)?,
                ReadSlot::Any => s
                    .ready_order
                    .iter()
                    .map(|&k| usize::from(k))
                    .find(|&i| i < PEERS && s.inbound[i].len() >= buf.len())
                    .ok_or(nb::Error::WouldBlock)?,
            };
            s.inbound[index]
                .read(buf)
                .map_err(|_| nb::Error::WouldBlock)?;
            if s.inbound[index].is_empty() {
                s.clear_ready(index);
            }
            Ok(s.slot_of(index))
        })
    }

    /// Takes exactly `buf.len()` bytes from `slot`.
    ///
    /// # Returns
    /// The slot the bytes came from; useful with [`ReadSlot::Any`].
    ///
    /// # Errors
    /// - [`Error::BufEmpty`] in [`Mode::NonBlock`] when not enough bytes are buffered
    /// - [`Error::InvalidSlot`] if this node has no buffer for `slot`
    /// - [`Error::Oversized`] when `buf` is larger than a receive buffer
    pub fn read(&self, slot: ReadSlot, buf: &mut [u8], mode: Mode) -> Result<u8, Error> {
        match mode {
            Mode::Block => block!(self.try_read(slot, buf)),
            Mode::NonBlock => non_blocking(self.try_read(slot, buf), Error::BufEmpty),
        }
    }

    /// Advertises this master for `periods` periods with a short free-text
    /// comment (truncated to [`COMMENT_LEN`] bytes). New slaves are admitted
    /// only while an announcement is active. A new call replaces the previous one.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] on a link started as a slave.
    pub fn announce(&self, periods: u16, text: &str) -> Result<(), Error> {
        let comment = truncate(text);
        self.with(|s| {
            if s.role == Some(Role::Slave) {
                return Err(Error::InvalidConfig);
            }
            s.announcement = (periods > 0).then_some(Announcement {
                remaining: periods,
                comment,
            });
            Ok(())
        })
    }

    /// `true` while an announcement is active.
    pub fn announcing(&self) -> bool {
        self.with(|s| s.announcement.is_some())
    }

    /// Asks the master to drop the peer in `slot`. The slot is freed, and
    /// everything received from it discarded, at the end of the current period.
    ///
    /// A peer that goes silent keeps owing an ack for the current broadcast
    /// fragment, so the stream stalls for everyone until it is dropped.
    ///
    /// # Errors
    /// - [`Error::InvalidConfig`] on a link started as a slave
    /// - [`Error::InvalidSlot`] if this node has no buffer for `slot`
    pub fn disconnect(&self, slot: u8) -> Result<(), Error> {
        self.with(|s| {
            if s.role == Some(Role::Slave) {
                return Err(Error::InvalidConfig);
            }
            let _ = s.index(slot)?;
            s.disconnects.set(slot, true);
            Ok(())
        })
    }

    /// Traffic counters of the node running on this link.
    pub fn stats(&self) -> Stats {
        self.with(|s| s.stats)
    }

    pub(crate) fn bind(&self, role: Role) -> Result<(), Error> {
        self.with(|s| {
            if s.role.is_some() {
                return Err(Error::AlreadyStarted);
            }
            s.role = Some(role);
            Ok(())
        })
    }

    pub(crate) fn set_own_slot(&self, slot: Option<u8>) {
        self.with(|s| {
            s.own_slot = slot;
            if slot.is_none() {
                s.inbound.iter_mut().for_each(RingBuffer::clear);
                s.ready = ConnectionBits::new();
                s.ready_order.clear();
            }
        });
    }

    /// Consumes one period of the active announcement and returns its comment.
    pub(crate) fn next_announcement(&self) -> Option<String<COMMENT_LEN>> {
        self.with(|s| {
            let a = s.announcement.as_mut()?;
            let comment = a.comment.clone();
            a.remaining -= 1;
            if a.remaining == 0 {
                s.announcement = None;
            }
            Some(comment)
        })
    }

    pub(crate) fn tally(&self, tally: Tally) {
        self.with(|s| s.stats.bump(tally));
    }

    /// Drains the slots the application asked to disconnect.
    pub(crate) fn take_disconnects(&self) -> ConnectionBits {
        self.with(|s| core::mem::replace(&mut s.disconnects, ConnectionBits::new()))
    }

    /// Dequeues up to one fragment of outbound data.
    pub(crate) fn take_fragment(&self) -> Vec<u8, FRAGMENT_SIZE> {
        self.with(|s| {
            let n = s.outbound.len().min(FRAGMENT_SIZE);
            let mut chunk = [0u8; FRAGMENT_SIZE];
            let mut out = Vec::new();
            if s.outbound.read(&mut chunk[..n]).is_ok() {
                let _ = out.extend_from_slice(&chunk[..n]);
            }
            out
        })
    }

    /// Stores a received fragment for the peer at buffer `index` and wakes its readers.
    ///
    /// # Errors
    /// [`Error::BufFull`] if the fragment does not fit; nothing is stored.
    pub(crate) fn deliver(&self, index: usize, data: &[u8]) -> Result<(), Error> {
        self.with(|s| {
            let buffer = s.inbound.get_mut(index).ok_or(Error::InvalidSlot(index as u8))?;
            buffer.write(data)?;
            if !data.is_empty() {
                s.mark_ready(index);
            }
            Ok(())
        })
    }

    /// Drops everything buffered for the peer at `index`.
    pub(crate) fn release(&self, index: usize) {
        self.with(|s| {
            if let Some(buffer) = s.inbound.get_mut(index) {
                buffer.clear();
                s.clear_ready(index);
            }
        });
    }
}

/// Formats and writes to a [`Link`], like `printf`.
///
/// # Example
/// ```rust
/// use geode::geode_printf;
/// use geode::link::{Link, Mode};
///
/// static LINK: Link<1> = Link::new();
///
/// let n = geode_printf!(LINK, Mode::NonBlock, "t={}C", 21).unwrap();
/// assert_eq!(n, 5);
/// ```
#[macro_export]
macro_rules! geode_printf {
    ( $link:expr, $mode:expr, $($arg:tt)* ) => {
        $link.printf($mode, core::format_args!($($arg)*))
    };
}
