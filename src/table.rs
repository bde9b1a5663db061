//! Connection table of a master.
//!
//! Four parallel [`ConnectionBits`] sets describe every connection slot:
//!
//! - `occupied`: the slot is allocated to a slave
//! - `seq`: sequence bit of the broadcast fragment outstanding for that peer
//! - `ack`: last broadcast sequence bit the peer reported as received
//! - `rx_ack`: sequence bit of the last uplink fragment accepted from the peer
//!
//! A peer still owes an acknowledgement for the current broadcast fragment
//! exactly when its `ack` bit differs from its `seq` bit.

use crate::bitmap::ConnectionBits;
use crate::consts::MAX_CONNECTIONS;
use crate::error::Error;

/// Occupancy and acknowledgement state of every connection slot.
#[derive(Debug, Clone)]
pub struct ConnectionTable {
    occupied: ConnectionBits,
    seq: ConnectionBits,
    ack: ConnectionBits,
    rx_ack: ConnectionBits,
    limit: u8,
}

impl ConnectionTable {
    /// Creates an empty table serving slots `0..limit` (capped at [`MAX_CONNECTIONS`]).
    pub fn new(limit: u8) -> Self {
        Self {
            occupied: ConnectionBits::new(),
            seq: ConnectionBits::new(),
            ack: ConnectionBits::new(),
            rx_ack: ConnectionBits::new(),
            limit: limit.min(MAX_CONNECTIONS as u8),
        }
    }

    /// `true` if `slot` is served and not allocated.
    pub fn is_free(&self, slot: u8) -> bool {
        slot < self.limit && !self.occupied.get(slot)
    }

    /// `true` if `slot` is allocated.
    pub fn is_connected(&self, slot: u8) -> bool {
        self.occupied.get(slot)
    }

    /// Lowest free slot, the one a master offers in its announce.
    ///
    /// # Errors
    /// [`Error::NoFreeSlot`] if every served slot is allocated.
    pub fn first_free(&self) -> Result<u8, Error> {
        self.occupied.first_clear(self.limit).ok_or(Error::NoFreeSlot)
    }

    /// Allocates `slot`, or re-initializes it if it is already allocated, so a
    /// repeated admission never yields a second entry.
    ///
    /// `seq` is the current broadcast sequence bit, `peer_ack` the ack bit the
    /// peer reported while joining. Uplink state starts cleared.
    ///
    /// # Errors
    /// [`Error::InvalidSlot`] if `slot` is not served.
    pub fn allocate(&mut self, slot: u8, seq: bool, peer_ack: bool) -> Result<(), Error> {
        if slot >= self.limit {
            return Err(Error::InvalidSlot(slot));
        }
        self.occupied.set(slot, true);
        self.seq.set(slot, seq);
        self.ack.set(slot, peer_ack);
        self.rx_ack.set(slot, false);
        Ok(())
    }

    /// Releases `slot` and clears all of its bits.
    pub fn free(&mut self, slot: u8) {
        self.occupied.set(slot, false);
        self.seq.set(slot, false);
        self.ack.set(slot, false);
        self.rx_ack.set(slot, false);
    }

    /// Number of allocated slots.
    pub fn count(&self) -> u32 {
        self.occupied.count()
    }

    /// `true` when every allocated peer acknowledged the current broadcast
    /// fragment. Vacuously `true` without peers.
    pub fn all_acked(&self) -> bool {
        self.ack.agrees_on(&self.seq, &self.occupied)
    }

    /// Records the broadcast ack bit reported by the peer in `slot`.
    pub fn set_peer_ack(&mut self, slot: u8, ack: bool) {
        if self.occupied.get(slot) {
            self.ack.set(slot, ack);
        }
    }

    /// Starts a new broadcast fragment: every allocated peer now owes an ack for `seq`.
    pub fn advance_sequence(&mut self, seq: bool) {
        self.seq.assign_masked(&self.occupied, seq);
    }

    /// Sequence bit of the last uplink fragment accepted from `slot`.
    pub fn rx_ack(&self, slot: u8) -> bool {
        self.rx_ack.get(slot)
    }

    /// Marks a new uplink fragment from `slot` as accepted.
    pub fn toggle_rx_ack(&mut self, slot: u8) {
        self.rx_ack.toggle(slot);
    }

    /// Uplink ack bits, as broadcast in the header.
    pub fn rx_acks(&self) -> ConnectionBits {
        self.rx_ack
    }
}
