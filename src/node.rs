//! Node start-up and the slot dispatcher shared by both roles.
//!
//! ```text
//! | 0        | 1      | 2         | 3      | 4      | ... | 3+n-1    |
//! | announce | header | broadcast | conn 0 | conn 1 | ... | conn n-1 |
//! ```
//!
//! After servicing a slot the scheduling task computes the next slot it needs
//! and arms the [`SlotClock`] for it. When the next slot lies in the following
//! period, the node hops to the next channel first.

use crate::clock::{SlotClock, SlotTimer};
use crate::config::Config;
use crate::consts::{ANNOUNCE_SLOT, BROADCAST_SLOT, CONTROL_SLOTS, HEADER_SLOT};
use crate::error::Error;
use crate::link::Link;
use crate::master::Master;
use crate::radio::Radio;
use crate::scan::Beacon;
use crate::slave::Slave;

/// What a node does in a slot.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SlotState {
    /// Slot 0: master advertisement.
    Announce,
    /// Slot 1: master header with uplink acks and admission commands.
    Header,
    /// Slot 2: broadcast fragment from the master.
    BroadcastData,
    /// Slot `3 + i`: uplink of connection `i`.
    Connection(u8),
    /// End of period: move to the next channel.
    HopFrequency,
}

impl SlotState {
    /// State of absolute slot number `slot`.
    pub fn for_slot(slot: u16) -> Self {
        match slot {
            ANNOUNCE_SLOT => SlotState::Announce,
            HEADER_SLOT => SlotState::Header,
            BROADCAST_SLOT => SlotState::BroadcastData,
            n => SlotState::Connection((n - CONTROL_SLOTS) as u8),
        }
    }

}

/// Master a slave should join.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct SlaveArgs {
    /// Sync word of the master's network.
    pub sync_word: u32,
    /// Connection slot the master offered.
    pub slot: u8,
    /// Period length of the master.
    pub period: u16,
}

impl From<&Beacon> for SlaveArgs {
    fn from(beacon: &Beacon) -> Self {
        Self {
            sync_word: beacon.sync_word,
            slot: beacon.slot,
            period: beacon.period,
        }
    }
}

/// Role passed to [`start`].
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum NodeType {
    /// Run a network.
    Master,
    /// Join the network described by the arguments.
    Slave(SlaveArgs),
}

/// Traffic counters of a node, kept in its [`Link`] so application threads
/// can read them while the node runs.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Stats {
    /// Frames transmitted.
    pub frames_sent: u32,
    /// Frames received in a slot where one was expected.
    pub frames_received: u32,
    /// Fragments handed to a receive buffer.
    pub fragments_delivered: u32,
    /// New fragments refused because the receive buffer was full.
    pub fragments_refused: u32,
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Tally {
    FrameSent,
    FrameReceived,
    FragmentDelivered,
    FragmentRefused,
}

impl Stats {
    pub(crate) fn bump(&mut self, tally: Tally) {
        let counter = match tally {
            Tally::FrameSent => &mut self.frames_sent,
            Tally::FrameReceived => &mut self.frames_received,
            Tally::FragmentDelivered => &mut self.fragments_delivered,
            Tally::FragmentRefused => &mut self.fragments_refused,
        };
        *counter = counter.wrapping_add(1);
    }
}

/// A started node, ready to [`run`](Node::run).
#[derive(Debug)]
pub enum Node<'a, R, T, const PEERS: usize> {
    /// Master role.
    Master(Master<'a, R, T, PEERS>),
    /// Slave role.
    Slave(Slave<'a, R, T, PEERS>),
}

/// Starts a node.
///
/// Binds `link` to the role, tunes the radio, and programs the clock period.
/// The returned [`Node`] is meant to be moved into the scheduling task and
/// [`run`](Node::run) there, while the application keeps using `link`.
///
/// # Errors
/// - [`Error::AlreadyStarted`] if `link` was started before
/// - [`Error::InvalidConfig`] if `config` does not fit the link
/// - [`Error::Radio`] if tuning the radio fails
pub fn start<'a, R: Radio, T: SlotTimer, const PEERS: usize>(
    node_type: NodeType,
    link: &'a Link<PEERS>,
    clock: &'a SlotClock,
    radio: R,
    timer: T,
    config: Config,
) -> Result<Node<'a, R, T, PEERS>, Error> {
    match node_type {
        NodeType::Master => Master::new(link, clock, radio, timer, config).map(Node::Master),
        NodeType::Slave(args) => {
            Slave::new(link, clock, radio, timer, config, args).map(Node::Slave)
        }
    }
}

impl<R: Radio, T: SlotTimer, const PEERS: usize> Node<'_, R, T, PEERS> {
    /// Runs the scheduling loop forever.
    pub fn run(self) -> ! {
        match self {
            Node::Master(master) => master.run(),
            Node::Slave(slave) => slave.run(),
        }
    }

    /// Services one slot, outside of the clock-driven loop.
    ///
    /// # Errors
    /// Whatever the role's handler reports for the slot.
    pub fn step(&mut self, state: SlotState) -> Result<(), Error> {
        match self {
            Node::Master(master) => master.step(state),
            Node::Slave(slave) => slave.step(state),
        }
    }

    /// Traffic counters.
    pub fn stats(&self) -> Stats {
        match self {
            Node::Master(master) => master.stats(),
            Node::Slave(slave) => slave.stats(),
        }
    }
}
