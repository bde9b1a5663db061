//! Master side of the protocol.
//!
//! Per period the master
//! - advertises itself in the announce slot while an announcement is active,
//!   offering the lowest free connection slot,
//! - sends a header carrying the uplink ack bitmap and, during admission, the
//!   `ConnectAck` for the joining slot,
//! - broadcasts the current outbound fragment until every connected peer has
//!   acknowledged it,
//! - listens in every allocated connection slot, plus the admitting one and,
//!   until the period in which the announcement ends, the offered one,
//! - drops the peers the application asked to disconnect, then hops.
//!
//! Admission is a three-way exchange: `ConnectRequest` in the offered slot,
//! `ConnectAck` in the next header, `ConnectConfirm` in the slot. The slot is
//! allocated on the confirm (or on the first data frame, should the confirm be
//! lost) and never twice.

use heapless::Vec;
use nb::block;

use crate::clock::{SlotClock, SlotTimer};
use crate::config::Config;
use crate::consts::{
    ADMISSION_TIMEOUT_PERIODS, CHANNEL_COUNT, DISCOVERY_SYNC_WORD, FRAGMENT_SIZE, HEADER_SLOT,
    NO_SLOT,
};
use crate::error::Error;
use crate::frame::{Command, DataFrame, Frame};
use crate::link::{Link, Role};
use crate::node::{SlotState, Stats, Tally};
use crate::radio::{self, Radio, radio_error};
use crate::table::ConnectionTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Admission {
    slot: u8,
    age: u8,
}

/// Scheduling task of a master node. Created by [`start`](crate::node::start).
#[derive(Debug)]
pub struct Master<'a, R, T, const PEERS: usize> {
    link: &'a Link<PEERS>,
    clock: &'a SlotClock,
    radio: R,
    timer: T,
    config: Config,
    table: ConnectionTable,
    channel: usize,
    broadcast_seq: bool,
    fragment: Option<Vec<u8, FRAGMENT_SIZE>>,
    offered: Option<u8>,
    pending: Option<Admission>,
    periods_since_sync: u16,
}

impl<'a, R: Radio, T: SlotTimer, const PEERS: usize> Master<'a, R, T, PEERS> {
    /// Validates `config`, tunes the radio to the first channel, and binds
    /// `link`. The clock is placed on the last slot of the period so that the
    /// next boundary starts slot 0.
    ///
    /// # Errors
    /// - [`Error::InvalidConfig`] if `config` does not fit `PEERS`
    /// - [`Error::AlreadyStarted`] if `link` is bound
    /// - [`Error::Radio`] if tuning fails
    pub fn new(
        link: &'a Link<PEERS>,
        clock: &'a SlotClock,
        mut radio: R,
        timer: T,
        config: Config,
    ) -> Result<Self, Error> {
        config.validate(PEERS)?;
        radio
            .set_frequency(config.channels[0])
            .map_err(radio_error)?;
        radio.set_sync_word(config.sync_word).map_err(radio_error)?;
        link.bind(Role::Master)?;
        info!(
            "master {:x} up: {} connections, period {} slots",
            config.sync_word,
            config.connections,
            config.period()
        );
        let mut master = Self {
            link,
            clock,
            radio,
            timer,
            config,
            table: ConnectionTable::new(config.connections),
            channel: 0,
            broadcast_seq: false,
            fragment: None,
            offered: None,
            pending: None,
            periods_since_sync: 0,
        };
        master.align();
        Ok(master)
    }

    /// Places the clock on the last slot of the period and restarts the timer,
    /// so that slot 0 begins one slot from now.
    fn align(&mut self) {
        let period = self.period();
        self.clock.set_period(period);
        self.clock.resync(period - 1);
        let slot_ticks = self.config.timing.slot_ticks();
        self.timer.set_reload(slot_ticks);
        self.timer.restart(slot_ticks);
    }

    /// Connection table.
    pub fn table(&self) -> &ConnectionTable {
        &self.table
    }

    /// Traffic counters.
    pub fn stats(&self) -> Stats {
        self.link.stats()
    }

    /// Drops the peer in `slot` and everything received from it. While the
    /// node runs, use [`Link::disconnect`] instead.
    pub fn disconnect(&mut self, slot: u8) {
        if self.table.is_connected(slot) {
            info!("slot {} disconnected", slot);
        }
        self.table.free(slot);
        self.link.release(usize::from(slot));
        if self.pending.map(|a| a.slot) == Some(slot) {
            self.pending = None;
        }
    }

    fn period(&self) -> u16 {
        self.config.period()
    }

    fn send(&mut self, frame: &Frame) -> Result<(), Error> {
        radio::send(&mut self.radio, frame)?;
        self.link.tally(Tally::FrameSent);
        Ok(())
    }

    /// Services one slot.
    ///
    /// # Errors
    /// [`Error::Radio`] if the radio fails. Silence and malformed frames are
    /// not errors.
    pub fn step(&mut self, state: SlotState) -> Result<(), Error> {
        match state {
            SlotState::Announce => self.announce_slot(),
            SlotState::Header => self.header_slot(),
            SlotState::BroadcastData => self.broadcast_slot(),
            SlotState::Connection(i) => self.connection_slot(i),
            SlotState::HopFrequency => self.hop(),
        }
    }

    fn announce_slot(&mut self) -> Result<(), Error> {
        let Some(comment) = self.link.next_announcement() else {
            self.offered = None;
            return Ok(());
        };
        self.offered = match self.pending {
            Some(a) => Some(a.slot),
            None => self.table.first_free().ok(),
        };
        let Some(slot) = self.offered else {
            debug!("announce skipped: no free slot");
            return Ok(());
        };
        let frame = Frame::announce(self.config.sync_word, slot, self.period(), &comment);
        self.radio
            .set_sync_word(DISCOVERY_SYNC_WORD)
            .map_err(radio_error)?;
        let sent = self.send(&frame);
        self.radio
            .set_sync_word(self.config.sync_word)
            .map_err(radio_error)?;
        sent
    }

    fn header_slot(&mut self) -> Result<(), Error> {
        if self.table.count() == 0 && self.pending.is_none() {
            return Ok(());
        }
        let (command, slot) = match self.pending {
            Some(a) => (Command::ConnectAck, a.slot),
            None if self.periods_since_sync >= self.config.sync_interval => {
                (Command::Sync, NO_SLOT)
            }
            None => (Command::Header, NO_SLOT),
        };
        if command == Command::Sync {
            self.periods_since_sync = 0;
        }
        let frame = Frame::header(command, self.broadcast_seq, self.table.rx_acks(), slot)?;
        self.send(&frame)
    }

    fn broadcast_slot(&mut self) -> Result<(), Error> {
        if self.fragment.is_some() && self.table.all_acked() {
            trace!("fragment acknowledged by every peer");
            self.fragment = None;
        }
        if self.fragment.is_none() {
            if self.table.count() == 0 {
                return Ok(());
            }
            let chunk = self.link.take_fragment();
            if chunk.is_empty() {
                return Ok(());
            }
            self.broadcast_seq = !self.broadcast_seq;
            self.table.advance_sequence(self.broadcast_seq);
            self.fragment = Some(chunk);
        }
        let Some(fragment) = &self.fragment else {
            return Ok(());
        };
        let frame = Frame::data(Command::Data, self.broadcast_seq, false, fragment)?;
        self.send(&frame)
    }

    fn admitting(&self, slot: u8) -> bool {
        self.pending.map(|a| a.slot) == Some(slot) || self.offered == Some(slot)
    }

    fn connection_slot(&mut self, slot: u8) -> Result<(), Error> {
        let connected = self.table.is_connected(slot);
        if !connected && !self.admitting(slot) {
            return Ok(());
        }
        let timeout = self.config.timing.listen_timeout_us();
        let Some(frame) = radio::listen(&mut self.radio, timeout)? else {
            return Ok(());
        };
        self.link.tally(Tally::FrameReceived);
        let data = match frame {
            Frame::Data(data) => data,
            other => {
                debug!("slot {}: unexpected {:?} frame", slot, other.flags().command);
                return Ok(());
            }
        };
        match data.flags.command {
            Command::ConnectRequest => self.on_connect_request(slot, &data),
            Command::ConnectConfirm => self.on_connect_confirm(slot, &data),
            Command::Data if connected => {
                self.on_uplink(slot, &data);
                Ok(())
            }
            Command::Data if self.pending.map(|a| a.slot) == Some(slot) => {
                // confirm lost, the slave already talks
                self.admit(slot, data.flags.ack)?;
                self.on_uplink(slot, &data);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn names_us(&self, data: &DataFrame) -> bool {
        data.payload.as_slice() == self.config.sync_word.to_le_bytes()
    }

    fn on_connect_request(&mut self, slot: u8, data: &DataFrame) -> Result<(), Error> {
        if !self.names_us(data) {
            return Ok(());
        }
        if self.table.is_connected(slot) {
            debug!("slot {} asks to join again", slot);
        }
        match &mut self.pending {
            Some(a) if a.slot == slot => a.age = 0,
            _ => {
                debug!("slot {} requested", slot);
                self.pending = Some(Admission { slot, age: 0 });
            }
        }
        Ok(())
    }

    fn on_connect_confirm(&mut self, slot: u8, data: &DataFrame) -> Result<(), Error> {
        if !self.names_us(data) || self.pending.map(|a| a.slot) != Some(slot) {
            return Ok(());
        }
        self.admit(slot, data.flags.ack)
    }

    fn admit(&mut self, slot: u8, peer_ack: bool) -> Result<(), Error> {
        self.table.allocate(slot, self.broadcast_seq, peer_ack)?;
        self.link.release(usize::from(slot));
        self.pending = None;
        info!("slot {} connected, {} peers", slot, self.table.count());
        Ok(())
    }

    fn on_uplink(&mut self, slot: u8, data: &DataFrame) {
        self.table.set_peer_ack(slot, data.flags.ack);
        if data.flags.seq == self.table.rx_ack(slot) {
            return;
        }
        match self.link.deliver(usize::from(slot), &data.payload) {
            Ok(()) => {
                self.table.toggle_rx_ack(slot);
                self.link.tally(Tally::FragmentDelivered);
            }
            Err(_) => {
                trace!("slot {}: receive buffer full", slot);
                self.link.tally(Tally::FragmentRefused);
            }
        }
    }

    fn hop(&mut self) -> Result<(), Error> {
        for slot in self.link.take_disconnects().iter() {
            self.disconnect(slot);
        }
        if !self.link.announcing() {
            self.offered = None;
        }
        self.channel = (self.channel + 1) % CHANNEL_COUNT;
        self.periods_since_sync = self.periods_since_sync.saturating_add(1);
        if let Some(a) = &mut self.pending {
            a.age += 1;
            if a.age > ADMISSION_TIMEOUT_PERIODS {
                warn!("admission of slot {} timed out", a.slot);
                self.pending = None;
            }
        }
        self.radio
            .set_frequency(self.config.channels[self.channel])
            .map_err(radio_error)
    }

    fn needs(&self, slot: u16) -> bool {
        match SlotState::for_slot(slot) {
            SlotState::Announce => self.link.announcing(),
            SlotState::Header | SlotState::BroadcastData => true,
            SlotState::Connection(i) => self.table.is_connected(i) || self.admitting(i),
            SlotState::HopFrequency => false,
        }
    }

    /// Next slot after `now` the master has to service, wrapping into the next
    /// period.
    pub fn next_wakeup(&self, now: u16) -> u16 {
        let period = self.period();
        (1..=period)
            .map(|d| (now + d) % period)
            .find(|&slot| self.needs(slot))
            .unwrap_or(HEADER_SLOT)
    }

    /// Services the slot the clock just released and arms the next one.
    /// Hops when the next slot lies in the following period.
    ///
    /// # Returns
    /// The slot armed next.
    pub fn service(&mut self, slot: u16) -> u16 {
        if let Err(e) = self.step(SlotState::for_slot(slot)) {
            warn!("slot {}: {:?}", slot, e);
        }
        let now = self.clock.slot();
        let next = self.next_wakeup(now);
        if next <= now {
            if let Err(e) = self.step(SlotState::HopFrequency) {
                warn!("hop: {:?}", e);
            }
        }
        self.clock.arm_at(next);
        next
    }

    /// Re-aligns the clock and arms it for the first slot to service.
    pub(crate) fn prime(&mut self) {
        self.align();
        self.clock.arm_at(self.next_wakeup(self.clock.slot()));
    }

    /// Runs the scheduling loop forever.
    pub fn run(mut self) -> ! {
        self.prime();
        loop {
            let slot = block!(self.clock.wait()).unwrap_or_else(|never| match never {});
            let _ = self.service(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::ConnectionBits;
    use crate::consts::{DEFAULT_CHANNELS, RX_BUFFER_SIZE, SYNC_INTERVAL_PERIODS};
    use crate::link::{Mode, ReadSlot};
    use crate::mock::{Air, MockRadio, MockTimer};

    const WORD: u32 = 0x0bad_f00d;

    fn config() -> Config {
        Config {
            sync_word: WORD,
            connections: 4,
            ..Config::default()
        }
    }

    fn data(command: Command, seq: bool, ack: bool, payload: &[u8]) -> Frame {
        Frame::data(command, seq, ack, payload).unwrap()
    }

    fn uplink(air: &Air, channel: usize, frame: &Frame) {
        air.inject_frame(DEFAULT_CHANNELS[channel], WORD, frame);
    }

    type TestMaster<'a> = Master<'a, MockRadio<'a>, MockTimer, 4>;

    fn last_sent<'r>(master: &'r TestMaster<'_>) -> Option<&'r Frame> {
        master.radio.sent.last()
    }

    /// Feeds slot boundaries to the clock and services every release.
    fn run_clock(master: &mut TestMaster<'_>, clock: &SlotClock, boundaries: usize) {
        for _ in 0..boundaries {
            clock.on_timer();
            if let Ok(slot) = clock.wait() {
                let _ = master.service(slot);
            }
        }
    }

    #[test]
    fn test_new_tunes_and_aligns_clock() {
        let air = Air::new();
        let link: Link<4> = Link::new();
        let clock = SlotClock::new();
        let master = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config()).unwrap();
        assert_eq!(master.radio.sync_word, WORD);
        assert_eq!(master.radio.frequency, DEFAULT_CHANNELS[0]);
        assert_eq!(clock.period(), 7);
        assert_eq!(clock.slot(), 6);
        assert_eq!(master.timer.restarts, [32_400]);
    }

    #[test]
    fn test_new_rejects_more_connections_than_buffers() {
        let air = Air::new();
        let link: Link<2> = Link::new();
        let clock = SlotClock::new();
        let result = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config());
        assert!(matches!(result, Err(Error::InvalidConfig)));
        assert_eq!(link.role(), None);
    }

    #[test]
    fn test_announce_offers_lowest_free_slot() {
        let air = Air::new();
        let link: Link<4> = Link::new();
        let clock = SlotClock::new();
        let mut master = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config()).unwrap();
        master.step(SlotState::Announce).unwrap();
        assert!(master.radio.sent.is_empty());

        master.table.allocate(0, false, false).unwrap();
        link.announce(1, "barn").unwrap();
        master.step(SlotState::Announce).unwrap();
        let Some(Frame::Announce(a)) = last_sent(&master) else {
            panic!("no announce sent");
        };
        assert_eq!((a.sync_word, a.slot, a.period), (WORD, 1, 7));
        assert_eq!(a.comment.as_str(), "barn");
        assert_eq!(master.radio.sync_word, WORD);
        assert_eq!(master.offered, Some(1));

        master.step(SlotState::Announce).unwrap();
        assert_eq!(master.radio.sent.len(), 1);
        assert_eq!(master.offered, None);
    }

    #[test]
    fn test_admission_handshake() {
        let air = Air::new();
        let link: Link<4> = Link::new();
        let clock = SlotClock::new();
        let mut master = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config()).unwrap();
        link.announce(4, "").unwrap();
        master.step(SlotState::Announce).unwrap();

        // a request naming another network is ignored
        uplink(&air, 0, &data(Command::ConnectRequest, false, false, &0x1111_1111u32.to_le_bytes()));
        master.step(SlotState::Connection(0)).unwrap();
        assert_eq!(master.pending, None);

        air.clear();
        uplink(&air, 0, &data(Command::ConnectRequest, false, false, &WORD.to_le_bytes()));
        master.step(SlotState::Connection(0)).unwrap();
        assert_eq!(master.pending.map(|a| a.slot), Some(0));

        master.step(SlotState::Header).unwrap();
        let Some(Frame::Header(h)) = last_sent(&master) else {
            panic!("no header sent");
        };
        assert_eq!(h.flags.command, Command::ConnectAck);
        assert_eq!(h.slot, 0);

        uplink(&air, 0, &data(Command::ConnectConfirm, false, false, &WORD.to_le_bytes()));
        master.step(SlotState::Connection(0)).unwrap();
        assert!(master.table.is_connected(0));
        assert_eq!(master.pending, None);

        master.step(SlotState::Header).unwrap();
        let Some(Frame::Header(h)) = last_sent(&master) else {
            panic!("no header sent");
        };
        assert_eq!(h.flags.command, Command::Header);
        assert_eq!(h.slot, NO_SLOT);
    }

    #[test]
    fn test_repeated_admission_keeps_one_entry() {
        let air = Air::new();
        let link: Link<4> = Link::new();
        let clock = SlotClock::new();
        let mut master = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config()).unwrap();
        for _ in 0..2 {
            master.pending = Some(Admission { slot: 2, age: 0 });
            uplink(&air, 0, &data(Command::ConnectConfirm, false, false, &WORD.to_le_bytes()));
            master.step(SlotState::Connection(2)).unwrap();
            air.clear();
        }
        assert_eq!(master.table.count(), 1);
    }

    #[test]
    fn test_lost_confirm_admits_on_first_data() {
        let air = Air::new();
        let link: Link<4> = Link::new();
        let clock = SlotClock::new();
        let mut master = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config()).unwrap();
        master.pending = Some(Admission { slot: 1, age: 0 });
        uplink(&air, 0, &data(Command::Data, true, false, b"up"));
        master.step(SlotState::Connection(1)).unwrap();
        assert!(master.table.is_connected(1));
        assert_eq!(link.available(1), Ok(2));
    }

    #[test]
    fn test_pending_admission_expires() {
        let air = Air::new();
        let link: Link<4> = Link::new();
        let clock = SlotClock::new();
        let mut master = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config()).unwrap();
        master.pending = Some(Admission { slot: 3, age: 0 });
        for _ in 0..ADMISSION_TIMEOUT_PERIODS {
            master.step(SlotState::HopFrequency).unwrap();
        }
        assert!(master.pending.is_some());
        master.step(SlotState::HopFrequency).unwrap();
        assert_eq!(master.pending, None);
        assert!(master.table.is_free(3));
    }

    #[test]
    fn test_broadcast_repeats_until_all_acked() {
        let air = Air::new();
        let link: Link<4> = Link::new();
        let clock = SlotClock::new();
        let mut master = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config()).unwrap();
        master.table.allocate(0, false, false).unwrap();
        master.table.allocate(2, false, false).unwrap();
        link.write(&[1u8; 20], Mode::NonBlock).unwrap();

        master.step(SlotState::BroadcastData).unwrap();
        let first = last_sent(&master).cloned().unwrap();
        assert_eq!(first.flags().seq, true);
        let Frame::Data(d) = &first else { panic!() };
        assert_eq!(d.payload.len(), 16);

        // slot 0 acks, slot 2 stays silent
        uplink(&air, 0, &data(Command::Data, false, true, &[]));
        master.step(SlotState::Connection(0)).unwrap();
        master.step(SlotState::Connection(2)).unwrap();
        master.step(SlotState::BroadcastData).unwrap();
        assert_eq!(last_sent(&master), Some(&first));

        uplink(&air, 0, &data(Command::Data, false, true, &[]));
        master.step(SlotState::Connection(2)).unwrap();
        master.step(SlotState::BroadcastData).unwrap();
        let Some(Frame::Data(d)) = last_sent(&master) else { panic!() };
        assert_eq!(d.flags.seq, false);
        assert_eq!(d.payload.as_slice(), &[1u8; 4]);
    }

    #[test]
    fn test_uplink_delivered_once_and_acked_in_header() {
        let air = Air::new();
        let link: Link<4> = Link::new();
        let clock = SlotClock::new();
        let mut master = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config()).unwrap();
        master.table.allocate(1, false, false).unwrap();
        for _ in 0..2 {
            uplink(&air, 0, &data(Command::Data, true, false, b"abc"));
            master.step(SlotState::Connection(1)).unwrap();
            air.clear();
        }
        assert_eq!(link.available(1), Ok(3));
        master.step(SlotState::Header).unwrap();
        let Some(Frame::Header(h)) = last_sent(&master) else { panic!() };
        let mut expected = ConnectionBits::new();
        expected.set(1, true);
        assert_eq!(h.acks, expected);
        assert_eq!(master.stats().fragments_delivered, 1);
    }

    #[test]
    fn test_full_receive_buffer_withholds_ack() {
        let air = Air::new();
        let link: Link<4> = Link::new();
        let clock = SlotClock::new();
        let mut master = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config()).unwrap();
        master.table.allocate(0, false, false).unwrap();
        link.deliver(0, &[0u8; RX_BUFFER_SIZE - 2]).unwrap();
        uplink(&air, 0, &data(Command::Data, true, false, b"xyz"));
        master.step(SlotState::Connection(0)).unwrap();
        assert!(!master.table.rx_ack(0));
        assert_eq!(master.stats().fragments_refused, 1);

        let mut sink = [0u8; RX_BUFFER_SIZE - 2];
        assert_eq!(link.read(ReadSlot::Slot(0), &mut sink, Mode::NonBlock), Ok(0));
        air.clear();
        uplink(&air, 0, &data(Command::Data, true, false, b"xyz"));
        master.step(SlotState::Connection(0)).unwrap();
        assert!(master.table.rx_ack(0));
        assert_eq!(link.available(0), Ok(3));
    }

    #[test]
    fn test_fragment_stays_with_its_slot() {
        let air = Air::new();
        let link: Link<4> = Link::new();
        let clock = SlotClock::new();
        let mut master = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config()).unwrap();
        master.table.allocate(0, false, false).unwrap();
        master.table.allocate(1, false, false).unwrap();
        uplink(&air, 0, &data(Command::Data, true, false, b"only zero"));
        master.step(SlotState::Connection(0)).unwrap();
        master.step(SlotState::Connection(1)).unwrap();
        assert_eq!(link.available(0), Ok(9));
        assert_eq!(link.available(1), Ok(0));
        assert!(!master.table.rx_ack(1));
    }

    #[test]
    fn test_sync_header_every_interval() {
        let air = Air::new();
        let link: Link<4> = Link::new();
        let clock = SlotClock::new();
        let mut master = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config()).unwrap();
        master.table.allocate(0, false, false).unwrap();
        let mut commands = std::vec::Vec::new();
        for _ in 0..SYNC_INTERVAL_PERIODS * 2 {
            master.step(SlotState::Header).unwrap();
            commands.push(last_sent(&master).unwrap().flags().command);
            master.step(SlotState::HopFrequency).unwrap();
        }
        let syncs: std::vec::Vec<usize> = commands
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == Command::Sync)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(syncs, [8]);
    }

    #[test]
    fn test_hop_cycles_channels() {
        let air = Air::new();
        let link: Link<4> = Link::new();
        let clock = SlotClock::new();
        let mut master = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config()).unwrap();
        let mut seen = [0u32; 4];
        for f in seen.iter_mut() {
            master.step(SlotState::HopFrequency).unwrap();
            *f = master.radio.frequency;
        }
        assert_eq!(
            seen,
            [DEFAULT_CHANNELS[1], DEFAULT_CHANNELS[2], DEFAULT_CHANNELS[0], DEFAULT_CHANNELS[1]]
        );
    }

    #[test]
    fn test_next_wakeup_skips_idle_slots() {
        let air = Air::new();
        let link: Link<4> = Link::new();
        let clock = SlotClock::new();
        let mut master = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config()).unwrap();
        assert_eq!(master.next_wakeup(1), 2);
        assert_eq!(master.next_wakeup(2), 1);
        master.table.allocate(2, false, false).unwrap();
        assert_eq!(master.next_wakeup(2), 5);
        link.announce(1, "").unwrap();
        assert_eq!(master.next_wakeup(5), 0);
    }

    #[test]
    fn test_service_hops_on_wrap() {
        let air = Air::new();
        let link: Link<4> = Link::new();
        let clock = SlotClock::new();
        let mut master = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config()).unwrap();
        clock.resync(2);
        assert_eq!(master.service(2), 1);
        assert_eq!(master.radio.frequency, DEFAULT_CHANNELS[1]);
        clock.resync(1);
        assert_eq!(master.service(1), 2);
        assert_eq!(master.radio.frequency, DEFAULT_CHANNELS[1]);
    }

    #[test]
    fn test_disconnect_frees_slot_and_buffer() {
        let air = Air::new();
        let link: Link<4> = Link::new();
        let clock = SlotClock::new();
        let mut master = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config()).unwrap();
        master.table.allocate(3, false, false).unwrap();
        link.deliver(3, b"bye").unwrap();
        master.disconnect(3);
        assert!(master.table.is_free(3));
        assert_eq!(link.available(3), Ok(0));
        assert_eq!(master.next_wakeup(2), 1);
    }

    #[test]
    fn test_offer_closes_when_announcement_expires() {
        let air = Air::new();
        let link: Link<4> = Link::new();
        let clock = SlotClock::new();
        let mut master = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config()).unwrap();
        link.announce(1, "").unwrap();
        master.prime();

        // one period: announce, header, broadcast, listen in the offered slot
        run_clock(&mut master, &clock, 7);
        assert_eq!(master.radio.sent.len(), 1);
        assert!(!link.announcing());
        assert_eq!(master.offered, None);
        assert_eq!(master.next_wakeup(2), 1);

        // a late request in the formerly offered slot is never heard
        let frequency = master.radio.frequency;
        air.inject_frame(frequency, WORD, &data(Command::ConnectRequest, false, false, &WORD.to_le_bytes()));
        run_clock(&mut master, &clock, 30);
        assert_eq!(master.pending, None);
        assert_eq!(master.table.count(), 0);
    }

    #[test]
    fn test_link_disconnect_applies_at_hop() {
        let air = Air::new();
        let link: Link<4> = Link::new();
        let clock = SlotClock::new();
        let mut master = Master::new(&link, &clock, MockRadio::new(&air), MockTimer::default(), config()).unwrap();
        master.table.allocate(0, false, false).unwrap();
        master.table.allocate(2, false, false).unwrap();
        master.table.advance_sequence(true);
        master.table.set_peer_ack(0, true);
        link.deliver(2, b"stale").unwrap();

        link.disconnect(2).unwrap();
        assert!(!master.table.all_acked());
        master.step(SlotState::HopFrequency).unwrap();
        assert!(master.table.is_free(2));
        assert_eq!(link.available(2), Ok(0));
        assert!(master.table.all_acked());
    }
}
