//! Slave side of the protocol.
//!
//! A slave starts out scanning for the announce of the master it was told to
//! join. The announce fixes the slot phase, the channel and the offered slot;
//! the slave then asks for the slot, waits for the `ConnectAck` in a header,
//! confirms, and from then on
//! - reads the uplink ack bitmap from every header,
//! - receives the broadcast fragment in slot 2,
//! - sends one uplink fragment (or an empty keepalive) in its own slot.
//!
//! The slot clock is hard-reset on the announce and on every `Sync` header.
//! A slave that is not admitted after [`MAX_ADMISSION_ATTEMPTS`] periods
//! returns to scanning.

use heapless::Vec;
use nb::block;

use crate::clock::{SlotClock, SlotTimer};
use crate::config::Config;
use crate::consts::{
    ANNOUNCE_SLOT, CHANNEL_COUNT, CONTROL_SLOTS, FRAGMENT_SIZE, HEADER_SLOT,
    MAX_ADMISSION_ATTEMPTS,
};
use crate::error::Error;
use crate::frame::{Command, DataFrame, Frame, HeaderFrame};
use crate::link::{Link, Role};
use crate::node::{SlaveArgs, SlotState, Stats, Tally};
use crate::radio::{self, Radio, radio_error};
use crate::scan::{Beacon, Scanner};

/// Progress of a slave through admission.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SlaveState {
    /// Listening for the master's announce.
    Scanning,
    /// Sending `ConnectRequest` in the offered slot, waiting for `ConnectAck`.
    Requesting {
        /// Periods spent requesting so far.
        attempts: u8,
    },
    /// `ConnectAck` received; the confirm goes out in the next own slot.
    Confirming,
    /// Admitted.
    Connected,
}

/// Scheduling task of a slave node. Created by [`start`](crate::node::start).
#[derive(Debug)]
pub struct Slave<'a, R, T, const PEERS: usize> {
    link: &'a Link<PEERS>,
    clock: &'a SlotClock,
    radio: R,
    timer: T,
    config: Config,
    target: SlaveArgs,
    state: SlaveState,
    scanner: Scanner,
    channel: usize,
    uplink_seq: bool,
    downlink_ack: bool,
    fragment: Option<Vec<u8, FRAGMENT_SIZE>>,
}

impl<'a, R: Radio, T: SlotTimer, const PEERS: usize> Slave<'a, R, T, PEERS> {
    /// Binds `link` and starts scanning for the master described by `args`.
    ///
    /// # Errors
    /// - [`Error::InvalidConfig`] if `PEERS` is zero or `args` names no connection slot
    /// - [`Error::AlreadyStarted`] if `link` is bound
    /// - [`Error::Radio`] if tuning fails
    pub fn new(
        link: &'a Link<PEERS>,
        clock: &'a SlotClock,
        mut radio: R,
        timer: T,
        config: Config,
        args: SlaveArgs,
    ) -> Result<Self, Error> {
        if PEERS == 0 || args.period <= u16::from(args.slot) + CONTROL_SLOTS {
            return Err(Error::InvalidConfig);
        }
        let mut scanner = Scanner::new(
            config.channels,
            (CHANNEL_COUNT as u16).saturating_mul(args.period),
            &config.timing,
        );
        scanner.restart(&mut radio)?;
        link.bind(Role::Slave)?;
        clock.set_period(args.period);
        info!("slave looking for master {:x}", args.sync_word);
        Ok(Self {
            link,
            clock,
            radio,
            timer,
            config,
            target: args,
            state: SlaveState::Scanning,
            scanner,
            channel: 0,
            uplink_seq: false,
            downlink_ack: false,
            fragment: None,
        })
    }

    /// Admission progress.
    pub fn state(&self) -> SlaveState {
        self.state
    }

    /// Traffic counters.
    pub fn stats(&self) -> Stats {
        self.link.stats()
    }

    fn own_slot(&self) -> SlotState {
        SlotState::Connection(self.target.slot)
    }

    /// Services one slot. While scanning every call is one listen window,
    /// whatever the slot.
    ///
    /// # Errors
    /// [`Error::Radio`] if the radio fails.
    pub fn step(&mut self, state: SlotState) -> Result<(), Error> {
        if self.state == SlaveState::Scanning {
            if state == SlotState::HopFrequency {
                return Ok(());
            }
            return self.scan_window();
        }
        match state {
            SlotState::Header => self.header_slot(),
            SlotState::BroadcastData if self.state == SlaveState::Connected => {
                self.broadcast_slot()
            }
            SlotState::HopFrequency => self.hop(),
            s if s == self.own_slot() => self.uplink_slot(),
            _ => Ok(()),
        }
    }

    fn resync(&mut self, slot: u16) {
        self.clock.resync(slot);
        self.timer
            .restart(self.config.timing.resync_remaining_ticks());
    }

    fn scan_window(&mut self) -> Result<(), Error> {
        match self.scanner.listen_once(&mut self.radio)? {
            Some(beacon) if beacon.sync_word == self.target.sync_word => self.on_announce(&beacon),
            Some(beacon) => {
                trace!("ignoring master {:x}", beacon.sync_word);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn on_announce(&mut self, beacon: &Beacon) -> Result<(), Error> {
        self.link.tally(Tally::FrameReceived);
        self.target.slot = beacon.slot;
        self.target.period = beacon.period;
        self.clock.set_period(beacon.period);
        self.resync(ANNOUNCE_SLOT);
        self.channel = usize::from(beacon.channel) % CHANNEL_COUNT;
        self.radio
            .set_frequency(self.config.channels[self.channel])
            .map_err(radio_error)?;
        self.radio
            .set_sync_word(self.target.sync_word)
            .map_err(radio_error)?;
        self.state = SlaveState::Requesting { attempts: 0 };
        debug!("master found, requesting slot {}", beacon.slot);
        Ok(())
    }

    fn header_slot(&mut self) -> Result<(), Error> {
        let timeout = self.config.timing.listen_timeout_us();
        let Some(Frame::Header(header)) = radio::listen(&mut self.radio, timeout)? else {
            return Ok(());
        };
        self.link.tally(Tally::FrameReceived);
        if header.flags.command == Command::Sync {
            self.resync(HEADER_SLOT);
        }
        match self.state {
            SlaveState::Requesting { .. }
                if header.flags.command == Command::ConnectAck
                    && header.slot == self.target.slot =>
            {
                self.downlink_ack = header.flags.seq;
                self.uplink_seq = false;
                self.fragment = None;
                self.state = SlaveState::Confirming;
                debug!("slot {} acknowledged", header.slot);
            }
            SlaveState::Connected => self.on_uplink_ack(&header),
            _ => {}
        }
        Ok(())
    }

    fn on_uplink_ack(&mut self, header: &HeaderFrame) {
        if self.fragment.is_some() && header.acks.get(self.target.slot) == self.uplink_seq {
            trace!("uplink fragment acknowledged");
            self.fragment = None;
        }
    }

    fn broadcast_slot(&mut self) -> Result<(), Error> {
        let timeout = self.config.timing.listen_timeout_us();
        let Some(Frame::Data(data)) = radio::listen(&mut self.radio, timeout)? else {
            return Ok(());
        };
        self.link.tally(Tally::FrameReceived);
        self.on_downlink(&data);
        Ok(())
    }

    fn on_downlink(&mut self, data: &DataFrame) {
        if data.flags.command != Command::Data || data.flags.seq == self.downlink_ack {
            return;
        }
        match self.link.deliver(0, &data.payload) {
            Ok(()) => {
                self.downlink_ack = data.flags.seq;
                self.link.tally(Tally::FragmentDelivered);
            }
            Err(_) => {
                trace!("receive buffer full");
                self.link.tally(Tally::FragmentRefused);
            }
        }
    }

    fn uplink_slot(&mut self) -> Result<(), Error> {
        let word = self.target.sync_word.to_le_bytes();
        let frame = match self.state {
            SlaveState::Requesting { .. } => {
                Frame::data(Command::ConnectRequest, false, false, &word)?
            }
            SlaveState::Confirming => {
                Frame::data(Command::ConnectConfirm, false, self.downlink_ack, &word)?
            }
            SlaveState::Connected => {
                if self.fragment.is_none() {
                    let chunk = self.link.take_fragment();
                    if !chunk.is_empty() {
                        self.uplink_seq = !self.uplink_seq;
                        self.fragment = Some(chunk);
                    }
                }
                let payload = self.fragment.as_deref().unwrap_or(&[]);
                Frame::data(Command::Data, self.uplink_seq, self.downlink_ack, payload)?
            }
            SlaveState::Scanning => return Ok(()),
        };
        radio::send(&mut self.radio, &frame)?;
        self.link.tally(Tally::FrameSent);
        if self.state == SlaveState::Confirming {
            self.state = SlaveState::Connected;
            self.link.set_own_slot(Some(self.target.slot));
            info!("joined master {:x} in slot {}", self.target.sync_word, self.target.slot);
        }
        Ok(())
    }

    fn hop(&mut self) -> Result<(), Error> {
        if let SlaveState::Requesting { attempts } = &mut self.state {
            *attempts += 1;
            if *attempts > MAX_ADMISSION_ATTEMPTS {
                warn!("no answer to connect request, scanning again");
                self.state = SlaveState::Scanning;
                return self.scanner.restart(&mut self.radio);
            }
        }
        self.channel = (self.channel + 1) % CHANNEL_COUNT;
        self.radio
            .set_frequency(self.config.channels[self.channel])
            .map_err(radio_error)
    }

    fn needs(&self, slot: u16) -> bool {
        let state = SlotState::for_slot(slot);
        match self.state {
            SlaveState::Scanning => true,
            SlaveState::Requesting { .. } => state == SlotState::Header || state == self.own_slot(),
            SlaveState::Confirming => state == self.own_slot(),
            SlaveState::Connected => {
                matches!(state, SlotState::Header | SlotState::BroadcastData)
                    || state == self.own_slot()
            }
        }
    }

    /// Next slot after `now` the slave has to service, wrapping into the next
    /// period.
    pub fn next_wakeup(&self, now: u16) -> u16 {
        let period = self.target.period;
        (1..=period)
            .map(|d| (now + d) % period)
            .find(|&slot| self.needs(slot))
            .unwrap_or(now)
    }

    /// Services the slot the clock just released and arms the next one.
    ///
    /// # Returns
    /// The slot armed next.
    pub fn service(&mut self, slot: u16) -> u16 {
        if let Err(e) = self.step(SlotState::for_slot(slot)) {
            warn!("slot {}: {:?}", slot, e);
        }
        let now = self.clock.slot();
        let next = self.next_wakeup(now);
        if next <= now && self.state != SlaveState::Scanning {
            if let Err(e) = self.step(SlotState::HopFrequency) {
                warn!("hop: {:?}", e);
            }
        }
        self.clock.arm_at(next);
        next
    }

    /// Arms the clock for the next slot; a scanning slave listens in every one.
    pub(crate) fn prime(&mut self) {
        self.clock.arm(1);
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
