//! Discovery of announcing masters.
//!
//! Masters advertise themselves in the announce slot on the discovery sync
//! word. A scanning node does not know the slot timing yet, so it listens in
//! back-to-back windows of one slot each, dwelling on every hop channel for
//! [`CHANNEL_COUNT`] full periods before moving to the next one. The master
//! visits every channel once in that time, so an announcing master is heard
//! within [`CHANNEL_COUNT`] periods.

use heapless::{String, Vec};

use crate::clock::SlotTiming;
use crate::consts::{
    CHANNEL_COUNT, COMMENT_LEN, DEFAULT_CHANNELS, DISCOVERY_SYNC_WORD, MAX_BEACONS,
    SLOTS_PER_PERIOD,
};
use crate::error::Error;
use crate::frame::Frame;
use crate::radio::{self, Radio, radio_error};

/// A master heard during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Beacon {
    /// Sync word of the master's network.
    pub sync_word: u32,
    /// Connection slot the master offers.
    pub slot: u8,
    /// Period length in slots.
    pub period: u16,
    /// Hop channel index the announce was heard on.
    pub channel: u8,
    /// Free text of the announcement.
    pub comment: String<COMMENT_LEN>,
}

/// Parameters of a [`scan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ScanConfig {
    /// Hop channel frequencies (Hz).
    pub channels: [u32; CHANNEL_COUNT],
    /// Total number of listen windows.
    pub windows: u32,
    /// Listen windows spent on a channel before moving on.
    pub dwell_windows: u16,
    /// Slot timing; one window lasts one slot.
    pub timing: SlotTiming,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::for_periods(CHANNEL_COUNT as u16)
    }
}

impl ScanConfig {
    /// Scan lasting `periods` full-size periods on the default channels.
    pub fn for_periods(periods: u16) -> Self {
        Self {
            channels: DEFAULT_CHANNELS,
            windows: u32::from(periods) * u32::from(SLOTS_PER_PERIOD),
            dwell_windows: CHANNEL_COUNT as u16 * SLOTS_PER_PERIOD,
            timing: SlotTiming::new(),
        }
    }
}

/// Channel rotation and listen loop shared by [`scan`] and a scanning slave.
#[derive(Debug, Clone)]
pub(crate) struct Scanner {
    channels: [u32; CHANNEL_COUNT],
    dwell_windows: u16,
    timeout_us: u32,
    channel: usize,
    dwell: u16,
}

impl Scanner {
    pub(crate) fn new(channels: [u32; CHANNEL_COUNT], dwell_windows: u16, timing: &SlotTiming) -> Self {
        Self {
            channels,
            dwell_windows: dwell_windows.max(1),
            timeout_us: timing.slot_us(),
            channel: 0,
            dwell: 0,
        }
    }

    /// Tunes the radio to the first channel on the discovery sync word.
    pub(crate) fn restart<R: Radio>(&mut self, radio: &mut R) -> Result<(), Error> {
        self.channel = 0;
        self.dwell = 0;
        radio.set_sync_word(DISCOVERY_SYNC_WORD).map_err(radio_error)?;
        radio
            .set_frequency(self.channels[self.channel])
            .map_err(radio_error)
    }

    /// Listens for one window, then moves to the next channel once the dwell
    /// time is used up.
    pub(crate) fn listen_once<R: Radio>(&mut self, radio: &mut R) -> Result<Option<Beacon>, Error> {
        let heard = radio::listen(radio, self.timeout_us)?;
        let channel = self.channel as u8;
        self.dwell += 1;
        if self.dwell >= self.dwell_windows {
            self.dwell = 0;
            self.channel = (self.channel + 1) % CHANNEL_COUNT;
            radio
                .set_frequency(self.channels[self.channel])
                .map_err(radio_error)?;
            trace!("scanning channel {}", self.channel);
        }
        Ok(match heard {
            Some(Frame::Announce(a)) => Some(Beacon {
                sync_word: a.sync_word,
                slot: a.slot,
                period: a.period,
                channel,
                comment: a.comment,
            }),
            _ => None,
        })
    }
}

/// Listens for announcing masters and reports each network once.
///
/// The scan runs for `config.windows` listen windows. A master heard several
/// times is reported with its most recent announcement. At most [`MAX_BEACONS`]
/// networks are kept. The radio is left on the discovery sync word.
///
/// # Errors
/// [`Error::Radio`] if a driver call fails.
pub fn scan<R: Radio>(radio: &mut R, config: &ScanConfig) -> Result<Vec<Beacon, MAX_BEACONS>, Error> {
    let mut scanner = Scanner::new(config.channels, config.dwell_windows, &config.timing);
    scanner.restart(radio)?;
    let mut found: Vec<Beacon, MAX_BEACONS> = Vec::new();
    for _ in 0..config.windows {
        let Some(beacon) = scanner.listen_once(radio)? else {
            continue;
        };
        match found.iter_mut().find(|b| b.sync_word == beacon.sync_word) {
            Some(known) => *known = beacon,
            None => {
                debug!("found master {:x} offering slot {}", beacon.sync_word, beacon.slot);
                if found.push(beacon).is_err() {
                    debug!("beacon list full");
                }
            }
        }
    }
    Ok(found)
}
