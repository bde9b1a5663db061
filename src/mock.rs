//! In-memory radio and timer doubles for unit tests.
//!
//! An [`Air`] is a shared medium: a frame transmitted by one [`MockRadio`] can
//! be received once by every other radio tuned to the same frequency and sync word.
//! Tests drive nodes slot by slot and call [`Air::clear`] between slots.

use core::cell::{Cell, RefCell};
use std::vec::Vec;

use crate::clock::SlotTimer;
use crate::consts::{DEFAULT_CHANNELS, DISCOVERY_SYNC_WORD, FRAME_SIZE};
use crate::frame::Frame;
use crate::radio::{PhyConfig, Radio, RadioMode, RxStatus};

#[derive(Debug, Clone)]
struct OnAir {
    origin: u32,
    frequency: u32,
    sync_word: u32,
    bytes: [u8; FRAME_SIZE],
    heard_by: Vec<u32>,
}

#[derive(Debug, Default)]
pub(crate) struct Air {
    frames: RefCell<Vec<OnAir>>,
    history: RefCell<Vec<Frame>>,
    next_id: Cell<u32>,
}

impl Air {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn inject(&self, frequency: u32, sync_word: u32, bytes: [u8; FRAME_SIZE]) {
        self.frames.borrow_mut().push(OnAir {
            origin: u32::MAX,
            frequency,
            sync_word,
            bytes,
            heard_by: Vec::new(),
        });
    }

    pub(crate) fn inject_frame(&self, frequency: u32, sync_word: u32, frame: &Frame) {
        self.inject(frequency, sync_word, frame.encode());
    }

    pub(crate) fn clear(&self) {
        self.frames.borrow_mut().clear();
    }

    pub(crate) fn pending(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Every frame any radio transmitted, oldest first. Not affected by [`Air::clear`].
    pub(crate) fn history(&self) -> Vec<Frame> {
        self.history.borrow().clone()
    }
}

#[derive(Debug)]
pub(crate) struct MockRadio<'a> {
    air: &'a Air,
    id: u32,
    pub frequency: u32,
    pub sync_word: u32,
    pub mode: RadioMode,
    pub phy: Option<PhyConfig>,
    pub fail: bool,
    pub sent: Vec<Frame>,
}

impl<'a> MockRadio<'a> {
    pub(crate) fn new(air: &'a Air) -> Self {
        let id = air.next_id.get();
        air.next_id.set(id + 1);
        Self {
            air,
            id,
            frequency: DEFAULT_CHANNELS[0],
            sync_word: DISCOVERY_SYNC_WORD,
            mode: RadioMode::Standby,
            phy: None,
            fail: false,
            sent: Vec::new(),
        }
    }

    fn check(&self) -> Result<(), ()> {
        if self.fail { Err(()) } else { Ok(()) }
    }
}

impl Radio for MockRadio<'_> {
    type Error = ();

    fn init(&mut self) -> Result<(), ()> {
        self.check()
    }

    fn configure(&mut self, phy: &PhyConfig) -> Result<(), ()> {
        self.check()?;
        self.phy = Some(*phy);
        Ok(())
    }

    fn set_frequency(&mut self, hz: u32) -> Result<(), ()> {
        self.check()?;
        self.frequency = hz;
        Ok(())
    }

    fn set_sync_word(&mut self, word: u32) -> Result<(), ()> {
        self.check()?;
        self.sync_word = word;
        Ok(())
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), ()> {
        self.check()?;
        self.mode = mode;
        Ok(())
    }

    fn transmit(&mut self, frame: &[u8; FRAME_SIZE]) -> Result<(), ()> {
        self.check()?;
        self.mode = RadioMode::TxTune;
        self.air.frames.borrow_mut().push(OnAir {
            origin: self.id,
            frequency: self.frequency,
            sync_word: self.sync_word,
            bytes: *frame,
            heard_by: Vec::new(),
        });
        if let Ok(decoded) = Frame::decode(frame) {
            self.air.history.borrow_mut().push(decoded.clone());
            self.sent.push(decoded);
        }
        Ok(())
    }

    fn receive(&mut self, frame: &mut [u8; FRAME_SIZE], _timeout_us: u32) -> Result<RxStatus, ()> {
        self.check()?;
        self.mode = RadioMode::RxTune;
        let mut frames = self.air.frames.borrow_mut();
        let hit = frames.iter_mut().find(|f| {
            f.origin != self.id
                && f.frequency == self.frequency
                && f.sync_word == self.sync_word
                && !f.heard_by.contains(&self.id)
        });
        match hit {
            Some(f) => {
                f.heard_by.push(self.id);
                *frame = f.bytes;
                Ok(RxStatus::Received(FRAME_SIZE))
            }
            None => Ok(RxStatus::Timeout),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockTimer {
    pub restarts: Vec<u32>,
    pub reloads: Vec<u32>,
}

impl SlotTimer for MockTimer {
    fn restart(&mut self, remaining_ticks: u32) {
        self.restarts.push(remaining_ticks);
    }

    fn set_reload(&mut self, ticks: u32) {
        self.reloads.push(ticks);
    }
}
