//! Radio transceiver abstraction.
//!
//! GEODE never touches transceiver registers. The firmware implements
//! [`Radio`] for its sub-GHz chip and hands it to [`start`](crate::node::start);
//! the scheduling task is then the only user of the radio.

use crate::consts::{DISCOVERY_SYNC_WORD, FRAME_SIZE};
use crate::error::Error;
use crate::frame::Frame;

/// Operating mode requested from the transceiver.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum RadioMode {
    ///   Low-power mode, oscillator off.
    Sleep,
    ///   Oscillator running, neither sending nor receiving.
    #[default]
    Standby,
    ///   Synthesizer locked on the transmit frequency.
    TxTune,
    ///   Synthesizer locked on the receive frequency.
    RxTune,
}

/// Outcome of a [`Radio::receive`] call.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum RxStatus {
    /// A packet of the given length was written into the buffer.
    Received(usize),
    /// Nothing arrived before the timeout. This is the normal "peer silent" outcome.
    Timeout,
}

/// Physical layer parameters shared by every GEODE node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct PhyConfig {
    /// Bit rate (bits per second).
    pub bitrate: u32,
    /// FSK frequency deviation (Hz).
    pub deviation: u32,
    /// Receiver bandwidth (Hz).
    pub bandwidth: u32,
    /// Preamble length in bytes.
    pub preamble_len: u8,
    /// Fixed payload length in bytes.
    pub payload_len: u8,
    /// Sync word programmed at init, before any master is known.
    pub sync_word: u32,
}

impl Default for PhyConfig {
    fn default() -> Self {
        Self {
            bitrate: 15_000,
            deviation: 7_500,
            bandwidth: 41_700,
            preamble_len: 4,
            payload_len: FRAME_SIZE as u8,
            sync_word: DISCOVERY_SYNC_WORD,
        }
    }
}

/// Raw transceiver primitives consumed by GEODE.
///
/// `transmit` and `receive` block until the packet is physically sent or
/// received, or until the timeout elapses.
pub trait Radio {
    /// Driver specific error.
    type Error;

    /// Resets and wakes the transceiver.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Programs the physical layer parameters.
    fn configure(&mut self, phy: &PhyConfig) -> Result<(), Self::Error>;

    /// Tunes to `hz`.
    fn set_frequency(&mut self, hz: u32) -> Result<(), Self::Error>;

    /// Sets the 32-bit sync word preceding every frame.
    fn set_sync_word(&mut self, word: u32) -> Result<(), Self::Error>;

    /// Switches the operating mode.
    fn set_mode(&mut self, mode: RadioMode) -> Result<(), Self::Error>;

    /// Sends one frame and blocks until it is on air.
    fn transmit(&mut self, frame: &[u8; FRAME_SIZE]) -> Result<(), Self::Error>;

    /// Waits up to `timeout_us` microseconds for one frame.
    fn receive(
        &mut self,
        frame: &mut [u8; FRAME_SIZE],
        timeout_us: u32,
    ) -> Result<RxStatus, Self::Error>;
}

/// Initializes the radio with the GEODE physical layer.
///
/// Leaves the transceiver in [`RadioMode::Standby`] on the default sync word.
///
/// # Errors
/// [`Error::Radio`] if any driver call fails.
pub fn init<R: Radio>(radio: &mut R, phy: &PhyConfig) -> Result<(), Error> {
    radio.init().map_err(radio_error)?;
    radio.configure(phy).map_err(radio_error)?;
    radio.set_sync_word(phy.sync_word).map_err(radio_error)?;
    radio.set_mode(RadioMode::Standby).map_err(radio_error)?;
    info!("radio initialized at {} bps", phy.bitrate);
    Ok(())
}

pub(crate) fn radio_error<E>(_: E) -> Error {
    Error::Radio
}

/// Encodes and sends one frame.
pub(crate) fn send<R: Radio>(radio: &mut R, frame: &Frame) -> Result<(), Error> {
    radio.transmit(&frame.encode()).map_err(radio_error)
}

/// Listens for one frame.
///
/// `Ok(None)` on timeout. Short or undecodable packets are dropped and also
/// reported as `Ok(None)`; they count as noise, not as protocol errors.
pub(crate) fn listen<R: Radio>(radio: &mut R, timeout_us: u32) -> Result<Option<Frame>, Error> {
    let mut buf = [0u8; FRAME_SIZE];
    match radio.receive(&mut buf, timeout_us).map_err(radio_error)? {
        RxStatus::Timeout => Ok(None),
        RxStatus::Received(len) if len != FRAME_SIZE => {
            debug!("dropping {} byte packet", len);
            Ok(None)
        }
        RxStatus::Received(_) => match Frame::decode(&buf) {
            Ok(frame) => Ok(Some(frame)),
            Err(e) => {
                debug!("dropping undecodable frame: {:?}", e);
                Ok(None)
            }
        },
    }
}
