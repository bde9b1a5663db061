//! Wire codec for the 18-byte GEODE frames.
//!
//! Every frame starts with a flags byte:
//!
//! | bits | meaning                         |
//! |------|---------------------------------|
//! | 0–3  | [`Command`]                     |
//! | 4    | sequence bit                    |
//! | 5    | ack bit                         |
//! | 6–7  | reserved, sent as zero          |
//!
//! The command selects the layout of the remaining 17 bytes:
//!
//! - **Header** (`Header`, `Sync`, `ConnectAck`): 16-byte ack bitmap, 1-byte slot.
//! - **Data** (`Data`, `ConnectRequest`, `ConnectConfirm`): 1-byte length (≤16, top two
//!   bits reserved), 16 payload bytes zero padded.
//! - **Announce**: master sync word (u32 LE), offered slot, period length (u16 LE),
//!   10-byte NUL padded comment.
//!
//! [`Frame::encode`] and [`Frame::decode`] are the only places that know this layout.

use crate::bitmap::ConnectionBits;
use crate::consts::{COMMENT_LEN, FRAGMENT_SIZE, FRAME_SIZE};
use crate::error::Error;

use heapless::{String, Vec};

const COMMAND_MASK: u8 = 0x0f;
const SEQ_BIT: u8 = 1 << 4;
const ACK_BIT: u8 = 1 << 5;
const LEN_MASK: u8 = 0x3f;

/// Command carried in the low nibble of the flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    /// Application data fragment (possibly empty keep-alive).
    Data = 0,
    /// Plain master header.
    Header = 1,
    /// Master header that also orders a timer phase reset.
    Sync = 2,
    /// Master advertisement.
    Announce = 3,
    /// Slave asks for the offered slot.
    ConnectRequest = 4,
    /// Master acknowledges the request for the slot named in the header.
    ConnectAck = 5,
    /// Slave completes the admission handshake.
    ConnectConfirm = 6,
}

impl Command {
    fn from_bits(bits: u8) -> Result<Self, Error> {
        Ok(match bits & COMMAND_MASK {
            0 => Command::Data,
            1 => Command::Header,
            2 => Command::Sync,
            3 => Command::Announce,
            4 => Command::ConnectRequest,
            5 => Command::ConnectAck,
            6 => Command::ConnectConfirm,
            _ => return Err(Error::InvalidFrame),
        })
    }

    fn is_header(self) -> bool {
        matches!(self, Command::Header | Command::Sync | Command::ConnectAck)
    }

    fn is_data(self) -> bool {
        matches!(
            self,
            Command::Data | Command::ConnectRequest | Command::ConnectConfirm
        )
    }
}

/// Decoded flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Flags {
    /// Frame command.
    pub command: Command,
    /// Sequence bit of the sender.
    pub seq: bool,
    /// Ack bit of the sender.
    pub ack: bool,
}

impl Flags {
    /// Flags with both bits clear.
    pub const fn new(command: Command) -> Self {
        Self {
            command,
            seq: false,
            ack: false,
        }
    }

    fn to_byte(self) -> u8 {
        let mut b = self.command as u8;
        if self.seq {
            b |= SEQ_BIT;
        }
        if self.ack {
            b |= ACK_BIT;
        }
        b
    }

    fn from_byte(b: u8) -> Result<Self, Error> {
        Ok(Self {
            command: Command::from_bits(b)?,
            seq: b & SEQ_BIT != 0,
            ack: b & ACK_BIT != 0,
        })
    }
}

/// Master header: authoritative uplink ack bitmap plus a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderFrame {
    /// `Header`, `Sync` or `ConnectAck`; `seq` is the current broadcast sequence bit.
    pub flags: Flags,
    /// Per-connection uplink ack bits.
    pub acks: ConnectionBits,
    /// Slot addressed by the command, [`NO_SLOT`](crate::consts::NO_SLOT) if none.
    pub slot: u8,
}

/// Data fragment, sent by the master in the broadcast slot or by a slave in its own slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// `Data`, `ConnectRequest` or `ConnectConfirm`.
    pub flags: Flags,
    /// Up to [`FRAGMENT_SIZE`] payload bytes.
    pub payload: Vec<u8, FRAGMENT_SIZE>,
}

/// Master advertisement, sent with the discovery sync word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceFrame {
    /// Sync word used by the master for every other frame.
    pub sync_word: u32,
    /// Connection slot offered to the next joining slave.
    pub slot: u8,
    /// Period length in slots.
    pub period: u16,
    /// Free text supplied to [`Link::announce`](crate::link::Link::announce).
    pub comment: String<COMMENT_LEN>,
}

/// Any frame on air.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Master header.
    Header(HeaderFrame),
    /// Data fragment.
    Data(DataFrame),
    /// Master advertisement.
    Announce(AnnounceFrame),
}

impl Frame {
    /// Builds a data-layout frame.
    ///
    /// # Errors
    /// [`Error::InvalidFrame`] if `command` is not a data command or `payload`
    /// exceeds [`FRAGMENT_SIZE`].
    pub fn data(command: Command, seq: bool, ack: bool, payload: &[u8]) -> Result<Self, Error> {
        if !command.is_data() {
            return Err(Error::InvalidFrame);
        }
        let payload = Vec::from_slice(payload).map_err(|_| Error::InvalidFrame)?;
        Ok(Frame::Data(DataFrame {
            flags: Flags { command, seq, ack },
            payload,
        }))
    }

    /// Builds a header-layout frame.
    ///
    /// # Errors
    /// [`Error::InvalidFrame`] if `command` is not a header command.
    pub fn header(command: Command, seq: bool, acks: ConnectionBits, slot: u8) -> Result<Self, Error> {
        if !command.is_header() {
            return Err(Error::InvalidFrame);
        }
        Ok(Frame::Header(HeaderFrame {
            flags: Flags {
                command,
                seq,
                ack: false,
            },
            acks,
            slot,
        }))
    }

    /// Builds an announce frame, truncating `comment` to [`COMMENT_LEN`] bytes on a
    /// character boundary.
    pub fn announce(sync_word: u32, slot: u8, period: u16, comment: &str) -> Self {
        Frame::Announce(AnnounceFrame {
            sync_word,
            slot,
            period,
            comment: truncate(comment),
        })
    }

    /// Flags of the frame.
    pub fn flags(&self) -> Flags {
        match self {
            Frame::Header(h) => h.flags,
            Frame::Data(d) => d.flags,
            Frame::Announce(_) => Flags::new(Command::Announce),
        }
    }

    /// Serializes the frame into its 18-byte wire form.
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut out = [0u8; FRAME_SIZE];
        out[0] = self.flags().to_byte();
        match self {
            Frame::Header(h) => {
                out[1..1 + ConnectionBits::BYTES].copy_from_slice(&h.acks.to_bytes());
                out[1 + ConnectionBits::BYTES] = h.slot;
            }
            Frame::Data(d) => {
                out[1] = d.payload.len() as u8 & LEN_MASK;
                out[2..2 + d.payload.len()].copy_from_slice(&d.payload);
            }
            Frame::Announce(a) => {
                out[1..5].copy_from_slice(&a.sync_word.to_le_bytes());
                out[5] = a.slot;
                out[6..8].copy_from_slice(&a.period.to_le_bytes());
                out[8..8 + a.comment.len()].copy_from_slice(a.comment.as_bytes());
            }
        }
        out
    }

    /// Parses an 18-byte wire frame.
    ///
    /// # Errors
    /// [`Error::InvalidFrame`] on an unknown command, a fragment length above
    /// [`FRAGMENT_SIZE`], or a comment that is not UTF-8.
    pub fn decode(bytes: &[u8; FRAME_SIZE]) -> Result<Self, Error> {
        let flags = Flags::from_byte(bytes[0])?;
        match flags.command {
            Command::Announce => {
                let comment_bytes = &bytes[8..8 + COMMENT_LEN];
                let end = comment_bytes
                    .iter()
                    .position(|&b| b == 0)
                    .unwrap_or(COMMENT_LEN);
                let text =
                    core::str::from_utf8(&comment_bytes[..end]).map_err(|_| Error::InvalidFrame)?;
                let mut comment = String::new();
                comment.push_str(text).map_err(|_| Error::InvalidFrame)?;
                Ok(Frame::Announce(AnnounceFrame {
                    sync_word: u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
                    slot: bytes[5],
                    period: u16::from_le_bytes([bytes[6], bytes[7]]),
                    comment,
                }))
            }
            c if c.is_header() => {
                let mut acks = [0u8; ConnectionBits::BYTES];
                acks.copy_from_slice(&bytes[1..1 + ConnectionBits::BYTES]);
                Ok(Frame::Header(HeaderFrame {
                    flags,
                    acks: ConnectionBits::from_bytes(&acks),
                    slot: bytes[1 + ConnectionBits::BYTES],
                }))
            }
            _ => {
                let len = usize::from(bytes[1] & LEN_MASK);
                if len > FRAGMENT_SIZE {
                    return Err(Error::InvalidFrame);
                }
                let payload = Vec::from_slice(&bytes[2..2 + len]).map_err(|_| Error::InvalidFrame)?;
                Ok(Frame::Data(DataFrame { flags, payload }))
            }
        }
    }
}

/// Cuts `text` to at most [`COMMENT_LEN`] bytes on a character boundary.
pub(crate) fn truncate(text: &str) -> String<COMMENT_LEN> {
    let mut end = text.len().min(COMMENT_LEN);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::new();
    // `end` never exceeds the capacity
    let _ = out.push_str(&text[..end]);
    out
}
