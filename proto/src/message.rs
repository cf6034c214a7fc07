//! message codecs for both directions of the protocol.
//!
//! client messages decode into a single enum the router matches on. the
//! service side encodes rating packs piecewise (header and entries are
//! written separately so workers can cache the top-of-leaderboard prefix)
//! and protocol errors as a tagged union.

use crate::wire::{ByteReader, ByteWriter, WireError};
use crate::{Monetary, UserId, COMPETITION_DISTANCE, PROTOCOL_VERSION, TOP_POSITIONS};

/// client → service opcodes, first byte of a frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientOpcode {
    Handshake = 111,
    UserRegistered = 1,
    UserRenamed = 2,
    UserDealWon = 3,
    UserConnected = 4,
    UserDisconnected = 5,
}

/// service → client opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceOpcode {
    ProtocolError = 1,
    UserRating = 2,
}

/// one decoded client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Handshake { version: u32 },
    UserRegistered { id: UserId, name: Vec<u8> },
    UserRenamed { id: UserId, name: Vec<u8> },
    UserDealWon { id: UserId, amount: Monetary },
    UserConnected { id: UserId },
    UserDisconnected { id: UserId },
}

impl ClientMessage {
    /// decode one client frame payload.
    ///
    /// trailing bytes are tolerated: a deal message may carry a client-side
    /// timestamp after the amount, which the service ignores - deals are
    /// bucketed into the week they arrive in.
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = ByteReader::new(payload);
        let code = r.get_u8()?;

        let msg = match code {
            c if c == ClientOpcode::Handshake as u8 => ClientMessage::Handshake {
                version: r.get_u32()?,
            },
            c if c == ClientOpcode::UserRegistered as u8 => ClientMessage::UserRegistered {
                id: r.get_i32()?,
                name: r.get_name()?,
            },
            c if c == ClientOpcode::UserRenamed as u8 => ClientMessage::UserRenamed {
                id: r.get_i32()?,
                name: r.get_name()?,
            },
            c if c == ClientOpcode::UserDealWon as u8 => ClientMessage::UserDealWon {
                id: r.get_i32()?,
                amount: r.get_i64()?,
            },
            c if c == ClientOpcode::UserConnected as u8 => ClientMessage::UserConnected {
                id: r.get_i32()?,
            },
            c if c == ClientOpcode::UserDisconnected as u8 => ClientMessage::UserDisconnected {
                id: r.get_i32()?,
            },
            code => return Err(WireError::UnknownOpcode { code }),
        };

        Ok(msg)
    }

    /// encode the message payload (opcode included, frame prefix excluded).
    pub fn encode(&self, w: &mut ByteWriter) -> Result<(), WireError> {
        match self {
            ClientMessage::Handshake { version } => {
                w.put_u8(ClientOpcode::Handshake as u8);
                w.put_u32(*version);
            }
            ClientMessage::UserRegistered { id, name } => {
                w.put_u8(ClientOpcode::UserRegistered as u8);
                w.put_i32(*id);
                w.put_name(name)?;
            }
            ClientMessage::UserRenamed { id, name } => {
                w.put_u8(ClientOpcode::UserRenamed as u8);
                w.put_i32(*id);
                w.put_name(name)?;
            }
            ClientMessage::UserDealWon { id, amount } => {
                w.put_u8(ClientOpcode::UserDealWon as u8);
                w.put_i32(*id);
                w.put_i64(*amount);
            }
            ClientMessage::UserConnected { id } => {
                w.put_u8(ClientOpcode::UserConnected as u8);
                w.put_i32(*id);
            }
            ClientMessage::UserDisconnected { id } => {
                w.put_u8(ClientOpcode::UserDisconnected as u8);
                w.put_i32(*id);
            }
        }
        Ok(())
    }
}

/// protocol-level error reported back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    VersionUnsupported { expected: u32 },
    UserUnrecognized { id: UserId },
    MultipleRegistration { id: UserId },
}

impl ProtocolError {
    pub fn version_unsupported() -> Self {
        ProtocolError::VersionUnsupported {
            expected: PROTOCOL_VERSION,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            ProtocolError::VersionUnsupported { .. } => 1,
            ProtocolError::UserUnrecognized { .. } => 2,
            ProtocolError::MultipleRegistration { .. } => 3,
        }
    }

    /// encode the error body (code + payload), without the service opcode.
    pub fn encode(&self, w: &mut ByteWriter) {
        w.put_u32(self.code());
        match self {
            ProtocolError::VersionUnsupported { expected } => w.put_u32(*expected),
            ProtocolError::UserUnrecognized { id }
            | ProtocolError::MultipleRegistration { id } => w.put_i32(*id),
        }
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self, WireError> {
        let code = r.get_u32()?;
        let err = match code {
            1 => ProtocolError::VersionUnsupported {
                expected: r.get_u32()?,
            },
            2 => ProtocolError::UserUnrecognized { id: r.get_i32()? },
            3 => ProtocolError::MultipleRegistration { id: r.get_i32()? },
            code => return Err(WireError::UnknownErrorCode { code }),
        };
        Ok(err)
    }
}

/// one leaderboard entry inside a rating pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingEntry {
    pub id: UserId,
    pub winnings: Monetary,
    pub name: Vec<u8>,
}

impl RatingEntry {
    /// append one entry to a rating pack under construction.
    pub fn write(
        w: &mut ByteWriter,
        id: UserId,
        winnings: Monetary,
        name: &[u8],
    ) -> Result<(), WireError> {
        w.put_i32(id);
        w.put_i64(winnings);
        w.put_name(name)
    }
}

/// a decoded `USER_RATING` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingPack {
    pub subject: UserId,
    pub length: i32,
    pub position: i32,
    pub entries: Vec<RatingEntry>,
}

impl RatingPack {
    /// write the pack header `(subject, length, position)`.
    pub fn write_header(w: &mut ByteWriter, subject: UserId, length: i32, position: i32) {
        w.put_i32(subject);
        w.put_i32(length);
        w.put_i32(position);
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self, WireError> {
        let subject = r.get_i32()?;
        let length = r.get_i32()?;
        let position = r.get_i32()?;

        let count = rating_entry_count(length, position);
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(RatingEntry {
                id: r.get_i32()?,
                winnings: r.get_i64()?,
                name: r.get_name()?,
            });
        }

        Ok(Self {
            subject,
            length,
            position,
            entries,
        })
    }
}

/// number of entries a rating pack carries for a subject at `position` in
/// a leaderboard of `length`: the top positions, the competition above
/// (only once the subject has left the top), and the competition below
/// including the subject.
pub fn rating_entry_count(length: i32, position: i32) -> usize {
    let top = TOP_POSITIONS.min(position);
    let above = if position > TOP_POSITIONS {
        COMPETITION_DISTANCE.min(position - TOP_POSITIONS)
    } else {
        0
    };
    let below = (COMPETITION_DISTANCE + 1).min(length - position);
    (top + above + below.max(0)) as usize
}

/// one decoded service frame, for the client side of the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceMessage {
    ProtocolError(ProtocolError),
    UserRating(RatingPack),
}

pub fn decode_service_message(payload: &[u8]) -> Result<ServiceMessage, WireError> {
    let mut r = ByteReader::new(payload);
    let code = r.get_u8()?;

    match code {
        c if c == ServiceOpcode::ProtocolError as u8 => {
            Ok(ServiceMessage::ProtocolError(ProtocolError::decode(&mut r)?))
        }
        c if c == ServiceOpcode::UserRating as u8 => {
            Ok(ServiceMessage::UserRating(RatingPack::decode(&mut r)?))
        }
        code => Err(WireError::UnknownOpcode { code }),
    }
}
