//! wire protocol for the podium rating service.
//!
//! every message travels as a little-endian length-prefixed frame: a u16
//! holding the total frame length (prefix included) followed by the
//! payload. the first payload byte is an opcode; names are length-prefixed
//! by a single byte, so they top out at 255 bytes.
//!
//! this crate is shared by the service and by test clients: the service
//! decodes client messages and encodes rating packs and protocol errors,
//! a client does the reverse.

mod message;
mod wire;

pub use message::{
    decode_service_message, rating_entry_count, ClientMessage, ClientOpcode, ProtocolError,
    RatingEntry, RatingPack, ServiceMessage, ServiceOpcode,
};
pub use wire::{ByteReader, ByteWriter, WireError};

/// user id as it appears on the wire; `-1` is the invalid sentinel.
pub type UserId = i32;

/// accumulated winnings.
pub type Monetary = i64;

pub const PROTOCOL_VERSION: u32 = 1;
pub const INVALID_USER_ID: UserId = -1;

/// leaderboard entries always included at the head of a rating pack.
pub const TOP_POSITIONS: i32 = 10;

/// positions fetched before and after the subject's own.
pub const COMPETITION_DISTANCE: i32 = 10;

/// the competition window around `position` in a leaderboard of `length`,
/// as a half-open `(begin, end)` index range. empty (begin >= end) when the
/// subject sits inside the top positions already sent.
#[inline]
pub fn competition_window(length: i32, position: i32) -> (i32, i32) {
    let begin = TOP_POSITIONS.max(position - COMPETITION_DISTANCE);
    let end = length.min(position + COMPETITION_DISTANCE + 1);
    (begin, end)
}
