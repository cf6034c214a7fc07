//! blocking framed TCP transport.
//!
//! one client session at a time: the read half goes to the router thread,
//! the write half is shared by every worker behind a spinlock so that no
//! two outgoing frames interleave on the wire. frames are u16-little-endian
//! length prefixed, the length counting its own two bytes.

use crate::error::{Result, ServiceError};
use log::warn;
use podium_cpu::Spinlock;
use podium_proto::{ByteWriter, ClientMessage, ProtocolError, ServiceOpcode, PROTOCOL_VERSION};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;

/// start of a rating frame: length placeholder + service opcode.
pub fn new_rating_frame() -> ByteWriter {
    let mut frame = ByteWriter::with_capacity(1024);
    frame.put_u16(0);
    frame.put_u8(ServiceOpcode::UserRating as u8);
    frame
}

/// start of a protocol-error frame: length placeholder + service opcode.
pub fn new_error_frame() -> ByteWriter {
    let mut frame = ByteWriter::with_capacity(64);
    frame.put_u16(0);
    frame.put_u8(ServiceOpcode::ProtocolError as u8);
    frame
}

/// accepting socket; outlives individual sessions so recovery can re-accept
/// without rebinding.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        Ok(Self {
            inner: TcpListener::bind(addr)?,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// accept a raw connection without the protocol handshake.
    pub(crate) fn accept_raw(&self) -> Result<(TcpStream, SocketAddr)> {
        Ok(self.inner.accept()?)
    }

    /// block until a client connects and completes the handshake.
    pub fn accept_session(&self) -> Result<(FrameReader, Arc<FrameWriter>)> {
        let (stream, peer) = self.accept_raw()?;
        log::info!("accepted connection from {}", peer);

        // bypass nagle: rating packets are small and latency-bound
        if let Err(e) = stream.set_nodelay(true) {
            warn!("failed to set TCP_NODELAY: {}", e);
        }

        let write_half = stream.try_clone()?;
        let mut reader = FrameReader::new(stream);
        let writer = Arc::new(FrameWriter::new(write_half));

        handshake(&mut reader, &writer)?;

        Ok((reader, writer))
    }
}

/// read half of the session; owned by the router thread.
pub struct FrameReader {
    stream: TcpStream,
    payload: Vec<u8>,
}

impl FrameReader {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            payload: Vec::with_capacity(256),
        }
    }

    /// read one frame and return its payload (opcode onwards).
    pub fn read_frame(&mut self) -> Result<&[u8]> {
        let mut prefix = [0u8; 2];
        self.stream.read_exact(&mut prefix)?;

        let frame_length = u16::from_le_bytes(prefix);
        if frame_length < 2 {
            return Err(ServiceError::FrameLength {
                length: frame_length,
            });
        }

        self.payload.resize(frame_length as usize - 2, 0);
        self.stream.read_exact(&mut self.payload)?;

        Ok(&self.payload)
    }
}

/// write half of the session, shared by all workers.
pub struct FrameWriter {
    stream: Spinlock<TcpStream>,
}

impl FrameWriter {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: Spinlock::new(stream),
        }
    }

    /// patch the frame's length prefix and write it out atomically.
    ///
    /// the buffer keeps its contents; the caller decides what to truncate
    /// or rewrite for the next message.
    pub fn send(&self, frame: &mut ByteWriter) -> std::io::Result<()> {
        let total = frame.bytes().len();
        debug_assert!(total >= 3 && total <= u16::MAX as usize);

        frame.set_position(0);
        frame.put_u16(total as u16);

        let mut stream = self.stream.lock();
        stream.write_all(frame.bytes())
    }
}

/// expect exactly one versioned handshake before anything else.
///
/// a version mismatch is answered with a protocol error frame before the
/// session is torn down, so the client learns which version to speak.
fn handshake(reader: &mut FrameReader, writer: &FrameWriter) -> Result<()> {
    let payload = reader.read_frame()?;

    match ClientMessage::decode(payload)? {
        ClientMessage::Handshake { version } if version == PROTOCOL_VERSION => Ok(()),
        ClientMessage::Handshake { version } => {
            let mut frame = new_error_frame();
            ProtocolError::version_unsupported().encode(&mut frame);
            if let Err(e) = writer.send(&mut frame) {
                warn!("failed to send version error: {}", e);
            }
            Err(ServiceError::ProtocolVersion { client: version })
        }
        _ => Err(ServiceError::HandshakeRequired),
    }
}
