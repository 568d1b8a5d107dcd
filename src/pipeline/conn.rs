//! A non-blocking connection driven by an external event loop: the caller
//! polls [`AsyncConn::poll_mask`], waits on its own `poll`/`epoll`/`select`
//! call, then hands the resulting readiness back to [`AsyncConn::consume`].
//! This crate never spawns threads or runs its own reactor.
//!
//! Grounded directly in `mongo_async_pollmask` / `mongo_async_consume` in
//! `original_source/src/mongo.c`, with the external driving loop shape
//! taken from `original_source/test/async.c`'s raw `poll()` usage — this is
//! deliberately NOT modeled on `zero-mysql::tokio`'s `async`/`await`
//! connection, since spec.md's async mode is poll-mask/consume, not a
//! tokio reactor.

use std::io::{Read, Write};
use std::net::TcpStream;

use bitflags::bitflags;

use crate::constant::HEADER_SIZE;
use crate::error::{Error, Result};
use crate::pipeline::buffer::AsyncBuffer;
use crate::protocol::primitive::read_i32;
use crate::protocol::reply::Reply;

bitflags! {
    /// Readiness to report to (or expect from) the caller's event loop.
    /// Mirrors `POLLIN`/`POLLOUT`/`POLLERR`/`POLLHUP`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollMask: u16 {
        const READABLE = 1 << 0;
        const WRITABLE = 1 << 1;
        const ERROR = 1 << 2;
        const HANGUP = 1 << 3;
    }
}

/// A non-blocking TCP connection with an elastic outgoing and incoming
/// byte buffer, driven by `poll_mask`/`consume` rather than its own loop.
pub struct AsyncConn {
    socket: TcpStream,
    out: AsyncBuffer,
    input: AsyncBuffer,
}

impl AsyncConn {
    /// Takes ownership of an already-connected, already non-blocking
    /// socket. Setting it non-blocking is the caller's responsibility,
    /// mirroring `mongo_async_create`'s contract.
    pub fn new(socket: TcpStream) -> Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            out: AsyncBuffer::new(),
            input: AsyncBuffer::new(),
        })
    }

    /// Queues a fully-built wire message (as produced by [`crate::protocol::op`])
    /// for sending on the next writable readiness.
    pub fn queue(&mut self, message: &[u8]) {
        self.out.append(message);
    }

    /// The readiness this connection wants from the caller's event loop:
    /// always error/hangup/readable, plus writable iff there is queued
    /// outgoing data.
    pub fn poll_mask(&self) -> PollMask {
        let mut mask = PollMask::ERROR | PollMask::HANGUP | PollMask::READABLE;
        if !self.out.is_empty() {
            mask |= PollMask::WRITABLE;
        }
        mask
    }

    /// Drives the connection given the readiness the caller observed.
    /// Sends as much of the outgoing buffer as the socket accepts, and
    /// reads as much as is available into the incoming buffer.
    pub fn consume(&mut self, events: PollMask) -> Result<()> {
        if events.intersects(PollMask::ERROR | PollMask::HANGUP) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "socket reported error or hangup",
            )));
        }

        if events.contains(PollMask::WRITABLE) && !self.out.is_empty() {
            match self.socket.write(self.out.as_slice()) {
                Ok(0) => {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "write returned zero bytes",
                    )))
                }
                Ok(written) => self.out.erase(written),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(err) => return Err(Error::Io(err)),
            }
        }

        if events.contains(PollMask::READABLE) {
            let mut scratch = [0u8; 8192];
            loop {
                match self.socket.read(&mut scratch) {
                    Ok(0) => {
                        return Err(Error::Io(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "peer closed connection",
                        )))
                    }
                    Ok(n) => {
                        self.input.append(&scratch[..n]);
                        if n < scratch.len() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(err) => return Err(Error::Io(err)),
                }
            }
        }

        Ok(())
    }

    /// The total length of the frame currently being assembled, if the
    /// 4-byte length prefix has arrived yet.
    fn declared_frame_length(&self) -> Option<usize> {
        let buffered = self.input.as_slice();
        if buffered.len() < 4 {
            return None;
        }
        read_i32(buffered, 0).ok().map(|len| len as usize)
    }

    /// True only once the incoming buffer holds at least one full frame
    /// (header and body), never on a partial read. This is the fix for
    /// spec.md §9's flagged "frame ready" ambiguity: readiness is reported
    /// strictly by comparing buffered length against the declared total
    /// frame length, never by the mere presence of 4 header bytes.
    pub fn has_complete_reply(&self) -> bool {
        match self.declared_frame_length() {
            Some(len) if len >= HEADER_SIZE => self.input.len() >= len,
            _ => false,
        }
    }

    /// Takes the next complete reply out of the incoming buffer, if one
    /// has fully arrived.
    pub fn try_take_reply(&mut self) -> Result<Option<Reply>> {
        let Some(len) = self.declared_frame_length() else {
            return Ok(None);
        };
        if len < HEADER_SIZE || self.input.len() < len {
            return Ok(None);
        }
        let frame = self.input.as_slice()[..len].to_vec();
        self.input.erase(len);
        Reply::parse(&frame).map(Some)
    }
}
