//! Connection State Machine
//!
//! One `Connection` per accepted socket, owning its buffers and
//! progress:
//!
//! ```text
//!              frame parsed, response buffered
//!    ┌───────────────────────────────────────────┐
//!    │                                           ▼
//! ┌──┴──────┐                              ┌──────────┐
//! │ Reading │ <──────────────────────────  │ Writing  │
//! └──┬──────┘      response fully flushed  └────┬─────┘
//!    │                                          │
//!    │ EOF / I/O error / protocol violation     │ I/O error
//!    ▼                                          ▼
//! ┌─────────────────────────────────────────────────┐
//! │                    Closing                      │  (reaped by the
//! └─────────────────────────────────────────────────┘   event loop)
//! ```
//!
//! The drive step never blocks: reads and writes run until the kernel
//! reports "would block", which just ends the step until the socket is
//! next reported ready. A response is flushed synchronously right after
//! its request is processed, before the next buffered frame is looked
//! at, so responses can never queue ahead of their requests and at most
//! one unflushed response exists per connection.

use crate::commands;
use crate::protocol::{self, Response, HEADER_LEN, MAX_MSG_SIZE};
use crate::server::buffer::{ReadBuf, WriteBuf};
use crate::storage::KeySpace;
use mio::net::TcpStream;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use tracing::{debug, trace, warn};

/// One frame per direction is all a connection keeps in flight.
const BUF_CAPACITY: usize = HEADER_LEN + MAX_MSG_SIZE;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Accumulating request bytes; may hold incomplete frames.
    Reading,
    /// Draining a pending response.
    Writing,
    /// Terminal; the event loop closes the socket and drops this.
    Closing,
}

/// A client connection and its buffered I/O.
pub struct Connection {
    stream: TcpStream,
    addr: SocketAddr,
    state: ConnState,
    rbuf: ReadBuf,
    wbuf: WriteBuf,
}

impl Connection {
    pub fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        Self {
            stream,
            addr,
            state: ConnState::Reading,
            rbuf: ReadBuf::new(BUF_CAPACITY),
            wbuf: WriteBuf::new(BUF_CAPACITY),
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn is_closing(&self) -> bool {
        self.state == ConnState::Closing
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The underlying socket, for poll (de)registration.
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Advances the connection as far as the socket allows right now.
    pub fn drive(&mut self, db: &mut KeySpace) {
        match self.state {
            ConnState::Reading => self.on_readable(db),
            ConnState::Writing => self.on_writable(),
            ConnState::Closing => {}
        }
    }

    fn on_readable(&mut self, db: &mut KeySpace) {
        while self.fill_read_buffer(db) {}
    }

    /// One socket read, then as many buffered frames as can complete.
    /// Returns true if another read should be attempted immediately.
    fn fill_read_buffer(&mut self, db: &mut KeySpace) -> bool {
        // Frame processing always leaves room: a full buffer holds a
        // complete frame, which is consumed below, or an oversize
        // header, which closes the connection.
        debug_assert!(!self.rbuf.is_full());

        let n = loop {
            match self.stream.read(self.rbuf.spare()) {
                Ok(n) => break n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return false,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "read failed");
                    self.state = ConnState::Closing;
                    return false;
                }
            }
        };

        if n == 0 {
            if self.rbuf.is_empty() {
                debug!(client = %self.addr, "client closed connection");
            } else {
                warn!(client = %self.addr, "eof with a partial frame buffered");
            }
            self.state = ConnState::Closing;
            return false;
        }

        self.rbuf.advance(n);
        trace!(client = %self.addr, bytes = n, "read data");

        while self.process_one_frame(db) {}
        self.state == ConnState::Reading
    }

    /// Processes one complete frame from the front of the read buffer:
    /// decode, dispatch, buffer the response, flush. Returns true when
    /// the next buffered frame can be attempted.
    fn process_one_frame(&mut self, db: &mut KeySpace) -> bool {
        let (args, frame_len) = match protocol::split_frame(self.rbuf.filled()) {
            Ok(None) => return false,
            Ok(Some((payload, frame_len))) => match protocol::decode_request(payload) {
                Ok(args) => (args, frame_len),
                Err(e) => {
                    warn!(client = %self.addr, error = %e, "invalid request payload");
                    self.state = ConnState::Closing;
                    return false;
                }
            },
            Err(e) => {
                warn!(client = %self.addr, error = %e, "invalid frame header");
                self.state = ConnState::Closing;
                return false;
            }
        };
        self.rbuf.consume(frame_len);

        let response = commands::dispatch(db, &args);
        trace!(client = %self.addr, args = args.len(), "dispatched request");

        let mut payload = Vec::with_capacity(64);
        response.encode_into(&mut payload);
        if payload.len() > MAX_MSG_SIZE {
            debug!(client = %self.addr, size = payload.len(), "response exceeds frame limit");
            payload.clear();
            Response::too_big().encode_into(&mut payload);
        }

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        protocol::encode_frame(&payload, &mut frame);
        self.wbuf.load(&frame);
        self.state = ConnState::Writing;

        // Respond immediately: one request, one flush.
        self.on_writable();
        self.state == ConnState::Reading
    }

    fn on_writable(&mut self) {
        while self.flush_some() {}
    }

    /// One socket write. Returns true if more remains and the socket
    /// may accept it.
    fn flush_some(&mut self) -> bool {
        match self.stream.write(self.wbuf.unsent()) {
            Ok(0) => {
                warn!(client = %self.addr, "write returned zero");
                self.state = ConnState::Closing;
                false
            }
            Ok(n) => {
                self.wbuf.advance(n);
                trace!(client = %self.addr, bytes = n, "wrote data");
                if self.wbuf.is_drained() {
                    self.wbuf.clear();
                    self.state = ConnState::Reading;
                    return false;
                }
                true
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => false,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => true,
            Err(e) => {
                warn!(client = %self.addr, error = %e, "write failed");
                self.state = ConnState::Closing;
                false
            }
        }
    }
}
