//! Event Loop
//!
//! Single-threaded readiness multiplexing over the listening socket and
//! every open connection. There is exactly one thread, so the key space
//! and all connection state are plain mutable data - no locks anywhere.
//!
//! Each iteration:
//!
//! 1. Wait for readiness, bounded by a fixed timeout so the process can
//!    still notice external shutdown. Registration interest mirrors the
//!    state machine: a Reading connection is watched for readable, a
//!    Writing one for writable; the listener is always watched.
//! 2. Accept at most one pending connection; the rest are picked up on
//!    later iterations. An accept failure is logged and ignored.
//! 3. Drive every ready connection, then reap any that reached Closing:
//!    deregister, drop, and thereby close the socket. This is the only
//!    destruction path.
//!
//! A failure of the readiness wait itself means the loop cannot make
//! progress and is propagated out of [`Server::run`].

use crate::server::conn::{ConnState, Connection};
use crate::storage::KeySpace;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

const LISTENER: Token = Token(0);

/// Upper bound on one readiness wait. Not a protocol deadline; it only
/// bounds how long the loop can be unresponsive to the outside world.
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// The server: listener, connection table, and the key space.
pub struct Server {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    conns: HashMap<Token, Connection>,
    next_token: usize,
    /// True while the listener may still hold queued connections. The
    /// poll events are edge-triggered, so the backlog would not be
    /// reported again on its own; this keeps the one-accept-per-
    /// iteration cadence without stranding anyone.
    accept_pending: bool,
    db: KeySpace,
}

impl Server {
    /// Wraps an already-bound listener. Bootstrap owns socket creation;
    /// the server owns everything after.
    pub fn new(listener: std::net::TcpListener, db: KeySpace) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        let mut listener = TcpListener::from_std(listener);

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(1024),
            listener,
            conns: HashMap::new(),
            next_token: LISTENER.0 + 1,
            accept_pending: false,
            db,
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the event loop. Never returns under normal operation; an
    /// error means the readiness wait itself failed.
    pub fn run(&mut self) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "server ready");

        loop {
            let timeout = if self.accept_pending {
                Duration::ZERO
            } else {
                POLL_TIMEOUT
            };
            match self.poll.poll(&mut self.events, Some(timeout)) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            let ready: Vec<Token> = self.events.iter().map(|event| event.token()).collect();
            for token in ready {
                if token == LISTENER {
                    self.accept_pending = true;
                } else {
                    self.drive_connection(token);
                }
            }

            if self.accept_pending {
                self.accept_one();
            }
        }
    }

    /// Accepts a single pending connection; more stay queued for the
    /// next iteration.
    fn accept_one(&mut self) {
        let (stream, addr) = match self.listener.accept() {
            Ok(accepted) => accepted,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.accept_pending = false;
                return;
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                return;
            }
        };

        let token = Token(self.next_token);
        self.next_token += 1;

        let mut conn = Connection::new(stream, addr);
        if let Err(e) = self
            .poll
            .registry()
            .register(conn.stream_mut(), token, Interest::READABLE)
        {
            warn!(client = %addr, error = %e, "failed to register connection");
            return;
        }

        debug!(client = %addr, "accepted connection");
        self.conns.insert(token, conn);
    }

    fn drive_connection(&mut self, token: Token) {
        let Some(conn) = self.conns.get_mut(&token) else {
            // Stale event for a connection reaped earlier this batch.
            return;
        };

        conn.drive(&mut self.db);

        match conn.state() {
            ConnState::Closing => self.reap(token),
            state => {
                let interest = match state {
                    ConnState::Reading => Interest::READABLE,
                    _ => Interest::WRITABLE,
                };
                if let Err(e) = self
                    .poll
                    .registry()
                    .reregister(conn.stream_mut(), token, interest)
                {
                    warn!(client = %conn.addr(), error = %e, "reregister failed");
                    self.reap(token);
                }
            }
        }
    }

    /// Removes and closes a finished connection.
    fn reap(&mut self, token: Token) {
        if let Some(mut conn) = self.conns.remove(&token) {
            let _ = self.poll.registry().deregister(conn.stream_mut());
            debug!(client = %conn.addr(), "connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{code, encode_request, Response};
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::thread;

    /// Binds port 0, then runs the event loop on a background thread.
    fn spawn_server() -> SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let mut server = Server::new(listener, KeySpace::new()).unwrap();
            let _ = server.run();
        });
        addr
    }

    fn read_response(stream: &mut TcpStream) -> Response {
        let mut header = [0u8; 4];
        stream.read_exact(&mut header).unwrap();
        let len = u32::from_le_bytes(header) as usize;
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).unwrap();
        let (response, consumed) = Response::decode(&payload).unwrap();
        assert_eq!(consumed, payload.len());
        response
    }

    fn request(stream: &mut TcpStream, args: &[&[u8]]) -> Response {
        stream.write_all(&encode_request(args).unwrap()).unwrap();
        read_response(stream)
    }

    #[test]
    fn test_set_get_del_roundtrip() {
        let addr = spawn_server();
        let mut client = TcpStream::connect(addr).unwrap();

        assert_eq!(request(&mut client, &[b"set", b"foo", b"bar"]), Response::Nil);
        assert_eq!(
            request(&mut client, &[b"get", b"foo"]),
            Response::str("bar")
        );
        assert_eq!(request(&mut client, &[b"get", b"missing"]), Response::Nil);
        assert_eq!(request(&mut client, &[b"del", b"foo"]), Response::Int(1));
        assert_eq!(request(&mut client, &[b"del", b"foo"]), Response::Int(0));
    }

    #[test]
    fn test_upsert_last_write_wins() {
        let addr = spawn_server();
        let mut client = TcpStream::connect(addr).unwrap();

        request(&mut client, &[b"set", b"k", b"v1"]);
        request(&mut client, &[b"set", b"k", b"v2"]);
        assert_eq!(request(&mut client, &[b"get", b"k"]), Response::str("v2"));
    }

    #[test]
    fn test_unknown_command() {
        let addr = spawn_server();
        let mut client = TcpStream::connect(addr).unwrap();

        let response = request(&mut client, &[b"bogus"]);
        match response {
            Response::Err { code, .. } => assert_eq!(code, code::UNKNOWN_COMMAND),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_keys_lists_current_set() {
        let addr = spawn_server();
        let mut client = TcpStream::connect(addr).unwrap();

        for name in [b"a".as_slice(), b"b", b"c"] {
            request(&mut client, &[b"set", name, b"x"]);
        }
        request(&mut client, &[b"del", b"b"]);

        let response = request(&mut client, &[b"keys"]);
        let mut listed: Vec<Vec<u8>> = response
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_bytes().unwrap().to_vec())
            .collect();
        listed.sort();
        assert_eq!(listed, vec![b"a".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_oversize_frame_closes_connection() {
        let addr = spawn_server();
        let mut client = TcpStream::connect(addr).unwrap();

        // A length field the server must reject from the header alone.
        client.write_all(&0xFFFF_FFFFu32.to_le_bytes()).unwrap();

        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).unwrap_or(0);
        assert_eq!(n, 0, "server should close without replying");
    }

    #[test]
    fn test_garbage_arguments_close_connection() {
        let addr = spawn_server();
        let mut client = TcpStream::connect(addr).unwrap();

        // Valid frame length, but the payload declares an argument that
        // runs past the frame end.
        let mut frame = Vec::new();
        let mut payload = Vec::new();
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&100u32.to_le_bytes());
        payload.extend_from_slice(b"ab");
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        client.write_all(&frame).unwrap();

        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).unwrap_or(0);
        assert_eq!(n, 0, "server should close without replying");
    }

    #[test]
    fn test_connection_survives_request_errors() {
        let addr = spawn_server();
        let mut client = TcpStream::connect(addr).unwrap();

        let err = request(&mut client, &[b"nope", b"x"]);
        assert!(matches!(err, Response::Err { .. }));

        // Still serving afterwards.
        assert_eq!(request(&mut client, &[b"set", b"k", b"v"]), Response::Nil);
        assert_eq!(request(&mut client, &[b"get", b"k"]), Response::str("v"));
    }

    #[test]
    fn test_oversize_response_becomes_error() {
        let addr = spawn_server();
        let mut client = TcpStream::connect(addr).unwrap();

        // Enough long keys that the KEYS array cannot fit in one frame.
        let key_len = 120;
        for i in 0..40 {
            let key = format!("{:0width$}", i, width = key_len);
            assert_eq!(
                request(&mut client, &[b"set", key.as_bytes(), b"x"]),
                Response::Nil
            );
        }

        match request(&mut client, &[b"keys"]) {
            Response::Err { code, .. } => assert_eq!(code, code::RESPONSE_TOO_BIG),
            other => panic!("expected error, got {:?}", other),
        }

        // The connection is still usable.
        assert_eq!(request(&mut client, &[b"del", b"absent"]), Response::Int(0));
    }

    #[test]
    fn test_pipelined_requests_in_one_write() {
        let addr = spawn_server();
        let mut client = TcpStream::connect(addr).unwrap();

        let mut burst = encode_request(&[b"set", b"p", b"1"]).unwrap();
        burst.extend_from_slice(&encode_request(&[b"get", b"p"]).unwrap());
        client.write_all(&burst).unwrap();

        assert_eq!(read_response(&mut client), Response::Nil);
        assert_eq!(read_response(&mut client), Response::str("1"));
    }

    #[test]
    fn test_request_split_across_writes() {
        let addr = spawn_server();
        let mut client = TcpStream::connect(addr).unwrap();

        let frame = encode_request(&[b"set", b"slow", b"drip"]).unwrap();
        let (head, tail) = frame.split_at(5);
        client.write_all(head).unwrap();
        client.flush().unwrap();
        thread::sleep(Duration::from_millis(50));
        client.write_all(tail).unwrap();

        assert_eq!(read_response(&mut client), Response::Nil);
        assert_eq!(
            request(&mut client, &[b"get", b"slow"]),
            Response::str("drip")
        );
    }

    #[test]
    fn test_two_clients_share_the_keyspace() {
        let addr = spawn_server();
        let mut first = TcpStream::connect(addr).unwrap();
        let mut second = TcpStream::connect(addr).unwrap();

        assert_eq!(
            request(&mut first, &[b"set", b"shared", b"yes"]),
            Response::Nil
        );
        assert_eq!(
            request(&mut second, &[b"get", b"shared"]),
            Response::str("yes")
        );

        drop(first);
        assert_eq!(request(&mut second, &[b"del", b"shared"]), Response::Int(1));
    }

    #[test]
    fn test_eof_mid_frame_is_not_answered() {
        let addr = spawn_server();
        let mut client = TcpStream::connect(addr).unwrap();

        let frame = encode_request(&[b"get", b"k"]).unwrap();
        client.write_all(&frame[..3]).unwrap();
        client.shutdown(std::net::Shutdown::Write).unwrap();

        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).unwrap_or(0);
        assert_eq!(n, 0);
    }
}
