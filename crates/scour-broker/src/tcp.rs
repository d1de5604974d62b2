//! TCP frontend.
//!
//! A mio-based, non-blocking frontend: clients connect over TCP and
//! exchange [`Frame`]s — request frames carrying the command line,
//! reply frames carrying the response text. The connection's peer
//! address becomes the opaque connection id the core routes replies by.
//!
//! The coordinator only calls [`Frontend::poll`] while a worker is idle,
//! so complete requests wait in `pending` (and unread bytes wait in the
//! kernel's socket buffers) while the pool is saturated.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};
use scour_types::ConnId;
use scour_wire as wire;
use scour_wire::{Frame, FrameKind};

use crate::error::BrokerResult;
use crate::frontend::Frontend;

const LISTENER: Token = Token(0);

/// One client connection.
#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    conn_id: ConnId,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

/// TCP implementation of [`Frontend`].
pub struct TcpFrontend {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    connections: HashMap<Token, Connection>,
    tokens: HashMap<ConnId, Token>,
    next_token: usize,
    pending: VecDeque<(ConnId, String)>,
}

impl TcpFrontend {
    /// Binds the listening socket.
    pub fn bind(addr: SocketAddr) -> BrokerResult<Self> {
        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(addr)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        info!(addr = %listener.local_addr()?, "frontend listening");

        Ok(Self {
            poll,
            events: Events::with_capacity(128),
            listener,
            connections: HashMap::new(),
            tokens: HashMap::new(),
            next_token: 1,
            pending: VecDeque::new(),
        })
    }

    /// The actual bound address (useful with port 0).
    pub fn local_addr(&self) -> BrokerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(e) = self.poll.registry().register(
                        &mut stream,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    ) {
                        warn!(peer = %peer, error = %e, "register failed");
                        continue;
                    }

                    let conn_id = ConnId::new(peer.to_string().into_bytes());
                    debug!(peer = %peer, "client connected");
                    self.tokens.insert(conn_id.clone(), token);
                    self.connections.insert(
                        token,
                        Connection {
                            stream,
                            conn_id,
                            read_buf: BytesMut::new(),
                            write_buf: BytesMut::new(),
                        },
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn read_connection(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        let mut closed = false;
        let mut chunk = [0u8; 4096];
        loop {
            match conn.stream.read(&mut chunk) {
                Ok(0) => {
                    closed = true;
                    break;
                }
                Ok(n) => conn.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(conn = %conn.conn_id, error = %e, "read failed");
                    closed = true;
                    break;
                }
            }
        }

        // Decode every complete frame buffered so far.
        loop {
            match Frame::decode(&mut conn.read_buf) {
                Ok(Some(frame)) if frame.kind == FrameKind::Request => {
                    match wire::decode_client_request(&frame.body) {
                        Ok(request) => {
                            self.pending.push_back((conn.conn_id.clone(), request));
                        }
                        Err(e) => {
                            warn!(conn = %conn.conn_id, error = %e, "bad request body; dropping client");
                            closed = true;
                            break;
                        }
                    }
                }
                Ok(Some(_)) => {
                    warn!(conn = %conn.conn_id, "client sent a reply frame; dropping client");
                    closed = true;
                    break;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(conn = %conn.conn_id, error = %e, "bad frame; dropping client");
                    closed = true;
                    break;
                }
            }
        }

        if closed {
            self.drop_connection(token);
        }
    }

    fn flush_connection(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        let mut closed = false;
        while !conn.write_buf.is_empty() {
            match conn.stream.write(&conn.write_buf) {
                Ok(0) => {
                    closed = true;
                    break;
                }
                Ok(n) => {
                    let _ = conn.write_buf.split_to(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(conn = %conn.conn_id, error = %e, "write failed");
                    closed = true;
                    break;
                }
            }
        }

        if closed {
            self.drop_connection(token);
        }
    }

    fn drop_connection(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            debug!(conn = %conn.conn_id, "client disconnected");
            self.tokens.remove(&conn.conn_id);
            let _ = self.poll.registry().deregister(&mut conn.stream);
        }
    }
}

impl Frontend for TcpFrontend {
    fn poll(&mut self, timeout: Duration) -> BrokerResult<Option<(ConnId, String)>> {
        if let Some(request) = self.pending.pop_front() {
            return Ok(Some(request));
        }

        self.poll.poll(&mut self.events, Some(timeout))?;

        let ready: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|event| (event.token(), event.is_readable(), event.is_writable()))
            .collect();

        for (token, readable, writable) in ready {
            if token == LISTENER {
                self.accept_all();
                continue;
            }
            if writable {
                self.flush_connection(token);
            }
            if readable {
                self.read_connection(token);
            }
        }

        Ok(self.pending.pop_front())
    }

    fn send(&mut self, conn: &ConnId, reply: &[u8]) -> BrokerResult<()> {
        let Some(&token) = self.tokens.get(conn) else {
            // The client went away while its request was in flight.
            debug!(conn = %conn, "reply for a disconnected client dropped");
            return Ok(());
        };

        let frame = Frame::reply(wire::encode_client_reply(reply));
        if let Some(connection) = self.connections.get_mut(&token) {
            let encoded = frame.encode_to_bytes();
            connection.write_buf.extend_from_slice(&encoded);
        }
        self.flush_connection(token);
        Ok(())
    }
}
