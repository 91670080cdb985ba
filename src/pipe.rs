//! Engine plumbing shared by every channel.
//!
//! The provider engine performs I/O through [`Wire`], an in-memory
//! transport: ciphertext the caller feeds a channel is queued on the read
//! side, ciphertext the engine emits collects on the write side, and a
//! drained read side reports would-block instead of ever touching a socket.
//! [`Engine`] wraps the provider session and folds its result codes into
//! three outcomes: progress, need-more-input, or a fatal error.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use openssl::ssl::{ErrorCode, Ssl, SslStream};

use crate::certificate::Certificate;
use crate::channel::Transport;
use crate::error::{Error, ErrorKind};
use crate::view::{ByteView, ByteViewMut};

/// Largest plaintext payload the channel frames into one record.
pub(crate) const MAX_MESSAGE: usize = 16 * 1024;
/// TLS record header on the wire.
pub(crate) const STREAM_HEADER: usize = 5;
/// DTLS record header on the wire.
pub(crate) const DATAGRAM_HEADER: usize = 13;
/// Upper bound on per-record expansion past the header: explicit IV,
/// authentication tag or MAC, block padding.
pub(crate) const RECORD_TRAILER: usize = 80;
/// Ciphertext a channel buffers ahead of the engine: one max-size record
/// plus framing slack.
pub(crate) const RESIDUE_LIMIT: usize = MAX_MESSAGE + 2 * 1024;

/// In-memory transport between the caller's buffers and the engine.
pub(crate) struct Wire {
    transport: Transport,
    segments: VecDeque<Vec<u8>>,
    buffered: usize,
    outgoing: Vec<u8>,
}

impl Wire {
    fn new(transport: Transport) -> Self {
        Self {
            transport,
            segments: VecDeque::new(),
            buffered: 0,
            outgoing: Vec::new(),
        }
    }

    /// Queue caller ciphertext for the engine, bounded by the residue
    /// limit. Returns how many bytes were taken; a datagram is taken whole
    /// or not at all.
    pub(crate) fn accept(&mut self, input: ByteView<'_>) -> usize {
        if input.is_empty() {
            return 0;
        }
        let room = RESIDUE_LIMIT.saturating_sub(self.buffered);
        let taken = match self.transport {
            Transport::Stream => input.subview(room),
            Transport::Datagram => {
                if input.len() <= room {
                    input
                } else {
                    ByteView::default()
                }
            }
        };
        if !taken.is_empty() {
            self.segments.push_back(taken.data().to_vec());
            self.buffered += taken.len();
        }
        taken.len()
    }

    pub(crate) fn has_output(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Move engine-produced ciphertext into `out`; returns bytes written.
    /// Anything that does not fit stays queued.
    pub(crate) fn take_output(&mut self, out: &mut [u8]) -> usize {
        let mut sink = ByteViewMut::new(out);
        let n = sink.put(&self.outgoing);
        self.outgoing.drain(..n);
        n
    }
}

impl Read for Wire {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.transport {
            Transport::Stream => {
                let mut copied = 0;
                while copied < buf.len() {
                    let Some(front) = self.segments.front_mut() else {
                        break;
                    };
                    let n = front.len().min(buf.len() - copied);
                    buf[copied..copied + n].copy_from_slice(&front[..n]);
                    copied += n;
                    if n == front.len() {
                        self.segments.pop_front();
                    } else {
                        front.drain(..n);
                    }
                }
                if copied == 0 {
                    return Err(io::ErrorKind::WouldBlock.into());
                }
                self.buffered -= copied;
                Ok(copied)
            }
            Transport::Datagram => {
                let Some(dgram) = self.segments.pop_front() else {
                    return Err(io::ErrorKind::WouldBlock.into());
                };
                self.buffered -= dgram.len();
                let n = dgram.len().min(buf.len());
                buf[..n].copy_from_slice(&dgram[..n]);
                // excess beyond the engine's buffer is lost, as on a socket
                Ok(n)
            }
        }
    }
}

impl Write for Wire {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outgoing.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Handshake progress.
pub(crate) enum Step {
    Done,
    NeedMore,
}

/// Outcome of one plaintext read from the engine.
pub(crate) enum ReadStep {
    Data(usize),
    NeedMore,
    Closed,
}

/// The provider session bound to a [`Wire`].
pub(crate) struct Engine {
    stream: SslStream<Wire>,
    server: bool,
    started: bool,
}

impl Engine {
    pub(crate) fn new(ssl: Ssl, transport: Transport, server: bool) -> Result<Self, Error> {
        let stream = SslStream::new(ssl, Wire::new(transport))?;
        Ok(Self {
            stream,
            server,
            started: false,
        })
    }

    pub(crate) fn wire(&self) -> &Wire {
        self.stream.get_ref()
    }

    pub(crate) fn wire_mut(&mut self) -> &mut Wire {
        self.stream.get_mut()
    }

    /// Advance the handshake as far as the queued input allows.
    pub(crate) fn handshake_step(&mut self) -> Result<Step, Error> {
        let result = if self.started {
            self.stream.do_handshake()
        } else {
            self.started = true;
            if self.server {
                self.stream.accept()
            } else {
                self.stream.connect()
            }
        };
        match result {
            Ok(()) => Ok(Step::Done),
            Err(e) if would_block(&e) => Ok(Step::NeedMore),
            Err(e) => Err(fatal(e)),
        }
    }

    pub(crate) fn read_step(&mut self, buf: &mut [u8]) -> Result<ReadStep, Error> {
        match self.stream.ssl_read(buf) {
            Ok(n) => Ok(ReadStep::Data(n)),
            Err(e) if e.code() == ErrorCode::ZERO_RETURN => Ok(ReadStep::Closed),
            Err(e) if would_block(&e) => Ok(ReadStep::NeedMore),
            Err(e) => Err(fatal(e)),
        }
    }

    pub(crate) fn write_step(&mut self, buf: &[u8]) -> Result<usize, Error> {
        match self.stream.ssl_write(buf) {
            Ok(n) => Ok(n),
            Err(e) => Err(fatal(e)),
        }
    }

    /// Emit a close notification into the wire.
    pub(crate) fn shutdown_step(&mut self) -> Result<(), Error> {
        match self.stream.shutdown() {
            Ok(_) => Ok(()),
            Err(e) if would_block(&e) => Ok(()),
            Err(e) => Err(fatal(e)),
        }
    }

    pub(crate) fn peer_certificate(&self) -> Option<Certificate> {
        self.stream
            .ssl()
            .peer_certificate()
            .map(Certificate::from_native)
    }
}

fn would_block(e: &openssl::ssl::Error) -> bool {
    match e.code() {
        ErrorCode::WANT_READ | ErrorCode::WANT_WRITE => true,
        ErrorCode::SYSCALL => e
            .io_error()
            .map(|io| io.kind() == io::ErrorKind::WouldBlock)
            .unwrap_or(false),
        _ => false,
    }
}

fn fatal(e: openssl::ssl::Error) -> Error {
    let detail = e
        .ssl_error()
        .map(|stack| stack.to_string())
        .or_else(|| e.io_error().map(|io| io.to_string()));
    match detail {
        Some(detail) => Error::with_detail(ErrorKind::ConnectionAborted, detail),
        None => Error::new(ErrorKind::ConnectionAborted),
    }
}
