//! Channel factories and secure channels.
//!
//! A [`ChannelFactory`] holds validated credentials and policy; every
//! [`Channel`] it manufactures is an independent per-session state machine.
//! Channels never perform I/O: the three entry points are pure transforms
//! that consume bytes from the caller's input and produce bytes into the
//! caller's output, reporting `(consumed, produced)`.
//!
//! ```no_run
//! use rampart::{ChannelFactory, Transport};
//!
//! let factory = ChannelFactory::client(Transport::Stream)
//!     .peer_name("example.com")
//!     .build()?;
//! let mut channel = factory.make_channel()?;
//!
//! let mut out = [0u8; 4096];
//! // first flight: nothing received yet
//! let (_, produced) = channel.handshake(&[], &mut out)?;
//! // ... send out[..produced], feed replies back in, repeat until connected
//! # Ok::<(), rampart::Error>(())
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use openssl::ssl::{
    Ssl, SslContext, SslMethod, SslOptions, SslVerifyMode, SslVersion,
};
use tracing::{debug, trace};

use crate::certificate::{Certificate, Identity};
use crate::error::{Error, ErrorKind};
use crate::pipe::{self, Engine, ReadStep, Step};
use crate::view::{ByteView, ByteViewMut};

/// Which framing the session runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// TLS over a reliable, ordered byte stream.
    Stream,
    /// DTLS over a lossy, datagram-preserving transport.
    Datagram,
}

/// Which side of the handshake a factory produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Channel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Handshaking,
    Connected,
    /// The peer closed the session cleanly.
    Closed,
    /// A fatal error happened; the channel keeps reporting it.
    Failed(ErrorKind),
}

/// Record geometry negotiated for a connected channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSizes {
    pub header: usize,
    pub trailer: usize,
    pub max_message: usize,
}

type CheckFn = dyn Fn(&Certificate) -> bool + Send + Sync;

#[derive(Clone)]
enum Check {
    /// Delegate chain validation to the provider.
    Platform,
    /// Accept any peer without validation.
    Disabled,
    /// Provider validation off; the application inspects the peer's leaf.
    Manual(Arc<CheckFn>),
}

struct Shared {
    context: SslContext,
    role: Role,
    transport: Transport,
    check: Check,
    peer_name: Option<String>,
    mutual_auth: bool,
}

/// Configures and validates a [`ChannelFactory`].
pub struct ChannelFactoryBuilder {
    role: Role,
    transport: Transport,
    identity: Option<Identity>,
    mutual_auth: bool,
    peer_name: Option<String>,
    check: Check,
}

impl ChannelFactoryBuilder {
    fn new(role: Role, transport: Transport) -> Self {
        Self {
            role,
            transport,
            identity: None,
            mutual_auth: false,
            peer_name: None,
            check: Check::Platform,
        }
    }

    /// Certificate chain and private key presented to the peer.
    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Require the peer to present a certificate as well.
    pub fn mutual_auth(mut self, enabled: bool) -> Self {
        self.mutual_auth = enabled;
        self
    }

    /// Expected peer name: sent as SNI and, under platform validation,
    /// checked against the peer certificate's identities.
    pub fn peer_name(mut self, name: impl Into<String>) -> Self {
        self.peer_name = Some(name.into());
        self
    }

    /// Install an application check over the peer's leaf certificate.
    ///
    /// Disables the provider's own chain validation; the callback's verdict
    /// alone accepts or rejects the peer.
    pub fn certificate_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&Certificate) -> bool + Send + Sync + 'static,
    {
        self.check = Check::Manual(Arc::new(check));
        self
    }

    /// Accept any peer certificate without validation.
    pub fn no_certificate_check(mut self) -> Self {
        self.check = Check::Disabled;
        self
    }

    /// Acquire credentials from the provider.
    ///
    /// Failures here are provider errors; a built factory hands known-good
    /// credentials to every channel it produces.
    pub fn build(self) -> Result<ChannelFactory, Error> {
        let method = match self.transport {
            Transport::Stream => SslMethod::tls(),
            Transport::Datagram => SslMethod::dtls(),
        };
        let mut builder = SslContext::builder(method)?;

        match self.transport {
            Transport::Stream => {
                builder.set_min_proto_version(Some(SslVersion::TLS1_2))?;
                builder.set_max_proto_version(Some(SslVersion::TLS1_2))?;
            }
            Transport::Datagram => {
                // the wire is not a socket, so the engine cannot ask it for
                // an MTU; each session pins one instead
                builder.set_options(SslOptions::NO_QUERY_MTU);
            }
        }

        if let Some(identity) = &self.identity {
            builder.set_certificate(&identity.cert)?;
            builder.set_private_key(&identity.key)?;
            for link in &identity.chain {
                builder.add_extra_chain_cert(link.clone())?;
            }
            builder.check_private_key()?;
        }

        let mode = verify_mode(self.role, self.mutual_auth, &self.check);
        builder.set_verify(mode);
        if matches!(self.check, Check::Platform) && mode.contains(SslVerifyMode::PEER) {
            builder.set_default_verify_paths()?;
        }

        debug!(
            role = ?self.role,
            transport = ?self.transport,
            has_identity = self.identity.is_some(),
            mutual_auth = self.mutual_auth,
            "channel factory ready"
        );

        Ok(ChannelFactory {
            shared: Arc::new(Shared {
                context: builder.build(),
                role: self.role,
                transport: self.transport,
                check: self.check,
                peer_name: self.peer_name,
                mutual_auth: self.mutual_auth,
            }),
        })
    }
}

/// Holds credentials and policy; manufactures [`Channel`]s.
///
/// The credential block is immutable once built and shared read-only with
/// every channel, so channels stay usable after the factory handle is
/// dropped and independent channels may run on separate threads.
#[derive(Clone)]
pub struct ChannelFactory {
    shared: Arc<Shared>,
}

impl ChannelFactory {
    pub fn client(transport: Transport) -> ChannelFactoryBuilder {
        ChannelFactoryBuilder::new(Role::Client, transport)
    }

    pub fn server(transport: Transport) -> ChannelFactoryBuilder {
        ChannelFactoryBuilder::new(Role::Server, transport)
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn transport(&self) -> Transport {
        self.shared.transport
    }

    /// Produce a channel bound to this factory's credentials.
    pub fn make_channel(&self) -> Result<Channel, Error> {
        let shared = &self.shared;
        let mut ssl = Ssl::new(&shared.context)?;
        let rejected = Arc::new(AtomicBool::new(false));

        let mode = verify_mode(shared.role, shared.mutual_auth, &shared.check);
        match &shared.check {
            Check::Manual(check) if mode.contains(SslVerifyMode::PEER) => {
                let check = check.clone();
                let flag = rejected.clone();
                // the provider revisits depth 0 while overriding its own
                // verification result; the application check runs once and
                // the verdict is replayed
                let verdict = std::sync::atomic::AtomicU8::new(0);
                ssl.set_verify_callback(mode, move |_preverified, store| {
                    // the application sees the leaf only; intermediate
                    // entries pass through to keep the walk going
                    if store.error_depth() != 0 {
                        return true;
                    }
                    match verdict.load(Ordering::SeqCst) {
                        1 => return true,
                        2 => return false,
                        _ => {}
                    }
                    let Some(cert) = store.current_cert() else {
                        return false;
                    };
                    let accepted = check(&Certificate::from_native(cert.to_owned()));
                    verdict.store(if accepted { 1 } else { 2 }, Ordering::SeqCst);
                    if !accepted {
                        flag.store(true, Ordering::SeqCst);
                    }
                    accepted
                });
            }
            Check::Disabled if mode.contains(SslVerifyMode::PEER) => {
                // mutual auth without validation: require a certificate but
                // accept whatever the peer presents
                ssl.set_verify_callback(mode, |_, _| true);
            }
            _ => {}
        }

        if shared.role == Role::Client {
            if let Some(name) = &shared.peer_name {
                ssl.set_hostname(name)?;
                if matches!(shared.check, Check::Platform) {
                    ssl.param_mut().set_host(name)?;
                }
            }
        }

        if shared.transport == Transport::Datagram {
            ssl.set_mtu(1400)?;
        }

        let engine = Engine::new(ssl, shared.transport, shared.role == Role::Server)?;
        Ok(Channel {
            shared: self.shared.clone(),
            engine,
            state: State::Handshaking,
            saved: None,
            rejected,
            plain: std::collections::VecDeque::new(),
            sizes: None,
            negotiated: false,
        })
    }
}

impl fmt::Debug for ChannelFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelFactory")
            .field("role", &self.shared.role)
            .field("transport", &self.shared.transport)
            .finish_non_exhaustive()
    }
}

fn verify_mode(role: Role, mutual_auth: bool, check: &Check) -> SslVerifyMode {
    let wants_peer = match role {
        Role::Client => !matches!(check, Check::Disabled),
        Role::Server => mutual_auth,
    };
    if !wants_peer {
        SslVerifyMode::NONE
    } else if role == Role::Server {
        SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT
    } else {
        SslVerifyMode::PEER
    }
}

/// One secure session: a byte-transform state machine.
///
/// Single-threaded by construction; a channel is `Send` but its entry
/// points must not be invoked concurrently.
pub struct Channel {
    shared: Arc<Shared>,
    engine: Engine,
    state: State,
    saved: Option<Error>,
    rejected: Arc<AtomicBool>,
    plain: std::collections::VecDeque<u8>,
    sizes: Option<RecordSizes>,
    /// The engine finished negotiating, but the final flight may still be
    /// queued for the caller.
    negotiated: bool,
}

impl Channel {
    /// Drive the handshake with whatever ciphertext has arrived.
    ///
    /// Feeds `input` to the engine and collects the next outbound flight
    /// into `output`. Returns `(consumed, produced)`; needing more input is
    /// a success with nothing produced. Trailing bytes the engine did not
    /// need (application data coalesced behind the final flight) are kept
    /// in the channel's residue for the next [`decrypt`](Self::decrypt)
    /// call; accepted bytes must never be fed again.
    pub fn handshake(&mut self, input: &[u8], output: &mut [u8]) -> Result<(usize, usize), Error> {
        match self.state {
            State::Failed(_) => return Err(self.saved_error()),
            State::Connected | State::Closed => {
                return Err(Error::new(ErrorKind::AlreadyConnected))
            }
            State::Handshaking => {}
        }

        let consumed = self.engine.wire_mut().accept(ByteView::new(input));
        if !self.negotiated {
            match self.engine.handshake_step() {
                Ok(Step::Done) => {
                    self.negotiated = true;
                    trace!(role = ?self.shared.role, "handshake complete");
                }
                Ok(Step::NeedMore) => {
                    trace!(role = ?self.shared.role, consumed, "handshake needs more input");
                }
                Err(e) => return Err(self.fail(e)),
            }
        }

        let produced = self.engine.wire_mut().take_output(output);
        if self.engine.wire().has_output() && self.shared.transport == Transport::Datagram {
            // a datagram flight must not be split across calls
            return Err(Error::new(ErrorKind::NoBufferSpace));
        }
        if self.negotiated && !self.engine.wire().has_output() {
            self.connect();
        }
        Ok((consumed, produced))
    }

    /// Frame plaintext into encrypted records.
    ///
    /// On stream transports the output is a concatenation of records;
    /// anything that does not fit into `output` stays queued and is
    /// returned by a later call (an empty `input` just drains). On datagram
    /// transports every call yields exactly one record and an output too
    /// small for it is rejected up front with `NoBufferSpace`.
    pub fn encrypt(&mut self, input: &[u8], output: &mut [u8]) -> Result<(usize, usize), Error> {
        match self.state {
            State::Failed(_) => return Err(self.saved_error()),
            State::Handshaking => return Err(Error::new(ErrorKind::NotConnected)),
            State::Connected | State::Closed => {}
        }
        let Some(sizes) = self.sizes else {
            return Err(Error::new(ErrorKind::NotConnected));
        };
        let payload_limit = sizes.max_message - sizes.header - sizes.trailer;

        if self.shared.transport == Transport::Datagram {
            if input.len() > payload_limit {
                return Err(Error::new(ErrorKind::MessageSize));
            }
            if output.len() < sizes.header + input.len() + sizes.trailer {
                return Err(Error::new(ErrorKind::NoBufferSpace));
            }
        }

        let mut consumed = 0;
        while consumed < input.len() {
            let chunk = (input.len() - consumed).min(payload_limit);
            match self.engine.write_step(&input[consumed..consumed + chunk]) {
                Ok(n) => consumed += n,
                Err(e) => return Err(self.fail(e)),
            }
        }

        let produced = self.engine.wire_mut().take_output(output);
        if produced == 0 && self.engine.wire().has_output() {
            return Err(Error::new(ErrorKind::NoBufferSpace));
        }
        Ok((consumed, produced))
    }

    /// Decrypt zero or more records from `input` into `output`.
    ///
    /// Partial records are buffered internally; `consumed` covers them, so
    /// the caller must not re-feed those bytes. Plaintext the engine holds
    /// beyond what `output` fits is retained and served by later calls
    /// (`input` may then be empty). A clean close by the peer yields
    /// `(consumed, 0)` once; after that only plaintext already decrypted
    /// can still be drained with empty input, and any further ciphertext is
    /// refused with `OrderlyShutdown` instead of being absorbed.
    pub fn decrypt(&mut self, input: &[u8], output: &mut [u8]) -> Result<(usize, usize), Error> {
        match self.state {
            State::Failed(_) => return Err(self.saved_error()),
            State::Handshaking => return Err(Error::new(ErrorKind::NotConnected)),
            State::Connected => {}
            State::Closed => {
                if !input.is_empty() || self.plain.is_empty() {
                    return Err(Error::new(ErrorKind::OrderlyShutdown));
                }
            }
        }

        if output.is_empty() {
            // nothing can be delivered; refuse before absorbing any input
            if input.is_empty() && self.plain.is_empty() {
                return Ok((0, 0));
            }
            return Err(Error::new(ErrorKind::NoBufferSpace));
        }

        let consumed = self.engine.wire_mut().accept(ByteView::new(input));
        let mut produced = self.serve_residue(output);
        let mut closed = false;

        if self.state == State::Connected {
            match self.shared.transport {
                Transport::Stream => loop {
                    if produced == output.len() {
                        closed = self.buffer_excess()?;
                        break;
                    }
                    match self.engine.read_step(&mut output[produced..]) {
                        Ok(ReadStep::Data(n)) => produced += n,
                        Ok(ReadStep::NeedMore) => break,
                        Ok(ReadStep::Closed) => {
                            closed = true;
                            break;
                        }
                        Err(e) => return Err(self.fail(e)),
                    }
                },
                Transport::Datagram => {
                    // the engine discards whatever part of a record does not
                    // fit the read buffer, so records are always pulled
                    // whole into the residue and served from there
                    closed = self.buffer_excess()?;
                    produced += self.serve_residue(&mut output[produced..]);
                }
            }
        }

        if closed {
            trace!(role = ?self.shared.role, "peer closed");
            self.state = State::Closed;
        }
        Ok((consumed, produced))
    }

    /// Emit a close notification for the peer and close this side.
    pub fn shutdown(&mut self, output: &mut [u8]) -> Result<usize, Error> {
        match self.state {
            State::Failed(_) => return Err(self.saved_error()),
            State::Handshaking => return Err(Error::new(ErrorKind::NotConnected)),
            State::Connected | State::Closed => {}
        }
        if let Err(e) = self.engine.shutdown_step() {
            return Err(self.fail(e));
        }
        let produced = self.engine.wire_mut().take_output(output);
        self.state = State::Closed;
        Ok(produced)
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == State::Connected
    }

    /// Decrypted bytes waiting for an `output` buffer.
    pub fn has_pending_plaintext(&self) -> bool {
        !self.plain.is_empty()
    }

    /// Record geometry, once connected.
    pub fn record_sizes(&self) -> Option<RecordSizes> {
        self.sizes
    }

    /// Record header size; 0 until connected.
    pub fn header_size(&self) -> usize {
        self.sizes.map(|s| s.header).unwrap_or(0)
    }

    /// Record trailer size; 0 until connected.
    pub fn trailer_size(&self) -> usize {
        self.sizes.map(|s| s.trailer).unwrap_or(0)
    }

    /// Largest plaintext per record; 0 until connected.
    pub fn max_message_size(&self) -> usize {
        self.sizes.map(|s| s.max_message).unwrap_or(0)
    }

    /// The peer's leaf certificate, once the handshake presented one.
    pub fn peer_certificate(&self) -> Option<Certificate> {
        self.engine.peer_certificate()
    }

    fn connect(&mut self) {
        self.sizes = Some(RecordSizes {
            header: match self.shared.transport {
                Transport::Stream => pipe::STREAM_HEADER,
                Transport::Datagram => pipe::DATAGRAM_HEADER,
            },
            trailer: pipe::RECORD_TRAILER,
            max_message: pipe::MAX_MESSAGE,
        });
        self.state = State::Connected;
        debug!(role = ?self.shared.role, transport = ?self.shared.transport, "connected");
    }

    /// Pull plaintext the engine already decrypted into the channel residue
    /// so a full output buffer never strands data inside the provider.
    fn buffer_excess(&mut self) -> Result<bool, Error> {
        let mut scratch = [0u8; 4096];
        while self.plain.len() < pipe::MAX_MESSAGE {
            match self.engine.read_step(&mut scratch) {
                Ok(ReadStep::Data(n)) => self.plain.extend(&scratch[..n]),
                Ok(ReadStep::NeedMore) => break,
                Ok(ReadStep::Closed) => return Ok(true),
                Err(e) => return Err(self.fail(e)),
            }
        }
        Ok(false)
    }

    fn serve_residue(&mut self, output: &mut [u8]) -> usize {
        let mut sink = ByteViewMut::new(output);
        let (front, back) = self.plain.as_slices();
        sink.put(front);
        sink.put(back);
        let n = sink.filled();
        self.plain.drain(..n);
        n
    }

    fn fail(&mut self, e: Error) -> Error {
        let e = if self.rejected.load(Ordering::SeqCst)
            && matches!(e.kind(), ErrorKind::ConnectionAborted | ErrorKind::Platform)
        {
            Error::new(ErrorKind::PermissionDenied)
        } else {
            e
        };
        debug!(role = ?self.shared.role, error = %e, "channel failed");
        self.state = State::Failed(e.kind());
        self.saved = Some(e.clone());
        e
    }

    fn saved_error(&self) -> Error {
        self.saved
            .clone()
            .unwrap_or_else(|| Error::new(ErrorKind::ConnectionAborted))
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("role", &self.shared.role)
            .field("transport", &self.shared.transport)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
