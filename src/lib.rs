//! # Rampart
//!
//! Transport-agnostic TLS/DTLS secure channels over the platform crypto
//! provider.
//!
//! A channel is a pure byte transform: the application shuttles ciphertext
//! between its sockets and the channel's `handshake`/`encrypt`/`decrypt`
//! entry points, each of which reports how much input it consumed and how
//! much output it produced. No entry point blocks or performs I/O, so
//! channels drop into any event loop, test harness or exotic transport.
//!
//! ## Quick start
//!
//! ```no_run
//! use rampart::{ChannelFactory, Transport};
//!
//! let factory = ChannelFactory::client(Transport::Stream)
//!     .peer_name("example.com")
//!     .build()?;
//! let mut channel = factory.make_channel()?;
//!
//! let mut wire = [0u8; 4096];
//! let (_, n) = channel.handshake(&[], &mut wire)?;
//! // send wire[..n] to the peer, feed its reply into handshake again,
//! // repeat until channel.is_connected()
//! # Ok::<(), rampart::Error>(())
//! ```
//!
//! ## What's here
//!
//! - **Channels**: TLS 1.2 / DTLS 1.2 sessions driven by the provider
//!   engine, with the wire behavior the provider produces
//! - **Certificates**: shared-ownership X.509 handles for parsing,
//!   inspection, fingerprints and chain checks
//! - **Digests**: streaming and one-shot hash/HMAC (MD5, SHA-1, SHA-2)
//!
//! ## What's NOT provided
//!
//! - Socket management or an async runtime
//! - A trust store of its own (validation is the provider's, unless the
//!   application installs a manual check)
//! - Protocol extensions beyond what the provider negotiates

#![deny(unsafe_code)]
#![doc(html_root_url = "https://docs.rs/rampart/0.1.0")]

// ---------------------------------------------------------------------------
// Internal modules
// ---------------------------------------------------------------------------

mod channel;
mod certificate;
mod error;
mod hash;
mod pem;
mod pipe;
mod view;

/// Distinguished-name attribute OIDs.
pub mod oid;

// ---------------------------------------------------------------------------
// Public interface
// ---------------------------------------------------------------------------

pub use channel::{
    Channel,
    ChannelFactory,
    ChannelFactoryBuilder,
    RecordSizes,
    Role,
    State,
    Transport,
};
pub use certificate::{AltName, Certificate, DistinguishedName, Identity};
pub use error::{Error, ErrorKind};
pub use hash::{Algorithm, Hash, Hmac, Md5, Sha1, Sha256, Sha384, Sha512};
pub use view::{ByteView, ByteViewMut};
