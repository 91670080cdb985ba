//! Streaming hash and HMAC over the supported digest algorithms.
//!
//! Contexts are reusable: `finish` writes the digest and resets the state,
//! so one object can hash independent inputs back to back. Cloning
//! duplicates the in-progress context, allowing independent continuations.

use digest::{Digest, FixedOutputReset, KeyInit, Mac};

use crate::error::{Error, ErrorKind};

mod sealed {
    pub trait Sealed {}
}

/// A digest algorithm usable with [`Hash`] and [`Hmac`].
///
/// Implemented by the algorithm tags in this module; not implementable
/// outside the crate.
pub trait Algorithm: sealed::Sealed {
    /// Digest size in bytes.
    const DIGEST_SIZE: usize;

    #[doc(hidden)]
    type Hasher: Digest + FixedOutputReset + Clone;
    #[doc(hidden)]
    type Keyed: Mac + KeyInit + FixedOutputReset + Clone;
}

macro_rules! algorithm {
    ($(#[$doc:meta])* $name:ident, $hasher:ty, $size:expr) => {
        $(#[$doc])*
        #[derive(Debug)]
        pub enum $name {}

        impl sealed::Sealed for $name {}

        impl Algorithm for $name {
            const DIGEST_SIZE: usize = $size;
            type Hasher = $hasher;
            type Keyed = hmac::Hmac<$hasher>;
        }
    };
}

algorithm!(
    /// MD5 (16-byte digest). Kept for fingerprint compatibility only.
    Md5, md5::Md5, 16
);
algorithm!(
    /// SHA-1 (20-byte digest).
    Sha1, sha1::Sha1, 20
);
algorithm!(
    /// SHA-256 (32-byte digest).
    Sha256, sha2::Sha256, 32
);
algorithm!(
    /// SHA-384 (48-byte digest).
    Sha384, sha2::Sha384, 48
);
algorithm!(
    /// SHA-512 (64-byte digest).
    Sha512, sha2::Sha512, 64
);

/// Streaming hash context.
pub struct Hash<A: Algorithm> {
    ctx: A::Hasher,
}

impl<A: Algorithm> Clone for Hash<A> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<A: Algorithm> Hash<A> {
    pub fn new() -> Self {
        Self {
            ctx: A::Hasher::new(),
        }
    }

    pub const fn digest_size() -> usize {
        A::DIGEST_SIZE
    }

    pub fn update(&mut self, data: impl AsRef<[u8]>) {
        Digest::update(&mut self.ctx, data.as_ref());
    }

    /// Write the digest of everything fed so far and reset the context.
    ///
    /// Fails with `NoBufferSpace` when `out` is shorter than
    /// [`Algorithm::DIGEST_SIZE`]; the context is left untouched in that
    /// case.
    pub fn finish(&mut self, out: &mut [u8]) -> Result<(), Error> {
        if out.len() < A::DIGEST_SIZE {
            return Err(Error::new(ErrorKind::NoBufferSpace));
        }
        let digest = Digest::finalize_reset(&mut self.ctx);
        out[..A::DIGEST_SIZE].copy_from_slice(&digest);
        Ok(())
    }

    /// Like [`finish`](Self::finish), allocating the output.
    pub fn finish_vec(&mut self) -> Vec<u8> {
        Digest::finalize_reset(&mut self.ctx).to_vec()
    }

    /// Single-call form, equivalent to `new` + `update` + `finish`.
    pub fn one_shot(data: impl AsRef<[u8]>, out: &mut [u8]) -> Result<(), Error> {
        let mut hash = Self::new();
        hash.update(data);
        hash.finish(out)
    }

    pub fn one_shot_vec(data: impl AsRef<[u8]>) -> Vec<u8> {
        let mut hash = Self::new();
        hash.update(data);
        hash.finish_vec()
    }
}

impl<A: Algorithm> Default for Hash<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Streaming keyed-hash (HMAC) context.
///
/// Same lifecycle as [`Hash`]; the constructor consumes a key of any
/// length, the empty key included.
pub struct Hmac<A: Algorithm> {
    ctx: A::Keyed,
}

impl<A: Algorithm> Clone for Hmac<A> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<A: Algorithm> Hmac<A> {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            ctx: <A::Keyed as Mac>::new_from_slice(key.as_ref())
                .expect("HMAC accepts keys of any length"),
        }
    }

    pub const fn digest_size() -> usize {
        A::DIGEST_SIZE
    }

    pub fn update(&mut self, data: impl AsRef<[u8]>) {
        Mac::update(&mut self.ctx, data.as_ref());
    }

    /// Write the authentication tag and reset the context, keeping the key.
    pub fn finish(&mut self, out: &mut [u8]) -> Result<(), Error> {
        if out.len() < A::DIGEST_SIZE {
            return Err(Error::new(ErrorKind::NoBufferSpace));
        }
        let tag = Mac::finalize_reset(&mut self.ctx).into_bytes();
        out[..A::DIGEST_SIZE].copy_from_slice(&tag);
        Ok(())
    }

    pub fn finish_vec(&mut self) -> Vec<u8> {
        Mac::finalize_reset(&mut self.ctx).into_bytes().to_vec()
    }

    pub fn one_shot(
        key: impl AsRef<[u8]>,
        data: impl AsRef<[u8]>,
        out: &mut [u8],
    ) -> Result<(), Error> {
        let mut hmac = Self::new(key);
        hmac.update(data);
        hmac.finish(out)
    }

    pub fn one_shot_vec(key: impl AsRef<[u8]>, data: impl AsRef<[u8]>) -> Vec<u8> {
        let mut hmac = Self::new(key);
        hmac.update(data);
        hmac.finish_vec()
    }
}
