//! X.509 certificate handle and channel credentials.
//!
//! [`Certificate`] wraps the provider's reference-counted certificate
//! object: cloning retains, dropping releases, the bytes are never deep
//! copied. The default value is the null handle, which answers every query
//! with [`ErrorKind::BadAddress`].

use chrono::{DateTime, Duration, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509, X509VerifyResult};

use crate::error::{Error, ErrorKind};
use crate::hash::{Algorithm, Hash};
use crate::{oid, pem};

/// Subject/issuer alternative name kinds surfaced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AltName {
    Dns,
    Ip,
    Uri,
    Email,
}

/// Ordered distinguished-name entries: `(dotted OID, UTF-8 value)`.
pub type DistinguishedName = Vec<(String, String)>;

/// Shared-ownership X.509 certificate handle.
#[derive(Clone, Default)]
pub struct Certificate {
    handle: Option<X509>,
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            f.write_str("Certificate(null)")
        } else {
            f.debug_struct("Certificate")
                .field("serial_number", &self.serial_number().ok())
                .finish_non_exhaustive()
        }
    }
}

impl Certificate {
    pub(crate) fn from_native(handle: X509) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    fn native(&self) -> Result<&X509, Error> {
        self.handle
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::BadAddress))
    }

    /// True for the default, credential-less handle.
    pub fn is_null(&self) -> bool {
        self.handle.is_none()
    }

    /// Parse a DER-encoded certificate.
    pub fn from_der(data: impl AsRef<[u8]>) -> Result<Self, Error> {
        let data = data.as_ref();
        if data.is_empty() {
            return Err(Error::new(ErrorKind::InvalidArgument));
        }
        let handle = X509::from_der(data)
            .map_err(|_| Error::new(ErrorKind::IllegalByteSequence))?;
        Ok(Self::from_native(handle))
    }

    /// Parse a PEM certificate.
    ///
    /// Armor is optional: leading text before `-----BEGIN` is skipped and a
    /// missing `-----END` line is tolerated. The base64 body must decode
    /// into the fixed 8 KiB import buffer.
    pub fn from_pem(text: impl AsRef<str>) -> Result<Self, Error> {
        let mut der = [0u8; pem::DECODE_BUFFER];
        let n = pem::decode(text.as_ref(), &mut der)?;
        Self::from_der(&der[..n])
    }

    /// Copy out the DER encoding.
    pub fn to_der(&self) -> Result<Vec<u8>, Error> {
        Ok(self.native()?.to_der()?)
    }

    /// Certificate version, 1 through 3; 0 for the null handle.
    pub fn version(&self) -> i32 {
        match &self.handle {
            Some(x) => x.version(),
            None => 0,
        }
    }

    pub fn not_before(&self) -> Result<DateTime<Utc>, Error> {
        asn1_to_utc(self.native()?.not_before())
    }

    pub fn not_after(&self) -> Result<DateTime<Utc>, Error> {
        asn1_to_utc(self.native()?.not_after())
    }

    /// True when `at` falls inside the validity window with `margin` to
    /// spare before expiry.
    pub fn not_expired(&self, at: DateTime<Utc>, margin: Duration) -> Result<bool, Error> {
        Ok(self.not_before()? <= at && at + margin <= self.not_after()?)
    }

    /// Serial number as big-endian bytes, leading zeros stripped.
    pub fn serial_number(&self) -> Result<Vec<u8>, Error> {
        let bn = self.native()?.serial_number().to_bn()?;
        Ok(bn.to_vec())
    }

    /// Authority key identifier bytes; empty when the extension is absent.
    pub fn authority_key_identifier(&self) -> Result<Vec<u8>, Error> {
        Ok(self
            .native()?
            .authority_key_id()
            .map(|id| id.as_slice().to_vec())
            .unwrap_or_default())
    }

    /// Subject key identifier bytes; empty when the extension is absent.
    pub fn subject_key_identifier(&self) -> Result<Vec<u8>, Error> {
        Ok(self
            .native()?
            .subject_key_id()
            .map(|id| id.as_slice().to_vec())
            .unwrap_or_default())
    }

    /// Issuer distinguished name in certificate order.
    pub fn issuer(&self) -> Result<DistinguishedName, Error> {
        distinguished_name(self.native()?.issuer_name(), None)
    }

    /// Issuer entries whose attribute type matches `filter_oid`.
    ///
    /// An OID this certificate does not carry, or one that is not a DN
    /// attribute at all, yields an empty list rather than an error.
    pub fn issuer_filtered(&self, filter_oid: &str) -> Result<DistinguishedName, Error> {
        distinguished_name(self.native()?.issuer_name(), Some(filter_oid))
    }

    /// Subject distinguished name in certificate order.
    pub fn subject(&self) -> Result<DistinguishedName, Error> {
        distinguished_name(self.native()?.subject_name(), None)
    }

    /// Subject entries whose attribute type matches `filter_oid`.
    pub fn subject_filtered(&self, filter_oid: &str) -> Result<DistinguishedName, Error> {
        distinguished_name(self.native()?.subject_name(), Some(filter_oid))
    }

    /// Issuer alternative names; empty when the extension is absent.
    pub fn issuer_alt_names(&self) -> Result<Vec<(AltName, String)>, Error> {
        Ok(collect_alt_names(self.native()?.issuer_alt_names()))
    }

    /// Subject alternative names; empty when the extension is absent.
    ///
    /// IP entries are rendered as text: dotted quad for IPv4, RFC 5952
    /// canonical form for IPv6.
    pub fn subject_alt_names(&self) -> Result<Vec<(AltName, String)>, Error> {
        Ok(collect_alt_names(self.native()?.subject_alt_names()))
    }

    /// True when `issuer` is the certificate that issued this one: the
    /// provider compares the normalized issuer/subject name sequences and
    /// the key-identifier linkage.
    pub fn issued_by(&self, issuer: &Certificate) -> Result<bool, Error> {
        let subject = self.native()?;
        let issuer = issuer.native()?;
        Ok(issuer.issued(subject) == X509VerifyResult::OK)
    }

    pub fn is_self_signed(&self) -> Result<bool, Error> {
        self.issued_by(self)
    }

    /// Digest of the DER encoding.
    pub fn digest<A: Algorithm>(&self) -> Result<Vec<u8>, Error> {
        Ok(Hash::<A>::one_shot_vec(self.to_der()?))
    }

    /// SubjectPublicKeyInfo DER of the certified key.
    pub fn public_key_der(&self) -> Result<Vec<u8>, Error> {
        Ok(self.native()?.public_key()?.public_key_to_der()?)
    }

    pub(crate) fn as_native(&self) -> Option<&X509> {
        self.handle.as_ref()
    }
}

/// Equality is equality of the DER encodings; two null handles are equal.
impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        match (&self.handle, &other.handle) {
            (None, None) => true,
            (Some(a), Some(b)) => match (a.to_der(), b.to_der()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            },
            _ => false,
        }
    }
}

impl Eq for Certificate {}

fn asn1_to_utc(at: &Asn1TimeRef) -> Result<DateTime<Utc>, Error> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(at)?;
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| Error::new(ErrorKind::IllegalByteSequence))
}

fn distinguished_name(
    name: &openssl::x509::X509NameRef,
    filter_oid: Option<&str>,
) -> Result<DistinguishedName, Error> {
    let mut result = Vec::new();
    for entry in name.entries() {
        let entry_oid = match oid::from_nid(entry.object().nid()) {
            Some(known) => known.to_owned(),
            None => entry.object().to_string(),
        };
        if let Some(filter) = filter_oid {
            if entry_oid != filter {
                continue;
            }
        }
        let value = entry.data().as_utf8()?.to_string();
        result.push((entry_oid, value));
    }
    Ok(result)
}

fn collect_alt_names(
    names: Option<openssl::stack::Stack<openssl::x509::GeneralName>>,
) -> Vec<(AltName, String)> {
    let mut result = Vec::new();
    let Some(names) = names else {
        return result;
    };
    for name in &names {
        if let Some(dns) = name.dnsname() {
            result.push((AltName::Dns, dns.to_owned()));
        } else if let Some(email) = name.email() {
            result.push((AltName::Email, email.to_owned()));
        } else if let Some(uri) = name.uri() {
            result.push((AltName::Uri, uri.to_owned()));
        } else if let Some(ip) = name.ipaddress() {
            if let Some(text) = ip_to_text(ip) {
                result.push((AltName::Ip, text));
            }
        }
    }
    result
}

/// RFC 5952 text for the 4- or 16-byte address encodings; other lengths are
/// not valid iPAddress entries and are skipped.
fn ip_to_text(raw: &[u8]) -> Option<String> {
    match raw.len() {
        4 => {
            let octets: [u8; 4] = raw.try_into().ok()?;
            Some(std::net::Ipv4Addr::from(octets).to_string())
        }
        16 => {
            let octets: [u8; 16] = raw.try_into().ok()?;
            Some(std::net::Ipv6Addr::from(octets).to_string())
        }
        _ => None,
    }
}

/// A certificate chain with its private key: the credential material a
/// server (or a mutually-authenticating client) binds into a factory.
#[derive(Clone)]
pub struct Identity {
    pub(crate) cert: X509,
    pub(crate) chain: Vec<X509>,
    pub(crate) key: PKey<Private>,
}

impl Identity {
    /// Import from a PKCS#12 archive.
    pub fn from_pkcs12(der: impl AsRef<[u8]>, passphrase: &str) -> Result<Self, Error> {
        let parsed = Pkcs12::from_der(der.as_ref())
            .map_err(|_| Error::new(ErrorKind::IllegalByteSequence))?
            .parse2(passphrase)?;
        let cert = parsed
            .cert
            .ok_or_else(|| Error::new(ErrorKind::InvalidArgument))?;
        let key = parsed
            .pkey
            .ok_or_else(|| Error::new(ErrorKind::InvalidArgument))?;
        let chain = parsed
            .ca
            .map(|stack| stack.iter().map(|c| c.to_owned()).collect())
            .unwrap_or_default();
        Ok(Self { cert, chain, key })
    }

    /// Import from a PEM certificate chain (leaf first) and a PEM PKCS#8
    /// private key.
    pub fn from_pkcs8(cert_pem: impl AsRef<[u8]>, key_pem: impl AsRef<[u8]>) -> Result<Self, Error> {
        let mut chain = X509::stack_from_pem(cert_pem.as_ref())
            .map_err(|_| Error::new(ErrorKind::IllegalByteSequence))?;
        if chain.is_empty() {
            return Err(Error::new(ErrorKind::InvalidArgument));
        }
        let cert = chain.remove(0);
        let key = PKey::private_key_from_pem(key_pem.as_ref())
            .map_err(|_| Error::new(ErrorKind::IllegalByteSequence))?;
        Ok(Self { cert, chain, key })
    }

    /// Construct from already-parsed parts.
    pub fn from_parts(
        cert: Certificate,
        chain: &[Certificate],
        key_pem: impl AsRef<[u8]>,
    ) -> Result<Self, Error> {
        let cert = cert
            .as_native()
            .ok_or_else(|| Error::new(ErrorKind::BadAddress))?
            .clone();
        let chain = chain
            .iter()
            .map(|c| {
                c.as_native()
                    .cloned()
                    .ok_or_else(|| Error::new(ErrorKind::BadAddress))
            })
            .collect::<Result<_, _>>()?;
        let key = PKey::private_key_from_pem(key_pem.as_ref())
            .map_err(|_| Error::new(ErrorKind::IllegalByteSequence))?;
        Ok(Self { cert, chain, key })
    }

    /// The leaf certificate of this identity.
    pub fn certificate(&self) -> Certificate {
        Certificate::from_native(self.cert.clone())
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("chain_len", &(self.chain.len() + 1))
            .finish_non_exhaustive()
    }
}
