//! PEM import plumbing: armor stripping and bounded base64 decode.
//!
//! Accepted input is lenient: text before the `-----BEGIN` line is ignored,
//! the `-----END` line may be missing, and armor may be absent entirely (the
//! whole input is then taken as the base64 body). The decode buffer is fixed
//! at 8 KiB; larger bodies are rejected rather than allocated for.

use base64::engine::general_purpose::STANDARD;
use base64::{DecodeSliceError, Engine as _};

use crate::error::{Error, ErrorKind};

/// Fixed decode buffer size. One X.509 certificate comfortably fits.
pub(crate) const DECODE_BUFFER: usize = 8 * 1024;

const BEGIN: &str = "-----BEGIN";
const END: &str = "-----END";

/// Strip PEM armor, returning the base64 body with line breaks removed.
fn unwrap_armor(text: &str) -> String {
    let Some(begin) = text.find(BEGIN) else {
        // not armored at all
        return text.to_owned();
    };

    let mut body = String::new();
    let after_begin = match text[begin..].find('\n') {
        Some(eol) => &text[begin + eol + 1..],
        None => "",
    };
    for line in after_begin.lines() {
        if line.starts_with(END) {
            break;
        }
        body.push_str(line.trim_end_matches('\r'));
    }
    body
}

/// Decode a PEM body into `buf`, returning the decoded length.
///
/// Errors: `MessageSize` for a base64 length that cannot be valid,
/// `IllegalByteSequence` for invalid symbols, `NoBufferSpace` when the
/// decoded body would not fit.
pub(crate) fn decode(text: &str, buf: &mut [u8]) -> Result<usize, Error> {
    let body = unwrap_armor(text);
    match STANDARD.decode_slice(body.as_bytes(), buf) {
        Ok(n) => Ok(n),
        Err(DecodeSliceError::OutputSliceTooSmall) => Err(Error::new(ErrorKind::NoBufferSpace)),
        Err(DecodeSliceError::DecodeError(e)) => {
            use base64::DecodeError::*;
            match e {
                InvalidLength(_) | InvalidPadding => Err(Error::new(ErrorKind::MessageSize)),
                InvalidByte(..) | InvalidLastSymbol(..) => {
                    Err(Error::new(ErrorKind::IllegalByteSequence))
                }
            }
        }
    }
}
