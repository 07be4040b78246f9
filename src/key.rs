//! Record key extraction.

use crate::sort::SortError;

/// Extracts the integer key of a record line.
///
/// The key is the longest leading signed decimal integer: an optional `-`
/// followed by at least one digit. Everything after the digits is opaque
/// payload and is ignored. Lines without a single leading digit fail with
/// [`SortError::MalformedRecord`], as do keys that overflow `i64`.
pub fn key_of(line: &str) -> Result<i64, SortError> {
    let bytes = line.as_bytes();
    let mut pos = 0;

    let negative = bytes.first() == Some(&b'-');
    if negative {
        pos += 1;
    }

    // The magnitude accumulates in a wider type so the asymmetric i64 range
    // narrows cleanly at the end (i64::MIN has no positive counterpart).
    let mut magnitude: i128 = 0;
    let mut any_digit = false;
    while let Some(&byte) = bytes.get(pos) {
        if !byte.is_ascii_digit() {
            break;
        }
        any_digit = true;
        magnitude = magnitude
            .checked_mul(10)
            .and_then(|magnitude| magnitude.checked_add((byte - b'0') as i128))
            .ok_or_else(|| SortError::MalformedRecord(line.to_string()))?;
        pos += 1;
    }

    if !any_digit {
        return Err(SortError::MalformedRecord(line.to_string()));
    }

    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value).map_err(|_| SortError::MalformedRecord(line.to_string()))
}
