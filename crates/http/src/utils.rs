//! Utility macros and functions shared by the codec and client layers.

use rand::Rng;
use rand::distr::Alphanumeric;
use std::fmt::Write;

/// A macro for early returns with an error if a condition is not met.
///
/// This is similar to the `assert!` macro, but returns an error instead of panicking.
///
/// # Example
///
/// ```ignore
/// ensure!(head.len() <= MAX_HEADER_SIZE, ParseError::too_large_header(head.len(), MAX_HEADER_SIZE));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

/// Percent-encodes `src` the way `application/x-www-form-urlencoded` bodies expect:
/// space becomes `+`, `[A-Za-z0-9._~-]` pass through, everything else becomes `%XX`.
pub(crate) fn percent_encode(src: &str) -> String {
    let mut out = String::with_capacity(src.len() * 3);
    for b in src.bytes() {
        match b {
            b' ' => out.push('+'),
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'~' | b'-' => out.push(char::from(b)),
            _ => {
                // writing into a String never fails
                let _ = write!(out, "%{b:02X}");
            }
        }
    }
    out
}

/// Random alphanumeric token, used for multipart boundaries.
pub(crate) fn random_token(len: usize) -> String {
    rand::rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}
