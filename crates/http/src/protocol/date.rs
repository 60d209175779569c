//! Cached `Date` header value.
//!
//! Formatting an HTTP date on every response is wasteful, so the formatted value is kept
//! in an [`ArcSwap`] and only regenerated once it is older than [`REFRESH_INTERVAL`].

use arc_swap::ArcSwap;
use bytes::Bytes;
use http::HeaderValue;
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::{Duration, Instant};

const REFRESH_INTERVAL: Duration = Duration::from_millis(500);

struct CachedDate {
    created: Instant,
    value: HeaderValue,
}

static CURRENT: Lazy<ArcSwap<CachedDate>> = Lazy::new(|| ArcSwap::from_pointee(CachedDate::now()));

impl CachedDate {
    fn now() -> Self {
        let mut buf = faf_http_date::get_date_buff_no_key();
        faf_http_date::get_date_no_key(&mut buf);
        let value = HeaderValue::from_maybe_shared(Bytes::copy_from_slice(&buf))
            .unwrap_or_else(|_| HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 GMT"));
        Self { created: Instant::now(), value }
    }
}

/// Current time formatted for the `Date` header.
pub fn http_date() -> HeaderValue {
    let current = CURRENT.load();
    if current.created.elapsed() < REFRESH_INTERVAL {
        return current.value.clone();
    }

    let fresh = Arc::new(CachedDate::now());
    let value = fresh.value.clone();
    CURRENT.store(fresh);
    value
}
