//! Client configuration and the process-wide default.

use crate::codec::MAX_BODY_SIZE;
use crate::connection::{VerifyFn, client_tls_config};
use crate::protocol::ConnError;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, header};
use once_cell::sync::{Lazy, OnceCell};
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::net::IpAddr;
use std::sync::Arc;

const USER_AGENT: &str = concat!("micro-wire/", env!("CARGO_PKG_VERSION"));

static GLOBAL: Lazy<ArcSwap<ClientConfig>> = Lazy::new(|| ArcSwap::from_pointee(ClientConfig::default()));

/// Hook that replaces DNS resolution for outbound connections.
///
/// Returning `None` falls back to the system resolver.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, host: &str) -> Option<IpAddr>;
}

#[derive(Clone)]
pub struct ClientConfig {
    no_delay: bool,
    verify: Option<Arc<VerifyFn>>,
    default_headers: HeaderMap,
    resolver: Option<Arc<dyn Resolve>>,
    max_body_size: usize,
    tls: Arc<OnceCell<Arc<rustls::ClientConfig>>>,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder { config: Self::default() }
    }

    /// The configuration used by the free request functions and by sessions created
    /// without an explicit one.
    pub fn global() -> Arc<Self> {
        GLOBAL.load_full()
    }

    pub fn set_global(config: Self) {
        GLOBAL.store(Arc::new(config));
    }

    pub fn no_delay(&self) -> bool {
        self.no_delay
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    pub fn resolver(&self) -> Option<&Arc<dyn Resolve>> {
        self.resolver.as_ref()
    }

    /// Largest response body accepted, measured after gzip decoding.
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Built on first use and shared by every connection made with this configuration.
    pub(crate) fn tls_config(&self) -> Result<Arc<rustls::ClientConfig>, ConnError> {
        self.tls.get_or_try_init(|| client_tls_config(self.verify.clone())).map(Arc::clone)
    }

    /// Copies the default headers the request does not set itself.
    pub fn apply_default_headers(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.default_headers {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        default_headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        default_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        default_headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        default_headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));

        Self {
            no_delay: true,
            verify: None,
            default_headers,
            resolver: None,
            max_body_size: MAX_BODY_SIZE,
            tls: Arc::new(OnceCell::new()),
        }
    }
}

impl Debug for ClientConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("no_delay", &self.no_delay)
            .field("verify", &self.verify.is_some())
            .field("default_headers", &self.default_headers)
            .field("resolver", &self.resolver.is_some())
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    #[must_use]
    pub fn no_delay(mut self, no_delay: bool) -> Self {
        self.config.no_delay = no_delay;
        self
    }

    /// Installs a TLS peer verification predicate: `(preverified, end_entity) -> accept`.
    #[must_use]
    pub fn verify<F>(mut self, verify: F) -> Self
    where
        F: Fn(bool, &rustls::pki_types::CertificateDer<'_>) -> bool + Send + Sync + 'static,
    {
        self.config.verify = Some(Arc::new(verify));
        self
    }

    /// Sets a default header; an empty value removes it from the defaults.
    #[must_use]
    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        if value.is_empty() {
            self.config.default_headers.remove(name);
        } else {
            self.config.default_headers.insert(name, value);
        }
        self
    }

    #[must_use]
    pub fn resolver<R: Resolve + 'static>(mut self, resolver: R) -> Self {
        self.config.resolver = Some(Arc::new(resolver));
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, max_body_size: usize) -> Self {
        self.config.max_body_size = max_body_size;
        self
    }

    pub fn build(self) -> ClientConfig {
        ClientConfig { tls: Arc::new(OnceCell::new()), ..self.config }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl Resolve for Fixed {
        async fn resolve(&self, host: &str) -> Option<IpAddr> {
            (host == "fixed.test").then_some(IpAddr::from([127, 0, 0, 1]))
        }
    }

    #[test]
    fn test_default_headers() {
        let config = ClientConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        config.apply_default_headers(&mut headers);

        assert_eq!(headers[header::ACCEPT], "text/html");
        assert_eq!(headers[header::ACCEPT_ENCODING], "gzip");
        assert_eq!(headers[header::CONNECTION], "keep-alive");
        assert!(headers[header::USER_AGENT].to_str().unwrap().starts_with("micro-wire/"));
    }

    #[tokio::test]
    async fn test_builder() {
        let config = ClientConfig::builder()
            .no_delay(false)
            .default_header(header::CACHE_CONTROL, HeaderValue::from_static(""))
            .default_header(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en"))
            .resolver(Fixed)
            .max_body_size(1024)
            .build();

        assert!(!config.no_delay());
        assert_eq!(config.max_body_size(), 1024);
        assert!(!config.default_headers().contains_key(header::CACHE_CONTROL));
        assert_eq!(config.default_headers()[header::ACCEPT_LANGUAGE], "en");

        let resolver = config.resolver().unwrap();
        assert_eq!(resolver.resolve("fixed.test").await, Some(IpAddr::from([127, 0, 0, 1])));
        assert_eq!(resolver.resolve("other.test").await, None);
    }

    #[test]
    fn test_tls_config_is_cached() {
        let config = ClientConfig::builder().verify(|_, _| true).build();
        let first = config.tls_config().unwrap();
        let second = config.clone().tls_config().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
