//! A reusable client binding that keeps one connection alive between requests.
//!
//! Requests are written under the session's send lock, which is released before the
//! response is awaited. Responses are read by a task owned by the connection, which
//! hands them out in the order the requests were written, so concurrent callers of one
//! session pipeline over a single socket.

use crate::client::{Body, ClientConfig, RequestOption};
use crate::codec::{RequestEncoder, ResponseDecoder};
use crate::connection::{ClientConn, ConnReader, ConnWriter, MaybeTlsStream};
use crate::protocol::{ConnError, HttpError, ParseError, Request, RequestUrl, Response, Target, has_token};
use crate::sync::{AsyncMutex, AsyncTimer, CancelToken};
use bytes::BytesMut;
use http::{Method, header};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Encoder;
use tracing::{debug, trace};

type Reply = oneshot::Receiver<Result<Response, ParseError>>;

struct Pending {
    decoder: ResponseDecoder,
    reply: oneshot::Sender<Result<Response, ParseError>>,
}

/// A live connection plus the task reading its responses.
struct Link {
    flag: String,
    writer: ConnWriter<MaybeTlsStream>,
    pending: mpsc::UnboundedSender<Pending>,
    max_body_size: usize,
}

impl Link {
    async fn open(target: &Target, server: Option<String>, config: Arc<ClientConfig>) -> Result<Arc<Self>, ConnError> {
        let max_body_size = config.max_body_size();
        let conn = ClientConn::connect(target.clone(), server, config).await?;
        let flag = conn.flag();
        let (reader, writer) = conn.into_conn().into_parts();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(read_responses(reader, writer.clone(), rx));

        debug!(target = %flag, "session connected");
        Ok(Arc::new(Self { flag, writer, pending: tx, max_body_size }))
    }

    fn is_connected(&self) -> bool {
        self.writer.is_connected() && !self.pending.is_closed()
    }

    /// Writes `bytes` and queues a reader for the answer. Must be called under the send lock
    /// so the queue order matches the wire order.
    async fn send(&self, bytes: &[u8], method: &Method) -> Result<Reply, ConnError> {
        self.writer.send(bytes).await?;

        let (reply, receiver) = oneshot::channel();
        let decoder = ResponseDecoder::for_method(method).with_max_body_size(self.max_body_size);
        let pending = Pending { decoder, reply };
        if self.pending.send(pending).is_err() {
            return Err(ConnError::Closed);
        }
        Ok(receiver)
    }
}

async fn read_responses(
    mut reader: ConnReader<MaybeTlsStream>,
    writer: ConnWriter<MaybeTlsStream>,
    mut queue: mpsc::UnboundedReceiver<Pending>,
) {
    loop {
        let Pending { mut decoder, reply } = select! {
            biased;
            pending = queue.recv() => match pending {
                Some(pending) => pending,
                None => break,
            },
            // nothing is expected, but an idle peer may still hang up
            result = reader.read_more() => match result {
                Ok(_) => continue,
                Err(e) => {
                    debug!(cause = %e, "idle session connection ended");
                    break;
                }
            },
        };

        let result = reader.decode(&mut decoder).await;
        let done = match &result {
            Ok(response) => has_token(response.headers(), &header::CONNECTION, "close"),
            Err(e) => {
                debug!(cause = %e, "reading response failed");
                true
            }
        };
        if done {
            writer.cancel();
        }
        if reply.send(result).is_err() {
            trace!("response arrived after its caller gave up");
        }
        if done {
            break;
        }
    }
    writer.cancel();
}

/// An HTTP client session.
///
/// At most one connection is held. It is reused while requests go to the same
/// `scheme://host:port` and replaced otherwise; any unrecoverable error drops it so the
/// next request starts from a fresh connection.
pub struct Session {
    config: Arc<ClientConfig>,
    send_lock: AsyncMutex,
    link: Mutex<Option<Arc<Link>>>,
}

impl Session {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self { config, send_lock: AsyncMutex::new(false), link: Mutex::new(None) }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Opens the connection for `url` ahead of the first request.
    pub async fn connect(&self, url: &str) -> Result<(), HttpError> {
        let url = RequestUrl::parse(url)?;
        let guard = self.send_lock.lock_guard().await;
        self.link_for(&url.target, None).await?;
        guard.unlock();
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.held().is_some_and(|link| link.is_connected())
    }

    /// Sends `request` and waits for its response.
    ///
    /// A failed send reconnects and is retried exactly once. A non-zero request timeout
    /// bounds the whole exchange; when it fires the connection is cancelled and dropped.
    pub async fn do_method(&self, mut request: Request) -> Result<Response, HttpError> {
        let url = RequestUrl::parse(request.url())?;
        self.config.apply_default_headers(request.headers_mut());

        let mut buf = BytesMut::new();
        RequestEncoder.encode(&mut request, &mut buf)?;

        let timeout = request.timeout();
        let server = request.server().map(str::to_string);
        let exchange = self.send(&url.target, server, &buf, request.method());

        let deadline = (!timeout.is_zero()).then(|| CancelToken::new(timeout));
        let (link, reply) = match &deadline {
            None => exchange.await?,
            Some(deadline) => match tokio::time::timeout_at(deadline.deadline(), exchange).await {
                Ok(result) => result?,
                Err(_) => {
                    debug!(url = request.url(), ?timeout, "timed out before the request was sent");
                    self.drop_link();
                    return Err(HttpError::timeout(timeout));
                }
            },
        };

        let timer = AsyncTimer::new();
        let fired = Arc::new(AtomicBool::new(false));
        if let Some(deadline) = &deadline {
            let fired = Arc::clone(&fired);
            let writer = link.writer.clone();
            timer.wait_callback(deadline.remaining(), move || {
                fired.store(true, Ordering::Release);
                writer.cancel();
            });
        }

        let result = reply.await;
        timer.cancel();

        match result {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) | Err(_) if fired.load(Ordering::Acquire) => {
                debug!(url = request.url(), ?timeout, "timed out waiting for the response");
                self.forget_link(&link);
                Err(HttpError::timeout(timeout))
            }
            Ok(Err(e)) => {
                self.forget_link(&link);
                Err(e.into())
            }
            Err(_) => {
                self.forget_link(&link);
                Err(ConnError::Closed.into())
            }
        }
    }

    pub async fn head(&self, url: &str, options: Vec<RequestOption>) -> Result<Response, HttpError> {
        self.do_method(build(Method::HEAD, url, options)).await
    }

    pub async fn options(&self, url: &str, options: Vec<RequestOption>) -> Result<Response, HttpError> {
        self.do_method(build(Method::OPTIONS, url, options)).await
    }

    pub async fn get(&self, url: &str, options: Vec<RequestOption>) -> Result<Response, HttpError> {
        self.do_method(build(Method::GET, url, options)).await
    }

    pub async fn post(&self, url: &str, options: Vec<RequestOption>) -> Result<Response, HttpError> {
        self.do_method(build(Method::POST, url, options)).await
    }

    pub async fn put(&self, url: &str, options: Vec<RequestOption>) -> Result<Response, HttpError> {
        self.do_method(build(Method::PUT, url, options)).await
    }

    pub async fn delete(&self, url: &str, options: Vec<RequestOption>) -> Result<Response, HttpError> {
        self.do_method(build(Method::DELETE, url, options)).await
    }

    pub async fn post_body(&self, url: &str, body: Body, options: Vec<RequestOption>) -> Result<Response, HttpError> {
        let mut request = build(Method::POST, url, options);
        body.apply(&mut request);
        self.do_method(request).await
    }

    pub async fn put_body(&self, url: &str, body: Body, options: Vec<RequestOption>) -> Result<Response, HttpError> {
        let mut request = build(Method::PUT, url, options);
        body.apply(&mut request);
        self.do_method(request).await
    }

    async fn send(
        &self,
        target: &Target,
        server: Option<String>,
        bytes: &[u8],
        method: &Method,
    ) -> Result<(Arc<Link>, Reply), HttpError> {
        let guard = self.send_lock.lock_guard().await;

        let link = self.link_for(target, server.clone()).await?;
        let sent = match link.send(bytes, method).await {
            Ok(reply) => (link, reply),
            Err(e) => {
                debug!(cause = %e, target = %link.flag, "send failed, reconnecting once");
                self.forget_link(&link);

                let link = Link::open(target, server, Arc::clone(&self.config)).await?;
                self.hold(Arc::clone(&link));
                match link.send(bytes, method).await {
                    Ok(reply) => (link, reply),
                    Err(e) => {
                        self.forget_link(&link);
                        return Err(e.into());
                    }
                }
            }
        };

        guard.unlock();
        Ok(sent)
    }

    async fn link_for(&self, target: &Target, server: Option<String>) -> Result<Arc<Link>, ConnError> {
        let flag = target.flag();
        if let Some(link) = self.held() {
            if link.flag == flag && link.is_connected() {
                return Ok(link);
            }
            debug!(held = %link.flag, wanted = %flag, "replacing session connection");
            self.forget_link(&link);
        }

        let link = Link::open(target, server, Arc::clone(&self.config)).await?;
        self.hold(Arc::clone(&link));
        Ok(link)
    }

    fn held(&self) -> Option<Arc<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn hold(&self, link: Arc<Link>) {
        *self.link.lock().unwrap_or_else(PoisonError::into_inner) = Some(link);
    }

    /// Cancels `link` and lets go of it, unless another request already replaced it.
    fn forget_link(&self, link: &Arc<Link>) {
        link.writer.cancel();
        let mut held = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        if held.as_ref().is_some_and(|current| Arc::ptr_eq(current, link)) {
            held.take();
        }
    }

    fn drop_link(&self) {
        let held = self.link.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(link) = held {
            link.writer.cancel();
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(ClientConfig::global())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.drop_link();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("link", &self.held().map(|link| link.flag.clone()))
            .finish()
    }
}

pub(crate) fn build(method: Method, url: &str, options: Vec<RequestOption>) -> Request {
    let mut request = Request::new(method, url);
    for option in options {
        option.apply(&mut request);
    }
    request
}
