//! Client side of the push channel transports
//!
//! Both transports surface the relay's events through [`EventStream`], so
//! the subscriber does not care which one a connection attempt ended up on.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http_body_util::{BodyExt, Full};
use hyper::header::{ACCEPT, CONTENT_TYPE, HOST};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use crate::api::realtime::PollHandshake;
use crate::error::{FallwatchError, Result};
use crate::hub::TransportKind;
use crate::models::AlertEvent;

/// Extra time allowed on top of the relay's long-poll timeout
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Timeout for handshake and close requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A live stream of events from the relay
#[async_trait]
pub trait EventStream: Send {
    fn transport(&self) -> TransportKind;

    /// Next event, or `None` once the relay has closed the stream
    async fn next_event(&mut self) -> Result<Option<AlertEvent>>;

    /// Close the stream, telling the relay where the transport allows
    async fn close(&mut self);
}

/// Open a stream, trying each transport in order until one connects
pub async fn open_stream(
    base: &Url,
    path: &str,
    transports: &[TransportKind],
    read_timeout: Duration,
) -> Result<Box<dyn EventStream>> {
    let mut last_error = FallwatchError::InvalidConfig("no transports configured".into());

    for transport in transports {
        let attempt: Result<Box<dyn EventStream>> = match transport {
            TransportKind::WebSocket => WebSocketEvents::connect(base, path, read_timeout)
                .await
                .map(|s| Box::new(s) as Box<dyn EventStream>),
            TransportKind::Polling => PollingEvents::open(base, path)
                .await
                .map(|s| Box::new(s) as Box<dyn EventStream>),
        };

        match attempt {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(transport = %transport, "Transport unavailable: {}", e);
                last_error = e;
            }
        }
    }

    Err(last_error)
}

/// URL of a push channel endpoint below the relay's base URL
pub fn endpoint(base: &Url, path: &str, suffix: &str) -> Url {
    let mut url = base.clone();
    url.set_path(&format!("{}{}", path.trim_end_matches('/'), suffix));
    url.set_query(None);
    url.set_fragment(None);
    url
}

/// WebSocket URL for the alert stream
pub fn websocket_url(base: &Url, path: &str) -> Result<Url> {
    let mut url = endpoint(base, path, "/ws");
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(FallwatchError::InvalidConfig(format!(
                "unsupported relay URL scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme).map_err(|_| {
        FallwatchError::InvalidConfig(format!("cannot use scheme {} for {}", scheme, base))
    })?;
    Ok(url)
}

/// Persistent WebSocket transport
pub struct WebSocketEvents {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    read_timeout: Duration,
}

impl WebSocketEvents {
    /// Connect to the relay.
    ///
    /// The relay pings on an interval, so a socket that stays silent for
    /// `read_timeout` is treated as dead.
    pub async fn connect(base: &Url, path: &str, read_timeout: Duration) -> Result<Self> {
        let url = websocket_url(base, path)?;
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        Ok(Self {
            socket,
            read_timeout,
        })
    }
}

#[async_trait]
impl EventStream for WebSocketEvents {
    fn transport(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn next_event(&mut self) -> Result<Option<AlertEvent>> {
        loop {
            let msg = match tokio::time::timeout(self.read_timeout, self.socket.next()).await {
                Ok(Some(msg)) => msg?,
                Ok(None) => return Ok(None),
                Err(_) => return Err(FallwatchError::Timeout),
            };

            match msg {
                Message::Text(text) => match serde_json::from_str::<AlertEvent>(&text) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => warn!("Ignoring malformed alert frame: {}", e),
                },
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.close(None).await {
            debug!("WebSocket close failed: {}", e);
        }
    }
}

/// Long-polling transport
pub struct PollingEvents {
    client: PollClient,
    session_path: String,
    poll_timeout: Duration,
    pending: VecDeque<AlertEvent>,
    open: bool,
}

impl PollingEvents {
    pub async fn open(base: &Url, path: &str) -> Result<Self> {
        let client = PollClient::new(base)?;
        let open_path = endpoint(base, path, "/poll").path().to_string();

        let (status, body) = client
            .request(Method::POST, &open_path, REQUEST_TIMEOUT)
            .await?;
        if status != StatusCode::CREATED {
            return Err(FallwatchError::UnexpectedStatus(status.as_u16()));
        }

        let handshake: PollHandshake = serde_json::from_slice(&body)?;
        debug!(sid = %handshake.sid, "Polling session opened");

        Ok(Self {
            client,
            session_path: format!("{}/{}", open_path, handshake.sid),
            poll_timeout: Duration::from_millis(handshake.poll_timeout_ms),
            pending: VecDeque::new(),
            open: true,
        })
    }
}

#[async_trait]
impl EventStream for PollingEvents {
    fn transport(&self) -> TransportKind {
        TransportKind::Polling
    }

    async fn next_event(&mut self) -> Result<Option<AlertEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if !self.open {
                return Ok(None);
            }

            let (status, body) = self
                .client
                .request(Method::GET, &self.session_path, self.poll_timeout + POLL_GRACE)
                .await?;

            match status {
                StatusCode::OK => {
                    let events: Vec<AlertEvent> = serde_json::from_slice(&body)?;
                    self.pending.extend(events);
                }
                StatusCode::NOT_FOUND => {
                    self.open = false;
                }
                other => return Err(FallwatchError::UnexpectedStatus(other.as_u16())),
            }
        }
    }

    async fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(e) = self
            .client
            .request(Method::DELETE, &self.session_path, REQUEST_TIMEOUT)
            .await
        {
            debug!("Polling session close failed: {}", e);
        }
    }
}

/// Minimal HTTP/1 client for the polling endpoints
struct PollClient {
    address: String,
    host: String,
}

impl PollClient {
    fn new(base: &Url) -> Result<Self> {
        if base.scheme() != "http" {
            return Err(FallwatchError::InvalidConfig(format!(
                "polling transport requires an http:// relay URL, got {}",
                base.scheme()
            )));
        }

        let host = base
            .host_str()
            .ok_or_else(|| FallwatchError::InvalidConfig("relay URL must include a host".into()))?;
        let port = base.port_or_known_default().unwrap_or(80);

        Ok(Self {
            address: format!("{}:{}", host, port),
            host: match base.port() {
                Some(p) => format!("{}:{}", host, p),
                None => host.to_string(),
            },
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        timeout: Duration,
    ) -> Result<(StatusCode, Bytes)> {
        let stream = TcpStream::connect(&self.address).await.map_err(|e| {
            FallwatchError::ConnectionFailed(format!("connect to {} failed: {}", self.address, e))
        })?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| FallwatchError::ConnectionFailed(format!("Handshake failed: {}", e)))?;

        // Spawn connection handler
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Polling connection ended: {}", e);
            }
        });

        let request = Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, &self.host)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::new()))
            .map_err(|e| FallwatchError::Http(format!("Failed to build request: {}", e)))?;

        let response = tokio::time::timeout(timeout, sender.send_request(request))
            .await
            .map_err(|_| FallwatchError::Timeout)??;

        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();

        Ok((status, body))
    }
}
