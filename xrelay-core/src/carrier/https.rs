//! HTTPS/OBFS carrier: tunnels the custom frame protocol inside HTTP(S)
//! request/response bodies so on-path observers see only web traffic.
//!
//! Server side exposes `POST /data` and `POST /poll` (see spec §4.3/§6) via
//! `axum`; client side is a polling `reqwest::Client`. Per-client FIFO
//! inbox/outbox queues are bounded at `queue_limit` frames (default 64). A
//! full outbox (server-to-client frames piling up because the client hasn't
//! polled) drops its oldest frame to make room; a full inbox instead answers
//! `503` and leaves the frame unenqueued, so `HttpsClientCarrier` just waits
//! and reposts the same frame rather than losing it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::carrier::{Carrier, PeerAddr};
use crate::error::{Error, Result};

/// Request header carrying the stable client identifier.
pub const CLIENT_ID_HEADER: &str = "X-Client-Id";

/// Consecutive `503` responses the client carrier absorbs before giving up
/// and surfacing `CarrierUnavailable` to the Transport layer.
const MAX_SERVICE_UNAVAILABLE_RETRIES: u32 = 32;

#[derive(Default)]
struct ClientQueues {
    inbox: VecDeque<Vec<u8>>,
    outbox: VecDeque<Vec<u8>>,
}

fn push_bounded(queue: &mut VecDeque<Vec<u8>>, item: Vec<u8>, limit: usize) {
    if queue.len() >= limit {
        queue.pop_front();
    }
    queue.push_back(item);
}

struct ServerState {
    queues: Mutex<HashMap<String, ClientQueues>>,
    queue_limit: usize,
    notify: Notify,
}

/// Server-side HTTPS carrier. Cloning shares the underlying queues, so the
/// same carrier handle can be used both by the `axum` router (to enqueue
/// inbound frames and dequeue outbound ones) and by a `Transport` endpoint.
#[derive(Clone)]
pub struct HttpsServerCarrier {
    state: Arc<ServerState>,
    closed: Arc<std::sync::atomic::AtomicBool>,
}

impl HttpsServerCarrier {
    /// Creates a new carrier and its matching `axum` router. The caller is
    /// responsible for serving the router (e.g. with `axum::serve`).
    pub fn new(queue_limit: usize) -> (Self, Router) {
        let state = Arc::new(ServerState {
            queues: Mutex::new(HashMap::new()),
            queue_limit,
            notify: Notify::new(),
        });
        let carrier = Self {
            state: state.clone(),
            closed: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        };

        let router = Router::new()
            .route("/data", post(data_handler))
            .route("/poll", post(poll_handler))
            .with_state(state);

        (carrier, router)
    }

    async fn try_pop_any_inbox(&self) -> Option<(String, Vec<u8>)> {
        let mut guard = self.state.queues.lock().await;
        for (client_id, queues) in guard.iter_mut() {
            if let Some(frame) = queues.inbox.pop_front() {
                return Some((client_id.clone(), frame));
            }
        }
        None
    }
}

impl Carrier for HttpsServerCarrier {
    async fn send(&mut self, frame: &[u8], peer: &PeerAddr) -> Result<()> {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::CarrierClosed);
        }
        let PeerAddr::Https(client_id) = peer else {
            return Err(Error::CarrierUnavailable);
        };

        let mut guard = self.state.queues.lock().await;
        let queues = guard.entry(client_id.clone()).or_default();
        push_bounded(&mut queues.outbox, frame.to_vec(), self.state.queue_limit);
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<(Vec<u8>, PeerAddr)> {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::CarrierClosed);
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Some((client_id, frame)) = self.try_pop_any_inbox().await {
                return Ok((frame, PeerAddr::Https(client_id)));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }

            tokio::select! {
                _ = self.state.notify.notified() => {}
                _ = tokio::time::sleep(remaining) => return Err(Error::Timeout),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

async fn handle_request(
    state: Arc<ServerState>,
    headers: HeaderMap,
    body: Option<Bytes>,
) -> Response {
    let Some(client_id) = headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return (StatusCode::BAD_REQUEST, Vec::new()).into_response();
    };

    let mut guard = state.queues.lock().await;
    let queues = guard.entry(client_id).or_default();

    if let Some(body) = body {
        if !body.is_empty() {
            if queues.inbox.len() >= state.queue_limit {
                log::debug!("inbox full for client, rejecting frame with 503");
                return (StatusCode::SERVICE_UNAVAILABLE, Vec::new()).into_response();
            }
            queues.inbox.push_back(body.to_vec());
        }
    }

    let outbound = queues.outbox.pop_front().unwrap_or_default();
    drop(guard);
    state.notify.notify_waiters();

    (StatusCode::OK, outbound).into_response()
}

async fn data_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_request(state, headers, Some(body)).await
}

async fn poll_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Response {
    handle_request(state, headers, None).await
}

/// Client-side HTTPS carrier. Polls `/poll` at `poll_interval` whenever it
/// has nothing queued to send; every `/data` or `/poll` call both delivers
/// a pending client→server frame (if any) and drains at most one
/// server→client frame.
pub struct HttpsClientCarrier {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    poll_interval: Duration,
    pending_send: Option<Vec<u8>>,
    stashed_recv: Option<Vec<u8>>,
    closed: bool,
}

impl HttpsClientCarrier {
    /// Creates a client carrier talking to `base_url` (e.g.
    /// `https://host:port`) identified as `client_id`.
    pub fn new(base_url: impl Into<String>, client_id: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            client_id: client_id.into(),
            poll_interval,
            pending_send: None,
            stashed_recv: None,
            closed: false,
        }
    }

    /// The sentinel peer address identifying "the server" from the
    /// client's point of view: there is exactly one HTTPS endpoint on the
    /// other end of this carrier.
    pub fn server_peer(&self) -> PeerAddr {
        PeerAddr::Https(self.client_id.clone())
    }

    /// Posts to `path`, retrying on `503` (inbox-full) after sleeping
    /// `poll_interval` — spec §4.3/§6 treats `503` as transient backpressure
    /// the client absorbs rather than an error the Transport layer needs to
    /// see. Gives up after [`MAX_SERVICE_UNAVAILABLE_RETRIES`] consecutive
    /// `503`s and surfaces `CarrierUnavailable` to the caller.
    async fn post(&self, path: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let mut attempt = 0u32;
        loop {
            let response = self
                .http
                .post(format!("{}{}", self.base_url, path))
                .header(CLIENT_ID_HEADER, &self.client_id)
                .body(body.clone())
                .send()
                .await
                .map_err(|_| Error::CarrierUnavailable)?;

            match response.status() {
                reqwest::StatusCode::OK => {
                    return response
                        .bytes()
                        .await
                        .map(|b| b.to_vec())
                        .map_err(|_| Error::CarrierUnavailable)
                }
                reqwest::StatusCode::SERVICE_UNAVAILABLE => {
                    attempt += 1;
                    if attempt > MAX_SERVICE_UNAVAILABLE_RETRIES {
                        return Err(Error::CarrierUnavailable);
                    }
                    log::debug!("server inbox full ({path}), retrying in {:?}", self.poll_interval);
                    tokio::time::sleep(self.poll_interval).await;
                }
                _ => return Err(Error::CarrierUnavailable),
            }
        }
    }
}

impl Carrier for HttpsClientCarrier {
    async fn send(&mut self, frame: &[u8], _peer: &PeerAddr) -> Result<()> {
        if self.closed {
            return Err(Error::CarrierClosed);
        }

        let piggybacked = self.post("/data", frame.to_vec()).await?;
        if !piggybacked.is_empty() {
            self.stashed_recv = Some(piggybacked);
        }
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<(Vec<u8>, PeerAddr)> {
        if self.closed {
            return Err(Error::CarrierClosed);
        }

        if let Some(frame) = self.stashed_recv.take() {
            return Ok((frame, self.server_peer()));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let piggybacked = self.post("/poll", self.pending_send.take().unwrap_or_default()).await?;
            if !piggybacked.is_empty() {
                return Ok((piggybacked, self.server_peer()));
            }

            if Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            tokio::time::sleep(self.poll_interval.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
