//! Session table for the streaming transports
//!
//! Every SSE or NDJSON client gets a [`Session`]: a bounded inbound queue
//! drained by one dispatcher task, and a bounded outbound queue read by the
//! single subscriber stream. Both queues drop on overflow instead of
//! blocking. Each session's cancellation token is a child of the table's
//! shutdown token.

use crate::protocol::{McpRequest, McpResponse};
use crate::transport::McpHandler;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use svcmgr_core::SessionConfig;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Id prefix for SSE sessions
pub const CLIENT_PREFIX: &str = "client_";
/// Id prefix for NDJSON sessions
pub const STREAM_PREFIX: &str = "stream_";

/// How a response is labelled on the outbound stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Message,
    Response,
}

impl FrameKind {
    pub fn event_name(&self) -> &'static str {
        match self {
            FrameKind::Message => "message",
            FrameKind::Response => "response",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameKind,
    pub response: McpResponse,
}

/// Work item for a session's dispatcher
#[derive(Debug)]
pub enum Inbound {
    Request { request: McpRequest, kind: FrameKind },
    /// A ready-made reply, e.g. a parse error for a bad frame
    Reject(McpResponse),
}

pub struct Session {
    id: String,
    inbound: Mutex<Option<mpsc::Sender<Inbound>>>,
    outbound: Mutex<Option<mpsc::Receiver<Frame>>>,
    epoch: Instant,
    last_seen_ms: AtomicU64,
    cancel: CancellationToken,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Record client activity
    pub fn touch(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.last_seen_ms.fetch_max(now, Ordering::Relaxed);
    }

    pub fn idle_for(&self) -> Duration {
        let now = self.epoch.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_seen_ms.load(Ordering::Relaxed)))
    }

    /// Queue work for the dispatcher without waiting. A full queue drops
    /// the item.
    pub fn enqueue(&self, item: Inbound) -> Result<(), TrySendError<Inbound>> {
        let sender = self
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let result = match sender {
            Some(sender) => sender.try_send(item),
            None => Err(TrySendError::Closed(item)),
        };
        match &result {
            Err(TrySendError::Full(_)) => warn!(session = %self.id, "Inbound queue full, dropping request"),
            Err(TrySendError::Closed(_)) => debug!(session = %self.id, "Inbound queue closed"),
            Ok(()) => {}
        }
        result
    }

    /// No more requests will arrive. Queued ones are still answered, then
    /// the outbound stream ends.
    pub fn close_inbound(&self) {
        self.inbound.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// The outbound queue has exactly one reader; later callers get `None`.
    pub fn take_outbound(&self) -> Option<mpsc::Receiver<Frame>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

pub struct SessionTable {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    handler: Arc<dyn McpHandler>,
    config: SessionConfig,
    epoch: Instant,
    shutdown: CancellationToken,
}

impl SessionTable {
    pub fn new(handler: Arc<dyn McpHandler>, config: SessionConfig, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            handler,
            config,
            epoch: Instant::now(),
            shutdown,
        })
    }

    pub fn handler(&self) -> &Arc<dyn McpHandler> {
        &self.handler
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Register a new session and start its dispatcher
    pub fn open(&self, prefix: &str) -> Arc<Session> {
        let id = format!("{}{}", prefix, Uuid::new_v4().simple());
        let capacity = self.config.queue_capacity.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);

        let session = Arc::new(Session {
            id: id.clone(),
            inbound: Mutex::new(Some(inbound_tx)),
            outbound: Mutex::new(Some(outbound_rx)),
            epoch: self.epoch,
            last_seen_ms: AtomicU64::new(0),
            cancel: self.shutdown.child_token(),
        });
        session.touch();

        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), session.clone());
        tokio::spawn(dispatch(self.handler.clone(), session.clone(), inbound_rx, outbound_tx));

        info!(session = %id, "Session opened");
        session
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Drop a session and cancel everything attached to it
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if let Some(session) = &removed {
            session.cancel.cancel();
            info!(session = %id, "Session closed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict sessions idle past the configured timeout
    pub fn reap_idle(&self) -> usize {
        let timeout = self.config.idle_timeout();
        let idle: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.idle_for() > timeout)
            .map(|s| s.id.clone())
            .collect();

        for id in &idle {
            warn!(session = %id, "Evicting idle session");
            self.remove(id);
        }
        idle.len()
    }

    /// Run [`reap_idle`](Self::reap_idle) on the configured interval until
    /// shutdown.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let table = self.clone();
        tokio::spawn(async move {
            let period = table.config.reap_interval();
            let mut ticker = time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = table.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = table.reap_idle();
                        if evicted > 0 {
                            debug!(evicted, remaining = table.len(), "Reaped idle sessions");
                        }
                    }
                }
            }
        })
    }

    /// Removes the session when dropped
    pub fn guard(self: &Arc<Self>, id: &str) -> SessionGuard {
        SessionGuard {
            table: self.clone(),
            id: id.to_string(),
        }
    }

    /// Claim the outbound side of `session`. `None` when another subscriber
    /// already holds it. Dropping the subscription closes the session.
    pub fn subscribe(self: &Arc<Self>, session: &Session, heartbeat: Option<Duration>) -> Option<Subscription> {
        let outbound = session.take_outbound()?;
        let heartbeat = heartbeat.map(|period| {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        Some(Subscription {
            outbound,
            heartbeat,
            cancel: session.cancel.clone(),
            _guard: self.guard(&session.id),
        })
    }
}

pub enum Outgoing {
    Frame(Frame),
    Heartbeat,
}

/// Single reader of a session's outbound queue
pub struct Subscription {
    outbound: mpsc::Receiver<Frame>,
    heartbeat: Option<Interval>,
    cancel: CancellationToken,
    _guard: SessionGuard,
}

impl Subscription {
    /// Next item to write; `None` once the session is cancelled or its
    /// dispatcher has finished.
    pub async fn next(&mut self) -> Option<Outgoing> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            frame = self.outbound.recv() => frame.map(Outgoing::Frame),
            _ = tick(&mut self.heartbeat) => Some(Outgoing::Heartbeat),
        }
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

pub struct SessionGuard {
    table: Arc<SessionTable>,
    id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}

/// Single consumer of a session's inbound queue. Responses leave in the
/// order requests arrived.
async fn dispatch(
    handler: Arc<dyn McpHandler>,
    session: Arc<Session>,
    mut inbound: mpsc::Receiver<Inbound>,
    outbound: mpsc::Sender<Frame>,
) {
    loop {
        let item = tokio::select! {
            _ = session.cancel.cancelled() => break,
            item = inbound.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        let frame = match item {
            Inbound::Request { request, kind } => match handler.handle_request(request).await {
                Some(response) => Frame { kind, response },
                None => continue,
            },
            Inbound::Reject(response) => Frame {
                kind: FrameKind::Message,
                response,
            },
        };

        match outbound.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(session = %session.id, "Outbound queue full, dropping response")
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }
    debug!(session = %session.id, "Dispatcher stopped");
}
