// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! SSE subscriber registry: scent-to-session bindings, per-session event
//! logs with replay, and fan-out of fired triggers to connected streams.
//!
//! The engine knows nothing about subscribers. It exposes one handler
//! slot per scent; [`SseTriggerFanout`] multiplexes that slot across
//! every SSE stream bound to the scent's sessions.
//!
//! Bindings survive stream disconnects on purpose: events fired while a
//! client is away land in its session log and are replayed when it
//! reconnects with `Last-Event-ID`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::blackboard::TriggerHandler;
use crate::domain::ops::TriggerPayload;
use crate::presentation::rpc::trigger_notification;

/// One SSE event: a monotonic per-session id plus the serialized
/// JSON-RPC notification.
#[derive(Debug, Clone)]
pub struct SseFrame {
    pub event_id: u64,
    pub data: String,
}

#[derive(Debug, Default)]
struct SessionLog {
    next_event_id: u64,
    ring: VecDeque<SseFrame>,
}

struct StreamHandle {
    session_id: String,
    /// Explicit scent subscriptions carried by this stream, in addition
    /// to whatever its session is bound to.
    scents: HashSet<String>,
    tx: mpsc::Sender<SseFrame>,
}

#[derive(Default)]
struct Inner {
    /// scent_id -> sessions bound via sbp/subscribe.
    scent_sessions: HashMap<String, HashSet<String>>,
    /// session_id -> numbered replay ring.
    logs: HashMap<String, SessionLog>,
    /// client_id -> connected stream.
    streams: HashMap<Uuid, StreamHandle>,
}

pub struct SubscriberRegistry {
    ring_capacity: usize,
    channel_capacity: usize,
    inner: Mutex<Inner>,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SubscriberRegistry {
    pub fn new(ring_capacity: usize) -> Self {
        Self {
            ring_capacity,
            // Replay on reconnect must fit the channel before the
            // stream starts draining it.
            channel_capacity: ring_capacity + 16,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Bind a scent to a session (idempotent).
    pub fn bind(&self, session_id: &str, scent_id: &str) {
        let mut inner = self.inner();
        inner
            .scent_sessions
            .entry(scent_id.to_string())
            .or_default()
            .insert(session_id.to_string());
        inner.logs.entry(session_id.to_string()).or_default();
    }

    /// Remove a binding; returns how many sessions remain bound to the
    /// scent so the caller can free the engine's handler slot.
    pub fn unbind(&self, session_id: &str, scent_id: &str) -> usize {
        let mut inner = self.inner();
        if let Some(sessions) = inner.scent_sessions.get_mut(scent_id) {
            sessions.remove(session_id);
            if sessions.is_empty() {
                inner.scent_sessions.remove(scent_id);
                return 0;
            }
            return sessions.len();
        }
        0
    }

    pub fn sessions_bound(&self, scent_id: &str) -> usize {
        self.inner()
            .scent_sessions
            .get(scent_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner().streams.len()
    }

    /// Register a connected SSE stream. Events already buffered for the
    /// session with ids greater than `last_event_id` are queued for
    /// delivery first, in order.
    pub fn connect(
        &self,
        session_id: &str,
        scents: HashSet<String>,
        last_event_id: Option<u64>,
    ) -> (Uuid, mpsc::Receiver<SseFrame>) {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let client_id = Uuid::new_v4();
        let mut inner = self.inner();

        if let Some(after) = last_event_id {
            if let Some(log) = inner.logs.get(session_id) {
                for frame in log.ring.iter().filter(|f| f.event_id > after) {
                    if tx.try_send(frame.clone()).is_err() {
                        warn!(session_id, "replay overflowed the stream channel");
                        break;
                    }
                }
            }
        }

        inner.streams.insert(
            client_id,
            StreamHandle {
                session_id: session_id.to_string(),
                scents,
                tx,
            },
        );
        debug!(%client_id, session_id, "sse stream connected");
        (client_id, rx)
    }

    pub fn disconnect(&self, client_id: &Uuid) {
        if self.inner().streams.remove(client_id).is_some() {
            debug!(%client_id, "sse stream disconnected");
        }
    }

    /// Fan a fired trigger out to every stream bound to the scent.
    /// Returns the number of frames delivered to live streams. Streams
    /// whose channel is closed or full are dropped.
    pub fn publish(&self, scent_id: &str, payload: &TriggerPayload) -> usize {
        let data = trigger_notification(payload).to_string();
        let ring_capacity = self.ring_capacity;
        let mut guard = self.inner();
        let inner = &mut *guard;

        let sessions: Vec<String> = inner
            .scent_sessions
            .get(scent_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();

        let mut delivered = 0;
        let mut dead: Vec<Uuid> = Vec::new();

        for session_id in sessions {
            let log = inner.logs.entry(session_id.clone()).or_default();
            log.next_event_id += 1;
            let frame = SseFrame {
                event_id: log.next_event_id,
                data: data.clone(),
            };
            log.ring.push_back(frame.clone());
            while log.ring.len() > ring_capacity {
                log.ring.pop_front();
            }

            for (client_id, stream) in &inner.streams {
                if stream.session_id != session_id && !stream.scents.contains(scent_id) {
                    continue;
                }
                match stream.tx.try_send(frame.clone()) {
                    Ok(()) => delivered += 1,
                    Err(_) => dead.push(*client_id),
                }
            }
        }

        for client_id in dead {
            inner.streams.remove(&client_id);
            warn!(%client_id, "dropping unresponsive sse subscriber");
        }

        delivered
    }
}

/// The per-scent handler the transport installs on the engine. One
/// instance serves every subscribed scent; the payload names the scent.
pub struct SseTriggerFanout {
    registry: Arc<SubscriberRegistry>,
}

impl SseTriggerFanout {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl TriggerHandler for SseTriggerFanout {
    async fn handle(&self, payload: TriggerPayload) -> anyhow::Result<()> {
        self.registry.publish(&payload.scent_id, &payload);
        Ok(())
    }
}
