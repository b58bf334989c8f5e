// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Soft client identity across requests.
//!
//! Sessions scope SSE delivery and observability. They are not an
//! authorization mechanism; that is the API key layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::infrastructure::clock::Clock;

pub const SESSION_HEADER: &str = "Sbp-Session-Id";
pub const AGENT_HEADER: &str = "Sbp-Agent-Id";
pub const PROTOCOL_HEADER: &str = "Sbp-Protocol-Version";
pub const PROTOCOL_VERSION: &str = "0.1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub created_at: i64,
}

/// Tracks sessions keyed by id, creating one for any request that does
/// not carry the session header.
pub struct SessionManager {
    clock: Arc<dyn Clock>,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the session named by the request header, creating or
    /// reviving it as needed. Unknown ids are re-registered rather than
    /// rejected; session identity is soft.
    pub fn resolve(&self, supplied: Option<&str>, agent_id: Option<&str>) -> Session {
        let session_id = match supplied {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sessions
            .entry(session_id.clone())
            .and_modify(|s| {
                if s.agent_id.is_none() {
                    s.agent_id = agent_id.map(String::from);
                }
            })
            .or_insert_with(|| Session {
                session_id,
                agent_id: agent_id.map(String::from),
                created_at: self.clock.now_ms(),
            })
            .clone()
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.lock().ok()?.get(session_id).cloned()
    }

    pub fn count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }
}
