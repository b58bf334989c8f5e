// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Engine errors surfaced at the RPC boundary.

use thiserror::Error;

use crate::domain::condition::ConditionError;

/// Errors raised by blackboard operations. Each maps to one of the
/// protocol's JSON-RPC error codes; anything unexpected is `Internal`
/// and never leaks details beyond its message.
#[derive(Debug, Error)]
pub enum BlackboardError {
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("invalid condition: {0}")]
    InvalidCondition(#[from] ConditionError),

    #[error("unknown scent: {0}")]
    ScentNotFound(String),

    #[error("payload validation failed: {0}")]
    PayloadValidation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BlackboardError {
    /// JSON-RPC error code for this failure.
    pub fn code(&self) -> i64 {
        match self {
            Self::InvalidParams(_) => -32602,
            Self::InvalidCondition(_) => -32006,
            Self::ScentNotFound(_) => -32002,
            Self::PayloadValidation(_) => -32003,
            Self::Internal(_) => -32603,
        }
    }
}
