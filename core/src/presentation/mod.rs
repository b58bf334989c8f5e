// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod http;
pub mod middleware;
pub mod rpc;
pub mod session;
pub mod sse;

pub use http::{app, serve, ServerConfig};
pub use session::{Session, SessionManager};
pub use sse::SubscriberRegistry;
