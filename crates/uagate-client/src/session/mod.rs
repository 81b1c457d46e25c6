// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session lifecycle: the connected pool and keep-alive driven reconnection.

pub mod pool;
pub mod reconnect;

pub use pool::{ConnectionState, ManagedSession, SessionPool};
pub use reconnect::{KeepAliveOutcome, KeepAliveSignal, ReconnectSupervisor};
