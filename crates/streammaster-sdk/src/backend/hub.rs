// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hub executor: runs operations as invocations on the shared session.

use async_trait::async_trait;
use serde_json::Value;

use super::{ExecutorKind, OperationExecutor};
use crate::error::Result;
use crate::session::HubSession;

/// Executes operations over the real-time hub.
///
/// Any method name is accepted; the catalog is only needed for REST routes.
#[derive(Clone)]
pub struct HubExecutor {
    session: HubSession,
}

impl HubExecutor {
    pub fn new(session: HubSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &HubSession {
        &self.session
    }
}

#[async_trait]
impl OperationExecutor for HubExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::RealTime
    }

    async fn execute(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.session.invoke(method, args).await
    }
}
