// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alert sink trait for operator notifications (pager, chat, email).

use async_trait::async_trait;

use crate::error::LeadflowError;
use crate::types::AlertEvent;

#[async_trait]
pub trait AlertSink: Send + Sync + 'static {
    async fn deliver(&self, alert: &AlertEvent) -> Result<(), LeadflowError>;
}
