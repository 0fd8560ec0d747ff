// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound delivery trait implemented by SMS/email provider adapters.

use async_trait::async_trait;

use crate::error::LeadflowError;
use crate::types::{DeliveryReceipt, Lead};

/// Delivers one message to a lead.
///
/// An `Err` means the provider could not be reached at all; a receipt with
/// `delivered = false` means it answered and refused.
#[async_trait]
pub trait MessageSender: Send + Sync + 'static {
    async fn send(&self, lead: &Lead, message: &str) -> Result<DeliveryReceipt, LeadflowError>;
}
