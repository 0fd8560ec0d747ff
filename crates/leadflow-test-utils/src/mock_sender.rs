// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message sender that captures outbound messages.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use leadflow_core::types::{DeliveryReceipt, Lead};
use leadflow_core::{LeadflowError, MessageSender};

#[derive(Debug, Default)]
pub struct MockSender {
    sent: Mutex<Vec<(String, String)>>,
    fail_next: AtomicUsize,
}

impl MockSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` sends fail with a transient provider error.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Every `(lead_id, message)` delivered so far.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, lead_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == lead_id)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl MessageSender for MockSender {
    async fn send(&self, lead: &Lead, message: &str) -> Result<DeliveryReceipt, LeadflowError> {
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(LeadflowError::provider("mock sender failure"));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((lead.id.clone(), message.to_string()));
        Ok(DeliveryReceipt {
            delivered: true,
            provider_message_id: Some(format!("mock-{}", sent.len())),
            error: None,
        })
    }
}
