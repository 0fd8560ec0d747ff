// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local collaborators used when no provider integration is wired in.
//!
//! The router answers from the fallback templates, the sender writes each
//! outbound message to the log, and the CRM books the first hour of whatever
//! window it is asked about.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use leadflow_core::types::{
    Booking, BookingRequest, CrmCustomer, DeliveryReceipt, Lead, RouterDecision, RouterInput,
    Technician, TimeSlot,
};
use leadflow_core::{AgentRouter, CrmProvider, LeadflowError, MessageSender, RouterError};
use leadflow_lifecycle::templates::fallback_message;

/// Router that always answers with the per-state template and never proposes
/// a state, leaving the pipeline's default targets in charge.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateRouter;

#[async_trait]
impl AgentRouter for TemplateRouter {
    async fn route(&self, lead: &Lead, input: &RouterInput) -> Result<RouterDecision, RouterError> {
        Ok(RouterDecision {
            message: fallback_message(lead, input),
            next_state: None,
            booking: None,
        })
    }
}

/// Sender that logs outbound messages instead of handing them to a carrier.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

#[async_trait]
impl MessageSender for LogSender {
    async fn send(&self, lead: &Lead, message: &str) -> Result<DeliveryReceipt, LeadflowError> {
        let provider_message_id = Uuid::new_v4().to_string();
        info!(
            lead_id = %lead.id,
            client_id = %lead.client_id,
            provider_message_id = %provider_message_id,
            "outbound message: {message}"
        );
        Ok(DeliveryReceipt {
            delivered: true,
            provider_message_id: Some(provider_message_id),
            error: None,
        })
    }
}

/// CRM that keeps nothing and confirms every booking.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCrm;

#[async_trait]
impl CrmProvider for LocalCrm {
    fn name(&self) -> &str {
        "local"
    }

    async fn create_customer(&self, lead: &Lead) -> Result<CrmCustomer, LeadflowError> {
        Ok(CrmCustomer {
            id: format!("cust-{}", lead.id),
            name: lead.name.clone(),
            phone: lead.phone.clone(),
        })
    }

    async fn create_booking(
        &self,
        customer: &CrmCustomer,
        technician: Option<&Technician>,
        request: &BookingRequest,
    ) -> Result<Booking, LeadflowError> {
        let booking = Booking {
            id: Uuid::new_v4().to_string(),
            customer_id: customer.id.clone(),
            technician_id: technician.map(|t| t.id.clone()),
            slot: request.slot.clone(),
        };
        info!(
            booking_id = %booking.id,
            customer_id = %booking.customer_id,
            start = %booking.slot.start,
            "booking recorded"
        );
        Ok(booking)
    }

    async fn get_availability(&self, window: &TimeSlot) -> Result<Vec<TimeSlot>, LeadflowError> {
        let end = (window.start + chrono::Duration::hours(1)).min(window.end);
        if end <= window.start {
            return Ok(Vec::new());
        }
        Ok(vec![TimeSlot {
            start: window.start,
            end,
        }])
    }

    async fn get_technicians(&self) -> Result<Vec<Technician>, LeadflowError> {
        Ok(Vec::new())
    }
}
