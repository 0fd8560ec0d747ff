// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CRM capability trait. Each concrete CRM is one implementation.

use async_trait::async_trait;

use crate::error::LeadflowError;
use crate::types::{Booking, BookingRequest, CrmCustomer, Lead, Technician, TimeSlot};

#[async_trait]
pub trait CrmProvider: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn create_customer(&self, lead: &Lead) -> Result<CrmCustomer, LeadflowError>;

    async fn create_booking(
        &self,
        customer: &CrmCustomer,
        technician: Option<&Technician>,
        request: &BookingRequest,
    ) -> Result<Booking, LeadflowError>;

    /// Open slots overlapping `window`.
    async fn get_availability(&self, window: &TimeSlot) -> Result<Vec<TimeSlot>, LeadflowError>;

    async fn get_technicians(&self) -> Result<Vec<Technician>, LeadflowError>;
}
