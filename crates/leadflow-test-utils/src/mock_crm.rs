// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory CRM with a fixed technician roster.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use leadflow_core::types::{Booking, BookingRequest, CrmCustomer, Lead, Technician, TimeSlot};
use leadflow_core::{CrmProvider, LeadflowError};

#[derive(Debug)]
pub struct MockCrm {
    technicians: Vec<Technician>,
    open: AtomicBool,
    unavailable: AtomicBool,
    bookings: Mutex<Vec<Booking>>,
}

impl Default for MockCrm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCrm {
    pub fn new() -> Self {
        Self {
            technicians: vec![Technician {
                id: "tech-1".into(),
                name: "Pat".into(),
            }],
            open: AtomicBool::new(true),
            unavailable: AtomicBool::new(false),
            bookings: Mutex::new(Vec::new()),
        }
    }

    /// When closed, every availability query comes back empty.
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    /// When unavailable, every call fails with a transient error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn bookings(&self) -> Vec<Booking> {
        self.bookings.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), LeadflowError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(LeadflowError::provider("mock crm unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CrmProvider for MockCrm {
    fn name(&self) -> &str {
        "mock-crm"
    }

    async fn create_customer(&self, lead: &Lead) -> Result<CrmCustomer, LeadflowError> {
        self.check()?;
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
        self.check()?;
        let mut bookings = self.bookings.lock().unwrap();
        let booking = Booking {
            id: format!("booking-{}", bookings.len() + 1),
            customer_id: customer.id.clone(),
            technician_id: technician.map(|t| t.id.clone()),
            slot: request.slot.clone(),
        };
        bookings.push(booking.clone());
        Ok(booking)
    }

    async fn get_availability(&self, window: &TimeSlot) -> Result<Vec<TimeSlot>, LeadflowError> {
        self.check()?;
        if self.open.load(Ordering::SeqCst) {
            Ok(vec![window.clone()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn get_technicians(&self) -> Result<Vec<Technician>, LeadflowError> {
        self.check()?;
        Ok(self.technicians.clone())
    }
}
