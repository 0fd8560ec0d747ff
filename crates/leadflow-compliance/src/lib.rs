// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact-time compliance for Leadflow.
//!
//! Every outbound action passes [`ComplianceGate::evaluate`] first. The gate
//! is a pure function of consent, the lead's jurisdiction, the local clock,
//! the holiday calendar and the cold-outreach counter. A denial is an
//! ordinary outcome, not an error.

pub mod denials;
pub mod gate;
pub mod holidays;
pub mod timezone;

pub use denials::DenialTracker;
pub use gate::{ComplianceContext, ComplianceGate, OutreachKind};
pub use holidays::{Holiday, HolidayCalendar};
pub use timezone::timezone_for_state;
