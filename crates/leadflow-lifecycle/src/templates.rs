// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fallback messages used when the agent router is unavailable.

use leadflow_core::types::{Lead, LeadState, RouterInput};

/// A safe, generic message for the lead's current situation.
pub fn fallback_message(lead: &Lead, input: &RouterInput) -> String {
    let greeting = match lead.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => format!("Hi {name}"),
        _ => "Hi there".to_string(),
    };

    match input {
        RouterInput::NewLead { .. } => format!(
            "{greeting}, thanks for reaching out! We got your request and will help you \
             shortly. Reply STOP to opt out."
        ),
        RouterInput::ColdRecycle { .. } => format!(
            "{greeting}, just checking in. Are you still looking for help? Reply here and \
             we'll pick up where we left off. Reply STOP to opt out."
        ),
        RouterInput::Reply { .. } => match lead.state {
            LeadState::New | LeadState::IntakeSent | LeadState::Qualifying | LeadState::Cold => {
                "Thanks for the details. Could you tell us a bit more about what you need and \
                 when works best for you?"
                    .to_string()
            }
            LeadState::Qualified => {
                "Great, we can help with that. Would you like us to find an appointment time?"
                    .to_string()
            }
            LeadState::Booking => {
                "We're checking availability and will confirm your appointment shortly."
                    .to_string()
            }
            LeadState::Booked | LeadState::Completed => {
                "Thanks! Your appointment is confirmed. Reply here if anything changes."
                    .to_string()
            }
            LeadState::Dead | LeadState::OptedOut => {
                "Thanks for your message. A member of our team will follow up.".to_string()
            }
        },
    }
}
