// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted agent router.
//!
//! Decisions are popped from a FIFO queue. When the queue is empty the
//! router answers with a generic message and proposes no state change.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use leadflow_core::types::{Lead, LeadState, RouterDecision, RouterInput};
use leadflow_core::{AgentRouter, RouterError};

#[derive(Debug, Default)]
pub struct MockRouter {
    responses: Mutex<VecDeque<Result<RouterDecision, RouterError>>>,
    inputs: Mutex<Vec<(String, RouterInput)>>,
}

impl MockRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a decision.
    pub fn push(&self, decision: Result<RouterDecision, RouterError>) {
        self.responses.lock().unwrap().push_back(decision);
    }

    /// Queue a plain message with a proposed next state.
    pub fn push_reply(&self, message: &str, next_state: Option<LeadState>) {
        self.push(Ok(RouterDecision {
            message: message.to_string(),
            next_state,
            booking: None,
        }));
    }

    pub fn push_unavailable(&self) {
        self.push(Err(RouterError::Unavailable("mock outage".into())));
    }

    /// Every `(lead_id, input)` the router was asked about.
    pub fn inputs(&self) -> Vec<(String, RouterInput)> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentRouter for MockRouter {
    async fn route(&self, lead: &Lead, input: &RouterInput) -> Result<RouterDecision, RouterError> {
        self.inputs
            .lock()
            .unwrap()
            .push((lead.id.clone(), input.clone()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(RouterDecision {
                    message: "mock response".to_string(),
                    next_state: None,
                    booking: None,
                })
            })
    }
}
