// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alert sink that records everything it is given.

use std::sync::Mutex;

use async_trait::async_trait;

use leadflow_core::types::{AlertEvent, AlertType};
use leadflow_core::{AlertSink, LeadflowError};

#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<AlertEvent>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<AlertEvent> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn count_of(&self, alert_type: AlertType) -> usize {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.alert_type == alert_type)
            .count()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn deliver(&self, alert: &AlertEvent) -> Result<(), LeadflowError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}
