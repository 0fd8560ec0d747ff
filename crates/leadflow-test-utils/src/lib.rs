// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Leadflow integration tests.
//!
//! Provides deterministic stand-ins for every external collaborator and a
//! harness that assembles the full reliability layer on a temp SQLite file.
//!
//! # Components
//!
//! - [`ManualClock`] - wall clock that only moves when told to
//! - [`MockRouter`], [`MockSender`], [`MockCrm`] - scripted collaborators
//! - [`RecordingAlertSink`] - captures operator alerts
//! - [`FlakyCoordinationStore`] - coordination store that can be taken down
//! - [`TestHarness`] - everything wired together

pub mod clock;
pub mod flaky_store;
pub mod harness;
pub mod mock_alerts;
pub mod mock_crm;
pub mod mock_router;
pub mod mock_sender;

pub use clock::ManualClock;
pub use flaky_store::FlakyCoordinationStore;
pub use harness::{TestHarness, TestHarnessBuilder, default_start};
pub use mock_alerts::RecordingAlertSink;
pub use mock_crm::MockCrm;
pub use mock_router::MockRouter;
pub use mock_sender::MockSender;
