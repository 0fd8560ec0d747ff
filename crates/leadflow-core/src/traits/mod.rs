// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits at the seams of the reliability layer.
//!
//! Everything the core does not own (persistence, the coordination store,
//! message generation, delivery, CRM, alert delivery, wall-clock time) is
//! reached through one of these traits. All async traits use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod alert;
pub mod clock;
pub mod coordination;
pub mod crm;
pub mod router;
pub mod sender;
pub mod storage;

pub use alert::AlertSink;
pub use clock::{Clock, SystemClock};
pub use coordination::CoordinationStore;
pub use crm::CrmProvider;
pub use router::{AgentRouter, RouterError};
pub use sender::MessageSender;
pub use storage::StorageAdapter;
