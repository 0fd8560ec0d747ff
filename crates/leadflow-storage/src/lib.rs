// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for Leadflow.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed queries for leads,
//! consent, the audit trail, the dead-letter queue and the inbound queue.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

mod codec;

pub use adapter::SqliteStorage;
pub use database::Database;
