// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for CRUD operations on storage entities.

pub mod consent;
pub mod events;
pub mod failed_leads;
pub mod leads;
pub mod queue;
