// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Boxoffice Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Append-only order journal.
//!
//! The journal is the persistence seam of the engine: an order and its lines
//! are recorded as one atomic append at creation time, and again on each
//! terminal transition. A failed append at creation aborts the order and
//! rolls back its reservations.

use crate::order::OrderSnapshot;
use parking_lot::Mutex;
use thiserror::Error;

/// Journal write failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("journal write failed: {0}")]
pub struct JournalError(pub String);

/// Durable sink for order records.
///
/// Implementations must treat each `record` call as one atomic write of the
/// whole snapshot (order plus lines).
pub trait OrderJournal: Send + Sync {
    fn record(&self, snapshot: &OrderSnapshot) -> Result<(), JournalError>;
}

/// In-memory journal keeping every snapshot in append order.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<OrderSnapshot>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copies of all recorded snapshots, oldest first.
    pub fn entries(&self) -> Vec<OrderSnapshot> {
        self.entries.lock().clone()
    }
}

impl OrderJournal for MemoryJournal {
    fn record(&self, snapshot: &OrderSnapshot) -> Result<(), JournalError> {
        self.entries.lock().push(snapshot.clone());
        Ok(())
    }
}
