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

//! Ticket inventory ledger.
//!
//! The ledger owns the `quantity_sold` counter for every ticket type. All
//! reads and writes of that counter go through [`InventoryLedger::reserve`]
//! and [`InventoryLedger::release`]; the raw counter is never exposed for
//! read-modify-write elsewhere.
//!
//! # Example
//!
//! ```
//! use boxoffice_rs::{EventId, InventoryLedger, SaleWindow, TicketType, TicketTypeId};
//! use rust_decimal_macros::dec;
//!
//! let ledger = InventoryLedger::new();
//! ledger
//!     .register(TicketType {
//!         id: TicketTypeId(1),
//!         event_id: EventId(1),
//!         label: "Standard".into(),
//!         unit_price: dec!(45.00),
//!         quantity_total: 100,
//!         sale_window: SaleWindow::always(),
//!     })
//!     .unwrap();
//!
//! let token = ledger.reserve(TicketTypeId(1), 2).unwrap();
//! assert_eq!(ledger.available(TicketTypeId(1)), Some(98));
//! ledger.release(&token);
//! assert_eq!(ledger.available(TicketTypeId(1)), Some(100));
//! ```

use crate::base::{EventId, TicketTypeId};
use crate::error::InventoryError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Optional sale window for a ticket type. An absent bound is unbounded on
/// that side.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SaleWindow {
    pub starts: Option<DateTime<Utc>>,
    pub ends: Option<DateTime<Utc>>,
}

impl SaleWindow {
    /// A window with no bounds: always on sale.
    pub fn always() -> Self {
        Self::default()
    }

    pub fn between(starts: Option<DateTime<Utc>>, ends: Option<DateTime<Utc>>) -> Self {
        Self { starts, ends }
    }

    /// Both bounds are inclusive.
    pub fn on_sale(&self, at: DateTime<Utc>) -> bool {
        self.starts.is_none_or(|s| at >= s) && self.ends.is_none_or(|e| at <= e)
    }
}

/// One purchasable category within an event.
///
/// Catalog data is immutable here; the mutable `quantity_sold` counter lives
/// inside the ledger slot and is reachable only through reserve/release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketType {
    pub id: TicketTypeId,
    pub event_id: EventId,
    pub label: String,
    pub unit_price: Decimal,
    pub quantity_total: u32,
    #[serde(default)]
    pub sale_window: SaleWindow,
}

/// Receipt for a successful reservation.
///
/// Records what was reserved so the same quantity can be returned later.
/// Each token has a unique id; releasing the same token twice is a no-op.
#[derive(Debug, Clone)]
pub struct ReservationToken {
    id: u64,
    ticket_type: TicketTypeId,
    quantity: u32,
}

impl ReservationToken {
    pub fn ticket_type(&self) -> TicketTypeId {
        self.ticket_type
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }
}

/// Per-ticket-type slot: immutable catalog data plus the guarded counter.
#[derive(Debug)]
struct TicketSlot {
    ticket: TicketType,
    sold: Mutex<u32>,
}

impl TicketSlot {
    fn new(ticket: TicketType) -> Self {
        Self {
            ticket,
            sold: Mutex::new(0),
        }
    }

    /// Check-and-increment under the slot lock: a single atomic unit with
    /// respect to all other reserve/release calls on this ticket type.
    fn reserve(&self, quantity: u32) -> Result<(), InventoryError> {
        let mut sold = self.sold.lock();
        let wanted = sold
            .checked_add(quantity)
            .ok_or(InventoryError::Insufficient(self.ticket.id))?;
        if wanted > self.ticket.quantity_total {
            return Err(InventoryError::Insufficient(self.ticket.id));
        }
        *sold = wanted;
        self.assert_invariants(*sold);
        Ok(())
    }

    fn release(&self, quantity: u32) {
        let mut sold = self.sold.lock();
        debug_assert!(
            *sold >= quantity,
            "Invariant violated: releasing {} units with only {} sold",
            quantity,
            *sold
        );
        *sold = sold.saturating_sub(quantity);
        self.assert_invariants(*sold);
    }

    fn assert_invariants(&self, sold: u32) {
        debug_assert!(
            sold <= self.ticket.quantity_total,
            "Invariant violated: quantity_sold {} exceeds quantity_total {}",
            sold,
            self.ticket.quantity_total
        );
    }
}

/// Arena-style ledger keyed by ticket type, with a single mutation entry
/// point for the sold counter.
#[derive(Debug, Default)]
pub struct InventoryLedger {
    /// Ticket slots indexed by ticket type ID.
    slots: DashMap<TicketTypeId, TicketSlot>,
    /// Token IDs that have already been released (idempotence under retries).
    released: DashMap<u64, ()>,
    /// Next reservation token ID.
    next_token: AtomicU64,
}

impl InventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a ticket type. Called by event management; the ledger
    /// itself never creates or removes ticket types.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::DuplicateTicketType`] if the ID is taken.
    pub fn register(&self, ticket: TicketType) -> Result<(), InventoryError> {
        match self.slots.entry(ticket.id) {
            Entry::Occupied(_) => Err(InventoryError::DuplicateTicketType),
            Entry::Vacant(entry) => {
                entry.insert(TicketSlot::new(ticket));
                Ok(())
            }
        }
    }

    /// Returns a copy of the catalog data for a ticket type.
    pub fn ticket(&self, id: TicketTypeId) -> Option<TicketType> {
        self.slots.get(&id).map(|slot| slot.ticket.clone())
    }

    /// Units sold (reserved or paid) for a ticket type.
    pub fn quantity_sold(&self, id: TicketTypeId) -> Option<u32> {
        self.slots.get(&id).map(|slot| *slot.sold.lock())
    }

    /// Units still available for a ticket type.
    pub fn available(&self, id: TicketTypeId) -> Option<u32> {
        self.slots
            .get(&id)
            .map(|slot| slot.ticket.quantity_total - *slot.sold.lock())
    }

    /// Atomically reserves `quantity` units of a ticket type.
    ///
    /// Two concurrent requests for the last unit result in exactly one
    /// success and one [`InventoryError::Insufficient`].
    ///
    /// # Errors
    ///
    /// - [`InventoryError::UnknownTicketType`] - ID is not registered.
    /// - [`InventoryError::Insufficient`] - not enough unsold capacity;
    ///   no mutation is performed.
    pub fn reserve(
        &self,
        id: TicketTypeId,
        quantity: u32,
    ) -> Result<ReservationToken, InventoryError> {
        let slot = self.slots.get(&id).ok_or(InventoryError::UnknownTicketType)?;
        slot.reserve(quantity)?;
        Ok(ReservationToken {
            id: self.next_token.fetch_add(1, Ordering::Relaxed),
            ticket_type: id,
            quantity,
        })
    }

    /// Returns a token's quantity to the available pool.
    ///
    /// Idempotent per token: releasing an already-released token is a no-op,
    /// not an error, so compensating paths tolerate retries.
    pub fn release(&self, token: &ReservationToken) {
        // Atomic claim of the token ID; the loser of a concurrent double
        // release sees Occupied and leaves the counter alone.
        match self.released.entry(token.id) {
            Entry::Occupied(_) => return,
            Entry::Vacant(entry) => {
                entry.insert(());
            }
        }

        if let Some(slot) = self.slots.get(&token.ticket_type) {
            slot.release(token.quantity);
        }
    }
}
