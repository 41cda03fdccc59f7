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

//! Error types for order processing, inventory, discounts, and reconciliation.

use crate::base::TicketTypeId;
use thiserror::Error;

/// Inventory ledger errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Referenced ticket type is not registered in the ledger
    #[error("unknown ticket type")]
    UnknownTicketType,

    /// A ticket type with the same ID is already registered
    #[error("duplicate ticket type ID")]
    DuplicateTicketType,

    /// Not enough unsold capacity to satisfy the reservation
    #[error("insufficient inventory for ticket type {0}")]
    Insufficient(TicketTypeId),
}

/// Discount lookup and evaluation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscountError {
    /// No discount registered under the supplied code
    #[error("discount code not found")]
    NotFound,

    /// The date of evaluation falls outside the code's validity window
    #[error("discount code expired or not yet valid")]
    Expired,

    /// The code is scoped to a different event
    #[error("discount code not valid for this event")]
    WrongEvent,

    /// The code's usage cap has been reached
    #[error("discount code usage cap reached")]
    UsageExhausted,

    /// Rejected at registration: percentage outside [0,100] or negative value
    #[error("invalid discount value")]
    InvalidValue,
}

/// Order creation and lifecycle errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// Purchase request contains no lines
    #[error("order contains no lines")]
    EmptyOrder,

    /// Line quantity is zero or exceeds the per-line cap
    #[error("invalid line quantity")]
    InvalidQuantity,

    /// Referenced ticket type does not belong to the requested event
    #[error("ticket type does not belong to this event")]
    TicketNotInEvent,

    /// Ticket type's sale window is closed at order time
    #[error("ticket type is not on sale")]
    TicketNotOnSale,

    /// Not enough unsold capacity for one of the requested lines
    #[error("insufficient inventory for ticket type {0}")]
    InsufficientInventory(TicketTypeId),

    /// Discount code was supplied but rejected
    #[error("discount rejected: {0}")]
    Discount(#[from] DiscountError),

    /// Referenced order does not exist
    #[error("order not found")]
    OrderNotFound,

    /// Attempted transition out of a terminal state
    #[error("invalid order state transition")]
    InvalidTransition,

    /// Supplied payment reference conflicts with the one already recorded
    #[error("payment reference mismatch")]
    PaymentRefMismatch,

    /// Order journal write failed; reservations were rolled back
    #[error("order persistence failed")]
    PersistenceFailed,

    /// Payment gateway refused to create a checkout link
    #[error("checkout creation failed: {0}")]
    CheckoutFailed(String),
}

/// Payment notification intake errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// Signature does not verify against the payload
    #[error("invalid notification signature")]
    InvalidSignature,

    /// Payload is not a well-formed payment notification
    #[error("malformed notification payload")]
    MalformedPayload,

    /// Notification references a payment the engine never issued
    #[error("unknown payment reference")]
    UnknownOrder,
}
