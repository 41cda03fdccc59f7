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

//! Orders and the order lifecycle.
//!
//! Implemented state machine:
//!
//  Pending ──confirm_payment──► Paid       (terminal)
//     │
//     └──────cancel───────────► Cancelled  (terminal, reservations released)
//!
//! Terminal states are never revisited; any transition out of `Paid` or
//! `Cancelled` fails with [`OrderError::InvalidTransition`] and mutates
//! nothing. This is what protects against double-counting on retried
//! payment notifications.

use crate::base::{CustomerId, EventId, OrderId, PaymentRef, TicketTypeId};
use crate::error::OrderError;
use crate::inventory::ReservationToken;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{label}")
    }
}

/// One line of an order: quantity of a ticket type at the unit price locked
/// in at purchase time. Later catalog price changes do not affect it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub ticket_type: TicketTypeId,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// Serializable point-in-time copy of an order, used by the journal and the
/// transport layer.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub customer: CustomerId,
    pub event: EventId,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
    pub gross_total: Decimal,
    pub net_total: Decimal,
    pub discount_code: Option<String>,
    pub status: OrderStatus,
    pub payment_ref: Option<PaymentRef>,
    pub cancel_reason: Option<String>,
}

#[derive(Debug)]
struct OrderData {
    id: OrderId,
    customer: CustomerId,
    event: EventId,
    created_at: DateTime<Utc>,
    lines: Vec<OrderLine>,
    gross_total: Decimal,
    net_total: Decimal,
    discount_code: Option<String>,
    status: OrderStatus,
    payment_ref: Option<PaymentRef>,
    cancel_reason: Option<String>,
    /// Reservation tokens held while pending; drained exactly once by the
    /// pending -> cancelled transition so the compensating release cannot
    /// run twice.
    reservations: Vec<ReservationToken>,
}

impl OrderData {
    fn confirm(&mut self, reference: &PaymentRef) -> Result<(), OrderError> {
        match self.status {
            OrderStatus::Pending => {
                match &self.payment_ref {
                    // First notification for an order whose checkout link
                    // was created out-of-band: record the reference now.
                    None => self.payment_ref = Some(reference.clone()),
                    Some(existing) if existing == reference => {}
                    Some(_) => return Err(OrderError::PaymentRefMismatch),
                }
                self.status = OrderStatus::Paid;
                Ok(())
            }
            OrderStatus::Paid | OrderStatus::Cancelled => Err(OrderError::InvalidTransition),
        }
    }

    fn cancel(&mut self, reason: &str) -> Result<Vec<ReservationToken>, OrderError> {
        match self.status {
            OrderStatus::Pending => {
                self.status = OrderStatus::Cancelled;
                self.cancel_reason = Some(reason.to_string());
                Ok(std::mem::take(&mut self.reservations))
            }
            OrderStatus::Paid | OrderStatus::Cancelled => Err(OrderError::InvalidTransition),
        }
    }

    fn attach_payment_ref(&mut self, reference: &PaymentRef) -> Result<(), OrderError> {
        if self.status != OrderStatus::Pending {
            return Err(OrderError::InvalidTransition);
        }
        match &self.payment_ref {
            None => {
                self.payment_ref = Some(reference.clone());
                Ok(())
            }
            Some(existing) if existing == reference => Ok(()),
            Some(_) => Err(OrderError::PaymentRefMismatch),
        }
    }
}

/// One purchase transaction by one customer.
///
/// Orders are append-only: they are created pending, transitioned at most
/// once into a terminal state, and never deleted.
#[derive(Debug)]
pub struct Order {
    inner: Mutex<OrderData>,
}

impl Order {
    const DECIMAL_PRECISION: u32 = 2;

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: OrderId,
        customer: CustomerId,
        event: EventId,
        created_at: DateTime<Utc>,
        lines: Vec<OrderLine>,
        gross_total: Decimal,
        net_total: Decimal,
        discount_code: Option<String>,
        reservations: Vec<ReservationToken>,
    ) -> Self {
        Self {
            inner: Mutex::new(OrderData {
                id,
                customer,
                event,
                created_at,
                lines,
                gross_total,
                net_total,
                discount_code,
                status: OrderStatus::Pending,
                payment_ref: None,
                cancel_reason: None,
                reservations,
            }),
        }
    }

    pub fn id(&self) -> OrderId {
        self.inner.lock().id
    }

    pub fn customer(&self) -> CustomerId {
        self.inner.lock().customer
    }

    pub fn event(&self) -> EventId {
        self.inner.lock().event
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.lock().created_at
    }

    pub fn status(&self) -> OrderStatus {
        self.inner.lock().status
    }

    pub fn gross_total(&self) -> Decimal {
        self.inner.lock().gross_total
    }

    pub fn net_total(&self) -> Decimal {
        self.inner.lock().net_total
    }

    pub fn discount_code(&self) -> Option<String> {
        self.inner.lock().discount_code.clone()
    }

    pub fn payment_ref(&self) -> Option<PaymentRef> {
        self.inner.lock().payment_ref.clone()
    }

    pub fn cancel_reason(&self) -> Option<String> {
        self.inner.lock().cancel_reason.clone()
    }

    pub fn lines(&self) -> Vec<OrderLine> {
        self.inner.lock().lines.clone()
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        let data = self.inner.lock();
        OrderSnapshot {
            id: data.id,
            customer: data.customer,
            event: data.event,
            created_at: data.created_at,
            lines: data.lines.clone(),
            gross_total: data.gross_total,
            net_total: data.net_total,
            discount_code: data.discount_code.clone(),
            status: data.status,
            payment_ref: data.payment_ref.clone(),
            cancel_reason: data.cancel_reason.clone(),
        }
    }

    /// Applies the pending -> paid transition. See module docs for the
    /// transition table.
    pub(crate) fn confirm_payment(&self, reference: &PaymentRef) -> Result<(), OrderError> {
        self.inner.lock().confirm(reference)
    }

    /// Applies the pending -> cancelled transition and hands the drained
    /// reservation tokens to the caller for the compensating release.
    pub(crate) fn cancel(&self, reason: &str) -> Result<Vec<ReservationToken>, OrderError> {
        self.inner.lock().cancel(reason)
    }

    /// Records the external payment reference, immutable once set.
    pub(crate) fn attach_payment_ref(&self, reference: &PaymentRef) -> Result<(), OrderError> {
        self.inner.lock().attach_payment_ref(reference)
    }
}

impl Serialize for Order {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.inner.lock();
        let mut state = serializer.serialize_struct("Order", 8)?;
        state.serialize_field("order", &data.id)?;
        state.serialize_field("customer", &data.customer)?;
        state.serialize_field("event", &data.event)?;
        state.serialize_field("status", &data.status)?;
        state.serialize_field(
            "gross",
            &data.gross_total.round_dp(Order::DECIMAL_PRECISION),
        )?;
        state.serialize_field("net", &data.net_total.round_dp(Order::DECIMAL_PRECISION))?;
        state.serialize_field("reference", &data.payment_ref)?;
        state.serialize_field("reason", &data.cancel_reason)?;
        state.end()
    }
}
