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

//! Box office engine.
//!
//! The [`BoxOffice`] is the central component: it assembles orders against
//! live inventory, owns the order store and the payment-reference index, and
//! is the only entry point for lifecycle transitions.
//!
//! # Order Creation
//!
//! `create_order` runs a fail-fast saga: validate every line, reserve every
//! line, price, apply the discount, persist. Any failure after the first
//! reservation releases everything acquired so far; a request either
//! produces a fully persisted pending order or leaves no trace in the
//! inventory.
//!
//! # Thread Safety
//!
//! Orders and ticket slots live in [`DashMap`]s, so purchases for different
//! ticket types proceed in parallel while reservations on the same type
//! serialize on that slot's lock.

use crate::base::{OrderId, PaymentRef};
use crate::discount::DiscountBook;
use crate::error::{InventoryError, OrderError};
use crate::inventory::{InventoryLedger, ReservationToken};
use crate::journal::{MemoryJournal, OrderJournal};
use crate::order::{Order, OrderLine, OrderSnapshot, OrderStatus};
use crate::reconcile::{CheckoutLink, PaymentGateway};
use crate::{CustomerId, EventId, TicketTypeId};
use chrono::{DateTime, Duration, Utc};
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// One requested line of a purchase.
#[derive(Debug, Clone, Deserialize)]
pub struct LineRequest {
    pub ticket_type: TicketTypeId,
    pub quantity: u32,
}

/// A purchase request as it arrives from the transport layer, customer id
/// already authenticated by the identity collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    pub customer: CustomerId,
    pub event: EventId,
    pub lines: Vec<LineRequest>,
    #[serde(default)]
    pub discount_code: Option<String>,
}

/// Ticket sales engine managing inventory, discounts, and orders.
///
/// # Invariants
///
/// - `quantity_sold` never exceeds `quantity_total` for any ticket type,
///   under any interleaving of purchases and cancellations.
/// - An order reaches at most one terminal state, exactly once.
/// - Every reservation is either owned by a live pending/paid order or has
///   been released back to the ledger.
pub struct BoxOffice {
    /// Ticket inventory; sole owner of the sold counters.
    inventory: InventoryLedger,
    /// Discount catalog with usage counting.
    discounts: DiscountBook,
    /// Orders indexed by order ID. Append-only.
    orders: DashMap<OrderId, Arc<Order>>,
    /// External payment reference -> order ID, for webhook lookup.
    by_ref: DashMap<PaymentRef, OrderId>,
    /// FIFO queue of possibly-pending orders for the expiry sweep.
    pending: SegQueue<OrderId>,
    /// Durable audit sink.
    journal: Arc<dyn OrderJournal>,
    /// Next order ID.
    next_order: AtomicU64,
}

impl BoxOffice {
    /// Per-order cap on quantity per ticket type (policy constant).
    pub const PER_LINE_CAP: u32 = 5;

    /// Creates an engine with an in-memory journal.
    pub fn new() -> Self {
        Self::with_journal(Arc::new(MemoryJournal::new()))
    }

    /// Creates an engine writing order records to the given journal.
    pub fn with_journal(journal: Arc<dyn OrderJournal>) -> Self {
        Self {
            inventory: InventoryLedger::new(),
            discounts: DiscountBook::new(),
            orders: DashMap::new(),
            by_ref: DashMap::new(),
            pending: SegQueue::new(),
            journal,
            next_order: AtomicU64::new(1),
        }
    }

    /// The ticket inventory ledger (registration and read access).
    pub fn inventory(&self) -> &InventoryLedger {
        &self.inventory
    }

    /// The discount catalog (registration and read access).
    pub fn discounts(&self) -> &DiscountBook {
        &self.discounts
    }

    /// Retrieves an order by ID.
    pub fn get_order(&self, id: OrderId) -> Option<Arc<Order>> {
        self.orders.get(&id).map(|order| Arc::clone(order.value()))
    }

    /// Looks up an order by its external payment reference.
    pub fn order_by_ref(&self, reference: &PaymentRef) -> Option<Arc<Order>> {
        let id = *self.by_ref.get(reference)?;
        self.get_order(id)
    }

    /// Returns an iterator over all orders.
    pub fn orders(&self) -> impl Iterator<Item = Arc<Order>> + '_ {
        self.orders.iter().map(|entry| Arc::clone(entry.value()))
    }

    /// Creates an order timestamped with the current wall clock.
    pub fn create_order(&self, request: PurchaseRequest) -> Result<Arc<Order>, OrderError> {
        self.create_order_at(request, Utc::now())
    }

    /// Creates an order with an explicit clock.
    ///
    /// Validation is fail-fast (first violation wins) and fully compensated:
    /// no reservation and no discount usage survives a failed request.
    ///
    /// # Errors
    ///
    /// - [`OrderError::EmptyOrder`] - request has no lines.
    /// - [`OrderError::InvalidQuantity`] - a line quantity is zero or above
    ///   [`Self::PER_LINE_CAP`].
    /// - [`OrderError::TicketNotInEvent`] - unknown ticket type, or one
    ///   belonging to a different event.
    /// - [`OrderError::TicketNotOnSale`] - sale window closed at order time.
    /// - [`OrderError::InsufficientInventory`] - a line could not be
    ///   reserved; earlier reservations are rolled back.
    /// - [`OrderError::Discount`] - the supplied code was rejected.
    /// - [`OrderError::PersistenceFailed`] - journal append failed;
    ///   everything is rolled back.
    pub fn create_order_at(
        &self,
        request: PurchaseRequest,
        at: DateTime<Utc>,
    ) -> Result<Arc<Order>, OrderError> {
        if request.lines.is_empty() {
            return Err(OrderError::EmptyOrder);
        }

        // Validate all lines before touching any counter.
        let mut tickets = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            if line.quantity == 0 || line.quantity > Self::PER_LINE_CAP {
                return Err(OrderError::InvalidQuantity);
            }
            let ticket = self
                .inventory
                .ticket(line.ticket_type)
                .ok_or(OrderError::TicketNotInEvent)?;
            if ticket.event_id != request.event {
                return Err(OrderError::TicketNotInEvent);
            }
            if !ticket.sale_window.on_sale(at) {
                return Err(OrderError::TicketNotOnSale);
            }
            tickets.push(ticket);
        }

        // Reserve line by line, rolling back on the first failure.
        let mut reservations: Vec<ReservationToken> = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            match self.inventory.reserve(line.ticket_type, line.quantity) {
                Ok(token) => reservations.push(token),
                Err(err) => {
                    self.release_all(&reservations);
                    return Err(match err {
                        InventoryError::Insufficient(id) => OrderError::InsufficientInventory(id),
                        InventoryError::UnknownTicketType
                        | InventoryError::DuplicateTicketType => OrderError::TicketNotInEvent,
                    });
                }
            }
        }

        // Snapshot unit prices into the lines; later catalog price changes
        // must not affect this order.
        let lines: Vec<OrderLine> = request
            .lines
            .iter()
            .zip(&tickets)
            .map(|(line, ticket)| OrderLine {
                ticket_type: line.ticket_type,
                quantity: line.quantity,
                unit_price: ticket.unit_price,
            })
            .collect();
        let gross: Decimal = lines
            .iter()
            .map(|line| line.unit_price * Decimal::from(line.quantity))
            .sum();

        let net = match &request.discount_code {
            Some(code) => {
                match self
                    .discounts
                    .evaluate(code, request.event, gross, at.date_naive())
                {
                    Ok(net) => net,
                    Err(err) => {
                        self.release_all(&reservations);
                        return Err(OrderError::Discount(err));
                    }
                }
            }
            None => gross,
        };

        // Consume one usage; refunded if the saga fails past this point.
        if let Some(code) = &request.discount_code
            && let Err(err) = self.discounts.redeem(code)
        {
            self.release_all(&reservations);
            return Err(OrderError::Discount(err));
        }

        let id = OrderId(self.next_order.fetch_add(1, Ordering::Relaxed));
        let snapshot = OrderSnapshot {
            id,
            customer: request.customer,
            event: request.event,
            created_at: at,
            lines: lines.clone(),
            gross_total: gross,
            net_total: net,
            discount_code: request.discount_code.clone(),
            status: OrderStatus::Pending,
            payment_ref: None,
            cancel_reason: None,
        };
        if let Err(err) = self.journal.record(&snapshot) {
            tracing::warn!(order = %id, error = %err, "journal rejected order, rolling back");
            self.release_all(&reservations);
            if let Some(code) = &request.discount_code {
                self.discounts.refund(code);
            }
            return Err(OrderError::PersistenceFailed);
        }

        let order = Arc::new(Order::new(
            id,
            request.customer,
            request.event,
            at,
            lines,
            gross,
            net,
            request.discount_code,
            reservations,
        ));
        self.orders.insert(id, Arc::clone(&order));
        self.pending.push(id);
        Ok(order)
    }

    /// Creates a checkout link for a pending order and records the returned
    /// payment reference.
    ///
    /// No lock is held across the gateway call; a slow gateway never blocks
    /// another customer's reservation. Safe to retry: a gateway returning
    /// the same reference again is a no-op.
    ///
    /// # Errors
    ///
    /// - [`OrderError::OrderNotFound`] - no such order.
    /// - [`OrderError::CheckoutFailed`] - gateway refused; the order stays
    ///   pending and the call can be retried.
    /// - [`OrderError::InvalidTransition`] - order already terminal.
    /// - [`OrderError::PaymentRefMismatch`] - gateway returned a reference
    ///   conflicting with the one already recorded.
    pub fn open_checkout(
        &self,
        gateway: &dyn PaymentGateway,
        order_id: OrderId,
    ) -> Result<CheckoutLink, OrderError> {
        let order = self.get_order(order_id).ok_or(OrderError::OrderNotFound)?;

        let link = gateway
            .create_checkout_link(&order.snapshot())
            .map_err(|err| OrderError::CheckoutFailed(err.to_string()))?;

        order.attach_payment_ref(&link.reference)?;
        self.by_ref.entry(link.reference.clone()).or_insert(order_id);
        Ok(link)
    }

    /// Applies the pending -> paid transition.
    ///
    /// Inventory is untouched: the tickets were already reserved at
    /// creation.
    ///
    /// # Errors
    ///
    /// - [`OrderError::OrderNotFound`] - no such order.
    /// - [`OrderError::InvalidTransition`] - order already terminal.
    /// - [`OrderError::PaymentRefMismatch`] - reference conflicts with the
    ///   recorded one.
    pub fn confirm_payment(
        &self,
        order_id: OrderId,
        reference: &PaymentRef,
    ) -> Result<(), OrderError> {
        let order = self.get_order(order_id).ok_or(OrderError::OrderNotFound)?;
        order.confirm_payment(reference)?;
        self.by_ref.entry(reference.clone()).or_insert(order_id);
        self.journal_transition(&order);
        Ok(())
    }

    /// Applies the pending -> cancelled transition with compensating
    /// release.
    ///
    /// Every reservation held by the order returns to the ledger, and a
    /// redeemed discount usage is refunded. Explicit customer cancellation,
    /// gateway-reported failure, and the expiry sweep all go through here,
    /// so the release path exists exactly once.
    ///
    /// # Errors
    ///
    /// - [`OrderError::OrderNotFound`] - no such order.
    /// - [`OrderError::InvalidTransition`] - order already terminal.
    pub fn cancel_order(&self, order_id: OrderId, reason: &str) -> Result<(), OrderError> {
        let order = self.get_order(order_id).ok_or(OrderError::OrderNotFound)?;
        let tokens = order.cancel(reason)?;
        self.release_all(&tokens);
        if let Some(code) = order.discount_code() {
            self.discounts.refund(&code);
        }
        self.journal_transition(&order);
        Ok(())
    }

    /// Cancels pending orders older than `ttl`, returning how many were
    /// cancelled.
    ///
    /// The queue is FIFO by creation time, so the sweep stops at the first
    /// order that is still fresh; everything behind it is fresher still.
    pub fn sweep_expired(&self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let mut cancelled = 0;
        while let Some(order_id) = self.pending.pop() {
            let Some(order) = self.get_order(order_id) else {
                continue;
            };
            match order.status() {
                OrderStatus::Pending => {
                    if order.created_at() + ttl <= now {
                        if self.cancel_order(order_id, "payment link expired").is_ok() {
                            tracing::debug!(order = %order_id, "cancelled expired pending order");
                            cancelled += 1;
                        }
                    } else {
                        self.pending.push(order_id);
                        break;
                    }
                }
                // Terminal orders simply fall out of the queue.
                OrderStatus::Paid | OrderStatus::Cancelled => {}
            }
        }
        cancelled
    }

    fn release_all(&self, tokens: &[ReservationToken]) {
        for token in tokens {
            self.inventory.release(token);
        }
    }

    /// Transition records are best-effort: the state change is already
    /// applied, so a failed append is surfaced to operators, not callers.
    fn journal_transition(&self, order: &Order) {
        if let Err(err) = self.journal.record(&order.snapshot()) {
            tracing::error!(order = %order.id(), error = %err, "journal rejected transition record");
        }
    }
}

impl Default for BoxOffice {
    fn default() -> Self {
        Self::new()
    }
}
