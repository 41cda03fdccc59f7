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

//! # Box Office
//!
//! This library provides a ticket sales engine: concurrent inventory
//! reservation, discount pricing, and reconciliation of orders against
//! asynchronous payment-provider notifications.
//!
//! ## Core Components
//!
//! - [`BoxOffice`]: Central engine assembling orders and driving their
//!   lifecycle
//! - [`InventoryLedger`]: Per-ticket-type counters with atomic
//!   reserve/release
//! - [`DiscountBook`]: Discount validation, pricing, and usage counting
//! - [`Order`]: A purchase with a pending/paid/cancelled state machine
//! - [`PaymentReconciler`]: Idempotent intake of provider notifications
//!
//! ## Example
//!
//! ```
//! use boxoffice_rs::{
//!     BoxOffice, CustomerId, EventId, LineRequest, OrderStatus, PurchaseRequest, SaleWindow,
//!     TicketType, TicketTypeId,
//! };
//! use rust_decimal_macros::dec;
//!
//! let office = BoxOffice::new();
//! office
//!     .inventory()
//!     .register(TicketType {
//!         id: TicketTypeId(1),
//!         event_id: EventId(1),
//!         label: "Standard".into(),
//!         unit_price: dec!(45.00),
//!         quantity_total: 200,
//!         sale_window: SaleWindow::always(),
//!     })
//!     .unwrap();
//!
//! let order = office
//!     .create_order(PurchaseRequest {
//!         customer: CustomerId(7),
//!         event: EventId(1),
//!         lines: vec![LineRequest {
//!             ticket_type: TicketTypeId(1),
//!             quantity: 2,
//!         }],
//!         discount_code: None,
//!     })
//!     .unwrap();
//!
//! assert_eq!(order.status(), OrderStatus::Pending);
//! assert_eq!(order.net_total(), dec!(90.00));
//! ```
//!
//! ## Thread Safety
//!
//! All engine operations take `&self` and are safe to call from any number
//! of request-handling threads. Reservations on the same ticket type are a
//! single atomic check-and-increment, so concurrent purchases can never
//! oversell a ticket type.

mod base;
pub mod discount;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod journal;
pub mod order;
pub mod reconcile;

pub use base::{CustomerId, EventId, OrderId, PaymentRef, TicketTypeId};
pub use discount::{DiscountBook, DiscountCode, DiscountKind};
pub use engine::{BoxOffice, LineRequest, PurchaseRequest};
pub use error::{DiscountError, InventoryError, OrderError, ReconcileError};
pub use inventory::{InventoryLedger, ReservationToken, SaleWindow, TicketType};
pub use journal::{JournalError, MemoryJournal, OrderJournal};
pub use order::{Order, OrderLine, OrderSnapshot, OrderStatus};
pub use reconcile::{
    CheckoutLink, GatewayError, PaymentGateway, PaymentNotification, PaymentOutcome,
    PaymentReconciler, SharedSecretGateway,
};
