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

//! BoxOffice public API integration tests.

use boxoffice_rs::{
    BoxOffice, CustomerId, DiscountCode, DiscountError, DiscountKind, EventId, JournalError,
    LineRequest, MemoryJournal, OrderError, OrderJournal, OrderSnapshot, OrderStatus,
    PaymentNotification, PaymentOutcome, PaymentReconciler, PurchaseRequest, SaleWindow,
    SharedSecretGateway, TicketType, TicketTypeId,
};
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn register_ticket(office: &BoxOffice, id: u32, event: u32, price: Decimal, total: u32) {
    office
        .inventory()
        .register(TicketType {
            id: TicketTypeId(id),
            event_id: EventId(event),
            label: format!("type-{id}"),
            unit_price: price,
            quantity_total: total,
            sale_window: SaleWindow::always(),
        })
        .unwrap();
}

fn register_discount(office: &BoxOffice, code: &str, kind: DiscountKind, value: Decimal) {
    office
        .discounts()
        .insert(DiscountCode {
            code: code.into(),
            kind,
            value,
            event_id: EventId(1),
            valid_from: None,
            valid_to: None,
            max_usage: None,
        })
        .unwrap();
}

fn purchase(customer: u32, event: u32, lines: &[(u32, u32)]) -> PurchaseRequest {
    PurchaseRequest {
        customer: CustomerId(customer),
        event: EventId(event),
        lines: lines
            .iter()
            .map(|&(ticket_type, quantity)| LineRequest {
                ticket_type: TicketTypeId(ticket_type),
                quantity,
            })
            .collect(),
        discount_code: None,
    }
}

fn purchase_with_code(
    customer: u32,
    event: u32,
    lines: &[(u32, u32)],
    code: &str,
) -> PurchaseRequest {
    PurchaseRequest {
        discount_code: Some(code.into()),
        ..purchase(customer, event, lines)
    }
}

// === Order assembly ===

#[test]
fn create_order_reserves_and_prices() {
    let office = BoxOffice::new();
    register_ticket(&office, 1, 1, dec!(40.00), 10);
    register_ticket(&office, 2, 1, dec!(90.00), 5);

    let order = office
        .create_order(purchase(7, 1, &[(1, 2), (2, 1)]))
        .unwrap();

    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(order.gross_total(), dec!(170.00));
    assert_eq!(order.net_total(), dec!(170.00));
    assert_eq!(office.inventory().quantity_sold(TicketTypeId(1)), Some(2));
    assert_eq!(office.inventory().quantity_sold(TicketTypeId(2)), Some(1));

    // Unit prices are snapshotted into the lines
    let lines = order.lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].unit_price, dec!(40.00));
    assert_eq!(lines[1].unit_price, dec!(90.00));
}

#[test]
fn empty_order_rejected() {
    let office = BoxOffice::new();
    let result = office.create_order(purchase(7, 1, &[]));
    assert_eq!(result.unwrap_err(), OrderError::EmptyOrder);
}

#[test]
fn zero_quantity_rejected() {
    let office = BoxOffice::new();
    register_ticket(&office, 1, 1, dec!(40.00), 10);

    let result = office.create_order(purchase(7, 1, &[(1, 0)]));
    assert_eq!(result.unwrap_err(), OrderError::InvalidQuantity);
}

#[test]
fn quantity_above_cap_rejected() {
    let office = BoxOffice::new();
    register_ticket(&office, 1, 1, dec!(40.00), 100);

    let result = office.create_order(purchase(7, 1, &[(1, BoxOffice::PER_LINE_CAP + 1)]));
    assert_eq!(result.unwrap_err(), OrderError::InvalidQuantity);
    assert_eq!(office.inventory().quantity_sold(TicketTypeId(1)), Some(0));
}

#[test]
fn ticket_from_other_event_rejected() {
    let office = BoxOffice::new();
    register_ticket(&office, 1, 1, dec!(40.00), 10);
    register_ticket(&office, 2, 2, dec!(40.00), 10);

    let result = office.create_order(purchase(7, 1, &[(2, 1)]));
    assert_eq!(result.unwrap_err(), OrderError::TicketNotInEvent);
}

#[test]
fn unknown_ticket_type_rejected() {
    let office = BoxOffice::new();
    let result = office.create_order(purchase(7, 1, &[(99, 1)]));
    assert_eq!(result.unwrap_err(), OrderError::TicketNotInEvent);
}

#[test]
fn ticket_outside_sale_window_rejected() {
    let office = BoxOffice::new();
    let opens = Utc.with_ymd_and_hms(2026, 9, 1, 10, 0, 0).unwrap();
    office
        .inventory()
        .register(TicketType {
            id: TicketTypeId(1),
            event_id: EventId(1),
            label: "Early bird".into(),
            unit_price: dec!(25.00),
            quantity_total: 50,
            sale_window: SaleWindow::between(Some(opens), None),
        })
        .unwrap();

    let before = opens - Duration::hours(1);
    let result = office.create_order_at(purchase(7, 1, &[(1, 1)]), before);
    assert_eq!(result.unwrap_err(), OrderError::TicketNotOnSale);

    // On the opening instant the purchase goes through
    assert!(office.create_order_at(purchase(7, 1, &[(1, 1)]), opens).is_ok());
}

#[test]
fn insufficient_inventory_names_the_ticket_type() {
    let office = BoxOffice::new();
    register_ticket(&office, 1, 1, dec!(40.00), 1);

    let result = office.create_order(purchase(7, 1, &[(1, 2)]));
    assert_eq!(
        result.unwrap_err(),
        OrderError::InsufficientInventory(TicketTypeId(1))
    );
}

#[test]
fn failed_line_rolls_back_earlier_reservations() {
    let office = BoxOffice::new();
    register_ticket(&office, 1, 1, dec!(40.00), 10);
    register_ticket(&office, 2, 1, dec!(90.00), 1);

    let result = office.create_order(purchase(7, 1, &[(1, 3), (2, 2)]));
    assert_eq!(
        result.unwrap_err(),
        OrderError::InsufficientInventory(TicketTypeId(2))
    );

    // Line 1's reservation was released
    assert_eq!(office.inventory().quantity_sold(TicketTypeId(1)), Some(0));
    assert_eq!(office.inventory().quantity_sold(TicketTypeId(2)), Some(0));
}

// === Discounts ===

#[test]
fn percentage_discount_applied() {
    let office = BoxOffice::new();
    register_ticket(&office, 1, 1, dec!(50.00), 10);
    register_discount(&office, "SAVE10", DiscountKind::Percentage, dec!(10));

    let order = office
        .create_order(purchase_with_code(7, 1, &[(1, 2)], "SAVE10"))
        .unwrap();

    assert_eq!(order.gross_total(), dec!(100.00));
    assert_eq!(order.net_total(), dec!(90.00));
    assert_eq!(order.discount_code(), Some("SAVE10".to_string()));
}

#[test]
fn fixed_discount_floors_at_zero() {
    let office = BoxOffice::new();
    register_ticket(&office, 1, 1, dec!(15.00), 10);
    register_discount(&office, "TWENTY", DiscountKind::FixedAmount, dec!(20));

    let order = office
        .create_order(purchase_with_code(7, 1, &[(1, 1)], "TWENTY"))
        .unwrap();

    assert_eq!(order.net_total(), Decimal::ZERO);
}

#[test]
fn missing_code_passes_through() {
    let office = BoxOffice::new();
    register_ticket(&office, 1, 1, dec!(50.00), 10);

    let order = office.create_order(purchase(7, 1, &[(1, 1)])).unwrap();
    assert_eq!(order.net_total(), order.gross_total());
}

#[test]
fn rejected_discount_rolls_back_reservations() {
    let office = BoxOffice::new();
    register_ticket(&office, 1, 1, dec!(50.00), 10);

    let result = office.create_order(purchase_with_code(7, 1, &[(1, 2)], "NOPE"));
    assert_eq!(
        result.unwrap_err(),
        OrderError::Discount(DiscountError::NotFound)
    );
    assert_eq!(office.inventory().quantity_sold(TicketTypeId(1)), Some(0));
}

#[test]
fn discount_expiry_boundary() {
    let office = BoxOffice::new();
    register_ticket(&office, 1, 1, dec!(50.00), 10);
    office
        .discounts()
        .insert(DiscountCode {
            code: "JUNE".into(),
            kind: DiscountKind::Percentage,
            value: dec!(10),
            event_id: EventId(1),
            valid_from: None,
            valid_to: Some(chrono::NaiveDate::from_ymd_opt(2026, 6, 30).unwrap()),
            max_usage: None,
        })
        .unwrap();

    // Accepted on the last valid day
    let last_day = Utc.with_ymd_and_hms(2026, 6, 30, 23, 0, 0).unwrap();
    let order = office
        .create_order_at(purchase_with_code(7, 1, &[(1, 1)], "JUNE"), last_day)
        .unwrap();
    assert_eq!(order.net_total(), dec!(45.00));

    // Rejected the day after
    let next_day = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
    let result = office.create_order_at(purchase_with_code(8, 1, &[(1, 1)], "JUNE"), next_day);
    assert_eq!(
        result.unwrap_err(),
        OrderError::Discount(DiscountError::Expired)
    );
}

#[test]
fn usage_cap_limits_orders() {
    let office = BoxOffice::new();
    register_ticket(&office, 1, 1, dec!(50.00), 10);
    office
        .discounts()
        .insert(DiscountCode {
            code: "ONCE".into(),
            kind: DiscountKind::Percentage,
            value: dec!(50),
            event_id: EventId(1),
            valid_from: None,
            valid_to: None,
            max_usage: Some(1),
        })
        .unwrap();

    office
        .create_order(purchase_with_code(7, 1, &[(1, 1)], "ONCE"))
        .unwrap();

    let result = office.create_order(purchase_with_code(8, 1, &[(1, 1)], "ONCE"));
    assert_eq!(
        result.unwrap_err(),
        OrderError::Discount(DiscountError::UsageExhausted)
    );
    // The failed order's reservation was rolled back
    assert_eq!(office.inventory().quantity_sold(TicketTypeId(1)), Some(1));
}

#[test]
fn cancellation_refunds_discount_usage() {
    let office = BoxOffice::new();
    register_ticket(&office, 1, 1, dec!(50.00), 10);
    office
        .discounts()
        .insert(DiscountCode {
            code: "ONCE".into(),
            kind: DiscountKind::Percentage,
            value: dec!(50),
            event_id: EventId(1),
            valid_from: None,
            valid_to: None,
            max_usage: Some(1),
        })
        .unwrap();

    let order = office
        .create_order(purchase_with_code(7, 1, &[(1, 1)], "ONCE"))
        .unwrap();
    office.cancel_order(order.id(), "customer request").unwrap();

    // The slot freed up again
    assert!(
        office
            .create_order(purchase_with_code(8, 1, &[(1, 1)], "ONCE"))
            .is_ok()
    );
}

// === Persistence ===

struct FailingJournal;

impl OrderJournal for FailingJournal {
    fn record(&self, _snapshot: &OrderSnapshot) -> Result<(), JournalError> {
        Err(JournalError("disk full".into()))
    }
}

#[test]
fn persistence_failure_rolls_back_everything() {
    let office = BoxOffice::with_journal(Arc::new(FailingJournal));
    register_ticket(&office, 1, 1, dec!(50.00), 10);
    office
        .discounts()
        .insert(DiscountCode {
            code: "ONCE".into(),
            kind: DiscountKind::Percentage,
            value: dec!(10),
            event_id: EventId(1),
            valid_from: None,
            valid_to: None,
            max_usage: Some(1),
        })
        .unwrap();

    let result = office.create_order(purchase_with_code(7, 1, &[(1, 2)], "ONCE"));
    assert_eq!(result.unwrap_err(), OrderError::PersistenceFailed);

    // Reservations and discount usage both rolled back
    assert_eq!(office.inventory().quantity_sold(TicketTypeId(1)), Some(0));
    assert_eq!(office.discounts().usage("ONCE"), Some(0));
}

#[test]
fn journal_records_creation_and_transitions() {
    let journal = Arc::new(MemoryJournal::new());
    let office = BoxOffice::with_journal(Arc::clone(&journal) as Arc<dyn OrderJournal>);
    register_ticket(&office, 1, 1, dec!(50.00), 10);

    let order = office.create_order(purchase(7, 1, &[(1, 1)])).unwrap();
    office.cancel_order(order.id(), "customer request").unwrap();

    let entries = journal.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].status, OrderStatus::Pending);
    assert_eq!(entries[1].status, OrderStatus::Cancelled);
}

// === Lifecycle ===

#[test]
fn checkout_and_confirm_flow() {
    let office = BoxOffice::new();
    let gateway = SharedSecretGateway::new("s3cret");
    register_ticket(&office, 1, 1, dec!(50.00), 10);

    let order = office.create_order(purchase(7, 1, &[(1, 1)])).unwrap();
    let link = office.open_checkout(&gateway, order.id()).unwrap();
    assert_eq!(order.payment_ref(), Some(link.reference.clone()));

    office.confirm_payment(order.id(), &link.reference).unwrap();
    assert_eq!(order.status(), OrderStatus::Paid);
    // Inventory untouched by confirmation
    assert_eq!(office.inventory().quantity_sold(TicketTypeId(1)), Some(1));
}

#[test]
fn terminal_transitions_are_rejected() {
    let office = BoxOffice::new();
    let gateway = SharedSecretGateway::new("s3cret");
    register_ticket(&office, 1, 1, dec!(50.00), 10);

    let order = office.create_order(purchase(7, 1, &[(1, 2)])).unwrap();
    let link = office.open_checkout(&gateway, order.id()).unwrap();
    office.confirm_payment(order.id(), &link.reference).unwrap();

    // Double confirm and late cancel both refuse
    assert_eq!(
        office
            .confirm_payment(order.id(), &link.reference)
            .unwrap_err(),
        OrderError::InvalidTransition
    );
    assert_eq!(
        office.cancel_order(order.id(), "too late").unwrap_err(),
        OrderError::InvalidTransition
    );
    // No double release happened
    assert_eq!(office.inventory().quantity_sold(TicketTypeId(1)), Some(2));
}

#[test]
fn cancellation_releases_inventory() {
    let office = BoxOffice::new();
    register_ticket(&office, 1, 1, dec!(50.00), 2);

    let order = office.create_order(purchase(7, 1, &[(1, 2)])).unwrap();
    assert_eq!(office.inventory().quantity_sold(TicketTypeId(1)), Some(2));

    office.cancel_order(order.id(), "changed my mind").unwrap();
    assert_eq!(office.inventory().quantity_sold(TicketTypeId(1)), Some(0));

    // The freed capacity is immediately reservable
    assert!(office.create_order(purchase(8, 1, &[(1, 2)])).is_ok());
}

#[test]
fn double_cancel_does_not_double_release() {
    let office = BoxOffice::new();
    register_ticket(&office, 1, 1, dec!(50.00), 5);

    let order = office.create_order(purchase(7, 1, &[(1, 2)])).unwrap();
    office.cancel_order(order.id(), "first").unwrap();
    assert_eq!(
        office.cancel_order(order.id(), "second").unwrap_err(),
        OrderError::InvalidTransition
    );

    assert_eq!(office.inventory().quantity_sold(TicketTypeId(1)), Some(0));
    assert_eq!(order.cancel_reason(), Some("first".to_string()));
}

#[test]
fn unknown_order_reported() {
    let office = BoxOffice::new();
    let result = office.cancel_order(boxoffice_rs::OrderId(42), "nope");
    assert_eq!(result.unwrap_err(), OrderError::OrderNotFound);
}

// === Expiry sweep ===

#[test]
fn sweep_cancels_only_expired_pending_orders() {
    let office = BoxOffice::new();
    register_ticket(&office, 1, 1, dec!(50.00), 10);

    let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
    let stale = office
        .create_order_at(purchase(7, 1, &[(1, 1)]), now - Duration::minutes(45))
        .unwrap();
    let fresh = office
        .create_order_at(purchase(8, 1, &[(1, 1)]), now - Duration::minutes(5))
        .unwrap();

    let cancelled = office.sweep_expired(now, Duration::minutes(30));
    assert_eq!(cancelled, 1);
    assert_eq!(stale.status(), OrderStatus::Cancelled);
    assert_eq!(stale.cancel_reason(), Some("payment link expired".to_string()));
    assert_eq!(fresh.status(), OrderStatus::Pending);

    // The stale order's ticket went back on sale
    assert_eq!(office.inventory().quantity_sold(TicketTypeId(1)), Some(1));
}

#[test]
fn sweep_skips_paid_orders() {
    let office = BoxOffice::new();
    let gateway = SharedSecretGateway::new("s3cret");
    register_ticket(&office, 1, 1, dec!(50.00), 10);

    let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
    let order = office
        .create_order_at(purchase(7, 1, &[(1, 1)]), now - Duration::hours(2))
        .unwrap();
    let link = office.open_checkout(&gateway, order.id()).unwrap();
    office.confirm_payment(order.id(), &link.reference).unwrap();

    let cancelled = office.sweep_expired(now, Duration::minutes(30));
    assert_eq!(cancelled, 0);
    assert_eq!(order.status(), OrderStatus::Paid);
}

// === End-to-end scenario ===

#[test]
fn two_buyers_one_ticket_then_webhook_replay() {
    let office = Arc::new(BoxOffice::new());
    register_ticket(&office, 1, 1, dec!(99.00), 1);

    // Two concurrent orders race for the last unit
    let mut handles = Vec::new();
    for customer in [1u32, 2u32] {
        let office = Arc::clone(&office);
        handles.push(std::thread::spawn(move || {
            office.create_order(purchase(customer, 1, &[(1, 1)]))
        }));
    }
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    let losers: Vec<_> = results.iter().filter(|r| r.is_err()).collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(losers.len(), 1);
    assert_eq!(
        *losers[0].as_ref().unwrap_err(),
        OrderError::InsufficientInventory(TicketTypeId(1))
    );

    // The winner settles through the reconciler
    let gateway = Arc::new(SharedSecretGateway::new("s3cret"));
    let order = winners[0].as_ref().unwrap();
    let link = office.open_checkout(gateway.as_ref(), order.id()).unwrap();

    let reconciler = PaymentReconciler::new(Arc::clone(&office), gateway.clone());
    let payload = serde_json::to_vec(&PaymentNotification {
        reference: link.reference.clone(),
        outcome: PaymentOutcome::Settled,
    })
    .unwrap();
    let signature = gateway.sign(&payload);

    reconciler.handle_notification(&payload, &signature).unwrap();
    assert_eq!(order.status(), OrderStatus::Paid);

    // Replaying the exact same payload surfaces no error and changes nothing
    reconciler.handle_notification(&payload, &signature).unwrap();
    assert_eq!(order.status(), OrderStatus::Paid);
    assert_eq!(office.inventory().quantity_sold(TicketTypeId(1)), Some(1));
}
