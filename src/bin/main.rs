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

use boxoffice_rs::{
    BoxOffice, DiscountCode, OrderId, PaymentGateway, PaymentNotification, PaymentOutcome,
    PaymentReconciler, PurchaseRequest, SharedSecretGateway, TicketType,
};
use chrono::{Duration, Utc};
use clap::Parser;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Box Office - Replay ticket-sales scenarios
///
/// Reads a JSON-lines scenario file and outputs the final order table as CSV
/// to stdout. Supports ticket type and discount registration, purchases,
/// checkout creation, payment notifications, cancellations, and expiry
/// sweeps.
#[derive(Parser, Debug)]
#[command(name = "boxoffice-rs")]
#[command(about = "A ticket sales engine that replays scenario files", long_about = None)]
struct Args {
    /// Path to a JSON-lines scenario file
    ///
    /// One operation per line, e.g.:
    /// {"op":"purchase","customer":7,"event":1,"lines":[{"ticket_type":1,"quantity":2}]}
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Shared secret for signing and verifying scenario notifications
    #[arg(long, default_value = "scenario")]
    secret: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let office = match process_scenario(BufReader::new(file), &args.secret) {
        Ok(office) => office,
        Err(e) => {
            eprintln!("Error processing scenario: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_orders(&office, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// One line of a scenario file.
///
/// Internally tagged on `op`; registration ops carry the entity fields
/// inline.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ScenarioOp {
    /// Register a ticket type with the inventory ledger.
    TicketType(TicketType),
    /// Register a discount code.
    Discount(DiscountCode),
    /// Create an order.
    Purchase(PurchaseRequest),
    /// Create a checkout link for an order.
    Checkout { order: u64 },
    /// Deliver a signed payment notification.
    Notify {
        reference: String,
        outcome: PaymentOutcome,
    },
    /// Cancel an order explicitly.
    Cancel { order: u64, reason: String },
    /// Cancel pending orders older than the given TTL.
    Sweep { ttl_minutes: i64 },
}

/// Replays a scenario from a reader.
///
/// Each line is one JSON operation. Malformed lines and operations the
/// engine rejects are skipped (logged at debug level) so one bad line never
/// aborts a replay; the notification path runs through the reconciler with
/// a real signature so the verify branch is exercised too.
///
/// # Errors
///
/// Returns an I/O error if the reader itself fails.
pub fn process_scenario<R: Read>(reader: R, secret: &str) -> std::io::Result<Arc<BoxOffice>> {
    let office = Arc::new(BoxOffice::new());
    let gateway = Arc::new(SharedSecretGateway::new(secret));
    let reconciler =
        PaymentReconciler::new(Arc::clone(&office), Arc::clone(&gateway) as Arc<dyn PaymentGateway>);

    for line in BufReader::new(reader).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let op: ScenarioOp = match serde_json::from_str(&line) {
            Ok(op) => op,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed scenario line");
                continue;
            }
        };

        let result = match op {
            ScenarioOp::TicketType(ticket) => office
                .inventory()
                .register(ticket)
                .map_err(|e| e.to_string()),
            ScenarioOp::Discount(discount) => {
                office.discounts().insert(discount).map_err(|e| e.to_string())
            }
            ScenarioOp::Purchase(request) => office
                .create_order(request)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            ScenarioOp::Checkout { order } => office
                .open_checkout(gateway.as_ref(), OrderId(order))
                .map(|_| ())
                .map_err(|e| e.to_string()),
            ScenarioOp::Notify { reference, outcome } => {
                let notification = PaymentNotification {
                    reference: boxoffice_rs::PaymentRef::new(reference),
                    outcome,
                };
                serde_json::to_vec(&notification)
                    .map_err(|e| e.to_string())
                    .and_then(|payload| {
                        reconciler
                            .handle_notification(&payload, &gateway.sign(&payload))
                            .map_err(|e| e.to_string())
                    })
            }
            ScenarioOp::Cancel { order, reason } => office
                .cancel_order(OrderId(order), &reason)
                .map_err(|e| e.to_string()),
            ScenarioOp::Sweep { ttl_minutes } => {
                office.sweep_expired(Utc::now(), Duration::minutes(ttl_minutes));
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::debug!(error = %e, "skipping rejected operation");
        }
    }

    Ok(office)
}

/// Writes the final order table to a CSV writer.
///
/// Rows are sorted by order ID so replays produce stable output.
///
/// # CSV Format
///
/// Columns: `order, customer, event, status, gross, net, reference, reason`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_orders<W: Write>(office: &BoxOffice, writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut orders: Vec<_> = office.orders().collect();
    orders.sort_by_key(|order| order.id());

    for order in orders {
        wtr.serialize(order.as_ref())?;
    }

    wtr.flush()?;
    Ok(())
}
