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

//! Payment reconciliation.
//!
//! The [`PaymentReconciler`] is the only writer path triggered by untrusted
//! input. Payment providers redeliver notifications freely, so every call is
//! treated as possibly duplicated or replayed: a notification that lands on
//! an order already in its terminal state is acknowledged as success, never
//! surfaced to the gateway as an error.

use crate::base::PaymentRef;
use crate::engine::BoxOffice;
use crate::error::{OrderError, ReconcileError};
use crate::order::{OrderSnapshot, OrderStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Failure reported by the external payment gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct GatewayError(pub String);

/// Checkout link minted by the gateway for a pending order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutLink {
    pub reference: PaymentRef,
    pub url: String,
}

/// Narrow interface to the external payment provider.
pub trait PaymentGateway: Send + Sync {
    /// Creates a hosted checkout for the order and returns the provider's
    /// reference for it.
    fn create_checkout_link(&self, order: &OrderSnapshot) -> Result<CheckoutLink, GatewayError>;

    /// Verifies a notification signature against its raw payload.
    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool;
}

/// Outcome reported by the provider for a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Settled,
    Failed,
}

/// Parsed payment notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub reference: PaymentRef,
    pub outcome: PaymentOutcome,
}

/// Verifies and applies inbound payment notifications.
pub struct PaymentReconciler {
    office: Arc<BoxOffice>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentReconciler {
    pub fn new(office: Arc<BoxOffice>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { office, gateway }
    }

    /// Handles one raw provider notification.
    ///
    /// Safe to re-invoke any number of times for the same reference;
    /// repetition has no effect beyond the first successful application.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::InvalidSignature`] - rejected before anything is
    ///   parsed or applied.
    /// - [`ReconcileError::MalformedPayload`] - payload is not a
    ///   notification.
    /// - [`ReconcileError::UnknownOrder`] - reference was never issued.
    pub fn handle_notification(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<(), ReconcileError> {
        if !self.gateway.verify_signature(payload, signature) {
            return Err(ReconcileError::InvalidSignature);
        }
        let notification: PaymentNotification =
            serde_json::from_slice(payload).map_err(|_| ReconcileError::MalformedPayload)?;
        self.apply(&notification)
    }

    /// Applies an already-verified notification.
    pub fn apply(&self, notification: &PaymentNotification) -> Result<(), ReconcileError> {
        let Some(order) = self.office.order_by_ref(&notification.reference) else {
            tracing::warn!(
                reference = %notification.reference,
                "notification references an unknown payment"
            );
            return Err(ReconcileError::UnknownOrder);
        };
        let order_id = order.id();

        let result = match notification.outcome {
            PaymentOutcome::Settled => {
                self.office.confirm_payment(order_id, &notification.reference)
            }
            PaymentOutcome::Failed => self.office.cancel_order(order_id, "payment failed"),
        };

        match result {
            Ok(()) => Ok(()),
            Err(OrderError::InvalidTransition) => {
                // Already terminal: a redelivered notification. The gateway
                // must see success, or it will retry forever.
                let status = order.status();
                let conflicting = matches!(
                    (status, notification.outcome),
                    (OrderStatus::Paid, PaymentOutcome::Failed)
                        | (OrderStatus::Cancelled, PaymentOutcome::Settled)
                );
                if conflicting {
                    tracing::warn!(
                        order = %order_id,
                        %status,
                        outcome = ?notification.outcome,
                        "notification conflicts with terminal order state"
                    );
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!(order = %order_id, error = %err, "notification not applied");
                Ok(())
            }
        }
    }
}

/// Deterministic gateway for tests, demos, and the CLI.
///
/// The signature is a keyed FNV-1a tag, a stand-in rather than a MAC; real
/// deployments verify through the provider's SDK behind [`PaymentGateway`].
#[derive(Debug)]
pub struct SharedSecretGateway {
    secret: String,
    next_ref: AtomicU64,
}

impl SharedSecretGateway {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            next_ref: AtomicU64::new(1),
        }
    }

    /// Computes the signature this gateway expects for a payload.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in self.secret.bytes().chain(payload.iter().copied()) {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        format!("{hash:016x}")
    }
}

impl PaymentGateway for SharedSecretGateway {
    fn create_checkout_link(&self, order: &OrderSnapshot) -> Result<CheckoutLink, GatewayError> {
        let serial = self.next_ref.fetch_add(1, Ordering::Relaxed);
        let reference = PaymentRef::new(format!("pay_{serial:06}"));
        Ok(CheckoutLink {
            url: format!("https://checkout.invalid/{}/{}", order.id, reference),
            reference,
        })
    }

    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool {
        signature == self.sign(payload)
    }
}
