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

//! Discount codes and evaluation.
//!
//! [`DiscountBook::evaluate`] is pure: it validates a code against its event
//! scope, validity window, and usage cap, and computes the adjusted total.
//! Usage is consumed separately through [`DiscountBook::redeem`] so that
//! evaluation can run inside a saga that may still fail and roll back.

use crate::base::EventId;
use crate::error::DiscountError;
use chrono::NaiveDate;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// `value` is a percentage in [0, 100] taken off the gross total.
    Percentage,
    /// `value` is an absolute amount; the net total floors at zero.
    FixedAmount,
}

/// A promotional rule scoped to exactly one event.
///
/// The validity window is an inclusive date range; either bound may be
/// absent, meaning unbounded on that side. `max_usage` of `None` means
/// unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountCode {
    pub code: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub event_id: EventId,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub max_usage: Option<u32>,
}

impl DiscountCode {
    fn validity_covers(&self, as_of: NaiveDate) -> bool {
        self.valid_from.is_none_or(|from| as_of >= from)
            && self.valid_to.is_none_or(|to| as_of <= to)
    }

    fn apply(&self, gross: Decimal) -> Decimal {
        match self.kind {
            DiscountKind::Percentage => {
                gross * (Decimal::ONE_HUNDRED - self.value) / Decimal::ONE_HUNDRED
            }
            DiscountKind::FixedAmount => (gross - self.value).max(Decimal::ZERO),
        }
    }
}

#[derive(Debug)]
struct DiscountEntry {
    code: DiscountCode,
    used: AtomicU32,
}

/// Read-mostly discount catalog with per-code usage counting.
#[derive(Debug, Default)]
pub struct DiscountBook {
    codes: DashMap<String, DiscountEntry>,
}

impl DiscountBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a discount code.
    ///
    /// # Errors
    ///
    /// Returns [`DiscountError::InvalidValue`] for a percentage outside
    /// [0, 100] or a negative value, so invalid codes never enter the book.
    pub fn insert(&self, code: DiscountCode) -> Result<(), DiscountError> {
        let valid = match code.kind {
            DiscountKind::Percentage => {
                code.value >= Decimal::ZERO && code.value <= Decimal::ONE_HUNDRED
            }
            DiscountKind::FixedAmount => code.value >= Decimal::ZERO,
        };
        if !valid {
            return Err(DiscountError::InvalidValue);
        }
        self.codes.insert(
            code.code.clone(),
            DiscountEntry {
                code,
                used: AtomicU32::new(0),
            },
        );
        Ok(())
    }

    /// Validates `code` for `event_id` as of the given date and returns the
    /// adjusted total. Performs no mutation.
    ///
    /// # Errors
    ///
    /// - [`DiscountError::NotFound`] - no such code.
    /// - [`DiscountError::Expired`] - `as_of` outside the validity window.
    /// - [`DiscountError::WrongEvent`] - code scoped to a different event.
    /// - [`DiscountError::UsageExhausted`] - usage cap already reached.
    pub fn evaluate(
        &self,
        code: &str,
        event_id: EventId,
        gross: Decimal,
        as_of: NaiveDate,
    ) -> Result<Decimal, DiscountError> {
        let entry = self.codes.get(code).ok_or(DiscountError::NotFound)?;

        if !entry.code.validity_covers(as_of) {
            return Err(DiscountError::Expired);
        }
        if entry.code.event_id != event_id {
            return Err(DiscountError::WrongEvent);
        }
        if let Some(cap) = entry.code.max_usage
            && entry.used.load(Ordering::Acquire) >= cap
        {
            return Err(DiscountError::UsageExhausted);
        }

        Ok(entry.code.apply(gross))
    }

    /// Atomically consumes one usage of the code.
    ///
    /// The increment-if-below-cap is a single atomic step, so concurrent
    /// orders cannot push a code past its cap.
    ///
    /// # Errors
    ///
    /// - [`DiscountError::NotFound`] - no such code.
    /// - [`DiscountError::UsageExhausted`] - cap reached.
    pub fn redeem(&self, code: &str) -> Result<(), DiscountError> {
        let entry = self.codes.get(code).ok_or(DiscountError::NotFound)?;
        match entry.code.max_usage {
            None => {
                entry.used.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            Some(cap) => entry
                .used
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                    (used < cap).then_some(used + 1)
                })
                .map(|_| ())
                .map_err(|_| DiscountError::UsageExhausted),
        }
    }

    /// Returns one usage of the code (rollback or order cancellation).
    ///
    /// Refunding a code at zero usage is a no-op.
    pub fn refund(&self, code: &str) {
        if let Some(entry) = self.codes.get(code) {
            let _ = entry
                .used
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                    used.checked_sub(1)
                });
        }
    }

    /// Times the code has been redeemed (net of refunds).
    pub fn usage(&self, code: &str) -> Option<u32> {
        self.codes
            .get(code)
            .map(|entry| entry.used.load(Ordering::Acquire))
    }
}
