//! Per-employee, per-year leave quota bookkeeping.
//!
//! The ledger knows nothing about approvals. It only reserves days for a
//! pending request, settles a reservation into consumption, releases it back
//! into the pool, or resizes the yearly total.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::leave::EmployeeId;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum QuotaError {
    #[error("insufficient quota for {employee_id} in {year}: requested {requested} day(s), {remaining} remaining")]
    Insufficient { employee_id: String, year: i32, requested: u32, remaining: u32 },
    #[error("new total {new_total} for {employee_id} in {year} is below committed days {committed} (used + pending)")]
    TotalBelowCommitted { employee_id: String, year: i32, new_total: u32, committed: u32 },
}

/// Ledger operation, recorded on audit events and logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaOperation {
    Reserve,
    Settle,
    Release,
    Resize,
}

impl QuotaOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reserve => "reserve",
            Self::Settle => "settle",
            Self::Release => "release",
            Self::Resize => "resize",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaBalance {
    pub employee_id: EmployeeId,
    pub year: i32,
    pub total: u32,
    pub used: u32,
    pub pending: u32,
    pub remaining: u32,
    pub updated_at: DateTime<Utc>,
}

impl QuotaBalance {
    /// A fresh entry for the year: nothing used or pending.
    pub fn seeded(employee_id: EmployeeId, year: i32, total: u32) -> Self {
        Self {
            employee_id,
            year,
            total,
            used: 0,
            pending: 0,
            remaining: total,
            updated_at: Utc::now(),
        }
    }

    pub fn is_balanced(&self) -> bool {
        u64::from(self.used) + u64::from(self.pending) + u64::from(self.remaining)
            == u64::from(self.total)
    }

    pub fn committed(&self) -> u32 {
        self.used.saturating_add(self.pending)
    }

    pub fn reserve(&mut self, days: u32) -> Result<(), QuotaError> {
        if self.remaining < days {
            return Err(QuotaError::Insufficient {
                employee_id: self.employee_id.0.clone(),
                year: self.year,
                requested: days,
                remaining: self.remaining,
            });
        }
        self.pending = self.pending.saturating_add(days);
        self.remaining -= days;
        self.touch();
        Ok(())
    }

    /// Converts a reservation into consumption. `pending` floors at zero so a
    /// ledger edited out of band never underflows; `used` still grows by the
    /// full `days`, which leaves such a ledger unbalanced.
    pub fn settle(&mut self, days: u32) {
        self.pending = self.pending.saturating_sub(days);
        self.used = self.used.saturating_add(days);
        self.touch();
    }

    /// Returns a reservation to the available pool, flooring `pending` at zero
    /// and crediting the full `days` to `remaining`.
    pub fn release(&mut self, days: u32) {
        self.pending = self.pending.saturating_sub(days);
        self.remaining = self.remaining.saturating_add(days);
        self.touch();
    }

    pub fn resize(&mut self, new_total: u32) -> Result<(), QuotaError> {
        let committed = self.committed();
        if new_total < committed {
            return Err(QuotaError::TotalBelowCommitted {
                employee_id: self.employee_id.0.clone(),
                year: self.year,
                new_total,
                committed,
            });
        }
        self.total = new_total;
        self.remaining = new_total - committed;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Administrative resize of a yearly total, kept as an audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaAdjustment {
    pub id: String,
    pub employee_id: EmployeeId,
    pub year: i32,
    pub previous_total: u32,
    pub new_total: u32,
    pub justification: String,
    pub actor_id: EmployeeId,
    pub adjusted_at: DateTime<Utc>,
}
