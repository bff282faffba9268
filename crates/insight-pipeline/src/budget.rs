use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Datelike, Utc};
use inference_client::TokenUsage;

/// Spend is tracked in micro-dollars in the low bits; the billing period
/// (`year * 12 + month0`) sits in the high bits so both change in one CAS.
const SPENT_BITS: u32 = 44;
const SPENT_MASK: u64 = (1 << SPENT_BITS) - 1;
const MICROS_PER_USD: f64 = 1_000_000.0;

fn period_of(now: DateTime<Utc>) -> u64 {
    now.year().max(0) as u64 * 12 + now.month0() as u64
}

fn pack(period: u64, spent: u64) -> u64 {
    (period << SPENT_BITS) | spent.min(SPENT_MASK)
}

fn unpack(state: u64) -> (u64, u64) {
    (state >> SPENT_BITS, state & SPENT_MASK)
}

fn to_micros(usd: f64) -> u64 {
    if usd.is_finite() && usd > 0.0 {
        (usd * MICROS_PER_USD).ceil() as u64
    } else {
        0
    }
}

/// Cost held against the budget for one inference call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a reservation must be settled or released"]
pub struct Reservation {
    micros: u64,
    period: u64,
}

impl Reservation {
    pub fn cost_usd(&self) -> f64 {
        self.micros as f64 / MICROS_PER_USD
    }
}

/// Process-wide monthly spend counter for inference calls.
///
/// Cost is reserved before a call from an estimate and corrected afterwards with the
/// usage the provider reports. The counter resets at the first reservation of a new
/// UTC calendar month.
pub struct MonthlyBudget {
    limit_micros: u64,
    cost_per_1k_tokens_usd: f64,
    state: AtomicU64,
    /// Period (+1) for which exhaustion was last logged
    exhausted_logged: AtomicU64,
}

impl MonthlyBudget {
    pub fn new(limit_usd: f64, cost_per_1k_tokens_usd: f64) -> Self {
        Self {
            limit_micros: to_micros(limit_usd),
            cost_per_1k_tokens_usd: cost_per_1k_tokens_usd.max(0.0),
            state: AtomicU64::new(pack(period_of(Utc::now()), 0)),
            exhausted_logged: AtomicU64::new(0),
        }
    }

    /// Roughly four characters per prompt token, plus the full completion allowance.
    pub fn estimate_cost_usd(&self, prompt_chars: usize, max_tokens: u32) -> f64 {
        let tokens = prompt_chars.div_ceil(4) as f64 + max_tokens as f64;
        tokens * self.cost_per_1k_tokens_usd / 1000.0
    }

    pub fn try_reserve(&self, cost_usd: f64) -> Option<Reservation> {
        self.try_reserve_at(cost_usd, Utc::now())
    }

    pub fn try_reserve_at(&self, cost_usd: f64, now: DateTime<Utc>) -> Option<Reservation> {
        let micros = to_micros(cost_usd);
        let period = period_of(now);

        loop {
            let current = self.state.load(Ordering::Acquire);
            let (stored_period, stored_spent) = unpack(current);
            // A clock that steps backwards keeps the newer period
            let (period, spent) = if period > stored_period {
                (period, 0)
            } else {
                (stored_period, stored_spent)
            };

            let next = spent.saturating_add(micros);
            if next > self.limit_micros {
                self.log_exhausted(period, spent);
                return None;
            }

            if self
                .state
                .compare_exchange_weak(current, pack(period, next), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if period != stored_period {
                    tracing::info!("Inference budget reset for a new billing period");
                }
                return Some(Reservation { micros, period });
            }
        }
    }

    /// Replace the estimate with the actual cost. Without reported usage the estimate
    /// stands. Returns the cost charged, in dollars.
    pub fn settle(&self, reservation: Reservation, usage: Option<TokenUsage>) -> f64 {
        let Some(usage) = usage else {
            return reservation.cost_usd();
        };
        let actual = to_micros(usage.total_tokens as f64 * self.cost_per_1k_tokens_usd / 1000.0);
        self.adjust(reservation.period, |spent| {
            spent.saturating_sub(reservation.micros).saturating_add(actual)
        });
        actual as f64 / MICROS_PER_USD
    }

    /// Return the whole reservation, for calls that never reached the provider.
    pub fn release(&self, reservation: Reservation) {
        self.adjust(reservation.period, |spent| spent.saturating_sub(reservation.micros));
    }

    fn adjust(&self, period: u64, f: impl Fn(u64) -> u64) {
        let _ = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            let (stored_period, spent) = unpack(current);
            // Reservations from a finished period no longer count
            if stored_period != period {
                return None;
            }
            Some(pack(period, f(spent)))
        });
    }

    fn spent_micros_at(&self, now: DateTime<Utc>) -> u64 {
        let (stored_period, spent) = unpack(self.state.load(Ordering::Acquire));
        if period_of(now) > stored_period {
            0
        } else {
            spent
        }
    }

    pub fn spent_usd(&self) -> f64 {
        self.spent_micros_at(Utc::now()) as f64 / MICROS_PER_USD
    }

    pub fn limit_usd(&self) -> f64 {
        self.limit_micros as f64 / MICROS_PER_USD
    }

    pub fn remaining_usd(&self) -> f64 {
        self.limit_micros.saturating_sub(self.spent_micros_at(Utc::now())) as f64 / MICROS_PER_USD
    }

    pub fn is_exhausted(&self) -> bool {
        self.spent_micros_at(Utc::now()) >= self.limit_micros
    }

    fn log_exhausted(&self, period: u64, spent: u64) {
        if self.exhausted_logged.swap(period + 1, Ordering::AcqRel) != period + 1 {
            tracing::warn!(
                "Monthly inference budget exhausted (${:.2} of ${:.2}); requests fall back until the next period",
                spent as f64 / MICROS_PER_USD,
                self.limit_usd()
            );
        }
    }
}
