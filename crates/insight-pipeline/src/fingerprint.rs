//! Deterministic cache/dedup keys.
//!
//! A fingerprint captures what an insight depends on at the resolution we are willing
//! to share: category allocation rounded to whole percent, portfolio value in 10%
//! geometric buckets, scenario, catalog version and the user's experience tier.
//! Individual symbols never enter the key.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use scenario_core::{AssetCategory, ExperienceLevel, PortfolioSnapshot};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Bump when the canonical form or the response grammar changes.
pub const FINGERPRINT_VERSION: u32 = 1;

/// Hex characters kept from the SHA-256 digest.
const KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
    pub key: String,
    pub allocation: BTreeMap<AssetCategory, i64>,
    pub value_bucket: i64,
    pub scenario_id: String,
    pub catalog_version: String,
    pub tier: ExperienceLevel,
}

/// Index of the 10% geometric bucket a portfolio value falls into.
pub fn value_bucket(total_value: f64) -> i64 {
    if !total_value.is_finite() || total_value <= 0.0 {
        return 0;
    }
    (total_value.ln() / 1.1f64.ln()).round() as i64
}

/// Category allocation rounded to whole percent, zero buckets dropped.
pub fn rounded_allocation(portfolio: &PortfolioSnapshot) -> BTreeMap<AssetCategory, i64> {
    portfolio
        .category_allocation()
        .into_iter()
        .map(|(category, pct)| (category, pct.round() as i64))
        .filter(|(_, pct)| *pct > 0)
        .collect()
}

impl Fingerprint {
    pub fn compute(
        portfolio: &PortfolioSnapshot,
        scenario_id: &str,
        catalog_version: &str,
        experience: ExperienceLevel,
    ) -> Self {
        Self::from_parts(
            rounded_allocation(portfolio),
            value_bucket(portfolio.total_value),
            scenario_id,
            catalog_version,
            experience,
        )
    }

    pub fn from_parts(
        allocation: BTreeMap<AssetCategory, i64>,
        value_bucket: i64,
        scenario_id: &str,
        catalog_version: &str,
        tier: ExperienceLevel,
    ) -> Self {
        let key = digest(&canonical(&allocation, value_bucket, scenario_id, catalog_version, tier));
        Self {
            key,
            allocation,
            value_bucket,
            scenario_id: scenario_id.to_string(),
            catalog_version: catalog_version.to_string(),
            tier,
        }
    }

    /// Fingerprints that differ only in the rounding buckets: the value bucket one step
    /// either way, or one percentage point moved between two categories.
    pub fn neighbours(&self) -> Vec<Fingerprint> {
        let mut out = Vec::new();
        for delta in [-1, 1] {
            out.push(self.with(self.allocation.clone(), self.value_bucket + delta));
        }

        for (&from, &from_pct) in &self.allocation {
            for to in AssetCategory::ALL {
                if to == from {
                    continue;
                }
                let mut allocation = self.allocation.clone();
                if from_pct <= 1 {
                    allocation.remove(&from);
                } else {
                    allocation.insert(from, from_pct - 1);
                }
                *allocation.entry(to).or_insert(0) += 1;
                out.push(self.with(allocation, self.value_bucket));
            }
        }
        out
    }

    fn with(&self, allocation: BTreeMap<AssetCategory, i64>, value_bucket: i64) -> Fingerprint {
        Fingerprint::from_parts(allocation, value_bucket, &self.scenario_id, &self.catalog_version, self.tier)
    }
}

fn canonical(
    allocation: &BTreeMap<AssetCategory, i64>,
    value_bucket: i64,
    scenario_id: &str,
    catalog_version: &str,
    tier: ExperienceLevel,
) -> String {
    let mut out = format!("v{}|alloc=", FINGERPRINT_VERSION);
    for (i, (category, pct)) in allocation.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}:{}", category.as_str(), pct);
    }
    let _ = write!(
        out,
        "|bucket={}|scenario={}|catalog={}|tier={}",
        value_bucket,
        scenario_id,
        catalog_version,
        tier.tier()
    );
    out
}

fn digest(canonical: &str) -> String {
    let hash = Sha256::digest(canonical.as_bytes());
    let mut hex = hex::encode(hash);
    hex.truncate(KEY_LEN);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_core::AssetHolding;

    fn portfolio(id: &str, total: f64, parts: &[(&str, AssetCategory, f64)]) -> PortfolioSnapshot {
        PortfolioSnapshot {
            id: id.to_string(),
            total_value: total,
            currency: "USD".into(),
            holdings: parts
                .iter()
                .map(|(symbol, category, pct)| AssetHolding {
                    symbol: symbol.to_string(),
                    asset_category: *category,
                    allocation_percentage: *pct,
                    dollar_amount: total * pct / 100.0,
                    sector: String::new(),
                    geographic_region: String::new(),
                    risk_rating: 5,
                })
                .collect(),
        }
    }

    #[test]
    fn test_symbols_and_ids_do_not_change_the_key() {
        let a = portfolio(
            "alice",
            100_000.0,
            &[("VTI", AssetCategory::DomesticEquity, 60.0), ("BND", AssetCategory::GovernmentBonds, 40.0)],
        );
        let b = portfolio(
            "bob",
            100_500.0,
            &[
                ("SPY", AssetCategory::DomesticEquity, 35.2),
                ("IVV", AssetCategory::DomesticEquity, 24.9),
                ("GOVT", AssetCategory::GovernmentBonds, 39.9),
            ],
        );
        let fa = Fingerprint::compute(&a, "rate-shock", "2024.1", ExperienceLevel::Beginner);
        let fb = Fingerprint::compute(&b, "rate-shock", "2024.1", ExperienceLevel::Beginner);
        assert_eq!(fa.key, fb.key);
        assert_eq!(fa.key.len(), 32);
    }

    #[test]
    fn test_every_component_changes_the_key() {
        let p = portfolio("p", 50_000.0, &[("VTI", AssetCategory::DomesticEquity, 100.0)]);
        let base = Fingerprint::compute(&p, "rate-shock", "2024.1", ExperienceLevel::Intermediate);

        let other_scenario = Fingerprint::compute(&p, "stagflation", "2024.1", ExperienceLevel::Intermediate);
        let other_catalog = Fingerprint::compute(&p, "rate-shock", "2024.2", ExperienceLevel::Intermediate);
        let other_tier = Fingerprint::compute(&p, "rate-shock", "2024.1", ExperienceLevel::Advanced);
        let bigger = portfolio("p", 80_000.0, &[("VTI", AssetCategory::DomesticEquity, 100.0)]);
        let other_value = Fingerprint::compute(&bigger, "rate-shock", "2024.1", ExperienceLevel::Intermediate);

        for other in [other_scenario, other_catalog, other_tier, other_value] {
            assert_ne!(base.key, other.key);
        }
    }

    #[test]
    fn test_value_buckets_are_ten_percent_wide() {
        assert_eq!(value_bucket(100_000.0), value_bucket(102_000.0));
        assert_eq!(value_bucket(100_000.0) + 1, value_bucket(110_000.0));
        assert_eq!(value_bucket(0.0), 0);
    }

    #[test]
    fn test_neighbours_cover_bucket_and_one_point_moves() {
        let p = portfolio(
            "p",
            100_000.0,
            &[("VTI", AssetCategory::DomesticEquity, 60.0), ("BND", AssetCategory::GovernmentBonds, 40.0)],
        );
        let fp = Fingerprint::compute(&p, "rate-shock", "2024.1", ExperienceLevel::Beginner);
        let neighbours = fp.neighbours();

        // 2 value moves + 2 populated categories x 10 destinations
        assert_eq!(neighbours.len(), 2 + 2 * 10);
        assert!(neighbours.iter().all(|n| n.key != fp.key));

        let shifted = portfolio(
            "q",
            100_000.0,
            &[("VTI", AssetCategory::DomesticEquity, 61.0), ("BND", AssetCategory::GovernmentBonds, 39.0)],
        );
        let shifted_fp = Fingerprint::compute(&shifted, "rate-shock", "2024.1", ExperienceLevel::Beginner);
        assert!(neighbours.iter().any(|n| n.key == shifted_fp.key));
    }
}
