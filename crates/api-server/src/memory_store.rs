//! In-memory collaborators for running the server without external systems.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use scenario_core::{
    AiInsight, CoreResult, PortfolioSnapshot, PortfolioStore, ProfileService, ResultStore, ScenarioError,
    ScenarioResult, UserProfile,
};

/// Portfolio store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryPortfolioStore {
    portfolios: DashMap<String, PortfolioSnapshot>,
}

impl InMemoryPortfolioStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_portfolios(portfolios: impl IntoIterator<Item = PortfolioSnapshot>) -> Self {
        let store = Self::new();
        for portfolio in portfolios {
            store.insert(portfolio);
        }
        store
    }

    /// Load a JSON array of portfolio snapshots.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read portfolio seed file {}", path.display()))?;
        let portfolios: Vec<PortfolioSnapshot> = serde_json::from_str(&json)
            .with_context(|| format!("failed to parse portfolio seed file {}", path.display()))?;
        Ok(Self::with_portfolios(portfolios))
    }

    /// Insert or replace a snapshot. Returns the previous one.
    pub fn insert(&self, portfolio: PortfolioSnapshot) -> Option<PortfolioSnapshot> {
        self.portfolios.insert(portfolio.id.clone(), portfolio)
    }

    pub fn len(&self) -> usize {
        self.portfolios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portfolios.is_empty()
    }
}

#[async_trait]
impl PortfolioStore for InMemoryPortfolioStore {
    async fn get_portfolio(&self, id: &str) -> CoreResult<PortfolioSnapshot> {
        self.portfolios
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ScenarioError::PortfolioNotFound(id.to_string()))
    }
}

/// Keeps the latest result and insight per (portfolio, scenario).
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    results: DashMap<(String, String), ScenarioResult>,
    insights: DashMap<(String, String), AiInsight>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result(&self, portfolio_id: &str, scenario_id: &str) -> Option<ScenarioResult> {
        self.results
            .get(&(portfolio_id.to_string(), scenario_id.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn insight(&self, portfolio_id: &str, scenario_id: &str) -> Option<AiInsight> {
        self.insights
            .get(&(portfolio_id.to_string(), scenario_id.to_string()))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn save_result(&self, result: &ScenarioResult) -> CoreResult<()> {
        self.results.insert(
            (result.portfolio_id.clone(), result.scenario_id.clone()),
            result.clone(),
        );
        Ok(())
    }

    async fn save_insight(&self, portfolio_id: &str, insight: &AiInsight) -> CoreResult<()> {
        self.insights
            .insert((portfolio_id.to_string(), insight.scenario_id.clone()), insight.clone());
        Ok(())
    }
}

/// Profile lookup with a default for users it has never seen.
#[derive(Debug, Default)]
pub struct StaticProfileService {
    fallback: UserProfile,
    profiles: DashMap<String, UserProfile>,
}

impl StaticProfileService {
    pub fn new(fallback: UserProfile) -> Self {
        Self {
            fallback,
            profiles: DashMap::new(),
        }
    }

    pub fn set_profile(&self, user_id: impl Into<String>, profile: UserProfile) {
        self.profiles.insert(user_id.into(), profile);
    }
}

#[async_trait]
impl ProfileService for StaticProfileService {
    async fn get_profile(&self, user_id: &str) -> CoreResult<UserProfile> {
        Ok(self
            .profiles
            .get(user_id)
            .map(|entry| *entry.value())
            .unwrap_or(self.fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenario_core::{AssetCategory, AssetHolding, ExperienceLevel};
    use std::io::Write;

    fn snapshot(id: &str) -> PortfolioSnapshot {
        PortfolioSnapshot {
            id: id.to_string(),
            total_value: 1_000.0,
            currency: "USD".to_string(),
            holdings: vec![AssetHolding {
                symbol: "CASH".to_string(),
                asset_category: AssetCategory::Cash,
                allocation_percentage: 100.0,
                dollar_amount: 1_000.0,
                sector: String::new(),
                geographic_region: String::new(),
                risk_rating: 1,
            }],
        }
    }

    #[tokio::test]
    async fn test_unknown_portfolio_is_not_found() {
        let store = InMemoryPortfolioStore::with_portfolios([snapshot("a")]);
        assert_eq!(store.get_portfolio("a").await.unwrap().id, "a");
        assert_eq!(
            store.get_portfolio("b").await.unwrap_err(),
            ScenarioError::PortfolioNotFound("b".to_string())
        );
    }

    #[test]
    fn test_load_seed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&vec![snapshot("a"), snapshot("b")]).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let store = InMemoryPortfolioStore::from_path(file.path()).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_bad_seed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();
        assert!(InMemoryPortfolioStore::from_path(file.path()).is_err());
    }

    #[tokio::test]
    async fn test_profiles_fall_back_to_default() {
        let service = StaticProfileService::default();
        let advanced = UserProfile {
            experience_level: ExperienceLevel::Advanced,
            ..UserProfile::default()
        };
        service.set_profile("u1", advanced);

        assert_eq!(service.get_profile("u1").await.unwrap(), advanced);
        assert_eq!(service.get_profile("u2").await.unwrap(), UserProfile::default());
    }
}
