use async_trait::async_trait;

use crate::{AiInsight, CoreResult, PortfolioSnapshot, ScenarioDefinition, ScenarioResult, UserProfile};

/// External system of record for portfolios. Read-only from our side.
#[async_trait]
pub trait PortfolioStore: Send + Sync {
    async fn get_portfolio(&self, id: &str) -> CoreResult<PortfolioSnapshot>;
}

/// Identity/profile service supplying prompt-shaping preferences.
#[async_trait]
pub trait ProfileService: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> CoreResult<UserProfile>;
}

/// Downstream store for display. Written through, never read back.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save_result(&self, result: &ScenarioResult) -> CoreResult<()>;
    async fn save_insight(&self, portfolio_id: &str, insight: &AiInsight) -> CoreResult<()>;
}

/// Versioned source of scenario definitions.
pub trait ScenarioProvider: Send + Sync {
    fn catalog_version(&self) -> &str;
    fn get_scenario(&self, id: &str) -> CoreResult<&ScenarioDefinition>;
}
