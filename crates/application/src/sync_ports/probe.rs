use async_trait::async_trait;
use synccoord_core::AppResult;

/// Reachability check for one startup dependency.
#[async_trait]
pub trait DependencyProbe: Send + Sync {
    /// Dependency name used in logs.
    fn name(&self) -> &str;

    /// Succeeds when the dependency answers.
    async fn ping(&self) -> AppResult<()>;
}
