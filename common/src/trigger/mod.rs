// Build trigger module
// Resolves which downstream build to fork and requests the rebuild

pub mod drone;

use crate::errors::TriggerError;
use async_trait::async_trait;

pub use drone::DroneTrigger;

/// BuildTrigger starts a downstream build for a repository branch
#[async_trait]
pub trait BuildTrigger: Send + Sync {
    /// Fork the most recent build of `branch` in `repo`, returning the forked build number
    async fn trigger(&self, repo: &str, branch: &str) -> Result<u64, TriggerError>;
}
