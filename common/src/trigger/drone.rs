// Drone build trigger
// Finds the newest build on a branch and requests a forked rebuild of it

use crate::errors::TriggerError;
use crate::http::HttpFetcher;
use crate::models::{BuildRecord, ConnectionSettings};
use crate::trigger::BuildTrigger;
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

/// DroneTrigger talks to `{host}/api/repos/{repo}/builds`
pub struct DroneTrigger {
    http: HttpFetcher,
    host: String,
    auth_key: String,
    max_lookback: u64,
}

impl DroneTrigger {
    pub fn new(http: HttpFetcher, connection: &ConnectionSettings) -> Self {
        Self {
            http,
            host: connection.drone_host.trim_end_matches('/').to_string(),
            auth_key: connection.auth_key.clone(),
            max_lookback: connection.max_lookback,
        }
    }

    fn builds_url(&self, repo: &str) -> String {
        format!("{}/api/repos/{}/builds", self.host, repo)
    }

    /// Fetch a build by number, or `latest`
    async fn fetch_build(&self, repo: &str, build: &str) -> Result<BuildRecord, TriggerError> {
        let url = format!("{}/{}", self.builds_url(repo), build);
        let body = self.http.get_text(&url, Some(&self.auth_key)).await?;

        serde_json::from_str(&body).map_err(|e| TriggerError::InvalidBuild {
            url,
            reason: e.to_string(),
        })
    }

    /// Walk backward from `latest.number - 1` until a build on `branch` turns up.
    ///
    /// At most `max_lookback` builds are fetched and build 1 is the floor.
    #[instrument(skip(self, latest), fields(latest = latest.number))]
    async fn search_backward(
        &self,
        repo: &str,
        branch: &str,
        latest: &BuildRecord,
    ) -> Result<u64, TriggerError> {
        let floor = latest.number.saturating_sub(self.max_lookback).max(1);
        let mut number = latest.number;
        let mut scanned = 0;

        while number > floor {
            number -= 1;
            scanned += 1;

            let build = self.fetch_build(repo, &number.to_string()).await?;
            debug!(build_number = build.number, build_branch = %build.branch, "Examined build");

            if build.branch == branch {
                return Ok(build.number);
            }
        }

        warn!(scanned, "No build found on branch within lookback window");
        Err(TriggerError::BranchNotFound {
            repo: repo.to_string(),
            branch: branch.to_string(),
            latest: latest.number,
            scanned,
        })
    }

    /// Pick the build number to fork for `branch`
    pub async fn resolve_build(&self, repo: &str, branch: &str) -> Result<u64, TriggerError> {
        let latest = self.fetch_build(repo, "latest").await?;

        if latest.branch == branch {
            return Ok(latest.number);
        }

        debug!(
            latest = latest.number,
            latest_branch = %latest.branch,
            "Latest build is on another branch, searching backward"
        );
        self.search_backward(repo, branch, &latest).await
    }
}

#[async_trait]
impl BuildTrigger for DroneTrigger {
    #[instrument(skip(self))]
    async fn trigger(&self, repo: &str, branch: &str) -> Result<u64, TriggerError> {
        let number = self.resolve_build(repo, branch).await?;

        let url = format!("{}/{}?fork=true", self.builds_url(repo), number);
        let status = self.http.post_empty(&url, Some(&self.auth_key)).await?;

        if !status.is_success() {
            return Err(TriggerError::Rejected {
                repo: repo.to_string(),
                number,
                status: status.as_u16(),
            });
        }

        info!(build_number = number, "Forked build");
        Ok(number)
    }
}
