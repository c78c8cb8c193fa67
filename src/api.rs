// src/api.rs
//! Backend that persists finished trails

use crate::error::{Result, TrailError};
use crate::export;
use crate::session::draft::{TrailRecord, TrailSubmission};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

#[async_trait]
pub trait TrailApi: Send + Sync {
    async fn create_trail(&self, submission: &TrailSubmission) -> Result<TrailRecord>;
}

/// HTTP client for the trails service
#[derive(Clone)]
pub struct HttpTrailApi {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTrailApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn check_response(&self, response: reqwest::Response) -> Result<TrailRecord> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                tracing::warn!(%status, "Trail backend rejected credentials");
            }
            return Err(TrailError::Submit(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| TrailError::Submit(format!("JSON parse error: {}", e)))
    }
}

#[async_trait]
impl TrailApi for HttpTrailApi {
    async fn create_trail(&self, submission: &TrailSubmission) -> Result<TrailRecord> {
        let url = format!("{}/trails", self.base_url);
        let mut request = self.http.post(&url).json(submission);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TrailError::Submit(format!("Request to {} failed: {}", url, e)))?;

        let record = self.check_response(response).await?;
        tracing::info!(id = %record.id, "Trail saved to backend");
        Ok(record)
    }
}

/// Keeps trails on local disk: `<dir>/<id>.json` plus a GPX copy
#[derive(Debug, Clone)]
pub struct ArchiveTrailApi {
    dir: PathBuf,
}

impl ArchiveTrailApi {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Every archived trail, newest first
    pub async fn list(&self) -> Result<Vec<TrailSubmission>> {
        let mut trails = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(trails),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<TrailSubmission>(&contents) {
                Ok(trail) => trails.push(trail),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable archive entry"),
            }
        }

        trails.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        Ok(trails)
    }
}

#[async_trait]
impl TrailApi for ArchiveTrailApi {
    async fn create_trail(&self, submission: &TrailSubmission) -> Result<TrailRecord> {
        let write = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            let json = serde_json::to_string_pretty(submission)?;
            tokio::fs::write(self.dir.join(format!("{}.json", submission.id)), json).await?;
            tokio::fs::write(
                self.dir.join(format!("{}.gpx", submission.id)),
                export::submission_gpx(submission),
            )
            .await?;
            Ok::<_, TrailError>(())
        };

        write
            .await
            .map_err(|e| TrailError::Submit(format!("Failed to archive trail: {}", e)))?;

        tracing::info!(id = %submission.id, dir = %self.dir.display(), "Trail archived");
        Ok(TrailRecord::from(submission))
    }
}
