//! Supabase (PostgREST + Storage) 어댑터

use super::{ArtifactStore, BackendError, ObjectStore};
use crate::config::BackendConfig;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, Response};
use serde::Deserialize;
use std::time::Duration;

pub struct SupabaseBackend {
    http: Client,
    base_url: String,
    service_key: String,
    artifact_table: String,
    bucket: String,
}

#[derive(Debug, Deserialize)]
struct ArtifactRow {
    id: serde_json::Value,
}

impl SupabaseBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http = Client::builder().timeout(Duration::from_secs(15)).build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            artifact_table: config.artifact_table.clone(),
            bucket: config.storage_bucket.clone(),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, key
        )
    }
}

/// 2xx가 아니면 본문을 담아 에러로
async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

/// 아티팩트 id 컬럼은 콤마로 이어진 목록일 수 있다. 마지막 것이 최신.
fn latest_artifact_id(raw: &serde_json::Value) -> Option<String> {
    let text = match raw {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

#[async_trait]
impl ArtifactStore for SupabaseBackend {
    async fn find_artifact_id(&self, interview_id: &str) -> Result<Option<String>, BackendError> {
        let url = format!("{}/rest/v1/{}", self.base_url, self.artifact_table);
        let filter = format!("eq.{interview_id}");
        let request = self.http.get(&url).query(&[
            ("select", "id"),
            ("interview_id", filter.as_str()),
            ("order", "created_at.desc"),
            ("limit", "1"),
        ]);

        let response = ensure_success(self.authorized(request).send().await?).await?;
        let rows: Vec<ArtifactRow> = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        Ok(rows.first().and_then(|row| latest_artifact_id(&row.id)))
    }

    async fn record_image_urls(
        &self,
        artifact_id: &str,
        urls: &[String],
    ) -> Result<(), BackendError> {
        let url = format!("{}/rest/v1/{}", self.base_url, self.artifact_table);
        let filter = format!("eq.{artifact_id}");
        let request = self
            .http
            .patch(&url)
            .query(&[("id", filter.as_str())])
            .header("Prefer", "return=minimal")
            .json(&serde_json::json!({ "image_url": urls.join(",") }));

        ensure_success(self.authorized(request).send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for SupabaseBackend {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<String, BackendError> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key);
        let request = self
            .http
            .post(&url)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CACHE_CONTROL, "max-age=3600")
            .header("x-upsert", "false")
            .body(body);

        ensure_success(self.authorized(request).send().await?).await?;
        Ok(self.public_url(key))
    }
}
