//! 외부 백엔드 협력자
//!
//! 인터뷰 아티팩트 레코드를 가진 데이터 스토어와, 캡처 이미지를 받는
//! 오브젝트 스토어. 둘 다 이 서버가 통제하지 못하고 언제든 실패할 수 있다.

pub mod supabase;

pub use supabase::SupabaseBackend;

use async_trait::async_trait;
use bytes::Bytes;

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// 인터뷰 아티팩트 레코드 조회/갱신
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// 아직 행이 만들어지지 않았으면 `Ok(None)`
    async fn find_artifact_id(&self, interview_id: &str) -> Result<Option<String>, BackendError>;

    /// 세션 동안 업로드된 이미지 URL을 아티팩트에 기록
    async fn record_image_urls(&self, artifact_id: &str, urls: &[String])
        -> Result<(), BackendError>;
}

/// 바이너리 업로드 후 영구 URL 반환
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<String, BackendError>;
}
