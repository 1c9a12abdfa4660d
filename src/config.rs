//! 환경 변수 기반 설정 관리

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// 밀리초 단위 설정의 상한 (하루)
const MAX_DURATION_MS: u64 = 24 * 60 * 60 * 1000;

/// 서버 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
    pub room: RoomConfig,
    pub capture: CaptureConfig,
    pub upload: UploadConfig,
    pub backend: BackendConfig,
    pub ice: IceConfig,
    pub log_level: String,
}

/// 같은 역할로 두 번째 접속이 들어왔을 때의 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateRolePolicy {
    /// 새 연결이 기존 연결을 밀어낸다 (탭 새로고침 후 재접속)
    Evict,
    /// 기존 연결이 살아있으면 `RoleOccupied`로 거절
    Reject,
}

impl FromStr for DuplicateRolePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "evict" => Ok(Self::Evict),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown duplicate role policy: {other}")),
        }
    }
}

/// 방 설정
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub grace_period_ms: u64,
    pub ice_timeout_ms: u64,
    pub ice_buffer_capacity: usize,
    pub ice_buffer_ttl_ms: u64,
    pub duplicate_role_policy: DuplicateRolePolicy,
    pub max_renegotiations: u32,
}

impl RoomConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn ice_timeout(&self) -> Duration {
        Duration::from_millis(self.ice_timeout_ms)
    }

    pub fn ice_buffer_ttl(&self) -> Duration {
        Duration::from_millis(self.ice_buffer_ttl_ms)
    }
}

/// 캡처 및 아티팩트 조회 설정
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub artifact_poll_interval_ms: u64,
    pub artifact_poll_attempts: u32,
}

impl CaptureConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn artifact_poll_interval(&self) -> Duration {
        Duration::from_millis(self.artifact_poll_interval_ms)
    }
}

/// 업로드 파이프라인 설정
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl UploadConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// 호스팅 백엔드 (데이터 스토어 + 오브젝트 스토어)
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub service_key: String,
    pub artifact_table: String,
    pub storage_bucket: String,
}

impl BackendConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.service_key.is_empty()
    }
}

/// STUN/TURN 설정
#[derive(Debug, Clone)]
pub struct IceConfig {
    pub stun_servers: Vec<String>,
    pub turn_url: String,
    pub turn_secret: String,
    pub enable_tls: bool,
    pub port_udp: u16,
    pub port_tls: u16,
    pub credential_ttl: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3001,
            host: "0.0.0.0".to_string(),
            cors_origins: vec!["http://localhost:3000".to_string()],
            room: RoomConfig {
                grace_period_ms: 30_000,
                ice_timeout_ms: 20_000,
                ice_buffer_capacity: 50,
                ice_buffer_ttl_ms: 30_000,
                duplicate_role_policy: DuplicateRolePolicy::Evict,
                max_renegotiations: 1,
            },
            capture: CaptureConfig {
                enabled: true,
                interval_ms: 10_000,
                artifact_poll_interval_ms: 2_000,
                artifact_poll_attempts: 10,
            },
            upload: UploadConfig {
                max_attempts: 3,
                backoff_ms: 500,
                workers: 4,
                queue_capacity: 32,
            },
            backend: BackendConfig {
                url: String::new(),
                service_key: String::new(),
                artifact_table: "interview_artifacts".to_string(),
                storage_bucket: "pictures".to_string(),
            },
            ice: IceConfig {
                stun_servers: vec![
                    "stun:stun.l.google.com:19302".to_string(),
                    "stun:stun1.l.google.com:19302".to_string(),
                ],
                turn_url: String::new(),
                turn_secret: String::new(),
                enable_tls: false,
                port_udp: 3478,
                port_tls: 443,
                credential_ttl: 3600,
            },
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            port: parse_var("PORT", defaults.port),
            host: env::var("HOST").unwrap_or(defaults.host),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.cors_origins),
            room: RoomConfig {
                grace_period_ms: parse_millis("ROOM_GRACE_PERIOD_MS", defaults.room.grace_period_ms),
                ice_timeout_ms: parse_millis("ICE_TIMEOUT_MS", defaults.room.ice_timeout_ms),
                ice_buffer_capacity: parse_var(
                    "ICE_BUFFER_CAPACITY",
                    defaults.room.ice_buffer_capacity,
                ),
                ice_buffer_ttl_ms: parse_millis("ICE_BUFFER_TTL_MS", defaults.room.ice_buffer_ttl_ms),
                duplicate_role_policy: parse_var(
                    "DUPLICATE_ROLE_POLICY",
                    defaults.room.duplicate_role_policy,
                ),
                max_renegotiations: parse_var(
                    "MAX_RENEGOTIATIONS",
                    defaults.room.max_renegotiations,
                ),
            },
            capture: CaptureConfig {
                enabled: env::var("CAPTURE_ENABLED")
                    .map(|v| v != "false")
                    .unwrap_or(defaults.capture.enabled),
                interval_ms: parse_millis("CAPTURE_INTERVAL_MS", defaults.capture.interval_ms),
                artifact_poll_interval_ms: parse_millis(
                    "ARTIFACT_POLL_INTERVAL_MS",
                    defaults.capture.artifact_poll_interval_ms,
                ),
                artifact_poll_attempts: parse_var(
                    "ARTIFACT_POLL_ATTEMPTS",
                    defaults.capture.artifact_poll_attempts,
                ),
            },
            upload: UploadConfig {
                max_attempts: parse_var("UPLOAD_MAX_ATTEMPTS", defaults.upload.max_attempts),
                backoff_ms: parse_millis("UPLOAD_BACKOFF_MS", defaults.upload.backoff_ms),
                workers: parse_var("UPLOAD_WORKERS", defaults.upload.workers).max(1),
                queue_capacity: parse_var(
                    "UPLOAD_QUEUE_CAPACITY",
                    defaults.upload.queue_capacity,
                )
                .max(1),
            },
            backend: BackendConfig {
                url: env::var("SUPABASE_URL")
                    .map(|v| v.trim_end_matches('/').to_string())
                    .unwrap_or_default(),
                service_key: env::var("SUPABASE_SERVICE_KEY").unwrap_or_default(),
                artifact_table: env::var("ARTIFACT_TABLE")
                    .unwrap_or(defaults.backend.artifact_table),
                storage_bucket: env::var("STORAGE_BUCKET")
                    .unwrap_or(defaults.backend.storage_bucket),
            },
            ice: IceConfig {
                stun_servers: env::var("STUN_SERVERS")
                    .map(|v| split_list(&v))
                    .unwrap_or(defaults.ice.stun_servers),
                turn_url: env::var("TURN_SERVER_URL").unwrap_or_default(),
                turn_secret: env::var("TURN_SECRET").unwrap_or_default(),
                enable_tls: env::var("TURN_ENABLE_TLS")
                    .map(|v| v == "true")
                    .unwrap_or(defaults.ice.enable_tls),
                port_udp: parse_var("TURN_PORT_UDP", defaults.ice.port_udp),
                port_tls: parse_var("TURN_PORT_TLS", defaults.ice.port_tls),
                credential_ttl: parse_var("TURN_CREDENTIAL_TTL", defaults.ice.credential_ttl),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }
}

/// 값이 없거나 파싱에 실패하면 기본값 사용
fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// 밀리초 설정은 1ms ~ 하루로 자른다 (`Instant` 덧셈이 넘치지 않게)
fn parse_millis(key: &str, default: u64) -> u64 {
    clamp_millis(parse_var(key, default))
}

fn clamp_millis(value: u64) -> u64 {
    value.clamp(1, MAX_DURATION_MS)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_role_policy_parse() {
        assert_eq!(
            "evict".parse::<DuplicateRolePolicy>(),
            Ok(DuplicateRolePolicy::Evict)
        );
        assert_eq!(
            " Reject ".parse::<DuplicateRolePolicy>(),
            Ok(DuplicateRolePolicy::Reject)
        );
        assert!("replace".parse::<DuplicateRolePolicy>().is_err());
    }

    #[test]
    fn test_millis_are_clamped() {
        assert_eq!(clamp_millis(0), 1);
        assert_eq!(clamp_millis(20_000), 20_000);
        assert_eq!(clamp_millis(u64::MAX), MAX_DURATION_MS);

        std::env::set_var("TEST_CLAMPED_ICE_TIMEOUT_MS", u64::MAX.to_string());
        let timeout = parse_millis("TEST_CLAMPED_ICE_TIMEOUT_MS", 20_000);
        assert!(tokio::time::Instant::now()
            .checked_add(Duration::from_millis(timeout))
            .is_some());
    }

    #[test]
    fn test_split_list_skips_empty_entries() {
        assert_eq!(
            split_list("http://a.test, ,http://b.test,"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn test_defaults_match_interview_budgets() {
        let config = Config::default();
        assert_eq!(config.room.grace_period(), Duration::from_secs(30));
        assert_eq!(config.room.ice_timeout(), Duration::from_secs(20));
        assert_eq!(config.room.ice_buffer_capacity, 50);
        assert_eq!(config.capture.artifact_poll_attempts, 10);
        assert_eq!(config.upload.max_attempts, 3);
        assert_eq!(config.upload.workers, 4);
        assert!(!config.backend.is_configured());
    }
}
