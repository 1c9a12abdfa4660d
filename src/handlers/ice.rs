//! ICE 서버 설정 핸들러 (STUN 목록 + TURN REST 자격증명)

use super::connection::Connection;
use crate::config::IceConfig;
use crate::protocol::{IceServer, ServerMessage};
use crate::state::AppState;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha1 = Hmac<Sha1>;

/// ICE 설정 요청 처리
pub fn handle_ice_config_request(state: &AppState, connection: &Connection, interview_id: &str) {
    let config = &state.config.ice;
    let ice_servers = build_ice_servers(config, interview_id, unix_now());

    connection.send(ServerMessage::IceConfig {
        interview_id: interview_id.to_string(),
        ice_servers,
        ttl: config.credential_ttl,
    });

    tracing::info!(interview_id = %interview_id, turn = !config.turn_url.is_empty(), "ICE config sent");
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// STUN은 항상, TURN은 URL과 시크릿이 모두 있을 때만
pub fn build_ice_servers(config: &IceConfig, interview_id: &str, now: u64) -> Vec<IceServer> {
    let mut servers = Vec::new();

    if !config.stun_servers.is_empty() {
        servers.push(IceServer {
            urls: config.stun_servers.clone(),
            username: None,
            credential: None,
        });
    }

    if config.turn_url.is_empty() || config.turn_secret.is_empty() {
        return servers;
    }

    // username = "<만료 시각>:<interview id>" (RFC 5766 TURN REST)
    let username = format!("{}:{}", now.saturating_add(config.credential_ttl), interview_id);
    let Some(credential) = turn_credential(&config.turn_secret, &username) else {
        tracing::warn!("Invalid TURN secret, TURN servers omitted");
        return servers;
    };

    let mut urls = vec![format!("turn:{}:{}", config.turn_url, config.port_udp)];
    if config.enable_tls {
        urls.push(format!(
            "turns:{}:{}?transport=tcp",
            config.turn_url, config.port_tls
        ));
    }
    servers.push(IceServer {
        urls,
        username: Some(username),
        credential: Some(credential),
    });

    servers
}

fn turn_credential(secret: &str, username: &str) -> Option<String> {
    let Ok(mut mac) = HmacSha1::new_from_slice(secret.as_bytes()) else {
        return None;
    };
    mac.update(username.as_bytes());
    Some(BASE64.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn turn_config() -> IceConfig {
        let mut config = Config::default().ice;
        config.turn_url = "turn.example.com".to_string();
        config.turn_secret = "s3cret".to_string();
        config
    }

    #[test]
    fn test_stun_only_without_turn() {
        let servers = build_ice_servers(&Config::default().ice, "R1", 1_000);

        assert_eq!(servers.len(), 1);
        assert_eq!(
            servers[0].urls,
            vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string()
            ]
        );
        assert!(servers[0].credential.is_none());
    }

    #[test]
    fn test_turn_credentials_are_time_limited() {
        let servers = build_ice_servers(&turn_config(), "R1", 1_000);
        let turn = &servers[1];

        // 만료 시각 = 발급 시각 + ttl
        assert_eq!(turn.username.as_deref(), Some("4600:R1"));
        assert_eq!(turn.urls, vec!["turn:turn.example.com:3478".to_string()]);
    }

    #[test]
    fn test_huge_credential_ttl_saturates() {
        let mut config = turn_config();
        config.credential_ttl = u64::MAX;
        let servers = build_ice_servers(&config, "R1", 1_000);

        assert_eq!(
            servers[1].username.as_deref(),
            Some(format!("{}:R1", u64::MAX).as_str())
        );
    }

    #[test]
    fn test_credential_is_hmac_of_username() {
        let a = turn_credential("s3cret", "4600:R1").unwrap();
        let b = turn_credential("s3cret", "4600:R2").unwrap();

        assert_ne!(a, b);
        // SHA-1 20바이트 → base64 28자
        assert_eq!(a.len(), 28);
        assert_eq!(turn_credential("s3cret", "4600:R1").unwrap(), a);
    }

    #[test]
    fn test_tls_adds_turns_url() {
        let mut config = turn_config();
        config.enable_tls = true;
        let servers = build_ice_servers(&config, "R1", 0);

        assert_eq!(
            servers[1].urls[1],
            "turns:turn.example.com:443?transport=tcp".to_string()
        );
    }
}
