//! 설정 관리.
//!
//! 이 모듈은 애플리케이션 설정을 정의하고 관리합니다.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 서버 설정
    pub server: ServerConfig,
    /// 재생 엔진 설정
    pub replay: ReplayConfig,
    /// 합성 피드 설정
    pub synthetic: SyntheticConfig,
    /// 클라이언트(리듀서) 설정
    pub client: ClientConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// 여행 로그 CSV 경로
    pub trips_csv: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3100,
            trips_csv: "data/trips.csv".to_string(),
        }
    }
}

/// 재생 엔진 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// 초기 재생 속도 배율 (0.1 ~ 50.0으로 클램프)
    pub speed: f64,
    /// 틱당 최대 배치 크기
    pub max_batch: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            max_batch: 5,
        }
    }
}

/// 합성 피드 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// 초기 속도 배율
    pub speed: f64,
    /// 방출을 멈추는 목표 누적 개수
    pub target_total: usize,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            target_total: 1000,
        }
    }
}

/// 클라이언트 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// 최근 여행 목록 최대 크기
    pub max_recent: usize,
    /// 동시 애니메이션 엔티티 상한
    pub max_active: usize,
    /// 엔티티 애니메이션 고정 길이 (밀리초)
    pub animation_duration_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_recent: 100,
            max_active: 500,
            animation_duration_ms: 3000,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없어도 기본값과 환경 변수만으로 동작합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            // 파일에서 로드 (없으면 건너뜀)
            .add_source(config::File::from(path.as_ref()).required(false))
            // 환경 변수로 오버라이드
            .add_source(
                config::Environment::with_prefix("TRIPCAST")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/default.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.server.port, 3100);
        assert_eq!(config.replay.max_batch, 5);
        assert_eq!(config.synthetic.target_total, 1000);
        assert_eq!(config.client.max_recent, 100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AppConfig::load("does/not/exist.toml").unwrap();
        assert_eq!(config.replay.speed, 1.0);
        assert_eq!(config.client.animation_duration_ms, 3000);
    }
}
