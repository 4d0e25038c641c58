//! 피드 메시지 타입.
//!
//! 재생 엔진/합성 피드와 소비자 사이에 교환되는 메시지 정의.
//! 메시지는 닫힌 합 타입이므로 리듀서의 누락된 분기를 컴파일러가 잡아냅니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tripcast_core::Trip;

/// 피드 에러.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("잘못된 메시지 형식: {0}")]
    InvalidMessage(String),
    #[error("직렬화 실패: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// 재생 진행률.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayProgress {
    /// 현재 커서 위치
    pub current: usize,
    /// 전체 이벤트 수
    pub total: usize,
    /// 진행 퍼센트 (0~100, 반올림)
    pub percentage: u8,
}

impl ReplayProgress {
    /// 커서 위치에서 진행률을 계산합니다.
    pub fn new(current: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            ((current as f64 / total as f64) * 100.0).round() as u8
        };
        Self {
            current,
            total,
            percentage,
        }
    }

    /// 완료된 진행률 (100%).
    pub fn complete(total: usize) -> Self {
        Self {
            current: total,
            total,
            percentage: 100,
        }
    }
}

// ==================== 피드 → 소비자 메시지 ====================

/// 피드에서 소비자로 브로드캐스트되는 메시지.
///
/// 합성 피드도 동일한 어휘를 사용하므로 소비자는 메시지 형태만으로
/// 피드 출처를 구분할 수 없습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    /// 새로 방출된 여행 배치
    NewTrips {
        /// 이번 틱에 방출된 여행들
        trips: Vec<Trip>,
        /// 재생 진행률
        progress: ReplayProgress,
        /// 메시지 생성 시각
        timestamp: DateTime<Utc>,
    },
    /// 세션 시작
    SessionStarted {
        /// 전체 이벤트 수
        total: usize,
        /// 메시지 생성 시각
        timestamp: DateTime<Utc>,
    },
    /// 세션 일시정지
    SessionPaused {
        /// 메시지 생성 시각
        timestamp: DateTime<Utc>,
    },
    /// 세션 재개
    SessionResumed {
        /// 메시지 생성 시각
        timestamp: DateTime<Utc>,
    },
    /// 세션 정지
    SessionStopped {
        /// 메시지 생성 시각
        timestamp: DateTime<Utc>,
    },
    /// 재생 완료
    SessionComplete {
        /// 최종 진행률 (100%)
        progress: ReplayProgress,
        /// 메시지 생성 시각
        timestamp: DateTime<Utc>,
    },
    /// 속도 변경
    SpeedChanged {
        /// 클램프된 새 속도
        speed: f64,
        /// 메시지 생성 시각
        timestamp: DateTime<Utc>,
    },
}

impl FeedMessage {
    /// 새 여행 배치 메시지 생성.
    pub fn new_trips(trips: Vec<Trip>, progress: ReplayProgress) -> Self {
        Self::NewTrips {
            trips,
            progress,
            timestamp: Utc::now(),
        }
    }

    /// 세션 시작 메시지 생성.
    pub fn session_started(total: usize) -> Self {
        Self::SessionStarted {
            total,
            timestamp: Utc::now(),
        }
    }

    /// 세션 일시정지 메시지 생성.
    pub fn session_paused() -> Self {
        Self::SessionPaused {
            timestamp: Utc::now(),
        }
    }

    /// 세션 재개 메시지 생성.
    pub fn session_resumed() -> Self {
        Self::SessionResumed {
            timestamp: Utc::now(),
        }
    }

    /// 세션 정지 메시지 생성.
    pub fn session_stopped() -> Self {
        Self::SessionStopped {
            timestamp: Utc::now(),
        }
    }

    /// 재생 완료 메시지 생성.
    pub fn session_complete(total: usize) -> Self {
        Self::SessionComplete {
            progress: ReplayProgress::complete(total),
            timestamp: Utc::now(),
        }
    }

    /// 속도 변경 메시지 생성.
    pub fn speed_changed(speed: f64) -> Self {
        Self::SpeedChanged {
            speed,
            timestamp: Utc::now(),
        }
    }

    /// 메시지 생성 시각.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::NewTrips { timestamp, .. }
            | Self::SessionStarted { timestamp, .. }
            | Self::SessionPaused { timestamp }
            | Self::SessionResumed { timestamp }
            | Self::SessionStopped { timestamp }
            | Self::SessionComplete { timestamp, .. }
            | Self::SpeedChanged { timestamp, .. } => *timestamp,
        }
    }

    /// JSON 문자열로 직렬화.
    pub fn to_json(&self) -> Result<String, FeedError> {
        serde_json::to_string(self).map_err(FeedError::from)
    }

    /// JSON 문자열에서 파싱.
    pub fn from_json(json: &str) -> Result<Self, FeedError> {
        serde_json::from_str(json).map_err(|e| FeedError::InvalidMessage(e.to_string()))
    }
}

// ==================== 소비자 → 피드 메시지 ====================

/// 소비자가 피드로 보내는 제어 명령.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlCommand {
    /// 재생 시작
    Start,
    /// 일시정지
    Pause,
    /// 재개
    Resume,
    /// 정지
    Stop,
    /// 속도 변경
    SetSpeed {
        /// 요청 속도 (수신 측에서 클램프)
        speed: f64,
    },
    /// 핑 (연결 유지)
    Ping,
}

impl ControlCommand {
    /// JSON 문자열로 직렬화.
    pub fn to_json(&self) -> Result<String, FeedError> {
        serde_json::to_string(self).map_err(FeedError::from)
    }

    /// JSON 문자열에서 파싱.
    pub fn from_json(json: &str) -> Result<Self, FeedError> {
        serde_json::from_str(json).map_err(|e| FeedError::InvalidMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tripcast_core::{RiderType, Station, Trip};

    fn sample_trip() -> Trip {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        Trip::new(
            Some("trip-1".to_string()),
            start,
            start + chrono::Duration::minutes(12),
            Station::new("ST-101", "여의나루역 1번출구", 37.527, 126.932),
            Station::new("ST-205", "뚝섬유원지역", 37.529, 127.069),
            RiderType::Member,
        )
    }

    #[test]
    fn test_progress_percentage_rounding() {
        assert_eq!(ReplayProgress::new(1, 3).percentage, 33);
        assert_eq!(ReplayProgress::new(2, 3).percentage, 67);
        assert_eq!(ReplayProgress::new(0, 0).percentage, 0);
        assert_eq!(ReplayProgress::complete(10).percentage, 100);
    }

    #[test]
    fn test_new_trips_serialization() {
        let msg = FeedMessage::new_trips(vec![sample_trip()], ReplayProgress::new(1, 10));
        let json = msg.to_json().unwrap();

        assert!(json.contains("\"type\":\"new_trips\""));
        assert!(json.contains("여의나루역"));

        let parsed = FeedMessage::from_json(&json).unwrap();
        assert!(matches!(parsed, FeedMessage::NewTrips { .. }));
    }

    #[test]
    fn test_tag_only_messages() {
        let json = FeedMessage::session_paused().to_json().unwrap();
        assert!(json.contains("\"type\":\"session_paused\""));

        let parsed = FeedMessage::from_json(&json).unwrap();
        assert!(matches!(parsed, FeedMessage::SessionPaused { .. }));
    }

    #[test]
    fn test_invalid_message_is_error() {
        let err = FeedMessage::from_json("{\"type\": \"warp_drive\"}").unwrap_err();
        assert!(matches!(err, FeedError::InvalidMessage(_)));
    }

    #[test]
    fn test_control_command_roundtrip() {
        let json = r#"{"type": "set_speed", "speed": 2.5}"#;
        let cmd = ControlCommand::from_json(json).unwrap();
        assert_eq!(cmd, ControlCommand::SetSpeed { speed: 2.5 });

        let json = ControlCommand::Start.to_json().unwrap();
        assert!(json.contains("\"start\""));
    }

    #[test]
    fn test_timestamp_is_rfc3339_on_wire() {
        let json = FeedMessage::session_started(42).to_json().unwrap();
        // chrono의 기본 직렬화는 RFC 3339
        assert!(json.contains("T"));
        assert!(json.contains("\"total\":42"));
    }
}
