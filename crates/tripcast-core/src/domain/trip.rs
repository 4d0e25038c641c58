//! 자전거 여행(Trip) 도메인 타입.
//!
//! 재생 엔진이 방출하는 불변 이벤트 레코드. 시작 시각(`started_at`)이
//! 정렬 키입니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 이용자 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiderType {
    /// 정기권 회원
    Member,
    /// 일일권 이용자
    Casual,
}

impl Default for RiderType {
    fn default() -> Self {
        Self::Casual
    }
}

/// 대여소 정보.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// 대여소 ID
    pub id: String,
    /// 대여소 이름
    pub name: String,
    /// 위도
    pub lat: f64,
    /// 경도
    pub lng: f64,
}

impl Station {
    /// 새로운 대여소를 생성합니다.
    pub fn new(id: impl Into<String>, name: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lat,
            lng,
        }
    }
}

/// 자전거 여행 레코드.
///
/// 하나의 대여-반납 구간을 나타내는 불변 이벤트입니다. `id`가 없는
/// 레코드는 소비 측에서 안정적인 키를 합성합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// 여행 ID (원본 데이터에 없을 수 있음)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// 대여 시각
    pub started_at: DateTime<Utc>,
    /// 반납 시각
    pub ended_at: DateTime<Utc>,
    /// 출발 대여소
    pub start_station: Station,
    /// 도착 대여소
    pub end_station: Station,
    /// 이용자 유형
    pub rider_type: RiderType,
    /// 이용 시간 (초)
    pub duration_secs: i64,
}

impl Trip {
    /// 새로운 여행 레코드를 생성합니다.
    ///
    /// 이용 시간은 시작/종료 시각에서 계산됩니다.
    pub fn new(
        id: Option<String>,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        start_station: Station,
        end_station: Station,
        rider_type: RiderType,
    ) -> Self {
        let duration_secs = (ended_at - started_at).num_seconds().max(0);
        Self {
            id,
            started_at,
            ended_at,
            start_station,
            end_station,
            rider_type,
            duration_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn station(id: &str) -> Station {
        Station::new(id, format!("station-{}", id), 37.55, 126.97)
    }

    #[test]
    fn test_trip_duration() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 8, 12, 30).unwrap();

        let trip = Trip::new(
            None,
            start,
            end,
            station("ST-101"),
            station("ST-205"),
            RiderType::Member,
        );

        assert_eq!(trip.duration_secs, 750);
    }

    #[test]
    fn test_trip_duration_never_negative() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        let trip = Trip::new(
            None,
            start,
            end,
            station("ST-101"),
            station("ST-205"),
            RiderType::Casual,
        );

        assert_eq!(trip.duration_secs, 0);
    }

    #[test]
    fn test_trip_serde_roundtrip() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let trip = Trip::new(
            Some("trip-1".to_string()),
            start,
            start + chrono::Duration::minutes(10),
            station("ST-101"),
            station("ST-205"),
            RiderType::Member,
        );

        let json = serde_json::to_string(&trip).unwrap();
        assert!(json.contains("\"member\""));

        let parsed: Trip = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, trip);
    }

    #[test]
    fn test_trip_without_id_skips_field() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let trip = Trip::new(
            None,
            start,
            start + chrono::Duration::minutes(5),
            station("ST-101"),
            station("ST-205"),
            RiderType::Casual,
        );

        let json = serde_json::to_string(&trip).unwrap();
        assert!(!json.contains("\"id\""));
    }
}
