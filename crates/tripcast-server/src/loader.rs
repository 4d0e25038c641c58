//! 여행 로그 CSV 로더.
//!
//! 공공 자전거 이용 내역 내보내기 형식을 읽습니다. 열 구성:
//! `id,started_at,ended_at,start_id,start_name,start_lat,start_lng,
//! end_id,end_name,end_lat,end_lng,rider_type`
//!
//! 시각은 RFC 3339 또는 `YYYY-MM-DD HH:MM:SS`(UTC로 간주)를 허용합니다.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;

use tripcast_core::{RiderType, Station, Trip};

use crate::error::{ServerError, ServerResult};

/// CSV 파일에서 여행 레코드를 로드합니다.
///
/// 헤더와 열 수가 부족한 줄은 건너뜁니다. 시각 파싱 실패는 줄 번호와
/// 함께 에러로 반환합니다.
pub fn load_trips_csv(path: impl AsRef<Path>) -> ServerResult<Vec<Trip>> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let trips = parse_trips_csv(&content)?;

    debug!(
        path = %path.as_ref().display(),
        count = trips.len(),
        "Trip log loaded"
    );
    Ok(trips)
}

/// CSV 텍스트를 여행 레코드로 파싱합니다.
pub fn parse_trips_csv(content: &str) -> ServerResult<Vec<Trip>> {
    let mut trips = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        // 헤더 건너뛰기
        if line_no == 0 && line.contains("started_at") {
            continue;
        }

        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() < 12 {
            continue;
        }

        let started_at = parse_timestamp(parts[1], line_no + 1)?;
        let ended_at = parse_timestamp(parts[2], line_no + 1)?;

        let id = if parts[0].is_empty() {
            None
        } else {
            Some(parts[0].to_string())
        };

        let start_station = Station::new(
            parts[3],
            parts[4],
            parts[5].parse().unwrap_or_default(),
            parts[6].parse().unwrap_or_default(),
        );
        let end_station = Station::new(
            parts[7],
            parts[8],
            parts[9].parse().unwrap_or_default(),
            parts[10].parse().unwrap_or_default(),
        );

        let rider_type = match parts[11].to_lowercase().as_str() {
            "member" => RiderType::Member,
            _ => RiderType::Casual,
        };

        trips.push(Trip::new(
            id,
            started_at,
            ended_at,
            start_station,
            end_station,
            rider_type,
        ));
    }

    Ok(trips)
}

fn parse_timestamp(value: &str, line: usize) -> ServerResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| ServerError::TripParse {
            line,
            reason: format!("invalid timestamp '{}': {}", value, e),
        })
}
