//! 시간순 정렬된 여행 로그.
//!
//! 생성 시점에 한 번만 시작 시각 기준으로 정렬되며 이후 읽기 전용입니다.
//! 재생 커서는 엔진 쪽 상태이며 로그 자체는 커서를 갖지 않습니다.

use chrono::{DateTime, Utc};

use super::Trip;

/// 시작 시각 오름차순으로 정렬된 여행 로그.
///
/// 동일한 시작 시각을 가진 레코드는 입력 순서를 유지합니다(안정 정렬).
#[derive(Debug, Clone, Default)]
pub struct TripLog {
    trips: Vec<Trip>,
}

impl TripLog {
    /// 호출자가 제공한 배열에서 로그를 생성합니다.
    ///
    /// 순서가 뒤섞인 입력도 허용되며 여기서 한 번만 정렬합니다.
    pub fn new(mut trips: Vec<Trip>) -> Self {
        trips.sort_by_key(|t| t.started_at);
        Self { trips }
    }

    /// 로그 길이.
    pub fn len(&self) -> usize {
        self.trips.len()
    }

    /// 로그가 비어 있는지 여부.
    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }

    /// 인덱스로 여행을 조회합니다.
    pub fn get(&self, index: usize) -> Option<&Trip> {
        self.trips.get(index)
    }

    /// 첫 여행의 시작 시각 (가상 시간 원점).
    pub fn first_started_at(&self) -> Option<DateTime<Utc>> {
        self.trips.first().map(|t| t.started_at)
    }

    /// 전체 여행 슬라이스.
    pub fn trips(&self) -> &[Trip] {
        &self.trips
    }
}
