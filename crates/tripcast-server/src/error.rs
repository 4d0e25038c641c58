//! 서버 크레이트의 에러 타입.

use thiserror::Error;

/// 서버 에러.
#[derive(Debug, Error)]
pub enum ServerError {
    /// 여행 로그 파싱 에러
    #[error("여행 로그 파싱 에러 (line {line}): {reason}")]
    TripParse {
        /// 1부터 세는 줄 번호
        line: usize,
        /// 실패 사유
        reason: String,
    },

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),
}

/// 서버 에러용 Result 타입.
pub type ServerResult<T> = Result<T, ServerError>;
