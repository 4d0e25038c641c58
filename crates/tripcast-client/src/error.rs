//! 클라이언트 에러 타입.

use thiserror::Error;
use tripcast_feed::FeedError;

/// 클라이언트 에러.
#[derive(Debug, Error)]
pub enum ClientError {
    /// 채널 에러 (연결 실패, 전송 실패 등)
    #[error("채널 에러: {0}")]
    Channel(String),

    /// 채널이 열려 있지 않음
    #[error("채널이 열려 있지 않음")]
    NotOpen,

    /// 피드 메시지 에러
    #[error(transparent)]
    Feed(#[from] FeedError),
}
