//! 피드 제어 인터페이스.
//!
//! 재생 엔진과 합성 피드가 동일한 제어 표면을 노출하도록 하는 trait.
//! 소비자는 이 trait을 통해서만 피드를 제어하므로 두 구현을 구분할 수
//! 없습니다.

use async_trait::async_trait;

/// 허용되는 최소 재생 속도.
pub const MIN_SPEED: f64 = 0.1;
/// 허용되는 최대 재생 속도.
pub const MAX_SPEED: f64 = 50.0;

/// 속도를 유효 범위로 클램프합니다.
///
/// 잘못된 입력은 거부하지 않고 조용히 보정합니다. NaN은 최소 속도로
/// 취급합니다.
pub fn clamp_speed(speed: f64) -> f64 {
    if speed.is_nan() {
        return MIN_SPEED;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

/// 피드 제어 표면.
#[async_trait]
pub trait FeedControl: Send + Sync {
    /// 피드를 시작합니다. 이미 실행 중이면 아무 것도 하지 않습니다.
    async fn start(&self);

    /// 피드를 일시정지합니다. 실행 중이 아니면 아무 것도 하지 않습니다.
    async fn pause(&self);

    /// 일시정지 지점부터 피드를 재개합니다.
    async fn resume(&self);

    /// 피드를 정지합니다. 커서는 보존됩니다.
    async fn stop(&self);

    /// 속도를 변경합니다. 값은 [0.1, 50]으로 클램프됩니다.
    async fn set_speed(&self, speed: f64);

    /// 실행 중 여부.
    async fn is_running(&self) -> bool;

    /// 현재 속도.
    async fn speed(&self) -> f64;
}
