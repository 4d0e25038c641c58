//! Tripcast 피드 서버 엔트리포인트.

use std::sync::Arc;

use tracing::{info, warn};

use tripcast_core::{init_logging, AppConfig, LogConfig, LogFormat, TripLog};
use tripcast_feed::{FeedControl, NotificationBus, ReplayEngine, SyntheticFeed};
use tripcast_server::{load_trips_csv, ws_router, WsState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    // 설정 로드 (TRIPCAST_CONFIG로 경로 오버라이드 가능)
    let config_path =
        std::env::var("TRIPCAST_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
    let config = AppConfig::load(&config_path)
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", config_path, e))?;

    // tracing 초기화
    let log_format = config
        .logging
        .format
        .parse::<LogFormat>()
        .unwrap_or_default();
    init_logging(LogConfig::new(&config.logging.level).with_format(log_format))
        .map_err(|e| anyhow::anyhow!("failed to init logging: {}", e))?;

    info!("Starting Tripcast feed server...");

    // 여행 로그 로드: 실패하거나 비어 있으면 합성 피드로 기동
    let bus = NotificationBus::new();
    let control: Arc<dyn FeedControl> = match load_trips_csv(&config.server.trips_csv) {
        Ok(trips) if !trips.is_empty() => {
            info!(
                path = %config.server.trips_csv,
                count = trips.len(),
                "Trip log loaded, starting replay engine"
            );
            Arc::new(ReplayEngine::new(
                TripLog::new(trips),
                bus.clone(),
                config.replay.clone(),
            ))
        }
        Ok(_) => {
            warn!(
                path = %config.server.trips_csv,
                "Trip log is empty, falling back to synthetic feed"
            );
            Arc::new(SyntheticFeed::new(bus.clone(), config.synthetic.clone()))
        }
        Err(e) => {
            warn!(
                path = %config.server.trips_csv,
                error = %e,
                "Trip log unavailable, falling back to synthetic feed"
            );
            Arc::new(SyntheticFeed::new(bus.clone(), config.synthetic.clone()))
        }
    };

    // 라우터 생성
    let app = ws_router(WsState::new(bus, control));

    // 서버 시작
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(%addr, "Feed server listening");
    info!("WebSocket available at ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
