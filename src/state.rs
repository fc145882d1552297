use std::sync::Arc;

use redis::aio::ConnectionManager;

use super::{
    config::Config,
    database::init_redis,
    rate_limit::RateLimiter,
};

pub struct AppState {
    pub config: Config,
    pub redis_connection: ConnectionManager,
    /// Budget for the general API surface.
    pub general_limiter: RateLimiter,
    /// Stricter budget for code verification attempts.
    pub checkin_limiter: RateLimiter,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let redis_connection = init_redis(&config.redis_url).await;
        let general_limiter = RateLimiter::new(config.general_rate_limit());
        let checkin_limiter = RateLimiter::new(config.checkin_rate_limit());

        Arc::new(Self {
            config,
            redis_connection,
            general_limiter,
            checkin_limiter,
        })
    }
}
