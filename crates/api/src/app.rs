use axum::{middleware, routing::get, Router};
use domain::models::Recipient;
use domain::services::{MilestoneTracker, NotificationDispatcher};
use persistence::repositories::{MilestoneRepository, NotificationLogRepository};
use shared::jwt::{JwtConfig, JwtError};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{Config, ConfigValidationError};
use crate::middleware::{
    metrics_handler, metrics_middleware, require_user_auth, security_headers_middleware, trace_id,
};
use crate::routes::{analytics, health};
use crate::services::{AnalyticsService, EmailService, SmsService};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("JWT configuration rejected: {0}")]
    Jwt(#[from] JwtError),

    #[error(transparent)]
    Config(#[from] ConfigValidationError),
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt: Arc<JwtConfig>,
    pub analytics: AnalyticsService,
}

impl AppState {
    /// Wires the repositories, channels and tracker around `pool`.
    pub fn new(config: Config, pool: PgPool) -> Result<Self, StateError> {
        let jwt = JwtConfig::with_leeway(
            &config.jwt.secret,
            config.jwt.access_token_expiry_secs,
            config.jwt.leeway_secs,
        )?;

        let tracker = MilestoneTracker::new(
            Arc::new(MilestoneRepository::new(pool.clone())),
            config.milestones.tiers()?,
        );

        // Disabled channels stay registered so sends are logged as unavailable.
        let dispatcher = NotificationDispatcher::new(Arc::new(NotificationLogRepository::new(
            pool.clone(),
        )))
        .with_channel(Arc::new(EmailService::new(config.email.clone())))
        .with_channel(Arc::new(SmsService::new(config.sms.clone())));

        let analytics = AnalyticsService::new(
            pool.clone(),
            tracker,
            dispatcher,
            config.reports.exports_dir(),
            milestone_recipients(&config),
        );

        Ok(Self {
            pool,
            config: Arc::new(config),
            jwt: Arc::new(jwt),
            analytics,
        })
    }
}

fn milestone_recipients(config: &Config) -> Vec<Recipient> {
    let emails = config.milestones.notify_emails.iter().map(Recipient::email);
    let phones = config.milestones.notify_phones.iter().map(Recipient::sms);
    emails.chain(phones).collect()
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    // Build CORS layer based on configuration
    let cors = if config.security.cors_origins.is_empty() {
        // Default: allow any origin (for development)
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Analytics routes (require a bearer token)
    let analytics_routes = Router::new()
        .nest("/api/v1/analytics", analytics::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_user_auth,
        ));

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(analytics_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
