use std::sync::Arc;

use anyhow::Result;
use axum::http::{header, HeaderValue};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use civicpulse_api::{jwt::JwtService, router, AppState};
use civicpulse_common::Config;
use civicpulse_store::{pg, PgReportStore, PgUserStore, StoreSettings};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("civicpulse=info".parse()?);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = Config::from_env();
    let settings = StoreSettings::from_config(&config);
    let jwt = JwtService::new(&config.jwt_secret, config.jwt_issuer.clone());

    let state = match &config.database_url {
        Some(url) => {
            let pool = pg::connect(url, config.database_max_connections).await?;
            AppState::new(
                Arc::new(PgReportStore::new(pool.clone())),
                Arc::new(PgUserStore::new(pool)),
                settings,
                jwt,
            )
        }
        None => {
            warn!("DATABASE_URL not set, reports are kept in memory only");
            AppState::in_memory(settings, jwt)
        }
    };

    let origins = if config.allowed_origins.is_empty() {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        AllowOrigin::list(origins)
    };
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(Arc::new(state))
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // Method + path only; query strings can carry coordinates.
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("CivicPulse API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
