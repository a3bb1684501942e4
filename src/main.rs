// GEFS Forecast API v0.1
use axum::{
    routing::{get, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod db;
mod errors;
mod routes;
mod services;

use config::AppConfig;
use routes::forecasts::AppState;
use services::gefs::GefsClient;
use services::ingester::{IngestContext, IngesterState, SharedIngesterState};
use services::lattice::GridLattice;

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 2;

/// GEFS Forecast API — OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "GEFS Forecast API",
        version = "0.1.0",
        description = "Ensemble weather forecasts for Europe. Incrementally ingests \
            NOAA GEFS 0.5° GRIB2 output into a Postgres warehouse on a 1° lattice \
            and serves distance-weighted point forecasts with display-ready values.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Forecasts", description = "Point forecasts and raw grid rows"),
        (name = "Favourites", description = "Per-user favourite locations"),
        (name = "Ingester", description = "Background GEFS ingester status"),
    ),
    paths(
        routes::health::health_check,
        routes::forecasts::get_point_forecast,
        routes::forecasts::get_cell_forecast,
        routes::favourites::list_favourites,
        routes::favourites::add_favourite,
        routes::favourites::remove_favourite,
        routes::ingester::get_ingester_status,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::forecasts::ForecastRow,
            routes::forecasts::ForecastResponse,
            routes::forecasts::CellRecordResponse,
            routes::favourites::FavouritesResponse,
            routes::favourites::FavouriteChange,
            services::interpolation::WindFormula,
            services::presentation::WeatherIcon,
            services::presentation::DisplayRow,
            services::ingester::IngesterState,
            services::ingester::IngestReport,
            services::ingester::TaskFailure,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gefs_forecast_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    // Set up database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .min_connections(DB_POOL_MIN_CONNECTIONS)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations completed");

    let lattice = Arc::new(GridLattice::europe());
    tracing::info!("Sampling lattice has {} points", lattice.len());

    // Create shared ingester state and spawn the background ingester
    let ingester_state: SharedIngesterState =
        Arc::new(RwLock::new(IngesterState::new(config.ingest.enabled)));
    if config.ingest.enabled {
        let ctx = IngestContext {
            pool: pool.clone(),
            client: GefsClient::new(),
            lattice,
            config: config.ingest.clone(),
        };
        tokio::spawn(services::ingester::run_ingester(ctx, ingester_state.clone()));
    } else {
        tracing::warn!("Ingester disabled via INGEST_ENABLED");
    }

    let app_state = AppState {
        pool: pool.clone(),
        wind_formula: config.wind_formula,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers(Any);

    // Build router
    // Forecast routes use AppState; favourites and health use PgPool directly.
    let forecast_routes = Router::new()
        .route("/api/v1/forecasts", get(routes::forecasts::get_point_forecast))
        .route(
            "/api/v1/forecasts/cell",
            get(routes::forecasts::get_cell_forecast),
        )
        .with_state(app_state);

    let favourite_routes = Router::new()
        .route(
            "/api/v1/favourites",
            get(routes::favourites::list_favourites),
        )
        .route(
            "/api/v1/favourites/:location_id",
            put(routes::favourites::add_favourite).delete(routes::favourites::remove_favourite),
        )
        .with_state(pool.clone());

    let health_routes = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .with_state(pool);

    let ingester_routes = Router::new()
        .route(
            "/api/v1/ingester/status",
            get(routes::ingester::get_ingester_status),
        )
        .with_state(ingester_state);

    let app = Router::new()
        .merge(health_routes)
        .merge(forecast_routes)
        .merge(favourite_routes)
        .merge(ingester_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
