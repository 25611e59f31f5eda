use anyhow::{bail, Result};
use axum::{
    routing::{get, put},
    Extension, Router,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

use product_api_server::config::{AppEnv, Settings};
use product_api_server::database::ConnectionManager;
use product_api_server::events::LogObserver;
use product_api_server::shutdown::ShutdownCoordinator;
use product_api_server::{handlers, logging};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logger()?;

    info!("Starting Product API Server...");

    let settings = Settings::load()?;
    info!("Configuration loaded");

    let manager = Arc::new(
        ConnectionManager::new(settings.database.clone()).with_observer(Arc::new(LogObserver)),
    );

    // Failure diagnostics are emitted through the observer; a failed attempt
    // stops startup here with a non-zero exit code.
    let handle = manager.connect().await?;

    let coordinator = Arc::new(ShutdownCoordinator::new(manager.clone()));
    tokio::spawn(coordinator.listen());

    let app = build_router(&settings, handle.database(), manager)?;

    let addr = SocketAddr::from((
        settings.server.host.parse::<IpAddr>()?,
        settings.server.port,
    ));

    info!(
        "Server running in {} mode on port {}",
        settings.server.env.as_str(),
        settings.server.port
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(
    settings: &Settings,
    db: mongodb::Database,
    manager: Arc<ConnectionManager>,
) -> Result<Router> {
    let health_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .layer(Extension(manager));

    let api_routes = Router::new()
        .route(
            "/api/products",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
        .route(
            "/api/products/{id}",
            put(handlers::products::update_product).delete(handlers::products::delete_product),
        )
        .layer(Extension(db));

    let mut app = Router::new().merge(health_routes).merge(api_routes);

    match settings.server.env {
        AppEnv::Production => {
            let static_path = settings.static_path();
            if !static_path.is_dir() {
                bail!(
                    "frontend build not found at {}; run the frontend build first",
                    static_path.display()
                );
            }
            // SPA routing: unknown paths fall back to index.html
            let index = static_path.join("index.html");
            app = app.fallback_service(ServeDir::new(&static_path).fallback(ServeFile::new(index)));
            info!("Serving frontend from {}", static_path.display());
        }
        AppEnv::Development => {
            app = app.route("/", get(dev_root));
        }
    }

    Ok(app
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default())))
}

async fn dev_root() -> &'static str {
    "API is running in development mode"
}
