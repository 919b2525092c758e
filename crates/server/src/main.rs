use server::config;
use server::db;
use server::game_loader::GameLoader;
use server::routes;

use axum::{
    routing::{get, put},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env();

    tracing::info!("Connecting to game database...");
    let database = db::connect(&config)
        .await
        .expect("Failed to open the game database");

    let loader = GameLoader::new(database);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/game",
            get(routes::game::get_game).put(routes::game::create_game),
        )
        .route("/api/load_game", put(routes::game::load_game))
        .route("/api/games", get(routes::games::get_games))
        .route("/api/cloneable_games", get(routes::games::get_cloneable_games))
        .layer(Extension(loader))
        .layer(cors);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server error");
}
