use axum::{Extension, Json};

use game_core::GameId;

use crate::db::GameData;
use crate::error::AppError;
use crate::game_loader::GameLoader;

/// GET /api/games — ids of running games, most recently created first.
pub async fn get_games(
    Extension(loader): Extension<GameLoader>,
) -> Result<Json<Vec<GameId>>, AppError> {
    Ok(Json(loader.db().get_games().await?))
}

/// GET /api/cloneable_games — every known game with its player count.
pub async fn get_cloneable_games(
    Extension(loader): Extension<GameLoader>,
) -> Result<Json<Vec<GameData>>, AppError> {
    Ok(Json(loader.db().get_cloneable_games().await?))
}
