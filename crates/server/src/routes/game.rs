use axum::{extract::Query, Extension, Json};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use game_core::{generate_game_id, generate_save_id, Game, GameId, GameOptions, Player};

use crate::error::AppError;
use crate::game_loader::GameLoader;
use crate::models::{self, GameModel};

#[derive(Deserialize)]
pub struct GameQuery {
    pub id: Option<String>,
    #[serde(rename = "save-id")]
    pub save_id: Option<String>,
}

/// GET /api/game — game model at the current head, or at an exact version
/// when `save-id` is given.
pub async fn get_game(
    Extension(loader): Extension<GameLoader>,
    Query(q): Query<GameQuery>,
) -> Result<Json<GameModel>, AppError> {
    let game_id = q.id.ok_or_else(|| AppError::BadRequest("id parameter missing".to_string()))?;
    match loader.get_by_game_id(&game_id, q.save_id.as_deref(), false).await {
        Some(game) => {
            let game = game.lock().await;
            Ok(Json(models::game_model(&game)))
        }
        None => Err(AppError::NotFound("game not found".to_string())),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGameRequest {
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub game_options: GameOptions,
    #[serde(default)]
    pub board: JsonValue,
    /// When set, start from that game's root snapshot instead.
    pub clone_game_id: Option<GameId>,
}

/// PUT /api/game — create a new game, optionally cloned from another game's
/// initial configuration, and persist its root snapshot.
pub async fn create_game(
    Extension(loader): Extension<GameLoader>,
    Json(req): Json<NewGameRequest>,
) -> Result<Json<GameModel>, AppError> {
    let game_id = generate_game_id();
    let mut game = match &req.clone_game_id {
        Some(source_id) => {
            let source = loader.db().load_cloneable_game(source_id).await?;
            Game::load_from_clone_source(&source, game_id)
        }
        None => {
            if req.players.is_empty() {
                return Err(AppError::BadRequest("a game needs at least one player".to_string()));
            }
            Game::new(game_id, req.players, req.game_options, req.board)
        }
    };
    loader.db().save_game(&mut game, generate_save_id()).await?;
    let shared = loader.add(game);
    let game = shared.lock().await;
    Ok(Json(models::game_model(&game)))
}

/// Older clients send snake_case field names; accept both spellings.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadGameRequest {
    #[serde(alias = "game_id")]
    pub game_id: GameId,
    #[serde(default, alias = "rollback_count")]
    pub rollback_count: i64,
}

/// PUT /api/load_game — reload a game from storage, optionally rolling back
/// the most recent saves first.
pub async fn load_game(
    Extension(loader): Extension<GameLoader>,
    Json(req): Json<LoadGameRequest>,
) -> Result<Json<GameModel>, AppError> {
    let Some(shared) = loader.get_by_game_id(&req.game_id, None, true).await else {
        return Err(AppError::NotFound(format!("game {} not found", req.game_id)));
    };
    if req.rollback_count <= 0 {
        let game = shared.lock().await;
        return Ok(Json(models::game_model(&game)));
    }

    let head = shared.lock().await.save_id.clone().ok_or_else(|| {
        AppError::Internal(format!("loaded game {} carries no save id", req.game_id))
    })?;
    loader.db().rollback_saves(&req.game_id, &head, req.rollback_count).await?;

    let Some(restored) = loader.get_by_game_id(&req.game_id, None, true).await else {
        return Err(AppError::NotFound(format!(
            "game {} not found after rollback",
            req.game_id
        )));
    };
    let game = restored.lock().await;
    Ok(Json(models::game_model(&game)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn load_request_accepts_both_field_spellings() {
        let camel: LoadGameRequest =
            serde_json::from_value(json!({"gameId": "g1", "rollbackCount": 2})).unwrap();
        assert_eq!(camel.game_id, "g1");
        assert_eq!(camel.rollback_count, 2);

        let snake: LoadGameRequest =
            serde_json::from_value(json!({"game_id": "g1", "rollback_count": 2})).unwrap();
        assert_eq!(snake.game_id, "g1");
        assert_eq!(snake.rollback_count, 2);

        let bare: LoadGameRequest = serde_json::from_value(json!({"game_id": "g1"})).unwrap();
        assert_eq!(bare.rollback_count, 0);
    }
}
