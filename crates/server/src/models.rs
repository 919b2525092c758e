//! Read-only projections returned by the route layer.

use serde::Serialize;

use game_core::{Game, GameId, SaveId};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerModel {
    pub name: String,
    pub color: String,
    pub score: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameModel {
    pub id: GameId,
    pub save_id: Option<SaveId>,
    pub parent_save_id: Option<SaveId>,
    pub generation: u32,
    pub player_count: usize,
    pub players: Vec<PlayerModel>,
}

pub fn game_model(game: &Game) -> GameModel {
    GameModel {
        id: game.id.clone(),
        save_id: game.save_id.clone(),
        parent_save_id: game.parent_save_id.clone(),
        generation: game.generation,
        player_count: game.player_count(),
        players: game
            .players
            .iter()
            .map(|p| PlayerModel { name: p.name.clone(), color: p.color.clone(), score: p.score })
            .collect(),
    }
}
