//! The game aggregate and its snapshot codec.
//!
//! The storage layer treats a game as an opaque serialized body plus the
//! chain metadata fields (`saveId`, `parentSaveId`, player count). Everything
//! else in the body belongs to the rules engine and round-trips untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub type GameId = String;
pub type SaveId = String;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed game snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub name: String,
    pub color: String,
    pub score: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOptions {
    /// Id of the game this one was cloned from, if any.
    pub cloned_game_id: Option<GameId>,
    pub draft_variant: bool,
    pub shuffle_deck: bool,
}

/// Final per-player score recorded when a game completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub player: String,
    pub score: i32,
}

/// One immutable persisted version of a game's full state.
///
/// Field order is fixed by the struct definition, so serializing the same
/// snapshot twice yields byte-identical JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedGame {
    pub id: GameId,
    pub save_id: Option<SaveId>,
    pub parent_save_id: Option<SaveId>,
    pub players: Vec<Player>,
    pub generation: u32,
    pub game_options: GameOptions,
    /// Rules-engine state, opaque to the storage layer.
    pub board: JsonValue,
}

impl SerializedGame {
    pub fn from_json(text: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_value(value: JsonValue) -> Result<Self, CodecError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Pretty-printed form used by the file-tree backend.
    pub fn to_pretty_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}

/// The live, mutable game aggregate.
///
/// Owned by the storage layer between requests; borrowed and mutated by the
/// rules engine during a request. `save_id` is `None` until the first save.
#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub id: GameId,
    pub save_id: Option<SaveId>,
    pub parent_save_id: Option<SaveId>,
    pub players: Vec<Player>,
    pub generation: u32,
    pub game_options: GameOptions,
    pub board: JsonValue,
}

impl Game {
    pub fn new(id: GameId, players: Vec<Player>, game_options: GameOptions, board: JsonValue) -> Self {
        Self {
            id,
            save_id: None,
            parent_save_id: None,
            players,
            generation: 1,
            game_options,
            board,
        }
    }

    /// Start a fresh game from another game's root snapshot, copying only the
    /// initial configuration and discarding all chain linkage.
    pub fn load_from_clone_source(source: &SerializedGame, new_id: GameId) -> Self {
        let mut game_options = source.game_options.clone();
        game_options.cloned_game_id = Some(source.id.clone());
        Self {
            id: new_id,
            save_id: None,
            parent_save_id: None,
            players: source.players.clone(),
            generation: 1,
            game_options,
            board: source.board.clone(),
        }
    }

    pub fn serialize(&self) -> SerializedGame {
        SerializedGame {
            id: self.id.clone(),
            save_id: self.save_id.clone(),
            parent_save_id: self.parent_save_id.clone(),
            players: self.players.clone(),
            generation: self.generation,
            game_options: self.game_options.clone(),
            board: self.board.clone(),
        }
    }

    pub fn deserialize(s: SerializedGame) -> Self {
        Self {
            id: s.id,
            save_id: s.save_id,
            parent_save_id: s.parent_save_id,
            players: s.players,
            generation: s.generation,
            game_options: s.game_options,
            board: s.board,
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_game() -> Game {
        let mut game = Game::new(
            "g1".to_string(),
            vec![
                Player { name: "A".into(), color: "red".into(), score: 20 },
                Player { name: "B".into(), color: "blue".into(), score: 22 },
            ],
            GameOptions::default(),
            json!({"deck": ["c1", "c2"], "oceans": 3}),
        );
        game.save_id = Some("s000000000001".into());
        game.parent_save_id = None;
        game.generation = 4;
        game
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let game = sample_game();
        let first = game.serialize().to_json().unwrap();
        let reloaded = Game::deserialize(SerializedGame::from_json(&first).unwrap());
        let second = reloaded.serialize().to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn round_trip_preserves_chain_fields() {
        let game = sample_game();
        let snapshot = game.serialize();
        let reloaded = Game::deserialize(snapshot.clone());
        assert_eq!(reloaded.save_id, game.save_id);
        assert_eq!(reloaded.parent_save_id, None);
        assert_eq!(reloaded.player_count(), 2);
        assert_eq!(snapshot.player_count(), 2);
    }

    #[test]
    fn clone_source_discards_history() {
        let mut game = sample_game();
        game.parent_save_id = Some("s000000000000".into());
        let snapshot = game.serialize();

        let cloned = Game::load_from_clone_source(&snapshot, "g2".to_string());
        assert_eq!(cloned.id, "g2");
        assert_eq!(cloned.save_id, None);
        assert_eq!(cloned.parent_save_id, None);
        assert_eq!(cloned.generation, 1);
        assert_eq!(cloned.game_options.cloned_game_id.as_deref(), Some("g1"));
        assert_eq!(cloned.players, game.players);
        assert_eq!(cloned.board, game.board);
    }
}
