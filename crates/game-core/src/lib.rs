pub mod game;
pub mod ids;

pub use game::{CodecError, Game, GameId, GameOptions, Player, SaveId, Score, SerializedGame};
pub use ids::{generate_game_id, generate_save_id};
