//! Game-id and save-id generation.

use rand::Rng;

use crate::game::{GameId, SaveId};

/// Generate a new game id: `g` followed by 48 random bits in hex.
pub fn generate_game_id() -> GameId {
    format!("g{:012x}", random_48_bits())
}

/// Generate a new save id: `s` followed by 48 random bits in hex.
///
/// Uniqueness within a game's chain is enforced by the storage layer, which
/// fails a save on collision rather than overwriting.
pub fn generate_save_id() -> SaveId {
    format!("s{:012x}", random_48_bits())
}

fn random_48_bits() -> u64 {
    rand::thread_rng().gen::<u64>() & 0xffff_ffff_ffff
}
