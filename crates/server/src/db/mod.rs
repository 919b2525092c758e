//! Storage backends for the save chain.
//!
//! Three interchangeable backends implement [`GameDatabase`]: a file tree
//! ([`local_filesystem::LocalFilesystem`]), an embedded SQLite database
//! ([`sqlite::Sqlite`]) and a networked PostgreSQL server
//! ([`postgres::Postgres`]). All three maintain the same parent-linked chain
//! of snapshots per game; the relational variants share their schema and
//! query logic and differ only in connection mechanics.

pub mod local_filesystem;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use game_core::{Game, GameId, GameOptions, SaveId, Score, SerializedGame};

use crate::config::Config;
use crate::error::AppError;

/// Per-game listing entry returned by [`GameDatabase::get_cloneable_games`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameData {
    pub game_id: GameId,
    pub player_count: i64,
}

/// The storage contract shared by every backend.
///
/// Chain invariants all implementations must keep, regardless of medium:
/// a save always appends a new snapshot and never overwrites one; the new
/// snapshot's parent is set to the current head before the new head becomes
/// visible; the root snapshot is never deleted except by whole-game deletion;
/// and a save-id collision fails the save.
#[async_trait]
pub trait GameDatabase: Send + Sync {
    /// Persist a new snapshot of `game`'s current state under `new_save_id`.
    ///
    /// Advances the in-memory chain fields on `game` (`parent_save_id` takes
    /// the old head, `save_id` the new one). On the very first save this also
    /// creates the game record and marks the snapshot as root. An error means
    /// the head was not advanced in storage.
    async fn save_game(&self, game: &mut Game, new_save_id: SaveId) -> Result<(), AppError>;

    /// Snapshot at the current head.
    async fn get_game(&self, game_id: &str) -> Result<SerializedGame, AppError>;

    /// Snapshot at an exact historical point in the chain.
    async fn get_game_version(&self, game_id: &str, save_id: &str) -> Result<SerializedGame, AppError>;

    /// Root snapshot, used as the clone source for new games.
    async fn load_cloneable_game(&self, game_id: &str) -> Result<SerializedGame, AppError>;

    /// Every known game with its player count, ordered by game id.
    async fn get_cloneable_games(&self) -> Result<Vec<GameData>, AppError>;

    /// Ids of all running games, most recently created first.
    async fn get_games(&self) -> Result<Vec<GameId>, AppError>;

    /// Write-once result summary; a second call for the same game id is a
    /// primary-key conflict and propagates as such.
    async fn save_game_results(
        &self,
        game_id: &str,
        players: i64,
        generations: i64,
        game_options: &GameOptions,
        scores: &[Score],
    ) -> Result<(), AppError>;

    /// Delete every snapshot except root and head, then flip the game to
    /// `finished`. An unknown game id warns instead of failing. Kicks off a
    /// background [`Self::purge_unfinished_games`] sweep.
    async fn clean_saves(&self, game_id: &str) -> Result<(), AppError>;

    /// Delete entire running games older than the configured age threshold.
    /// Finished games are never purged.
    async fn purge_unfinished_games(&self) -> Result<(), AppError>;

    /// Walk the parent chain from `from_save_id`, deleting `rollback_count`
    /// snapshots, then rewind the head to the last surviving ancestor.
    ///
    /// A count of zero or less is a no-op. Rolling back past the root stops
    /// early with a warning, leaving the root and its immediate child intact.
    /// The delete-then-rewind sequence is not transactional; a crash partway
    /// through can leave the head pointing at a deleted snapshot.
    async fn rollback_saves(
        &self,
        game_id: &str,
        from_save_id: &str,
        rollback_count: i64,
    ) -> Result<(), AppError>;
}

/// Pick and connect the backend selected by the configuration.
pub async fn connect(config: &Config) -> Result<Arc<dyn GameDatabase>, AppError> {
    if config.local_fs_db {
        let db = local_filesystem::LocalFilesystem::new(&config.db_dir).await?;
        return Ok(Arc::new(db));
    }
    match config.database_url.as_deref() {
        Some(url) if url.starts_with("postgres") => {
            let db = postgres::Postgres::connect(url, config.max_game_days).await?;
            Ok(Arc::new(db))
        }
        Some(url) => {
            let db = sqlite::Sqlite::connect(url, config.max_game_days).await?;
            Ok(Arc::new(db))
        }
        None => {
            let path = config.db_dir.join("game.db");
            let url = format!("sqlite://{}", path.display());
            tokio::fs::create_dir_all(&config.db_dir).await.map_err(|e| {
                AppError::Internal(format!("cannot create db directory: {e}"))
            })?;
            let db = sqlite::Sqlite::connect(&url, config.max_game_days).await?;
            Ok(Arc::new(db))
        }
    }
}

/// Map a unique-key violation to a Conflict, anything else to a database
/// error. Save-id and game-result collisions must fail loudly, never
/// overwrite.
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: String) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.kind() == sqlx::error::ErrorKind::UniqueViolation => {
            AppError::Conflict(what)
        }
        _ => AppError::Sqlx(err),
    }
}

/// Outcome of planning a rollback over a collected ancestor chain.
pub(crate) struct RollbackPlan {
    /// Save ids to delete, most recent first.
    pub delete: Vec<SaveId>,
    /// Head to rewind to after the deletes, if any were planned.
    pub new_head: Option<SaveId>,
    /// True when the walk ran into the root before `rollback_count` steps.
    pub hit_root: bool,
}

/// Plan a rollback given the ancestor chain walked from the starting save.
///
/// `chain[0]` is the starting save; each following entry is the parent of
/// the one before it. The walk stops either once `rollback_count + 1` ids
/// are collected (the last one is the rewind target) or at the root
/// (`reached_root`). Rolling back to the root exactly is allowed; going past
/// it keeps the root and its immediate child and rewinds the head to that
/// child.
pub(crate) fn plan_rollback(chain: &[SaveId], rollback_count: i64, reached_root: bool) -> RollbackPlan {
    if rollback_count <= 0 || chain.is_empty() {
        return RollbackPlan { delete: Vec::new(), new_head: None, hit_root: false };
    }
    if (chain.len() as i64) > rollback_count {
        let count = rollback_count as usize;
        return RollbackPlan {
            delete: chain[..count].to_vec(),
            new_head: Some(chain[count].clone()),
            hit_root: false,
        };
    }
    // The requested count runs past the root.
    debug_assert!(reached_root);
    if chain.len() <= 2 {
        return RollbackPlan { delete: Vec::new(), new_head: None, hit_root: true };
    }
    let keep_from = chain.len() - 2;
    RollbackPlan {
        delete: chain[..keep_from].to_vec(),
        new_head: Some(chain[keep_from].clone()),
        hit_root: true,
    }
}

// DML shared by both relational backends. `$N` placeholders bind on both
// engines. The `games` table deliberately carries no foreign key from
// `first_save_id`/`current_save_id` to `saves`, so saves can be deleted
// independently of the game row; the chain invariants are enforced here, not
// by the database.
pub(crate) const INSERT_GAME: &str =
    "INSERT INTO games (game_id, current_save_id, first_save_id, players) VALUES ($1, $2, $2, $3)";
pub(crate) const INSERT_SAVE: &str =
    "INSERT INTO saves (game_id, save_id, game) VALUES ($1, $2, $3)";
pub(crate) const UPDATE_CURRENT_SAVE: &str =
    "UPDATE games SET current_save_id = $1 WHERE game_id = $2";
pub(crate) const SELECT_CURRENT_SAVE: &str = "SELECT s.game \
     FROM games g \
     INNER JOIN saves s ON s.save_id = g.current_save_id \
     WHERE g.game_id = $1";
pub(crate) const SELECT_FIRST_SAVE: &str = "SELECT s.game \
     FROM games g \
     INNER JOIN saves s ON s.save_id = g.first_save_id \
     WHERE g.game_id = $1";
pub(crate) const SELECT_SAVE_VERSION: &str =
    "SELECT game FROM saves WHERE game_id = $1 AND save_id = $2";
pub(crate) const SELECT_CLONEABLE_GAMES: &str =
    "SELECT game_id, players FROM games ORDER BY game_id ASC";
pub(crate) const SELECT_RUNNING_GAMES: &str =
    "SELECT game_id FROM games WHERE status = 'running' ORDER BY created_time DESC";
pub(crate) const INSERT_GAME_RESULT: &str = "INSERT INTO game_results \
     (game_id, seed_game_id, players, generations, game_options, scores) \
     VALUES ($1, $2, $3, $4, $5, $6)";
pub(crate) const SELECT_SAVE_ENDPOINTS: &str =
    "SELECT first_save_id, current_save_id FROM games WHERE game_id = $1";
pub(crate) const DELETE_INTERIOR_SAVES: &str =
    "DELETE FROM saves WHERE game_id = $1 AND save_id != $2 AND save_id != $3";
pub(crate) const MARK_GAME_FINISHED: &str =
    "UPDATE games SET status = 'finished' WHERE game_id = $1";
pub(crate) const DELETE_SAVE: &str = "DELETE FROM saves WHERE game_id = $1 AND save_id = $2";
pub(crate) const DELETE_GAME_SAVES: &str = "DELETE FROM saves WHERE game_id = $1";
pub(crate) const DELETE_GAME: &str = "DELETE FROM games WHERE game_id = $1";

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(ids: &[&str]) -> Vec<SaveId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rollback_plan_deletes_requested_count() {
        let plan = plan_rollback(&chain(&["s3", "s2", "s1"]), 2, false);
        assert_eq!(plan.delete, chain(&["s3", "s2"]));
        assert_eq!(plan.new_head.as_deref(), Some("s1"));
        assert!(!plan.hit_root);
    }

    #[test]
    fn rollback_plan_allows_rewinding_to_root() {
        let plan = plan_rollback(&chain(&["s3", "s2", "s1", "s0"]), 3, true);
        assert_eq!(plan.delete, chain(&["s3", "s2", "s1"]));
        assert_eq!(plan.new_head.as_deref(), Some("s0"));
        assert!(!plan.hit_root);
    }

    #[test]
    fn rollback_plan_stops_short_of_root() {
        // Count larger than the chain depth: root and its child survive.
        let plan = plan_rollback(&chain(&["s3", "s2", "s1", "s0"]), 7, true);
        assert_eq!(plan.delete, chain(&["s3", "s2"]));
        assert_eq!(plan.new_head.as_deref(), Some("s1"));
        assert!(plan.hit_root);
    }

    #[test]
    fn rollback_plan_from_root_is_inert() {
        let plan = plan_rollback(&chain(&["s0"]), 3, true);
        assert!(plan.delete.is_empty());
        assert_eq!(plan.new_head, None);
        assert!(plan.hit_root);
    }

    #[test]
    fn rollback_plan_ignores_non_positive_counts() {
        let plan = plan_rollback(&chain(&["s3", "s2"]), 0, false);
        assert!(plan.delete.is_empty());
        assert_eq!(plan.new_head, None);
    }
}
