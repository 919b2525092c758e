//! File-tree backend: one pretty-printed JSON file per snapshot.
//!
//! Layout under the db root: the current head mirrored to
//! `game-<gameId>.json`, full history under `history/` keyed by
//! `game-<gameId>-<00000saveId>.json`, and the root snapshot mirrored to
//! `start/game-<gameId>.json` for O(1) clone-source lookup. This backend
//! keeps no game status or creation time of its own, so result recording,
//! age-based purging and rollback are unsupported.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;

use game_core::{Game, GameId, GameOptions, SaveId, Score, SerializedGame};

use crate::db::{GameData, GameDatabase};
use crate::error::AppError;

pub struct LocalFilesystem {
    db_dir: PathBuf,
    history_dir: PathBuf,
    start_dir: PathBuf,
    game_file_pattern: Regex,
}

impl LocalFilesystem {
    pub async fn new(root: &Path) -> Result<Self, AppError> {
        let db_dir = root.to_path_buf();
        let history_dir = db_dir.join("history");
        let start_dir = db_dir.join("start");
        for dir in [&db_dir, &history_dir, &start_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| AppError::Internal(format!("cannot create {}: {e}", dir.display())))?;
        }
        tracing::info!("starting local database at {}", db_dir.display());
        Ok(Self {
            db_dir,
            history_dir,
            start_dir,
            game_file_pattern: Regex::new(r"^game-(.*)\.json$").expect("valid pattern"),
        })
    }

    fn filename(&self, game_id: &str) -> PathBuf {
        self.db_dir.join(format!("game-{game_id}.json"))
    }

    fn history_filename(&self, game_id: &str, save_id: &str) -> PathBuf {
        self.history_dir.join(format!("game-{game_id}-{save_id:0>5}.json"))
    }

    fn start_filename(&self, game_id: &str) -> PathBuf {
        self.start_dir.join(format!("game-{game_id}.json"))
    }

    /// Write one snapshot to the tree. Used by `save_game` and by the export
    /// tool when copying a chain out of a relational backend.
    pub async fn save_serialized_game(
        &self,
        snapshot: &SerializedGame,
        save_start: bool,
    ) -> Result<(), AppError> {
        let save_id = snapshot.save_id.as_deref().ok_or_else(|| {
            AppError::Internal(format!("snapshot of game {} carries no save id", snapshot.id))
        })?;
        let text = snapshot.to_pretty_json()?;

        // History files are append-only; a save-id collision fails the save
        // instead of overwriting an existing snapshot.
        let history = self.history_filename(&snapshot.id, save_id);
        let write = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&history)
            .await;
        match write {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(AppError::Conflict(format!("save {save_id} already exists")));
            }
            Err(e) => {
                return Err(AppError::Internal(format!(
                    "cannot create {}: {e}",
                    history.display()
                )));
            }
        }
        write_file(&history, &text).await?;

        if save_start {
            write_file(&self.start_filename(&snapshot.id), &text).await?;
        }
        write_file(&self.filename(&snapshot.id), &text).await
    }

    async fn read_snapshot(&self, path: &Path, game_id: &str) -> Result<SerializedGame, AppError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(SerializedGame::from_json(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("game {game_id} not found")))
            }
            Err(e) => {
                tracing::error!("LocalFilesystem:read {}: {e}", path.display());
                Err(AppError::Internal(format!("cannot read {}: {e}", path.display())))
            }
        }
    }
}

#[async_trait]
impl GameDatabase for LocalFilesystem {
    async fn save_game(&self, game: &mut Game, new_save_id: SaveId) -> Result<(), AppError> {
        let first_save = game.save_id.is_none();

        game.parent_save_id = game.save_id.take();
        game.save_id = Some(new_save_id.clone());

        tracing::info!("saving {} at position {new_save_id}", game.id);
        self.save_serialized_game(&game.serialize(), first_save).await
    }

    async fn get_game(&self, game_id: &str) -> Result<SerializedGame, AppError> {
        self.read_snapshot(&self.filename(game_id), game_id).await
    }

    async fn get_game_version(&self, _game_id: &str, _save_id: &str) -> Result<SerializedGame, AppError> {
        Err(AppError::Unsupported("version history".to_string()))
    }

    async fn load_cloneable_game(&self, game_id: &str) -> Result<SerializedGame, AppError> {
        self.read_snapshot(&self.start_filename(game_id), game_id).await
    }

    async fn get_cloneable_games(&self) -> Result<Vec<GameData>, AppError> {
        let mut all = Vec::new();
        for game_id in self.get_games().await? {
            let start = self.start_filename(&game_id);
            match self.read_snapshot(&start, &game_id).await {
                Ok(snapshot) => all.push(GameData {
                    player_count: snapshot.player_count() as i64,
                    game_id,
                }),
                // Games saved before the start mirror existed have no clone
                // source; skip them.
                Err(AppError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        all.sort_by(|a, b| a.game_id.cmp(&b.game_id));
        Ok(all)
    }

    async fn get_games(&self) -> Result<Vec<GameId>, AppError> {
        let mut entries = tokio::fs::read_dir(&self.db_dir)
            .await
            .map_err(|e| AppError::Internal(format!("cannot list {}: {e}", self.db_dir.display())))?;
        let mut game_ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::Internal(format!("cannot list {}: {e}", self.db_dir.display())))?
        {
            if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(captures) = self.game_file_pattern.captures(name) {
                game_ids.push(captures[1].to_string());
            }
        }
        Ok(game_ids)
    }

    async fn save_game_results(
        &self,
        _game_id: &str,
        _players: i64,
        _generations: i64,
        _game_options: &GameOptions,
        _scores: &[Score],
    ) -> Result<(), AppError> {
        Err(AppError::Unsupported("game results".to_string()))
    }

    async fn clean_saves(&self, game_id: &str) -> Result<(), AppError> {
        // Full history stays on disk; there is no status to flip here.
        tracing::warn!("clean_saves({game_id}) does nothing on the file tree backend");
        Ok(())
    }

    async fn purge_unfinished_games(&self) -> Result<(), AppError> {
        Err(AppError::Unsupported("purging unfinished games".to_string()))
    }

    async fn rollback_saves(
        &self,
        _game_id: &str,
        _from_save_id: &str,
        _rollback_count: i64,
    ) -> Result<(), AppError> {
        Err(AppError::Unsupported("rollback".to_string()))
    }
}

async fn write_file(path: &Path, text: &str) -> Result<(), AppError> {
    tokio::fs::write(path, text).await.map_err(|e| {
        tracing::error!("LocalFilesystem:write {}: {e}", path.display());
        AppError::Internal(format!("cannot write {}: {e}", path.display()))
    })
}
