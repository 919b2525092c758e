//! Embedded single-file backend on SQLite.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use game_core::{Game, GameId, GameOptions, SaveId, Score, SerializedGame};

use crate::db::{self, GameData, GameDatabase};
use crate::error::AppError;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS games(
    game_id VARCHAR PRIMARY KEY,
    players INTEGER,
    first_save_id VARCHAR,
    current_save_id VARCHAR,
    status TEXT DEFAULT 'running',
    created_time INTEGER DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS saves(
    save_id VARCHAR PRIMARY KEY,
    game_id VARCHAR NOT NULL,
    game TEXT NOT NULL,
    created_time INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    FOREIGN KEY(game_id) REFERENCES games(game_id)
);

CREATE TABLE IF NOT EXISTS game_results(
    game_id VARCHAR PRIMARY KEY,
    seed_game_id VARCHAR,
    players INTEGER NOT NULL,
    generations INTEGER NOT NULL,
    game_options TEXT NOT NULL,
    scores TEXT NOT NULL
);
"#;

pub struct Sqlite {
    pool: SqlitePool,
    max_game_age_days: i64,
}

impl Sqlite {
    /// Open (creating if missing) the database at `url`, e.g.
    /// `sqlite://db/game.db` or `sqlite::memory:`.
    pub async fn connect(url: &str, max_game_age_days: i64) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(AppError::Sqlx)?
            .create_if_missing(true);
        // SQLite serializes writers anyway; a single pooled connection also
        // keeps `sqlite::memory:` pointing at one database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(AppError::Sqlx)?;
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&pool)
            .await
            .map_err(AppError::Sqlx)?;
        Ok(Self { pool, max_game_age_days })
    }

    async fn fetch_snapshot(&self, game_id: &str, save_id: &str) -> Result<SerializedGame, AppError> {
        let row: Option<(String,)> = sqlx::query_as(db::SELECT_SAVE_VERSION)
            .bind(game_id)
            .bind(save_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some((body,)) => Ok(SerializedGame::from_json(&body)?),
            None => Err(AppError::NotFound(format!(
                "save {save_id} not found for game {game_id}"
            ))),
        }
    }
}

#[async_trait]
impl GameDatabase for Sqlite {
    async fn save_game(&self, game: &mut Game, new_save_id: SaveId) -> Result<(), AppError> {
        let first_save = game.save_id.is_none();

        // Parent linkage is fixed before anything becomes visible in storage.
        game.parent_save_id = game.save_id.take();
        game.save_id = Some(new_save_id.clone());
        let body = game.serialize().to_json()?;

        if first_save {
            // First save creates the game record and its root snapshot as one
            // unit; a collision on either row must leave neither behind.
            let mut tx = self.pool.begin().await?;
            sqlx::query(db::INSERT_GAME)
                .bind(&game.id)
                .bind(&new_save_id)
                .bind(game.player_count() as i64)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    tracing::error!("Sqlite:save_game {e}");
                    db::conflict_on_unique(e, format!("game {} already exists", game.id))
                })?;
            sqlx::query(db::INSERT_SAVE)
                .bind(&game.id)
                .bind(&new_save_id)
                .bind(&body)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    tracing::error!("Sqlite:save_game {e}");
                    db::conflict_on_unique(e, format!("save {new_save_id} already exists"))
                })?;
            tx.commit().await?;
        } else {
            // Save row first, head pointer second: a racing reader must never
            // see a head pointing at a save that does not exist yet.
            sqlx::query(db::INSERT_SAVE)
                .bind(&game.id)
                .bind(&new_save_id)
                .bind(&body)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!("Sqlite:save_game {e}");
                    db::conflict_on_unique(e, format!("save {new_save_id} already exists"))
                })?;
            sqlx::query(db::UPDATE_CURRENT_SAVE)
                .bind(&new_save_id)
                .bind(&game.id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!("Sqlite:save_game {e}");
                    AppError::Sqlx(e)
                })?;
        }
        Ok(())
    }

    async fn get_game(&self, game_id: &str) -> Result<SerializedGame, AppError> {
        let row: Option<(String,)> = sqlx::query_as(db::SELECT_CURRENT_SAVE)
            .bind(game_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some((body,)) => Ok(SerializedGame::from_json(&body)?),
            None => Err(AppError::NotFound(format!("game {game_id} not found"))),
        }
    }

    async fn get_game_version(&self, game_id: &str, save_id: &str) -> Result<SerializedGame, AppError> {
        self.fetch_snapshot(game_id, save_id).await
    }

    async fn load_cloneable_game(&self, game_id: &str) -> Result<SerializedGame, AppError> {
        let row: Option<(String,)> = sqlx::query_as(db::SELECT_FIRST_SAVE)
            .bind(game_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some((body,)) => Ok(SerializedGame::from_json(&body)?),
            None => Err(AppError::NotFound(format!("game {game_id} not found"))),
        }
    }

    async fn get_cloneable_games(&self) -> Result<Vec<GameData>, AppError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(db::SELECT_CLONEABLE_GAMES)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(game_id, player_count)| GameData { game_id, player_count })
            .collect())
    }

    async fn get_games(&self) -> Result<Vec<GameId>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as(db::SELECT_RUNNING_GAMES)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn save_game_results(
        &self,
        game_id: &str,
        players: i64,
        generations: i64,
        game_options: &GameOptions,
        scores: &[Score],
    ) -> Result<(), AppError> {
        sqlx::query(db::INSERT_GAME_RESULT)
            .bind(game_id)
            .bind(&game_options.cloned_game_id)
            .bind(players)
            .bind(generations)
            .bind(serde_json::to_string(game_options).map_err(game_core::CodecError::from)?)
            .bind(serde_json::to_string(scores).map_err(game_core::CodecError::from)?)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Sqlite:save_game_results {e}");
                db::conflict_on_unique(e, format!("results for game {game_id} already recorded"))
            })?;
        Ok(())
    }

    async fn clean_saves(&self, game_id: &str) -> Result<(), AppError> {
        let row: Option<(String, String)> = sqlx::query_as(db::SELECT_SAVE_ENDPOINTS)
            .bind(game_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some((first_save_id, current_save_id)) = row else {
            tracing::warn!("couldn't find game {game_id} to clean saves");
            return Ok(());
        };
        sqlx::query(db::DELETE_INTERIOR_SAVES)
            .bind(game_id)
            .bind(&current_save_id)
            .bind(&first_save_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Sqlite:clean_saves {e}");
                AppError::Sqlx(e)
            })?;
        sqlx::query(db::MARK_GAME_FINISHED)
            .bind(game_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Sqlite:clean_saves {e}");
                AppError::Sqlx(e)
            })?;

        // Fire-and-forget sweep of stale games; callers do not wait on it.
        let pool = self.pool.clone();
        let days = self.max_game_age_days;
        tokio::spawn(async move {
            if let Err(e) = purge_stale_games(&pool, days).await {
                tracing::warn!("Sqlite:purge_unfinished_games {e}");
            }
        });
        Ok(())
    }

    async fn purge_unfinished_games(&self) -> Result<(), AppError> {
        purge_stale_games(&self.pool, self.max_game_age_days).await
    }

    async fn rollback_saves(
        &self,
        game_id: &str,
        from_save_id: &str,
        rollback_count: i64,
    ) -> Result<(), AppError> {
        if rollback_count <= 0 {
            return Ok(());
        }

        // Collect the ancestor chain first, then delete; the walk is an
        // explicit loop so the depth stays bounded.
        let mut chain: Vec<SaveId> = vec![from_save_id.to_string()];
        let mut reached_root = false;
        while (chain.len() as i64) <= rollback_count {
            let snapshot = self.fetch_snapshot(game_id, chain.last().unwrap()).await?;
            match snapshot.parent_save_id {
                Some(parent) => chain.push(parent),
                None => {
                    reached_root = true;
                    break;
                }
            }
        }

        let plan = db::plan_rollback(&chain, rollback_count, reached_root);
        if plan.hit_root {
            tracing::warn!(
                "game {game_id} cannot be rolled back past its root save; stopping early"
            );
        }
        for save_id in &plan.delete {
            sqlx::query(db::DELETE_SAVE)
                .bind(game_id)
                .bind(save_id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!("Sqlite:rollback_saves {e}");
                    AppError::Sqlx(e)
                })?;
        }
        if let Some(new_head) = &plan.new_head {
            sqlx::query(db::UPDATE_CURRENT_SAVE)
                .bind(new_head)
                .bind(game_id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!("Sqlite:rollback_saves {e}");
                    AppError::Sqlx(e)
                })?;
        }
        Ok(())
    }
}

async fn purge_stale_games(pool: &SqlitePool, max_age_days: i64) -> Result<(), AppError> {
    let stale: Vec<(String,)> = sqlx::query_as(
        "SELECT game_id FROM games \
         WHERE created_time < strftime('%s', 'now') - $1 * 86400 AND status = 'running'",
    )
    .bind(max_age_days)
    .fetch_all(pool)
    .await?;
    if stale.is_empty() {
        return Ok(());
    }
    for (game_id,) in &stale {
        sqlx::query(db::DELETE_GAME_SAVES).bind(game_id).execute(pool).await?;
        sqlx::query(db::DELETE_GAME).bind(game_id).execute(pool).await?;
    }
    tracing::info!("purged {} stale unfinished games", stale.len());
    Ok(())
}
