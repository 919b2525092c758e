use std::env;
use std::path::PathBuf;

const DEFAULT_MAX_GAME_DAYS: i64 = 10;

#[derive(Clone, Debug)]
pub struct Config {
    /// Relational connection string. `postgres://` selects the networked
    /// backend, anything else is treated as a SQLite path/URL. Absent means
    /// the default SQLite file under `db_dir`.
    pub database_url: Option<String>,
    /// When set, the file-tree backend is active and export tooling is
    /// disabled.
    pub local_fs_db: bool,
    /// Root directory for the file-tree backend and the default SQLite file.
    pub db_dir: PathBuf,
    /// Age threshold for purging unfinished games.
    pub max_game_days: i64,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").ok(),
            local_fs_db: env::var("LOCAL_FS_DB").is_ok(),
            db_dir: env::var("DB_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("db")),
            max_game_days: max_game_days_from(env::var("MAX_GAME_DAYS").ok().as_deref()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
        }
    }
}

/// Parse the purge age threshold; anything that isn't a valid integer falls
/// back to the default of 10 days.
fn max_game_days_from(value: Option<&str>) -> i64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_MAX_GAME_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_game_days_falls_back_to_default() {
        assert_eq!(max_game_days_from(None), 10);
        assert_eq!(max_game_days_from(Some("")), 10);
        assert_eq!(max_game_days_from(Some("soon")), 10);
        assert_eq!(max_game_days_from(Some("25")), 25);
    }
}
