//! Backend-contract tests run against the embedded backends: the SQLite
//! variant and the local file tree. The Postgres variant shares its queries
//! and chain logic with SQLite and needs a running server, so it is not
//! exercised here.

use serde_json::json;

use game_core::{Game, GameOptions, Player, Score, SerializedGame};
use server::db::local_filesystem::LocalFilesystem;
use server::db::sqlite::Sqlite;
use server::db::GameDatabase;
use server::error::AppError;

fn new_game(id: &str, players: usize) -> Game {
    let players = (0..players)
        .map(|i| Player {
            name: format!("P{i}"),
            color: ["red", "blue", "green"][i % 3].to_string(),
            score: 0,
        })
        .collect();
    Game::new(id.to_string(), players, GameOptions::default(), json!({"oceans": 0}))
}

async fn save_n(db: &dyn GameDatabase, game: &mut Game, n: usize) -> Vec<String> {
    let mut save_ids = Vec::new();
    for i in 0..n {
        let save_id = format!("{}-s{i}", game.id);
        db.save_game(game, save_id.clone()).await.unwrap();
        game.generation += 1;
        save_ids.push(save_id);
    }
    save_ids
}

// ---------------------------------------------------------------------------
// SQLite backend
// ---------------------------------------------------------------------------

async fn sqlite() -> Sqlite {
    Sqlite::connect("sqlite::memory:", 10).await.unwrap()
}

#[tokio::test]
async fn chain_reaches_root_in_n_minus_one_steps() {
    let db = sqlite().await;
    let mut game = new_game("g1", 2);
    let save_ids = save_n(&db, &mut game, 5).await;

    let mut snapshot = db.get_game("g1").await.unwrap();
    assert_eq!(snapshot.save_id.as_deref(), Some(save_ids[4].as_str()));

    let mut steps = 0;
    while let Some(parent) = snapshot.parent_save_id.clone() {
        snapshot = db.get_game_version("g1", &parent).await.unwrap();
        steps += 1;
    }
    assert_eq!(steps, 4);
    assert_eq!(snapshot.save_id.as_deref(), Some(save_ids[0].as_str()));
    assert_eq!(snapshot.parent_save_id, None);
}

#[tokio::test]
async fn head_tracks_most_recent_save() {
    let db = sqlite().await;
    let mut game = new_game("g1", 2);
    save_n(&db, &mut game, 3).await;

    let head = db.get_game("g1").await.unwrap();
    assert_eq!(head.save_id, game.save_id);
    assert_eq!(head.generation, 3);
}

#[tokio::test]
async fn clone_source_is_always_the_root() {
    let db = sqlite().await;
    let mut game = new_game("g1", 3);
    save_n(&db, &mut game, 4).await;

    let root = db.load_cloneable_game("g1").await.unwrap();
    assert_eq!(root.save_id.as_deref(), Some("g1-s0"));
    assert_eq!(root.parent_save_id, None);
    assert_eq!(root.generation, 1);
    assert_eq!(root.player_count(), 3);
}

#[tokio::test]
async fn listings_follow_game_status() {
    let db = sqlite().await;
    for id in ["g_b", "g_a"] {
        let mut game = new_game(id, 2);
        save_n(&db, &mut game, 2).await;
    }

    let cloneable = db.get_cloneable_games().await.unwrap();
    let ids: Vec<&str> = cloneable.iter().map(|g| g.game_id.as_str()).collect();
    assert_eq!(ids, ["g_a", "g_b"]); // game id ascending
    assert!(cloneable.iter().all(|g| g.player_count == 2));

    assert_eq!(db.get_games().await.unwrap().len(), 2);
    db.clean_saves("g_a").await.unwrap();
    // Finished games drop out of the running listing but stay cloneable.
    assert_eq!(db.get_games().await.unwrap(), vec!["g_b".to_string()]);
    assert_eq!(db.get_cloneable_games().await.unwrap().len(), 2);
}

#[tokio::test]
async fn clean_saves_keeps_root_and_head_only() {
    let db = sqlite().await;
    let mut game = new_game("g1", 2);
    save_n(&db, &mut game, 3).await;

    db.clean_saves("g1").await.unwrap();

    assert!(db.get_game_version("g1", "g1-s0").await.is_ok());
    assert!(matches!(db.get_game_version("g1", "g1-s1").await, Err(AppError::NotFound(_))));
    assert!(db.get_game_version("g1", "g1-s2").await.is_ok());
    assert_eq!(db.get_game("g1").await.unwrap().save_id.as_deref(), Some("g1-s2"));
}

#[tokio::test]
async fn clean_saves_on_unknown_game_only_warns() {
    let db = sqlite().await;
    db.clean_saves("nope").await.unwrap();
}

#[tokio::test]
async fn game_results_are_write_once() {
    let db = sqlite().await;
    let mut game = new_game("g1", 2);
    save_n(&db, &mut game, 2).await;

    let scores = [
        Score { player: "A".into(), score: 30 },
        Score { player: "B".into(), score: 25 },
    ];
    db.save_game_results("g1", 2, 15, &GameOptions::default(), &scores)
        .await
        .unwrap();
    let second = db
        .save_game_results("g1", 2, 15, &GameOptions::default(), &scores)
        .await;
    assert!(matches!(second, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn unknown_games_are_not_found() {
    let db = sqlite().await;
    assert!(matches!(db.get_game("missing").await, Err(AppError::NotFound(_))));
    assert!(matches!(db.load_cloneable_game("missing").await, Err(AppError::NotFound(_))));
    assert!(matches!(db.get_game_version("missing", "s0").await, Err(AppError::NotFound(_))));
}

// ---------------------------------------------------------------------------
// File tree backend
// ---------------------------------------------------------------------------

async fn file_tree() -> (tempfile::TempDir, LocalFilesystem) {
    let dir = tempfile::tempdir().unwrap();
    let db = LocalFilesystem::new(dir.path()).await.unwrap();
    (dir, db)
}

#[tokio::test]
async fn file_tree_mirrors_head_history_and_start() {
    let (dir, db) = file_tree().await;
    let mut game = new_game("g1", 2);
    save_n(&db, &mut game, 2).await;

    assert!(dir.path().join("game-g1.json").is_file());
    assert!(dir.path().join("history").join("game-g1-g1-s0.json").is_file());
    assert!(dir.path().join("history").join("game-g1-g1-s1.json").is_file());
    assert!(dir.path().join("start").join("game-g1.json").is_file());

    // The head mirror is pretty-printed and round-trips through the codec.
    let text = std::fs::read_to_string(dir.path().join("game-g1.json")).unwrap();
    assert!(text.contains('\n'));
    let head = SerializedGame::from_json(&text).unwrap();
    assert_eq!(head.save_id.as_deref(), Some("g1-s1"));
    assert_eq!(head.parent_save_id.as_deref(), Some("g1-s0"));
}

#[tokio::test]
async fn file_tree_pads_short_save_ids() {
    let (dir, db) = file_tree().await;
    let mut game = new_game("g1", 2);
    db.save_game(&mut game, "7".to_string()).await.unwrap();

    assert!(dir.path().join("history").join("game-g1-00007.json").is_file());
}

#[tokio::test]
async fn file_tree_serves_head_root_and_listing() {
    let (_dir, db) = file_tree().await;
    let mut game = new_game("g1", 2);
    save_n(&db, &mut game, 3).await;

    assert_eq!(db.get_game("g1").await.unwrap().save_id.as_deref(), Some("g1-s2"));
    let root = db.load_cloneable_game("g1").await.unwrap();
    assert_eq!(root.save_id.as_deref(), Some("g1-s0"));
    assert_eq!(db.get_games().await.unwrap(), vec!["g1".to_string()]);
    let cloneable = db.get_cloneable_games().await.unwrap();
    assert_eq!(cloneable.len(), 1);
    assert_eq!(cloneable[0].player_count, 2);
}

#[tokio::test]
async fn file_tree_rejects_duplicate_save_ids() {
    let (_dir, db) = file_tree().await;
    let mut game = new_game("g1", 2);
    db.save_game(&mut game, "s1".to_string()).await.unwrap();

    let err = db.save_game(&mut game, "s1".to_string()).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn file_tree_reports_unsupported_operations() {
    let (_dir, db) = file_tree().await;
    assert!(matches!(db.get_game_version("g1", "s0").await, Err(AppError::Unsupported(_))));
    assert!(matches!(db.rollback_saves("g1", "s0", 1).await, Err(AppError::Unsupported(_))));
    assert!(matches!(db.purge_unfinished_games().await, Err(AppError::Unsupported(_))));
    let results = db.save_game_results("g1", 2, 10, &GameOptions::default(), &[]).await;
    assert!(matches!(results, Err(AppError::Unsupported(_))));
    // Pruning warns instead of failing.
    db.clean_saves("g1").await.unwrap();
}
