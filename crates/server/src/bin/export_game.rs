//! Export a game's full version chain from the active relational backend
//! into a local file tree.
//!
//! Usage: cargo run --bin export-game -- <game_id> [target_dir]
//!
//! Walks the chain from the current head back to the root via parent links,
//! writing each snapshot to the tree (the root also lands in `start/`), then
//! mirrors the head as the current game file.

use anyhow::{bail, Context};

use server::config::Config;
use server::db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let game_id = args.next().context("missing game id")?;
    let target_dir = args.next().unwrap_or_else(|| "db/export".to_string());

    if std::env::var("LOCAL_FS_DB").is_ok() {
        bail!("the active database already is a local file tree; access the files directly");
    }

    let config = Config::from_env();
    let database = db::connect(&config).await?;
    let local = db::local_filesystem::LocalFilesystem::new(target_dir.as_ref()).await?;

    println!("Loading game {game_id}");
    let head = database.get_game(&game_id).await?;
    println!("Last version is {}", head.save_id.as_deref().unwrap_or("<none>"));

    // Collect every version from the head back to the root.
    let mut chain = vec![head];
    while let Some(parent) = chain.last().and_then(|s| s.parent_save_id.clone()) {
        chain.push(database.get_game_version(&game_id, &parent).await?);
    }

    // Write root first so the head ends up as the current game file.
    for (index, snapshot) in chain.iter().rev().enumerate() {
        let is_root = index == 0;
        println!("Storing version {}", snapshot.save_id.as_deref().unwrap_or("<none>"));
        local.save_serialized_game(snapshot, is_root).await?;
    }
    println!("Exported {game_id} to {target_dir}");
    Ok(())
}
