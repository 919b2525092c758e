//! Caching façade above a storage backend.
//!
//! Route handlers go through the loader rather than the backend so that a
//! game is reconstituted once and shared between requests. Concurrent
//! requests for the same game and version observe a single underlying read;
//! late arrivals wait on the in-flight load and receive the broadcast
//! result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{oneshot, Mutex};

use game_core::{Game, GameId, SaveId};

use crate::db::GameDatabase;
use crate::error::AppError;

pub type SharedGame = Arc<Mutex<Game>>;

type LoadKey = (GameId, Option<SaveId>);

#[derive(Default)]
struct LoaderState {
    /// Reconstituted games at their current head.
    cache: HashMap<GameId, SharedGame>,
    /// In-flight loads, keyed by game and optional version, with the waiters
    /// to notify when the leader finishes.
    pending: HashMap<LoadKey, Vec<oneshot::Sender<Option<SharedGame>>>>,
}

#[derive(Clone)]
pub struct GameLoader {
    db: Arc<dyn GameDatabase>,
    state: Arc<StdMutex<LoaderState>>,
}

impl GameLoader {
    pub fn new(db: Arc<dyn GameDatabase>) -> Self {
        Self { db, state: Arc::new(StdMutex::new(LoaderState::default())) }
    }

    pub fn db(&self) -> &Arc<dyn GameDatabase> {
        &self.db
    }

    /// Fetch a game at its head (`save_id` of `None`) or at an exact
    /// historical version. Head loads are cached; `force_reload` evicts the
    /// cached entry first. Absence and load failures both come back as
    /// `None` — failures are logged here, and absence is a normal outcome.
    pub async fn get_by_game_id(
        &self,
        game_id: &str,
        save_id: Option<&str>,
        force_reload: bool,
    ) -> Option<SharedGame> {
        let key: LoadKey = (game_id.to_string(), save_id.map(str::to_string));

        let (rx, lead) = {
            let mut state = self.state.lock().expect("loader state poisoned");
            if save_id.is_none() {
                if force_reload {
                    state.cache.remove(game_id);
                } else if let Some(game) = state.cache.get(game_id) {
                    return Some(game.clone());
                }
            }
            let (tx, rx) = oneshot::channel();
            let lead = match state.pending.get_mut(&key) {
                Some(waiters) => {
                    waiters.push(tx);
                    false
                }
                None => {
                    state.pending.insert(key.clone(), vec![tx]);
                    true
                }
            };
            (rx, lead)
        };

        if lead {
            // The load runs detached from the initiating request: axum drops
            // handler futures when a client disconnects, and an abandoned
            // pending entry would wedge every later request for this key.
            let loader = self.clone();
            let key = key.clone();
            tokio::spawn(async move { loader.lead_load(key).await });
        }

        rx.await.unwrap_or(None)
    }

    /// Perform the backend read for a key and broadcast the outcome to every
    /// waiter registered while it was in flight.
    async fn lead_load(&self, key: LoadKey) {
        let (game_id, save_id) = &key;
        let result = match self.load(game_id, save_id.as_deref()).await {
            Ok(game) => Some(Arc::new(Mutex::new(game))),
            Err(AppError::NotFound(msg)) => {
                tracing::warn!("unable to find {game_id}: {msg}");
                None
            }
            Err(e) => {
                tracing::error!("failed to load {game_id}: {e}");
                None
            }
        };

        let waiters = {
            let mut state = self.state.lock().expect("loader state poisoned");
            if save_id.is_none() {
                if let Some(game) = &result {
                    state.cache.insert(game_id.clone(), game.clone());
                }
            }
            state.pending.remove(&key).unwrap_or_default()
        };
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }

    /// Cache a freshly created game at its head.
    pub fn add(&self, game: Game) -> SharedGame {
        let id = game.id.clone();
        let shared = Arc::new(Mutex::new(game));
        let mut state = self.state.lock().expect("loader state poisoned");
        state.cache.insert(id, shared.clone());
        shared
    }

    async fn load(&self, game_id: &str, save_id: Option<&str>) -> Result<Game, AppError> {
        let snapshot = match save_id {
            None => self.db.get_game(game_id).await?,
            Some(save_id) => self.db.get_game_version(game_id, save_id).await?,
        };
        Ok(Game::deserialize(snapshot))
    }
}
