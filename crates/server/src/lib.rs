pub mod config;
pub mod db;
pub mod error;
pub mod game_loader;
pub mod models;
pub mod routes;
