//! Score ingestion and grid settlement for squares pools

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod grid;
pub mod models;
pub mod normalize;
pub mod settlement;
pub mod workers;

#[cfg(test)]
pub(crate) mod testing;
