//! Store visit analysis
//!
//! Jobs naming stores and their visit photos arrive on a queue. Workers fetch
//! just enough of each image to read its dimensions, derive a perimeter
//! metric per store, and record a visit or an error for every store along
//! with the job's overall status.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
