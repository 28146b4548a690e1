pub mod aggregate;
pub mod api;
pub mod bounds;
pub mod calendar;
pub mod config;
pub mod db;
pub mod intake;
pub mod models;
pub mod report;
pub mod stats;
