pub mod api;
pub mod clients;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod models;
pub mod utils;
