pub mod app;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod output;
pub mod pokeapi;
pub mod prompt;
pub mod snapshot;
