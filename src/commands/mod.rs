// src/commands/mod.rs

pub mod chat;
pub mod config;
pub mod profile;

pub use chat::*;
pub use config::*;
pub use profile::*;
