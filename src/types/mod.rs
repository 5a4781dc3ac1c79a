// src/types/mod.rs

pub mod chat;
pub mod openai;

pub use chat::*;
pub use openai::*;
