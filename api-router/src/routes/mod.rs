pub mod admin;
pub mod chat;
pub mod commands;
pub mod health;
pub mod notebooks;
pub mod notes;
pub mod secrets;
pub mod sources;
