//! Rollcall Core: accounts, organization groups, roster import, passes and the database layer.

pub mod accounts;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod mail;
pub mod media;
pub mod models;
pub mod passes;
pub mod passwords;
pub mod roster;
pub mod tokens;
