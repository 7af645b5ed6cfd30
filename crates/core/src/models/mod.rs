pub mod audit;
pub mod common;
pub mod group;
pub mod institution;
pub mod pass;
pub mod user;
