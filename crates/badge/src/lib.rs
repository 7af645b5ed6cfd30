//! Rollcall Badge: composes printable badge cards from a template, a photo and a name.

pub mod archive;
pub mod card;

pub use archive::write_zip;
pub use card::{BadgeLayout, BadgeRenderer};
