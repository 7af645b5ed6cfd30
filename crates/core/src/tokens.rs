//! Student login codes.
//!
//! A code looks like `0004-12a1b2c3`: the zero-padded group id, then the
//! alphabet position of the student's last-name initial, then six random hex
//! digits. The same string is used as both username and password.

use rand::Rng;

/// How many fresh codes to try before giving up on a username collision.
pub const MAX_TOKEN_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentToken(String);

impl StudentToken {
    pub fn generate(group_id: i64, last_name: &str) -> Self {
        let mut rng = rand::thread_rng();
        let bytes: [u8; 3] = rng.gen();
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Self(format!(
            "{group_id:04}-{}{hex}",
            initial_index(last_name)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for StudentToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Alphabet position of the first letter of `name`.
///
/// Cyrillic `а..я` map to 0..31 and `ё` to 33, Latin `a..z` to 0..25.
/// Anything else (including an empty name) maps to 99.
pub fn initial_index(name: &str) -> u32 {
    let Some(first) = name.trim().chars().next() else {
        return 99;
    };
    let lower = first.to_lowercase().next().unwrap_or(first);
    match lower {
        'а'..='я' => lower as u32 - 'а' as u32,
        'ё' => 33,
        'a'..='z' => lower as u32 - 'a' as u32,
        _ => 99,
    }
}
