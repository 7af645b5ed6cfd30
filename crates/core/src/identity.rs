//! Email normalization and sign-in identifier rules.

/// Canonical form of an email address, used for storage and lookup.
///
/// Lowercases, drops `+tag` suffixes, folds Yandex domains into `yandex.ru`
/// (where `.` and `-` are interchangeable in the mailbox name) and strips dots
/// from Gmail mailboxes. A value without `@` is returned unchanged.
pub fn normalize_email(email: &str) -> String {
    if !email.contains('@') {
        return email.to_string();
    }

    let lowered = email.trim().to_lowercase();
    let Some((local, domain)) = lowered.rsplit_once('@') else {
        return lowered;
    };

    let mut local = match local.split_once('+') {
        Some((head, _)) => head.to_string(),
        None => local.to_string(),
    };
    let mut domain = domain.to_string();

    match domain.as_str() {
        "ya.ru" | "yandex.ru" => {
            domain = "yandex.ru".to_string();
            local = local.replace('.', "-");
        }
        "gmail.com" => {
            local = local.replace('.', "");
        }
        _ => {}
    }

    format!("{local}@{domain}")
}

/// Loose syntactic check used to decide whether a login is an email address.
pub fn is_email(value: &str) -> bool {
    let value = value.trim();
    let mut parts = value.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() || local.chars().any(char::is_whitespace) {
        return false;
    }
    if domain.chars().any(char::is_whitespace) || !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|label| !label.is_empty())
}

/// Characters allowed in a username.
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.chars().count() <= 150
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}
