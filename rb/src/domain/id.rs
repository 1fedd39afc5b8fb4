//! Reminder ID generation and resolution
//!
//! Reminder IDs use the format: `{8-char-hex}-{slug}`
//! Example: `9f3c01ab-take-vitamins`

/// Longest slug kept in a generated ID
const MAX_SLUG_LEN: usize = 24;

/// Generate a reminder ID from its title
pub fn generate_id(title: &str) -> String {
    let simple = uuid::Uuid::now_v7().simple().to_string();
    // The tail of a v7 UUID is random; the head is a coarse timestamp
    let hex = &simple[simple.len() - 8..];
    let slug = slugify(title);
    if slug.is_empty() {
        hex.to_string()
    } else {
        format!("{}-{}", hex, slug)
    }
}

/// Generate a time-ordered ID for history rows
pub fn generate_entry_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Slugify a title for use in IDs
fn slugify(title: &str) -> String {
    let slug = title
        .to_lowercase()
        .chars()
        // Strip apostrophes entirely, replace other non-alphanumeric with hyphens
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    match slug.char_indices().nth(MAX_SLUG_LEN) {
        Some((cut, _)) => slug[..cut].trim_end_matches('-').to_string(),
        None => slug,
    }
}

/// Resolve a user-supplied reference against known IDs
///
/// Returns:
/// - Ok(Some(id)) if exactly one match
/// - Ok(None) if no matches
/// - Err with candidates if ambiguous
pub fn resolve_id<'a, I>(ids: I, reference: &str) -> Result<Option<String>, Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let ids: Vec<&str> = ids.into_iter().collect();
    if ids.contains(&reference) {
        return Ok(Some(reference.to_string()));
    }

    let mut matches: Vec<String> = ids
        .into_iter()
        .filter(|id| matches(id, reference))
        .map(str::to_string)
        .collect();

    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        _ => {
            matches.sort();
            Err(matches)
        }
    }
}

/// Check if an ID matches a partial reference (hex prefix or slug fragment)
fn matches(id: &str, reference: &str) -> bool {
    if reference.is_empty() {
        return false;
    }
    if id.starts_with(reference) {
        return true;
    }
    match id.find('-') {
        Some(slug_start) => id[slug_start + 1..].contains(reference),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id() {
        let id = generate_id("Take Vitamins");
        assert_eq!(id.len(), 8 + 1 + "take-vitamins".len());
        assert!(id.ends_with("-take-vitamins"));
    }

    #[test]
    fn test_generate_id_without_slug() {
        let id = generate_id("!!!");
        assert_eq!(id.len(), 8);
    }

    #[test]
    fn test_generate_ids_are_unique() {
        let a = generate_id("same");
        let b = generate_id("same");
        assert_ne!(a, b);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Call Mom"), "call-mom");
        assert_eq!(slugify("Pay rent!"), "pay-rent");
        assert_eq!(slugify("don't forget"), "dont-forget");
        assert_eq!(slugify("a very long reminder title that keeps going"), "a-very-long-reminder-tit");
    }

    #[test]
    fn test_resolve_exact_and_prefix() {
        let ids = ["0a1b2c3d-call-mom", "ffee0011-pay-rent"];
        assert_eq!(
            resolve_id(ids, "0a1b2c3d-call-mom").unwrap(),
            Some("0a1b2c3d-call-mom".to_string())
        );
        assert_eq!(resolve_id(ids, "ffee").unwrap(), Some("ffee0011-pay-rent".to_string()));
        assert_eq!(resolve_id(ids, "rent").unwrap(), Some("ffee0011-pay-rent".to_string()));
    }

    #[test]
    fn test_resolve_ambiguous_and_missing() {
        let ids = ["0a1b2c3d-call-mom", "0a1b9999-call-dad"];
        let candidates = resolve_id(ids, "call").unwrap_err();
        assert_eq!(candidates.len(), 2);
        assert_eq!(resolve_id(ids, "dentist").unwrap(), None);
        assert_eq!(resolve_id(ids, "").unwrap(), None);
    }
}
