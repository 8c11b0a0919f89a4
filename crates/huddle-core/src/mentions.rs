/// Pulls @-addressed email mentions out of comment text.
///
/// A mention is a whitespace-delimited token that starts with `@` and carries
/// something email-shaped after it, e.g. `@b@x.com`. Trailing punctuation is
/// stripped so `@b@x.com,` still resolves. Results are lowercased and
/// deduplicated in first-seen order; resolving them against actual members
/// happens at comment-save time, not here.
pub fn extract_mention_emails(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for token in text.split_whitespace() {
        let Some(candidate) = token.strip_prefix('@') else {
            continue;
        };
        let candidate = candidate
            .trim_end_matches(|c: char| matches!(c, '.' | ',' | '!' | '?' | ';' | ':' | ')' | '"'))
            .trim_start_matches(|c: char| matches!(c, '(' | '"'));
        if !looks_like_email(candidate) {
            continue;
        }
        let email = candidate.to_ascii_lowercase();
        if !found.contains(&email) {
            found.push(email);
        }
    }
    found
}

fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
