use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static BLOCK_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*/?\s*(?:br|div)\b[^>]*>").expect("valid block tag regex")
});
static INLINE_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*/?\s*(?:a|b|small)\b[^>]*>").expect("valid inline tag regex")
});

/// Turns the limited markup found in feed text into a single plain line.
///
/// Line-breaking tags become spaces, inline tags vanish, entities are decoded
/// and whitespace is collapsed.
pub fn strip_html(raw: &str) -> String {
    let spaced = BLOCK_TAG_RE.replace_all(raw, " ");
    let unwrapped = INLINE_TAG_RE.replace_all(&spaced, "");
    let unescaped = decode_entities(&unwrapped.replace("&nbsp;", " "));
    collapse_whitespace(&unescaped)
}

/// Decodes named and numeric entities only. Stray `<` and `>` stay text.
fn decode_entities(raw: &str) -> String {
    html_escape::decode_html_entities(raw).into_owned()
}

pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Unwraps click-tracking redirectors (`...?u=<destination>`).
///
/// Anything that does not parse, or carries no `u` parameter, comes back as-is.
pub fn strip_tracking(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .query_pairs()
                .find(|(key, _)| key == "u")
                .map(|(_, value)| value.into_owned())
        })
        .filter(|target| !target.is_empty())
        .unwrap_or_else(|| url.to_string())
}

/// Joins non-empty pieces with single spaces.
pub fn join_words<I, S>(pieces: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = pieces
        .into_iter()
        .map(|piece| piece.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(" ");
    collapse_whitespace(&joined)
}
