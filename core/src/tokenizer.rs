/// Lowercase `text` and delete ASCII punctuation. Whitespace is kept so the
/// caller can split the result into terms.
pub fn normalize(text: &str) -> String {
    text.to_lowercase().chars().filter(|c| !c.is_ascii_punctuation()).collect()
}

/// Normalized terms of `text`, in order of appearance.
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text).split_whitespace().map(str::to_string).collect()
}
