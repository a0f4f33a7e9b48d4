/// Text normalization applied before field comparison: strip diacritics by
/// decomposing to NFD and dropping combining marks, then uppercase and
/// collapse whitespace. Blocking keys and comparator inputs both go through
/// this so "José " and "JOSE" compare equal.
pub fn normalize_text(input: &str) -> String {
    use unicode_normalization::UnicodeNormalization;
    let stripped: String = input
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect();
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}
