use regex::{Regex, RegexBuilder};

/// Case-insensitive matcher for the search text, or `None` when blank.
pub fn build_highlight_regex(search_text: &str) -> Option<Regex> {
    let needle = search_text.trim();
    if needle.is_empty() {
        return None;
    }
    RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Wraps every match of `regex` in `open`/`close`.
pub fn highlight(text: &str, regex: Option<&Regex>, open: &str, close: &str) -> String {
    let Some(regex) = regex else {
        return text.to_string();
    };
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for found in regex.find_iter(text) {
        out.push_str(&text[last..found.start()]);
        out.push_str(open);
        out.push_str(found.as_str());
        out.push_str(close);
        last = found.end();
    }
    out.push_str(&text[last..]);
    out
}
