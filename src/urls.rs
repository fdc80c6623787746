use url::Url;

const FAVICON_SERVICE: &str = "https://www.google.com/s2/favicons";
const FOLDER_MANAGER: &str = "chrome://bookmarks/?id=";

pub fn hostname(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .filter(|host| !host.is_empty())
}

/// Hostname for grouping and domain suppression; the lowercased raw input when
/// it does not parse, matching how parsed hosts are normalised.
pub fn domain_key(raw: &str) -> String {
    hostname(raw).unwrap_or_else(|| raw.trim().to_lowercase())
}

/// The URL without its query string or fragment.
pub fn without_query(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw
            .split(|ch| ch == '?' || ch == '#')
            .next()
            .unwrap_or(raw)
            .to_string(),
    }
}

pub fn favicon_url(raw: &str) -> String {
    match hostname(raw) {
        Some(host) => format!("{FAVICON_SERVICE}?domain={host}&sz=32"),
        None => String::new(),
    }
}

pub fn folder_url(folder_id: &str) -> String {
    format!("{FOLDER_MANAGER}{folder_id}")
}
