use url::Url;

use crate::error::{InboxError, Result};

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// Parses the configured server address into a base that relative endpoint
/// paths can be joined onto.
pub fn base_url(input: &str) -> Result<Url> {
    let mut normalized = normalize_url(input);
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    let url = Url::parse(&normalized)
        .map_err(|e| InboxError::Config(format!("invalid base_url {input:?}: {e}")))?;
    if url.host_str().is_none() {
        return Err(InboxError::Config(format!("base_url {input:?} has no host")));
    }
    Ok(url)
}

pub fn endpoint(base: &Url, path: &str) -> Result<Url> {
    base.join(path.trim_start_matches('/'))
        .map_err(|e| InboxError::Config(format!("cannot build endpoint {path:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url_adds_scheme() {
        assert_eq!(normalize_url(" localhost:5000 "), "http://localhost:5000");
        assert_eq!(normalize_url("https://gw.example"), "https://gw.example");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let base = base_url("http://gw.example/inbox").unwrap();
        assert_eq!(
            endpoint(&base, "/test-messages").unwrap().as_str(),
            "http://gw.example/inbox/test-messages"
        );
        let base = base_url("127.0.0.1:5000").unwrap();
        assert_eq!(
            endpoint(&base, "send-message").unwrap().as_str(),
            "http://127.0.0.1:5000/send-message"
        );
    }

    #[test]
    fn test_base_url_rejects_garbage() {
        assert!(matches!(base_url("http://"), Err(InboxError::Config(_))));
        assert!(matches!(base_url("http://exa mple.com"), Err(InboxError::Config(_))));
    }
}
