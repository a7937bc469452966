//! Outbound error hygiene: URL redaction and network-failure classification.

use url::Url;

#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    // Best-effort: drop credentials + query + fragment.
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

/// Redact a URL given as a string; unparseable input is returned unchanged.
#[must_use]
pub fn redact_url_str(url: &str) -> String {
    Url::parse(url).map_or_else(|_| url.to_string(), |u| redact_url(&u))
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}

/// Whether a transport failure means "the remote side is unreachable".
///
/// Connection refused/reset, DNS failures and timeouts all qualify. Request-construction
/// failures (bad URL, bad header) do not.
#[must_use]
pub fn is_network_error(e: &reqwest::Error) -> bool {
    if e.is_builder() {
        return false;
    }
    e.is_connect() || e.is_timeout() || e.is_request()
}

/// The `scheme://host[:port]/` origin of a URL, used as the reachability probe target.
#[must_use]
pub fn origin_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if parsed.cannot_be_a_base() || parsed.host_str().is_none() {
        return None;
    }
    Some(format!("{}/", parsed.origin().ascii_serialization()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_drops_credentials_query_and_fragment() {
        let url = Url::parse("https://user:pw@api.example.com/pets?token=abc#frag").expect("url");
        assert_eq!(redact_url(&url), "https://api.example.com/pets");
    }

    #[test]
    fn redact_str_passes_through_garbage() {
        assert_eq!(redact_url_str("not a url"), "not a url");
        assert_eq!(
            redact_url_str("http://127.0.0.1:8080/a?b=c"),
            "http://127.0.0.1:8080/a"
        );
    }

    #[test]
    fn origin_keeps_scheme_host_and_port() {
        assert_eq!(
            origin_url("http://127.0.0.1:9000/api/v3/pets?x=1").as_deref(),
            Some("http://127.0.0.1:9000/")
        );
        assert_eq!(
            origin_url("https://api.example.com/v1").as_deref(),
            Some("https://api.example.com/")
        );
        assert_eq!(origin_url("mailto:someone@example.com"), None);
        assert_eq!(origin_url("/relative/only"), None);
    }

    #[tokio::test]
    async fn connection_refused_is_a_network_error() {
        let port = unrelated_test_support::pick_unused_port().expect("port");
        let err = reqwest::Client::new()
            .get(format!("http://127.0.0.1:{port}/"))
            .send()
            .await
            .expect_err("nothing is listening");
        assert!(is_network_error(&err));
    }

    #[tokio::test]
    async fn invalid_url_is_not_a_network_error() {
        let err = reqwest::Client::new()
            .get("not a url")
            .send()
            .await
            .expect_err("builder error");
        assert!(!is_network_error(&err));
    }
}
