// SPDX-License-Identifier: Apache-2.0

use axum::http::HeaderMap;

pub(crate) mod cors;
pub(crate) mod request_tracing;
pub(crate) mod security;
pub(crate) mod session_guard;

pub(crate) fn normalized_header_value(
    headers: &HeaderMap,
    key: &str,
    max_len: usize,
) -> Option<String> {
    let raw = headers.get(key)?.to_str().ok()?.trim();
    if raw.is_empty() || raw.len() > max_len {
        return None;
    }
    Some(raw.to_string())
}

pub(crate) fn normalized_forwarded_for(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = raw.split(',').next()?.trim();
    if first.is_empty() || first.len() > 64 {
        return None;
    }
    if first
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b':' || b == b'-')
    {
        Some(first.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_values_are_trimmed_and_capped() {
        let mut headers = HeaderMap::new();
        headers.insert("origin", HeaderValue::from_static("  https://app.ricebook.example  "));
        assert_eq!(
            normalized_header_value(&headers, "origin", 256).as_deref(),
            Some("https://app.ricebook.example")
        );
        assert_eq!(normalized_header_value(&headers, "origin", 8), None);
        assert_eq!(normalized_header_value(&headers, "absent", 256), None);
    }

    #[test]
    fn forwarded_for_takes_the_first_clean_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(
            normalized_forwarded_for(&headers).as_deref(),
            Some("203.0.113.9")
        );

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not an ip!!"));
        assert_eq!(normalized_forwarded_for(&headers), None);
    }
}
