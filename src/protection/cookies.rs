// Cookie inventory with protection-vendor attribution
use super::signatures::vendor_for_name;
use crate::models::Headers;
use serde::{Deserialize, Serialize};

const MAX_VALUE_CHARS: usize = 50;

/// Set-Cookie attributes that are not cookies themselves.
const COOKIE_ATTRIBUTES: &[&str] = &[
    "path",
    "domain",
    "expires",
    "max-age",
    "samesite",
    "secure",
    "httponly",
    "priority",
    "partitioned",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieInfo {
    pub name: String,
    pub value: String,
    pub protection_related: bool,
    pub vendor: String,
}

/// List cookies from `Cookie`, or failing that `Set-Cookie`, headers.
pub fn analyze_cookies(headers: &Headers) -> Vec<CookieInfo> {
    let mut values: Vec<&str> = headers
        .get_all_ignore_case("Cookie")
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        values = headers
            .get_all_ignore_case("Set-Cookie")
            .filter(|v| !v.is_empty())
            .collect();
    }

    values
        .into_iter()
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(name, value)| (name.trim(), value.trim()))
        .filter(|(name, _)| !COOKIE_ATTRIBUTES.contains(&name.to_lowercase().as_str()))
        .map(|(name, value)| {
            let vendor = vendor_for_name(name);
            CookieInfo {
                name: name.to_string(),
                value: truncate_value(value),
                protection_related: vendor.is_some(),
                vendor: vendor.unwrap_or("unknown").to_string(),
            }
        })
        .collect()
}

fn truncate_value(value: &str) -> String {
    if value.chars().count() < MAX_VALUE_CHARS {
        value.to_string()
    } else {
        let head: String = value.chars().take(MAX_VALUE_CHARS).collect();
        format!("{}... [truncated]", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_cookies() {
        let headers: Headers = vec![("cookie", "__cf_bm=xyz; theme=dark; flag")]
            .into_iter()
            .collect();

        let cookies = analyze_cookies(&headers);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name, "__cf_bm");
        assert!(cookies[0].protection_related);
        assert_eq!(cookies[0].vendor, "Cloudflare");
        assert_eq!(cookies[1].name, "theme");
        assert!(!cookies[1].protection_related);
        assert_eq!(cookies[1].vendor, "unknown");
    }

    #[test]
    fn test_set_cookie_skips_attributes() {
        let headers: Headers = vec![
            ("Set-Cookie", "datadome=abc; Path=/; Max-Age=3600; SameSite=Lax"),
            ("Set-Cookie", "_dd_s=rum=0; Secure"),
        ]
        .into_iter()
        .collect();

        let cookies = analyze_cookies(&headers);
        let names: Vec<&str> = cookies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["datadome", "_dd_s"]);
        assert_eq!(cookies[1].value, "rum=0");
        assert_eq!(cookies[1].vendor, "DataDome");
    }

    #[test]
    fn test_long_values_truncated() {
        let long = "v".repeat(80);
        let headers: Headers = vec![("Cookie", format!("big={}", long))].into_iter().collect();

        let cookies = analyze_cookies(&headers);
        assert_eq!(cookies[0].value, format!("{}... [truncated]", "v".repeat(50)));
    }

    #[test]
    fn test_no_cookie_headers() {
        assert!(analyze_cookies(&Headers::new()).is_empty());
    }
}
