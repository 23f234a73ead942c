// Vendor signature matching over headers and textual response bodies
use crate::content::decode_text;
use crate::models::Flow;
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Known bot protection vendors and the text fragments that give them away.
/// Order matters: it breaks confidence ties.
const SIGNATURE_TABLE: &[(&str, &[&str])] = &[
    (
        "Cloudflare",
        &[
            r"cf-ray",             // Ray ID header
            r"__cf_bm",            // Bot Management cookie
            r"cf_clearance",       // challenge clearance cookie
            r#""why_captcha""#,    // challenge response payloads
            r"challenge-platform", // challenge scripts
            r"turnstile\.js",      // Turnstile
        ],
    ),
    (
        "Akamai Bot Manager",
        &[r"_abck=", r"akam_", r"bm_sz", r"sensor_data"],
    ),
    ("PerimeterX", &[r"_px\d?=", r"px\.js", r"px-captcha"]),
    ("DataDome", &[r"datadome=", r"datadome\.js", r"_dd_s"]),
    (
        "reCAPTCHA",
        &[r"google\.com/recaptcha", r"recaptcha\.net", r"g-recaptcha"],
    ),
    ("hCaptcha", &[r"hcaptcha\.com", r"h-captcha"]),
    (
        "Generic Bot Detection",
        &[
            r"bot=",
            r"captcha",
            r"challenge",
            r"detected automated traffic",
            r"verify you are human",
        ],
    ),
];

pub struct VendorSignatures {
    pub vendor: &'static str,
    pub patterns: Vec<(&'static str, Regex)>,
}

lazy_static! {
    pub static ref BOT_PROTECTION_SIGNATURES: Vec<VendorSignatures> = SIGNATURE_TABLE
        .iter()
        .map(|(vendor, patterns)| VendorSignatures {
            vendor: *vendor,
            patterns: patterns
                .iter()
                .map(|p| (*p, case_insensitive(p)))
                .collect(),
        })
        .collect();
}

pub(crate) fn case_insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("static pattern must compile")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureMatch {
    pub vendor: String,
    /// Share of the vendor's signatures found, 0-100. A ranking aid, not a probability.
    pub confidence: f64,
    pub matching_signatures: Vec<String>,
}

fn is_textual(content_type: &str) -> bool {
    let content_type = content_type.to_lowercase();
    ["text", "javascript", "json"]
        .iter()
        .any(|t| content_type.contains(t))
}

/// Headers of both directions plus the response body when it is textual.
pub fn searchable_text(flow: &Flow) -> String {
    let mut text = String::new();

    for (k, v) in flow.request.headers.iter() {
        text.push_str(&format!("{}: {}\n", k, v));
    }

    if let Some(response) = &flow.response {
        for (k, v) in response.headers.iter() {
            text.push_str(&format!("{}: {}\n", k, v));
        }

        if is_textual(response.headers.content_type()) {
            text.push_str(&decode_text(&response.body));
        }
    }

    text
}

/// Score a flow against every vendor, best match first.
pub fn identify_protection(flow: &Flow) -> Vec<SignatureMatch> {
    match_text(&searchable_text(flow))
}

pub fn match_text(text: &str) -> Vec<SignatureMatch> {
    let mut matches: Vec<SignatureMatch> = BOT_PROTECTION_SIGNATURES
        .iter()
        .filter_map(|vendor| {
            let found: Vec<String> = vendor
                .patterns
                .iter()
                .filter(|(_, re)| re.is_match(text))
                .map(|(p, _)| p.to_string())
                .collect();

            if found.is_empty() {
                return None;
            }

            Some(SignatureMatch {
                vendor: vendor.vendor.to_string(),
                confidence: found.len() as f64 / vendor.patterns.len() as f64 * 100.0,
                matching_signatures: found,
            })
        })
        .collect();

    // Stable sort keeps table order for equal scores
    matches.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    matches
}

/// First vendor with a signature matching `name`.
pub fn vendor_for_name(name: &str) -> Option<&'static str> {
    BOT_PROTECTION_SIGNATURES
        .iter()
        .find(|vendor| vendor.patterns.iter().any(|(_, re)| re.is_match(name)))
        .map(|vendor| vendor.vendor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FlowKind, Headers, Request, Response};

    fn flow(request_headers: Headers, response: Option<Response>) -> Flow {
        Flow {
            index: 0,
            kind: FlowKind::Http,
            request: Request {
                method: "GET".into(),
                url: "https://shop.test/".into(),
                headers: request_headers,
                body: Vec::new(),
            },
            response,
            started_at: None,
        }
    }

    #[test]
    fn test_cloudflare_from_headers() {
        let headers: Headers = vec![("cf-ray", "123"), ("Cookie", "cf_clearance=abc")]
            .into_iter()
            .collect();

        let matches = identify_protection(&flow(headers, None));
        assert_eq!(matches[0].vendor, "Cloudflare");
        assert!(matches[0].confidence > 0.0);
        assert_eq!(matches[0].matching_signatures, vec!["cf-ray", "cf_clearance"]);
    }

    #[test]
    fn test_body_only_scanned_when_textual() {
        let body = b"<div class=\"g-recaptcha\"></div><script src=\"https://www.google.com/recaptcha/api.js\">".to_vec();

        let binary = Response {
            status_code: 200,
            headers: vec![("Content-Type", "image/png")].into_iter().collect(),
            body: body.clone(),
        };
        assert!(identify_protection(&flow(Headers::new(), Some(binary))).is_empty());

        let html = Response {
            status_code: 200,
            headers: vec![("content-type", "TEXT/HTML")].into_iter().collect(),
            body,
        };
        let matches = identify_protection(&flow(Headers::new(), Some(html)));
        let recaptcha = matches.iter().find(|m| m.vendor == "reCAPTCHA").unwrap();
        assert!((recaptcha.confidence - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_sorted_by_confidence_with_table_order_ties() {
        // hCaptcha 1/2 = 50, PerimeterX 1/3, DataDome 1/3
        let matches = match_text("hcaptcha.com px.js _dd_s");
        let vendors: Vec<&str> = matches.iter().map(|m| m.vendor.as_str()).collect();
        assert_eq!(vendors[0], "hCaptcha");
        let px = vendors.iter().position(|v| *v == "PerimeterX").unwrap();
        let dd = vendors.iter().position(|v| *v == "DataDome").unwrap();
        assert!(px < dd);

        for pair in matches.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[test]
    fn test_no_matches_is_empty() {
        assert!(match_text("Server: nginx\nContent-Length: 10\n").is_empty());
    }

    #[test]
    fn test_vendor_for_name() {
        assert_eq!(vendor_for_name("__cf_bm"), Some("Cloudflare"));
        assert_eq!(vendor_for_name("_dd_s"), Some("DataDome"));
        assert_eq!(vendor_for_name("sessionid"), None);
    }
}
