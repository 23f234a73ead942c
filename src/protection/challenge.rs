// Challenge response classification - status codes, vendor headers and page phrases
use super::signatures::case_insensitive;
use crate::content::decode_text;
use crate::models::Flow;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

const CHALLENGE_STATUS_CODES: &[u16] = &[403, 429, 503];

const CHALLENGE_HEADERS: &[(&str, &str)] = &[
    ("cf-mitigated", "Cloudflare mitigation"),
    ("cf-chl-bypass", "Cloudflare challenge bypass"),
    ("x-datadome", "DataDome protection"),
    ("x-px", "PerimeterX"),
    ("x-amz-captcha", "AWS WAF Captcha"),
];

const CHALLENGE_PATTERNS: &[(&str, &str)] = &[
    (r"captcha", "CAPTCHA"),
    (r"challenge", "Challenge term"),
    (r"blocked", "Blocking message"),
    (r"verify.*human", "Human verification"),
    (r"suspicious.*activity", "Suspicious activity message"),
    (r"security.*check", "Security check message"),
    (r"ddos", "DDoS protection message"),
    (r"automated.*request", "Automated request detection"),
];

lazy_static! {
    static ref CHALLENGE_REGEXES: Vec<(Regex, &'static str)> = CHALLENGE_PATTERNS
        .iter()
        .map(|(pattern, label)| (case_insensitive(pattern), *label))
        .collect();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeType {
    Captcha,
    Javascript,
    Other,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeVerdict {
    pub is_challenge: bool,
    pub challenge_indicators: Vec<String>,
    pub status_code: Option<u16>,
    pub challenge_type: ChallengeType,
}

impl ChallengeVerdict {
    fn none() -> Self {
        Self {
            is_challenge: false,
            challenge_indicators: Vec::new(),
            status_code: None,
            challenge_type: ChallengeType::Unknown,
        }
    }
}

/// Decide whether a flow's response is an anti-automation challenge.
pub fn analyze_challenge(flow: &Flow) -> ChallengeVerdict {
    let Some(response) = &flow.response else {
        return ChallengeVerdict::none();
    };

    let mut indicators = Vec::new();

    if CHALLENGE_STATUS_CODES.contains(&response.status_code) {
        indicators.push(format!("Suspicious status code: {}", response.status_code));
    }

    for (header, label) in CHALLENGE_HEADERS {
        if response.headers.contains_ignore_case(header) {
            indicators.push(format!("Challenge header: {}", label));
        }
    }

    let content = decode_text(&response.body);
    for (re, label) in CHALLENGE_REGEXES.iter() {
        if re.is_match(&content) {
            indicators.push(format!("Content indicator: {}", label));
        }
    }

    let is_challenge = !indicators.is_empty();

    // First match wins. The JavaScript check is a plain substring test on the body.
    let challenge_type = if indicators.iter().any(|i| i.contains("CAPTCHA")) {
        ChallengeType::Captcha
    } else if is_challenge && content.contains("JavaScript") {
        ChallengeType::Javascript
    } else if is_challenge {
        ChallengeType::Other
    } else {
        ChallengeType::Unknown
    };

    ChallengeVerdict {
        is_challenge,
        challenge_indicators: indicators,
        status_code: Some(response.status_code),
        challenge_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FlowKind, Headers, Request, Response};

    fn flow_with(status: u16, headers: Vec<(&str, &str)>, body: &str) -> Flow {
        Flow {
            index: 0,
            kind: FlowKind::Http,
            request: Request {
                method: "GET".into(),
                url: "https://shop.test/".into(),
                headers: Headers::new(),
                body: Vec::new(),
            },
            response: Some(Response {
                status_code: status,
                headers: headers.into_iter().collect(),
                body: body.as_bytes().to_vec(),
            }),
            started_at: None,
        }
    }

    #[test]
    fn test_human_verification_page() {
        let verdict = analyze_challenge(&flow_with(403, vec![], "Please verify you are human"));

        assert!(verdict.is_challenge);
        assert!(verdict.challenge_indicators.len() >= 2);
        assert_eq!(verdict.challenge_indicators[0], "Suspicious status code: 403");
        assert!(verdict
            .challenge_indicators
            .contains(&"Content indicator: Human verification".to_string()));
        assert_eq!(verdict.status_code, Some(403));
        assert_eq!(verdict.challenge_type, ChallengeType::Other);
    }

    #[test]
    fn test_captcha_takes_precedence() {
        let verdict = analyze_challenge(&flow_with(
            200,
            vec![],
            "<noscript>Enable JavaScript</noscript><div class=\"captcha\"></div>",
        ));
        assert_eq!(verdict.challenge_type, ChallengeType::Captcha);

        // The AWS header label carries "Captcha", not "CAPTCHA"
        let verdict = analyze_challenge(&flow_with(405, vec![("X-Amz-Captcha", "1")], ""));
        assert!(verdict.is_challenge);
        assert_eq!(verdict.challenge_type, ChallengeType::Other);
    }

    #[test]
    fn test_javascript_is_literal_substring() {
        let verdict = analyze_challenge(&flow_with(
            503,
            vec![("cf-mitigated", "challenge")],
            "Please enable JavaScript and cookies to continue",
        ));
        assert_eq!(verdict.challenge_type, ChallengeType::Javascript);
        assert!(verdict
            .challenge_indicators
            .contains(&"Challenge header: Cloudflare mitigation".to_string()));

        let verdict = analyze_challenge(&flow_with(503, vec![], "please enable javascript"));
        assert_eq!(verdict.challenge_type, ChallengeType::Other);
    }

    #[test]
    fn test_plain_response_is_not_challenge() {
        let verdict = analyze_challenge(&flow_with(200, vec![], "Welcome, JavaScript fans"));
        assert!(!verdict.is_challenge);
        assert!(verdict.challenge_indicators.is_empty());
        assert_eq!(verdict.challenge_type, ChallengeType::Unknown);
        assert_eq!(verdict.status_code, Some(200));
    }

    #[test]
    fn test_missing_response() {
        let mut flow = flow_with(200, vec![], "");
        flow.response = None;
        assert_eq!(analyze_challenge(&flow), ChallengeVerdict::none());
    }
}
