//! Bot protection analysis for a single recorded flow.
//!
//! Combines vendor signature matching, cookie attribution, challenge
//! classification and script heuristics into one [`ProtectionAnalysis`],
//! then derives remediation hints from it.

pub mod challenge;
pub mod cookies;
pub mod scripts;
pub mod signatures;
pub mod suggestions;

pub use challenge::{analyze_challenge, ChallengeType, ChallengeVerdict};
pub use cookies::{analyze_cookies, CookieInfo};
pub use scripts::{analyze_script, extract_javascript, ObfuscationLevel, ScriptAnalysis, ScriptRecord};
pub use signatures::{identify_protection, SignatureMatch};
pub use suggestions::generate_suggestions;

use crate::content::decode_text;
use crate::models::Flow;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionAnalysis {
    pub flow_index: usize,
    pub method: String,
    pub url: String,
    pub protection_systems: Vec<SignatureMatch>,
    pub request_cookies: Vec<CookieInfo>,
    pub has_response: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_cookies: Option<Vec<CookieInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_analysis: Option<ChallengeVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_html: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scripts: Option<Vec<ScriptRecord>>,
    pub suggestions: Vec<String>,
}

impl ProtectionAnalysis {
    pub fn is_challenge(&self) -> bool {
        self.challenge_analysis
            .as_ref()
            .is_some_and(|c| c.is_challenge)
    }
}

/// Run every detector over `flow`. Scripts are only extracted from HTML responses.
pub fn analyze_flow(flow: &Flow, extract_scripts: bool) -> ProtectionAnalysis {
    let mut analysis = ProtectionAnalysis {
        flow_index: flow.index,
        method: flow.request.method.clone(),
        url: flow.request.url.clone(),
        protection_systems: identify_protection(flow),
        request_cookies: analyze_cookies(&flow.request.headers),
        has_response: flow.response.is_some(),
        status_code: None,
        response_cookies: None,
        challenge_analysis: None,
        content_type: None,
        is_html: None,
        scripts: None,
        suggestions: Vec::new(),
    };

    if let Some(response) = &flow.response {
        let content_type = response.headers.content_type().to_string();
        let is_html = content_type.to_lowercase().contains("text/html");

        analysis.status_code = Some(response.status_code);
        analysis.response_cookies = Some(analyze_cookies(&response.headers));
        analysis.challenge_analysis = Some(analyze_challenge(flow));
        analysis.is_html = Some(is_html);
        analysis.content_type = Some(content_type);

        if is_html && extract_scripts {
            let scripts = extract_javascript(&decode_text(&response.body));
            debug!("Flow {}: extracted {} scripts", flow.index, scripts.len());
            analysis.scripts = Some(scripts);
        }
    }

    analysis.suggestions = generate_suggestions(&analysis);
    analysis
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::{Flow, FlowKind, Headers, Request, Response};

    pub fn html_flow(status: u16, response_headers: Vec<(&str, &str)>, body: &str) -> Flow {
        Flow {
            index: 4,
            kind: FlowKind::Http,
            request: Request {
                method: "GET".into(),
                url: "https://shop.test/products".into(),
                headers: vec![("User-Agent", "curl/8.0")].into_iter().collect::<Headers>(),
                body: Vec::new(),
            },
            response: Some(Response {
                status_code: status,
                headers: response_headers.into_iter().collect(),
                body: body.as_bytes().to_vec(),
            }),
            started_at: None,
        }
    }
}
