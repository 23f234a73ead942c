// Remediation hints derived from a finished protection analysis
use super::{ChallengeType, ObfuscationLevel, ProtectionAnalysis};

/// Confidence (percent) above which the top vendor is called out by name.
const VENDOR_CALLOUT_THRESHOLD: f64 = 50.0;

const GENERAL_RECOMMENDATIONS: &[&str] = &[
    "General recommendations:",
    "- Maintain consistent User-Agent between requests",
    "- Preserve all cookies from the session",
    "- Add appropriate referer and origin headers",
    "- Consider adding delays between requests to avoid rate limiting",
    "- Use rotating IP addresses if available",
];

fn vendor_hints(vendor: &str) -> &'static [&'static str] {
    if vendor.contains("Cloudflare") {
        &[
            "Cloudflare often uses JavaScript challenges. Check for cf_clearance cookie.",
            "Consider using proven techniques like cfscrape or cloudscraper libraries.",
        ]
    } else if vendor.contains("Akamai") {
        &[
            "Akamai uses sensor_data for browser fingerprinting.",
            "Focus on _abck cookie which contains browser verification data.",
        ]
    } else if vendor.contains("PerimeterX") {
        &[
            "PerimeterX relies on JavaScript execution and browser fingerprinting.",
            "Look for _px cookies which are essential for session validation.",
        ]
    } else if vendor.contains("DataDome") {
        &[
            "DataDome uses advanced behavioral and fingerprinting techniques.",
            "The datadome cookie is critical for maintaining sessions.",
        ]
    } else if vendor.contains("CAPTCHA") {
        &["This site uses CAPTCHA challenges which may require manual solving or specialized services."]
    } else {
        &[]
    }
}

pub fn generate_suggestions(analysis: &ProtectionAnalysis) -> Vec<String> {
    let mut suggestions = Vec::new();

    if let Some(top) = analysis.protection_systems.first() {
        if top.confidence > VENDOR_CALLOUT_THRESHOLD {
            suggestions.push(format!(
                "Detected {} with {:.1}% confidence.",
                top.vendor, top.confidence
            ));
            suggestions.extend(vendor_hints(&top.vendor).iter().map(|s| s.to_string()));
        }
    }

    if let Some(challenge) = analysis.challenge_analysis.as_ref().filter(|c| c.is_challenge) {
        match challenge.challenge_type {
            ChallengeType::Javascript => {
                suggestions.push("This response contains a JavaScript challenge that must be solved.".to_string());
                suggestions.push("Consider using a headless browser to execute the challenge JavaScript.".to_string());

                if let Some(scripts) = &analysis.scripts {
                    let summaries: Vec<_> = scripts.iter().filter_map(|s| s.summary()).collect();

                    let obfuscated = summaries
                        .iter()
                        .filter(|s| s.obfuscation_level != ObfuscationLevel::None)
                        .count();
                    if obfuscated > 0 {
                        suggestions.push(format!(
                            "Found {} obfuscated script(s) that likely contain challenge logic.",
                            obfuscated
                        ));
                    }

                    let mut techniques: Vec<&str> = Vec::new();
                    for technique in summaries
                        .iter()
                        .flat_map(|s| s.fingerprinting_indicators.iter())
                    {
                        if !techniques.contains(&technique.as_str()) {
                            techniques.push(technique);
                        }
                    }
                    if !techniques.is_empty() {
                        suggestions.push(format!(
                            "Detected browser fingerprinting techniques: {}.",
                            techniques.join(", ")
                        ));
                    }
                }
            }
            ChallengeType::Captcha => {
                suggestions.push("This response contains a CAPTCHA challenge.".to_string());
                suggestions.push("Consider using a CAPTCHA solving service or manual intervention.".to_string());
            }
            ChallengeType::Other | ChallengeType::Unknown => {}
        }
    }

    let protection_cookies: Vec<&str> = analysis
        .response_cookies
        .iter()
        .flatten()
        .filter(|c| c.protection_related)
        .map(|c| c.name.as_str())
        .collect();
    if !protection_cookies.is_empty() {
        suggestions.push(format!(
            "Important protection cookies to maintain: {}.",
            protection_cookies.join(", ")
        ));
    }

    if !analysis.protection_systems.is_empty() || analysis.is_challenge() {
        suggestions.extend(GENERAL_RECOMMENDATIONS.iter().map(|s| s.to_string()));
    }

    suggestions
}
