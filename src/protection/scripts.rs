// Script extraction from HTML and heuristic scoring of protection JavaScript
use super::signatures::case_insensitive;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

const MAX_INLINE_CHARS: usize = 1000;

const SUSPICIOUS_SRC_TERMS: &[&str] = &[
    "captcha", "challenge", "bot", "protect", "security", "verify", "check", "shield", "defend",
    "guard",
];

const SUSPICIOUS_FUNCTION_TERMS: &[&str] = &[
    "challenge", "token", "captcha", "verify", "bot", "check", "security",
];

const FINGERPRINTING_PATTERNS: &[(&str, &str)] = &[
    (r"navigator\.", "Browser navigator object"),
    (r"screen\.", "Screen properties"),
    (r"canvas", "Canvas fingerprinting"),
    (r"webgl", "WebGL fingerprinting"),
    (r"font", "Font enumeration"),
    (r"audio", "Audio fingerprinting"),
    (r"plugins", "Plugin enumeration"),
    (r"User-Agent", "User-Agent checking"),
    (r"platform", "Platform detection"),
];

const TOKEN_PATTERNS: &[(&str, &str)] = &[
    (r"(token|captcha|challenge|clearance)", "Token/challenge reference"),
    (r"(generate|calculate|compute)", "Computation terms"),
    (r"(Math\.random|crypto)", "Random generation"),
    (r"(cookie|setCookie|document\.cookie)", "Cookie manipulation"),
    (r"(xhr|XMLHttpRequest|fetch)", "Request sending"),
];

lazy_static! {
    static ref INLINE_SCRIPT: Regex = Regex::new(r"(?s)<script[^>]*>(.*?)</script>").unwrap();
    static ref EXTERNAL_SCRIPT: Regex =
        Regex::new(r#"<script[^>]*src=['"]([^'"]+)['"][^>]*>"#).unwrap();
    static ref FINGERPRINTING: Vec<(Regex, &'static str)> = compile_table(FINGERPRINTING_PATTERNS);
    static ref TOKEN_GENERATION: Vec<(Regex, &'static str)> = compile_table(TOKEN_PATTERNS);
    static ref EVAL_CALL: Regex = Regex::new(r"eval\(").unwrap();
    static ref HEX_ESCAPE: Regex = Regex::new(r"\\x[0-9a-f]{2}").unwrap();
    static ref FROM_CHAR_CODE: Regex = Regex::new(r"String\.fromCharCode").unwrap();
    static ref MINIFIED_SIGNATURE: Regex =
        Regex::new(r"function\(\w{1,2},\w{1,2},\w{1,2}\)\{").unwrap();
    static ref WORD: Regex = Regex::new(r"\w+").unwrap();
    static ref FUNCTION_DECL: Regex = Regex::new(r"function\s+(\w+)\s*\(").unwrap();
}

fn compile_table(table: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    table
        .iter()
        .map(|(pattern, label)| (case_insensitive(pattern), *label))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObfuscationLevel {
    None,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptAnalysis {
    pub potential_protection: bool,
    pub fingerprinting_indicators: Vec<String>,
    pub token_generation_indicators: Vec<String>,
    pub obfuscation_level: ObfuscationLevel,
    pub key_functions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScriptRecord {
    Inline {
        index: usize,
        size: usize,
        content: String,
        summary: ScriptAnalysis,
    },
    External {
        index: usize,
        src: String,
        suspicious: bool,
    },
}

impl ScriptRecord {
    pub fn summary(&self) -> Option<&ScriptAnalysis> {
        match self {
            ScriptRecord::Inline { summary, .. } => Some(summary),
            ScriptRecord::External { .. } => None,
        }
    }
}

/// Pull inline and external scripts out of an HTML page, inline ones first.
pub fn extract_javascript(html: &str) -> Vec<ScriptRecord> {
    let mut scripts = Vec::new();

    // Indexes count every inline match, including blank ones that are skipped
    for (index, caps) in INLINE_SCRIPT.captures_iter(html).enumerate() {
        let script = caps.get(1).map_or("", |m| m.as_str());
        if script.trim().is_empty() {
            continue;
        }

        let size = script.chars().count();
        let content = if size < MAX_INLINE_CHARS {
            script.to_string()
        } else {
            let head: String = script.chars().take(MAX_INLINE_CHARS).collect();
            format!("{}... [truncated]", head)
        };

        scripts.push(ScriptRecord::Inline {
            index,
            size,
            content,
            summary: analyze_script(script),
        });
    }

    for (index, caps) in EXTERNAL_SCRIPT.captures_iter(html).enumerate() {
        let src = caps.get(1).map_or("", |m| m.as_str());
        let lowered = src.to_lowercase();
        scripts.push(ScriptRecord::External {
            index,
            src: src.to_string(),
            suspicious: SUSPICIOUS_SRC_TERMS.iter().any(|t| lowered.contains(t)),
        });
    }

    scripts
}

fn matching_labels(table: &[(Regex, &'static str)], script: &str) -> Vec<String> {
    table
        .iter()
        .filter(|(re, _)| re.is_match(script))
        .map(|(_, label)| label.to_string())
        .collect()
}

/// Obfuscation cascade; the first rule that fires decides the level.
pub fn obfuscation_level(script: &str) -> ObfuscationLevel {
    let length = script.chars().count();

    if EVAL_CALL.find_iter(script).count() > 3
        || HEX_ESCAPE.find_iter(script).count() > 10
        || FROM_CHAR_CODE.find_iter(script).count() > 3
    {
        ObfuscationLevel::High
    } else if MINIFIED_SIGNATURE.is_match(script)
        || script.matches(';').count() as f64 > length as f64 / 10.0
        || WORD
            .find_iter(script)
            .filter(|w| w.as_str().chars().count() > 30)
            .count()
            > 10
    {
        ObfuscationLevel::Medium
    } else {
        ObfuscationLevel::None
    }
}

/// Score one script for fingerprinting, token generation and obfuscation.
pub fn analyze_script(script: &str) -> ScriptAnalysis {
    let fingerprinting_indicators = matching_labels(&FINGERPRINTING, script);
    let token_generation_indicators = matching_labels(&TOKEN_GENERATION, script);
    let obfuscation_level = obfuscation_level(script);

    let key_functions: Vec<String> = FUNCTION_DECL
        .captures_iter(script)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|name| {
            let lowered = name.to_lowercase();
            SUSPICIOUS_FUNCTION_TERMS.iter().any(|t| lowered.contains(t))
        })
        .map(str::to_string)
        .collect();

    let potential_protection = fingerprinting_indicators.len() > 2
        || token_generation_indicators.len() > 2
        || obfuscation_level != ObfuscationLevel::None
        || !key_functions.is_empty();

    ScriptAnalysis {
        potential_protection,
        fingerprinting_indicators,
        token_generation_indicators,
        obfuscation_level,
        key_functions,
    }
}
