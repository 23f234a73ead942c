// Terminal and machine output for the CLI
use crate::protection::{ProtectionAnalysis, ScriptRecord};
use crate::query::{ExtractedField, FlowDetails, FlowDetailsEntry, FlowSummary};
use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use serde::Serialize;
use serde_json::Value;
use std::io::{self, IsTerminal};

/// Output mode for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Tables and colors for an interactive terminal
    Human,
    /// Pretty-printed JSON payloads, identical to what the tool server returns
    Json,
}

impl OutputMode {
    /// JSON when asked for, when FLOWPROBE_JSON is set, or when stdout is piped.
    pub fn auto(force_json: bool) -> Self {
        if force_json || std::env::var("FLOWPROBE_JSON").is_ok() || !io::stdout().is_terminal() {
            Self::Json
        } else {
            Self::Human
        }
    }
}

/// CLI output writer with mode awareness
pub struct OutputWriter {
    mode: OutputMode,
}

impl OutputWriter {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Print any payload as pretty JSON.
    pub fn payload<T: Serialize + ?Sized>(&self, payload: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(payload)?);
        Ok(())
    }

    pub fn flows(&self, flows: &[FlowSummary]) -> anyhow::Result<()> {
        match self.mode {
            OutputMode::Json => self.payload(&flows),
            OutputMode::Human => {
                if flows.is_empty() {
                    println!("  {}", "No HTTP flows in this session".yellow());
                } else {
                    println!("{}", flows_table(flows));
                    println!("  {} HTTP flows", flows.len());
                }
                Ok(())
            }
        }
    }

    pub fn details(&self, entries: &[FlowDetailsEntry]) -> anyhow::Result<()> {
        if self.mode == OutputMode::Json {
            return self.payload(&entries);
        }

        for entry in entries {
            match entry {
                FlowDetailsEntry::Error { error } => println!("  {} {}", "✗".red(), error),
                FlowDetailsEntry::Details(details) => print_details(details)?,
            }
        }
        Ok(())
    }

    pub fn fields(&self, fields: &[ExtractedField]) -> anyhow::Result<()> {
        if self.mode == OutputMode::Json {
            return self.payload(fields);
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec!["Path", "Value"]);
        for field in fields {
            table.add_row(vec![field.path.clone(), serde_json::to_string(&field.value)?]);
        }
        println!("{table}");
        Ok(())
    }

    pub fn analysis(&self, analysis: &ProtectionAnalysis) -> anyhow::Result<()> {
        if self.mode == OutputMode::Json {
            return self.payload(analysis);
        }

        section(&format!(
            "Flow {}: {} {}",
            analysis.flow_index, analysis.method, analysis.url
        ));
        println!("  Status: {}", colored_status(analysis.status_code));

        if analysis.protection_systems.is_empty() {
            println!("  Protection: {}", "none detected".green());
        } else {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["Vendor", "Confidence", "Signatures"]);
            for system in &analysis.protection_systems {
                table.add_row(vec![
                    system.vendor.clone(),
                    format!("{:.1}%", system.confidence),
                    system.matching_signatures.join(", "),
                ]);
            }
            println!("{table}");
        }

        if let Some(challenge) = &analysis.challenge_analysis {
            let verdict = if challenge.is_challenge {
                format!("{:?} challenge", challenge.challenge_type).red().bold()
            } else {
                "no challenge".green()
            };
            println!("  Challenge: {}", verdict);
            for indicator in &challenge.challenge_indicators {
                println!("    • {}", indicator);
            }
        }

        let cookies = analysis
            .request_cookies
            .iter()
            .chain(analysis.response_cookies.iter().flatten())
            .filter(|c| c.protection_related);
        for cookie in cookies {
            println!("  Cookie {} ({})", cookie.name.yellow(), cookie.vendor);
        }

        if let Some(scripts) = &analysis.scripts {
            let (inline, external): (Vec<&ScriptRecord>, Vec<&ScriptRecord>) = scripts
                .iter()
                .partition(|s| matches!(s, ScriptRecord::Inline { .. }));
            println!(
                "  Scripts: {} inline, {} external",
                inline.len(),
                external.len()
            );
        }

        if !analysis.suggestions.is_empty() {
            section("Suggestions");
            for line in &analysis.suggestions {
                println!("  {}", line);
            }
        }
        Ok(())
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Human => eprintln!("  {} {}", "✗".red(), message),
            OutputMode::Json => eprintln!("{}", message),
        }
    }
}

fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
    println!("{}", "═".repeat(title.chars().count()).cyan());
}

fn print_details(details: &FlowDetails) -> anyhow::Result<()> {
    section(&format!(
        "Flow {}: {} {}",
        details.index, details.method, details.url
    ));
    println!("  Status: {}", colored_status(details.status));

    println!("  {}", "Request headers".yellow());
    for (name, value) in &details.request_headers {
        println!("    {}: {}", name, value.as_str().unwrap_or_default());
    }
    print_body(
        "Request",
        &details.request_content,
        &details.request_content_preview,
        details.request_content_size,
        &details.request_content_note,
    )?;

    if let Some(headers) = &details.response_headers {
        println!("  {}", "Response headers".yellow());
        for (name, value) in headers {
            println!("    {}: {}", name, value.as_str().unwrap_or_default());
        }
    }
    print_body(
        "Response",
        &details.response_content,
        &details.response_content_preview,
        details.response_content_size,
        &details.response_content_note,
    )
}

fn print_body(
    label: &str,
    content: &Option<Value>,
    preview: &Option<Value>,
    size: Option<usize>,
    note: &Option<String>,
) -> anyhow::Result<()> {
    match (content, preview) {
        (Some(Value::String(text)), _) if text.is_empty() => {}
        (Some(Value::String(text)), _) => println!("  {} body:\n{}", label, text),
        (Some(value), _) => {
            println!("  {} body:\n{}", label, serde_json::to_string_pretty(value)?)
        }
        (None, Some(preview)) => println!(
            "  {} body structure ({}):\n{}",
            label,
            format_size(size.unwrap_or_default() as u64),
            serde_json::to_string_pretty(preview)?
        ),
        (None, None) => {}
    }
    if let Some(note) = note {
        println!("  {}", note.dimmed());
    }
    Ok(())
}

pub fn status_label(status: Option<u16>) -> String {
    status.map_or_else(|| "-".to_string(), |code| code.to_string())
}

fn colored_status(status: Option<u16>) -> String {
    let label = status_label(status);
    match status {
        Some(code) if code < 300 => label.green().to_string(),
        Some(code) if code < 400 => label.cyan().to_string(),
        Some(_) => label.red().to_string(),
        None => label.dimmed().to_string(),
    }
}

pub fn flows_table(flows: &[FlowSummary]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["#", "Method", "Status", "URL"]);

    for flow in flows {
        table.add_row(vec![
            flow.index.to_string(),
            flow.method.clone(),
            status_label(flow.status),
            flow.url.clone(),
        ]);
    }
    table
}

/// Format byte counts in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    }
}
