//! Output formatting for the CLI.

use anyhow::Result;
use console::style;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

/// Print output in the specified format.
pub fn print<T: Serialize + HumanDisplay>(value: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Human => println!("{}", value.human_display()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

/// Print a collection listing with dynamic column widths.
pub fn print_records(collection: &str, records: &[Value], id_attribute: &str, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Human => {
            if records.is_empty() {
                println!("No resources found in {collection}.");
                return Ok(());
            }

            let ids: Vec<String> = records
                .iter()
                .map(|r| r.get(id_attribute).map_or_else(|| "-".to_string(), display_value))
                .collect();
            let id_width = ids.iter().map(String::len).max().unwrap_or(2).max(2);

            println!("{:<id_w$}  FIELDS", "ID", id_w = id_width);
            println!("{}", "-".repeat(id_width + 30));

            for (id, record) in ids.iter().zip(records) {
                println!("{:<id_w$}  {}", id, summarize(record, id_attribute), id_w = id_width);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(records)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(records)?),
    }
    Ok(())
}

/// Print a success message.
pub fn print_success(message: &str, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Human => println!("{}", style(message).green()),
        OutputFormat::Json => {
            let body = serde_json::json!({ "status": "ok", "message": message });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Yaml => {
            let body = serde_json::json!({ "status": "ok", "message": message });
            print!("{}", serde_yaml::to_string(&body)?);
        }
    }
    Ok(())
}

/// Trait for human-readable display.
pub trait HumanDisplay {
    fn human_display(&self) -> String;
}

/// Result of a `save` command: the model state after settlement.
#[derive(Debug, Serialize)]
pub struct SaveReport {
    pub collection: String,
    pub outcome: String,
    pub record: Value,
    pub changed: Value,
    pub events: Vec<String>,
}

impl HumanDisplay for SaveReport {
    fn human_display(&self) -> String {
        let mut out = String::new();
        let outcome = if self.outcome == "synced" {
            style(&self.outcome).green().to_string()
        } else {
            style(&self.outcome).red().to_string()
        };
        let _ = writeln!(out, "{} {outcome}", style(format!("[{}]", self.collection)).cyan());
        let _ = writeln!(out);
        write_fields(&mut out, &self.record);

        if let Value::Object(changed) = &self.changed
            && !changed.is_empty()
        {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", style("Unsaved:").yellow());
            for key in changed.keys() {
                let _ = writeln!(out, "  {key}");
            }
        }

        if !self.events.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Events: {}", self.events.join(", "));
        }
        out.trim_end().to_string()
    }
}

/// A single fetched resource.
#[derive(Debug, Serialize)]
pub struct RecordView {
    pub collection: String,
    pub record: Value,
}

impl HumanDisplay for RecordView {
    fn human_display(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", style(format!("[{}]", self.collection)).cyan());
        write_fields(&mut out, &self.record);
        out.trim_end().to_string()
    }
}

fn write_fields(out: &mut String, record: &Value) {
    let Value::Object(fields) = record else {
        let _ = writeln!(out, "{}", display_value(record));
        return;
    };
    let width = fields.keys().map(String::len).max().unwrap_or(0);
    for (key, value) in fields {
        let _ = writeln!(out, "{key:<width$}  {}", display_value(value));
    }
}

fn summarize(record: &Value, id_attribute: &str) -> String {
    let Value::Object(fields) = record else {
        return display_value(record);
    };
    fields
        .iter()
        .filter(|(key, _)| key.as_str() != id_attribute)
        .map(|(key, value)| format!("{key}={}", display_value(value)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
