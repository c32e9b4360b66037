//! Terminal and JSON rendering for the offline commands.

use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use serde::Serialize;

/// `--json` switches every command to machine-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

pub fn output_json<T: Serialize>(item: &T) {
    match serde_json::to_string_pretty(item) {
        Ok(json) => println!("{}", json),
        Err(e) => print_error(&format!("Failed to serialize to JSON: {}", e)),
    }
}

/// Build a table with the shared preset.
pub fn render_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(headers);
    for row in rows {
        table.add_row(row);
    }
    table
}

/// Print a table, or a dimmed placeholder when there are no rows.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    if rows.is_empty() {
        println!("{}", "(empty)".dimmed());
        return;
    }
    println!("{}", render_table(headers, rows));
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✔".green().bold(), msg);
}

/// Errors go to stderr so `--json` stdout stays parseable.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✘".red().bold(), msg);
}

pub fn print_header(title: &str) {
    println!("\n{}", title.bold().underline());
}

pub fn print_kv(key: &str, value: &str) {
    println!("  {:<16} {}", key.dimmed(), value);
}

/// Colored yes/no for boolean decisions.
pub fn flag(value: bool) -> String {
    if value {
        "yes".green().to_string()
    } else {
        "no".yellow().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_table_contains_cells() {
        let table = render_table(&["op", "id"], vec![vec!["upsert_block".into(), "a1".into()]]);
        let text = table.to_string();
        assert!(text.contains("upsert_block"));
        assert!(text.contains("a1"));
    }

    #[test]
    fn test_flag_text() {
        colored::control::set_override(false);
        assert_eq!(flag(true), "yes");
        assert_eq!(flag(false), "no");
    }
}
