//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use occupancy_lib::SpotType;
use serde::Serialize;
use std::collections::BTreeMap;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a rounded table, or a notice when there is nothing to show
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Format spot counts as `CAR: 3, CAR-HANDICAP: 1`
pub fn format_counts(counts: &BTreeMap<SpotType, u32>) -> String {
    counts
        .iter()
        .map(|(spot_type, count)| format!("{}: {}", spot_type, count))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Color `succeeded/total` by how many cameras contributed
pub fn color_coverage(succeeded: usize, total: usize) -> String {
    let formatted = format!("{}/{}", succeeded, total);
    if succeeded == total {
        formatted.green().to_string()
    } else if succeeded > 0 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_counts_in_type_order() {
        let counts = BTreeMap::from([(SpotType::CarHandicap, 1), (SpotType::Car, 3)]);
        assert_eq!(format_counts(&counts), "CAR: 3, CAR-HANDICAP: 1");
    }

    #[test]
    fn test_color_coverage_text() {
        colored::control::set_override(false);
        assert_eq!(color_coverage(2, 3), "2/3");
        assert_eq!(color_coverage(0, 0), "0/0");
    }
}
