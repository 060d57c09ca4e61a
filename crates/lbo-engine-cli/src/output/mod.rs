pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;
use std::io;

/// Render a command's result envelope on stdout in the requested format.
///
/// `compact` applies to JSON only.
pub fn format_output(format: &OutputFormat, compact: bool, value: &Value) -> io::Result<()> {
    match format {
        OutputFormat::Json => json::write_json(&mut io::stdout().lock(), value, compact),
        OutputFormat::Table => {
            table::print_table(value);
            Ok(())
        }
        OutputFormat::Csv => {
            csv_out::print_csv(value);
            Ok(())
        }
        OutputFormat::Minimal => {
            minimal::print_minimal(value);
            Ok(())
        }
    }
}
