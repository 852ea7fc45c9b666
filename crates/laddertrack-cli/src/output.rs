use std::io::{self, Write};

use serde_json::Value;

use crate::cli::OutputFormat;
use crate::commands::CommandOutput;
use crate::error::CliError;

pub fn render(output: &CommandOutput, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    match format {
        OutputFormat::Json => {
            let text = if pretty {
                serde_json::to_string_pretty(&output.data)?
            } else {
                serde_json::to_string(&output.data)?
            };
            writeln!(writer, "{text}")?;
        }
        OutputFormat::Table => write_table(&mut writer, output)?,
    }
    Ok(())
}

fn write_table(writer: &mut impl Write, output: &CommandOutput) -> Result<(), CliError> {
    let rows: Vec<&Value> = match &output.data {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            output
                .columns
                .iter()
                .map(|column| cell(row.get(*column)))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = output
        .columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            cells
                .iter()
                .map(|row| row[index].len())
                .chain([column.len()])
                .max()
                .unwrap_or_default()
        })
        .collect();

    let header: Vec<String> = output.columns.iter().map(|column| column.to_string()).collect();
    write_row(writer, &header, &widths)?;
    for row in &cells {
        write_row(writer, row, &widths)?;
    }
    Ok(())
}

fn write_row(writer: &mut impl Write, row: &[String], widths: &[usize]) -> Result<(), CliError> {
    let line: Vec<String> = row
        .iter()
        .zip(widths)
        .map(|(value, width)| format!("{value:<width$}"))
        .collect();
    writeln!(writer, "{}", line.join("  ").trim_end())?;
    Ok(())
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::from("-"),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn table_aligns_columns() {
        let output = CommandOutput {
            data: json!([
                {"provider": "twitch", "health": 100.0},
                {"provider": "sc2revealed", "health": null},
            ]),
            columns: vec!["provider", "health"],
        };
        let mut buffer = Vec::new();

        write_table(&mut buffer, &output).expect("table");

        let text = String::from_utf8(buffer).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "provider     health");
        assert_eq!(lines[1], "twitch       100.0");
        assert_eq!(lines[2], "sc2revealed  -");
    }
}
