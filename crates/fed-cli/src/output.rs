use serde::Serialize;
use serde_json::Value;

use crate::cli::OutputFormat;

/// Render a serializable response in the requested format.
pub fn render<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Table => Ok(render_table(&serde_json::to_value(value)?)),
    }
}

pub fn output<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    let rendered = render(value, format)?;
    println!("{rendered}");
    Ok(())
}

fn render_table(value: &Value) -> String {
    match value {
        Value::Array(items) => render_array_table(items),
        Value::Object(map) => {
            let mut rows: Vec<Vec<String>> = map
                .iter()
                .map(|(key, value)| vec![key.clone(), value_to_cell(value)])
                .collect();
            rows.sort();
            render_rows(&["key", "value"], &rows)
        }
        scalar => value_to_cell(scalar),
    }
}

fn render_array_table(items: &[Value]) -> String {
    if items.is_empty() {
        return String::from("(no rows)");
    }
    let mut headers = Vec::<String>::new();
    for map in items.iter().filter_map(Value::as_object) {
        for key in map.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }
    headers.sort();
    if headers.is_empty() {
        let rows: Vec<Vec<String>> = items.iter().map(|v| vec![value_to_cell(v)]).collect();
        return render_rows(&["value"], &rows);
    }
    let rows: Vec<Vec<String>> = items
        .iter()
        .map(|item| {
            headers
                .iter()
                .map(|h| item.get(h).map_or_else(|| String::from("-"), value_to_cell))
                .collect()
        })
        .collect();
    let header_refs: Vec<&str> = headers.iter().map(String::as_str).collect();
    render_rows(&header_refs, &rows)
}

/// Aligned columns, numbers right-aligned.
fn render_rows(headers: &[&str], rows: &[Vec<String>]) -> String {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(index, header)| {
            rows.iter()
                .filter_map(|row| row.get(index))
                .map(String::len)
                .max()
                .unwrap_or(0)
                .max(header.len())
        })
        .collect();

    let header_line = headers
        .iter()
        .zip(&widths)
        .map(|(header, width)| format!("{header:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    let divider = "-".repeat(header_line.len());

    let mut lines = vec![header_line.trim_end().to_string(), divider];
    for row in rows {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| {
                if cell.parse::<f64>().is_ok() {
                    format!("{cell:>width$}")
                } else {
                    format!("{cell:<width$}")
                }
            })
            .collect::<Vec<_>>()
            .join("  ");
        lines.push(line.trim_end().to_string());
    }
    lines.join("\n")
}

fn value_to_cell(value: &Value) -> String {
    match value {
        Value::Null => String::from("null"),
        Value::Bool(v) => v.to_string(),
        Value::Number(v) => v.to_string(),
        Value::String(v) => v.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| String::from("<invalid-json>")),
    }
}
