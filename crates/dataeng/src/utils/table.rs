//! Terminal tables for query results and record summaries.

use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use crate::session::QueryResult;
use crate::utils::value_text;

#[must_use]
pub fn render_result(result: &QueryResult) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = result
        .columns
        .iter()
        .map(|column| Cell::new(column).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in &result.rows {
        table.add_row(row.iter().map(value_text).collect::<Vec<_>>());
    }

    table.to_string()
}

#[must_use]
pub fn render_key_values(pairs: &[(&str, String)]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    for (key, value) in pairs {
        table.add_row(vec![Cell::new(key).fg(Color::Cyan), Cell::new(value)]);
    }

    table.to_string()
}
