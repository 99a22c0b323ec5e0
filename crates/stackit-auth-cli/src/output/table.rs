use anyhow::Result;
use comfy_table::{Cell, Table};

/// Two-column key/value table for detail views.
pub fn print_details(rows: &[(&str, String)]) -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["Field", "Value"]);
    for (field, value) in rows {
        table.add_row(vec![Cell::new(field), Cell::new(value)]);
    }
    println!("{table}");
    Ok(())
}
