//! Export a small table to XLSX, ODS and CSV

use miniexcel::{CellValue, Excel, Row, Style};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let staff = || {
        vec![
            Row::from_pairs([
                ("id", CellValue::Int(1)),
                ("name", CellValue::from("Alice Johnson")),
                ("salary", CellValue::Float(75000.0)),
            ]),
            Row::from_pairs([
                ("id", CellValue::Int(2)),
                ("name", CellValue::from("Bob Smith")),
                ("salary", CellValue::Float(65000.0)),
            ]),
        ]
    };

    for name in ["staff.xlsx", "staff.ods", "staff.csv"] {
        let written = Excel::new()
            .header_style(Style::new().bold().background_color("#DDEEFF"))
            .export(name, staff())?;
        println!("Created {}", written.display());
    }

    // Semicolon separated, Latin-1 for older spreadsheet imports
    Excel::new()
        .configure_csv(b';', b'"', "windows-1252", false)
        .export("staff-latin1.csv", staff())?;

    Ok(())
}
