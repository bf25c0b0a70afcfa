//! Write a workbook with several sheets and read it back by sheet name

use miniexcel::{Excel, Row, SheetCollection};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut sheets = SheetCollection::new();
    sheets
        .push_named(
            "Sales",
            vec![
                Row::from_pairs([("month", "January"), ("revenue", "50000")]),
                Row::from_pairs([("month", "February"), ("revenue", "55000")]),
            ],
        )
        .push_named(
            "Products",
            vec![Row::from_pairs([("sku", "P001"), ("price", "19.99")])],
        );
    Excel::new().export_sheets("book.xlsx", sheets)?;

    let tables = Excel::new().with_sheets_names().import_sheets("book.xlsx")?;
    for (sheet, table) in &tables {
        println!("{}: {} record(s)", sheet, table.len());
    }

    // Keep only the months that passed the target
    let strong = Excel::new().sheet(1).import_with("book.xlsx", |row| {
        let revenue: u32 = row.get_by_name("revenue")?.as_string().parse().ok()?;
        (revenue > 52000).then_some(row)
    })?;
    println!("Strong months: {:?}", strong.rows().unwrap_or_default());

    Ok(())
}
