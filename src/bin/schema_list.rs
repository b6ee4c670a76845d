use std::{io::Write, process, time::Instant};

use fixture::{
    catalog::{PrimaryKey, Schema, StaticProvider},
    Result,
};
use log::info;

const USAGE: &str = "Usage: schema_list <schema.json> <action>

Defined <action>s:

  schema:list           lists all the tables of the schema dump
  schema:list:relation  lists all the tables sorted by relation with their primary key and parent tables
";

const MAX_WIDTH: usize = 128;

fn main() {
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {} {}:{} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap(),
                record.line().unwrap(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (Some(path), Some(action)) = (args.first(), args.get(1)) else {
        print!("{}", USAGE);
        process::exit(1);
    };

    if let Err(err) = run(path, action) {
        eprintln!("{}", err);
        process::exit(1);
    }
}

fn run(path: &str, action: &str) -> Result<()> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| fixture::Error::Config(format!("cannot read {}: {}", path, e)))?;
    let schema = Schema::new(Box::new(StaticProvider::from_json_str(&json)?));

    let time = Instant::now();
    match action {
        "schema:list" => {
            let rows: Vec<Vec<String>> = schema.get_table_names()?.into_iter().map(|t| vec![t]).collect();
            info!("fetched in {:.3}s", time.elapsed().as_secs_f64());
            print_table(&["Tables"], &rows);
        }
        "schema:list:relation" => {
            let mut rows = vec![];
            for name in schema.get_table_names_sorted_by_relation()? {
                let table = schema.get_table_info(name)?;
                let (kind, columns) = match table.primary_key_column() {
                    PrimaryKey::None => ("None", vec![]),
                    PrimaryKey::Single(column) => ("Single", vec![column.name.clone()]),
                    PrimaryKey::Composite(columns) => ("Complex", columns.iter().map(|c| c.name.clone()).collect()),
                };
                rows.push(vec![
                    name.clone(),
                    kind.to_owned(),
                    columns.join(", "),
                    table.parent_tables().join(", "),
                ]);
            }
            info!("fetched in {:.3}s", time.elapsed().as_secs_f64());
            print_table(
                &["Table Name", "Primary Key Type", "Primary Key Columns", "Table Parents"],
                &rows,
            );
        }
        _ => print!("{}", USAGE),
    }
    Ok(())
}

fn print_table(header: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count().min(MAX_WIDTH)).collect();
    for row in rows {
        for (width, value) in widths.iter_mut().zip(row) {
            *width = (*width).max(value.chars().count()).min(MAX_WIDTH);
        }
    }

    let format_row = |row: &[String]| {
        let cells: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, width)| {
                let value = row.get(i).map(String::as_str).unwrap_or_default();
                let value = if value.chars().count() > *width {
                    format!("{}...", value.chars().take(width.saturating_sub(3)).collect::<String>())
                } else {
                    value.to_owned()
                };
                format!("{:<width$}", value, width = *width)
            })
            .collect();
        format!("| {} |", cells.join(" | "))
    };
    let line = "-".repeat(4 + (widths.len() - 1) * 3 + widths.iter().sum::<usize>());

    println!(" {}", line);
    println!(" {}", format_row(&header.iter().map(|h| h.to_string()).collect::<Vec<_>>()));
    println!(" {}", line);
    for row in rows {
        println!(" {}", format_row(row));
    }
    println!(" {}", line);
}
