//! Result export (CSV, JSON) and the console summary table.
use crate::results::ResultSet;
use crate::types::ResultRow;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Writer};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Header row of the CSV result file. Kept byte-for-byte for tools that read it.
pub const CSV_HEADER: [&str; 6] = ["IP", "发送", "成功", "丢包率", "延迟", "速度(MB/s)"];

/// Write rows in result order to any writer.
pub fn write_csv<W: Write>(writer: W, results: &ResultSet) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)?;
    for record in results.records() {
        let row = ResultRow::from(record);
        wtr.write_record(&[
            row.ip.to_string(),
            row.sent.to_string(),
            row.received.to_string(),
            format!("{:.2}", row.loss_rate),
            format!("{:.2}", row.average_delay_ms),
            format!("{:.2}", row.speed_mb_s),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_csv_file(path: &Path, results: &ResultSet) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create result file: {}", path.display()))?;
    write_csv(BufWriter::new(file), results)
}

/// Parse a result file produced by [`write_csv`]. Columns are matched by position.
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<ResultRow>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("row {}: malformed CSV", idx + 1))?;
        let row: ResultRow = record
            .deserialize(None)
            .with_context(|| format!("row {}: unexpected values", idx + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

pub fn write_json_file(path: &Path, results: &ResultSet) -> Result<()> {
    let rows: Vec<ResultRow> = results.records().iter().map(ResultRow::from).collect();
    let file = File::create(path)
        .with_context(|| format!("failed to create JSON file: {}", path.display()))?;
    let mut w = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut w, &rows)?;
    w.flush()?;
    Ok(())
}

/// Render the first `limit` rows as an aligned text table.
pub fn format_table(results: &ResultSet, limit: usize) -> String {
    const HEADERS: [&str; 6] = ["ip", "sent", "received", "loss", "avg_ms", "speed_mb_s"];
    let rows: Vec<[String; 6]> = results
        .top(limit)
        .iter()
        .map(|r| {
            let row = ResultRow::from(r);
            [
                row.ip.to_string(),
                row.sent.to_string(),
                row.received.to_string(),
                format!("{:.2}", row.loss_rate),
                format!("{:.2}", row.average_delay_ms),
                format!("{:.2}", row.speed_mb_s),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = String::new();
    let line = |cells: [&str; 6]| {
        let mut s = format!("{:<w$}", cells[0], w = widths[0]);
        for (cell, w) in cells.iter().zip(widths).skip(1) {
            s.push_str(&format!("  {:>w$}", cell, w = w));
        }
        s.push('\n');
        s
    };
    out.push_str(&line(HEADERS));
    out.push_str(&line(["", "", "", "", "", ""]).replace(' ', "-"));
    for row in &rows {
        out.push_str(&line(row.each_ref().map(String::as_str)));
    }
    out
}

pub fn print_results_table(results: &ResultSet, limit: usize) {
    if limit == 0 {
        return;
    }
    if results.is_empty() {
        println!("\nNo address passed the latency and speed filters.");
        return;
    }
    println!(
        "\nBest {} of {} addresses:",
        limit.min(results.len()),
        results.len()
    );
    print!("{}", format_table(results, limit));
}
