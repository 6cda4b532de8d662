//! CSV export of a batch: `prompt,video_url,status,selected`, one row per job
//! in submission order.

use std::io::{self, Write};

use crate::tracking::Batch;

pub const CSV_HEADER: [&str; 4] = ["prompt", "video_url", "status", "selected"];

/// UTF-8 byte order mark; lets spreadsheet apps detect the encoding.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn write_csv<W: Write>(batch: &Batch, mut out: W, bom: bool) -> io::Result<()> {
    if bom {
        out.write_all(UTF8_BOM)?;
    }
    write_row(&mut out, &CSV_HEADER)?;
    for job in batch.jobs() {
        write_row(
            &mut out,
            &[
                job.prompt(),
                job.result_url().unwrap_or(""),
                job.status().as_str(),
                if job.selected() { "true" } else { "false" },
            ],
        )?;
    }
    out.flush()
}

fn write_row<W: Write>(out: &mut W, fields: &[&str]) -> io::Result<()> {
    let line = fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",");
    out.write_all(line.as_bytes())?;
    out.write_all(b"\r\n")
}

/// Quote a field if it contains a delimiter, quote or line break.
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
