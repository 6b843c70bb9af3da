use chrono::{DateTime, Datelike, Local, TimeZone};
use std::io::{self, Write};

/// Formats permission bits like `ls -l`, e.g. `-rw-r--r--` or `drwsr-x--T`.
///
/// `kind` is the leading type character (`-`, `d` or `l`).
#[must_use]
pub fn format_mode(kind: char, mode: u32) -> String {
    // (special bit, lower-case when x is set, upper-case otherwise)
    const SPECIAL: [(u32, char, char); 3] =
        [(0o4000, 's', 'S'), (0o2000, 's', 'S'), (0o1000, 't', 'T')];

    let mut out = String::with_capacity(10);
    out.push(kind);
    for (triplet, (special, set_exec, set_noexec)) in SPECIAL.iter().enumerate() {
        let bits = (mode >> (6 - 3 * triplet)) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        let exec = bits & 0o1 != 0;
        out.push(match (mode & special != 0, exec) {
            (true, true) => *set_exec,
            (true, false) => *set_noexec,
            (false, true) => 'x',
            (false, false) => '-',
        });
    }
    out
}

/// Formats a timestamp in the compact style of `ls`: `HH:MM` for today,
/// `dd.mm.` within the last six months, the year otherwise.
#[must_use]
pub fn format_short_date(timestamp: i64, now: DateTime<Local>) -> String {
    let Some(datetime) = Local.timestamp_opt(timestamp, 0).single() else {
        return "?".to_string();
    };
    if datetime.date_naive() == now.date_naive() {
        datetime.format("%H:%M").to_string()
    } else if (now - datetime).num_days() < 183 && datetime.year() >= now.year() - 1 {
        datetime.format("%d.%m.").to_string()
    } else {
        datetime.format("%Y").to_string()
    }
}

/// Column alignment for [`write_table`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    /// Pad on the right
    Left,
    /// Pad on the left
    Right,
}

/// Writes rows as a table.
///
/// With `tabs`, columns are separated by a single tab. Otherwise every column
/// but the last is padded to the widest cell with the given alignment
/// (missing alignments default to left).
///
/// # Errors
///
/// Returns an error if writing fails
pub fn write_table(
    rows: &[Vec<String>],
    align: &[Align],
    tabs: bool,
    writer: &mut dyn Write,
) -> io::Result<()> {
    if tabs {
        for row in rows {
            writeln!(writer, "{}", row.join("\t"))?;
        }
        return Ok(());
    }

    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0; columns];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    for row in rows {
        let last = row.len().saturating_sub(1);
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                if i == last {
                    cell.clone()
                } else {
                    match align.get(i).copied().unwrap_or(Align::Left) {
                        Align::Left => format!("{cell:<width$}", width = widths[i]),
                        Align::Right => format!("{cell:>width$}", width = widths[i]),
                    }
                }
            })
            .collect();
        writeln!(writer, "{}", cells.join(" "))?;
    }
    Ok(())
}
