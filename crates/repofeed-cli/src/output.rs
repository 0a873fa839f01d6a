use std::io::Write;

use owo_colors::OwoColorize;
use repofeed_core::{Entry, PageCursor};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print the working set, one entry per block.
pub fn print_entries(
    w: &mut dyn Write,
    entries: &[Entry],
    color: ColorMode,
) -> std::io::Result<()> {
    for entry in entries {
        let record = &entry.record;
        if color.enabled() {
            writeln!(
                w,
                "{}  {}  {}",
                format!("{:>12}", record.id).dimmed(),
                record.name.green().bold(),
                record.html_url.blue()
            )?;
        } else {
            writeln!(w, "{:>12}  {}  {}", record.id, record.name, record.html_url)?;
        }
        if let Some(ref description) = record.description {
            writeln!(w, "              {description}")?;
        }
    }
    Ok(())
}

/// Print the cache summary line after a command.
pub fn print_summary(
    w: &mut dyn Write,
    len: usize,
    cursor: PageCursor,
    color: ColorMode,
) -> std::io::Result<()> {
    let line = if cursor.has_more() {
        format!(
            "{} repositories cached (next page {} of {})",
            len, cursor.current_page, cursor.total_pages
        )
    } else {
        format!("{} repositories cached (all pages fetched)", len)
    };
    if color.enabled() {
        writeln!(w, "{}", line.dimmed())
    } else {
        writeln!(w, "{line}")
    }
}
