//! Left-aligned plain-text tables for terminal output.

/// Renders `rows` under `headers`, columns separated by two spaces, with a
/// dashed rule below the header. Short rows are padded with empty cells.
pub fn render(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(headers.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, headers.iter().map(|h| h.to_string()), &widths);
    push_line(&mut out, widths.iter().map(|w| "-".repeat(*w)), &widths);
    for row in rows {
        let cells = (0..headers.len()).map(|i| row.get(i).cloned().unwrap_or_default());
        push_line(&mut out, cells, &widths);
    }
    out
}

fn push_line(out: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let line: Vec<String> = cells
        .zip(widths.iter())
        .map(|(c, w)| format!("{:<width$}", c, width = *w))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}
