//! CSV/TSV export text for response lists
//!
//! Exports open in spreadsheet tools so cells must be quoted against
//! embedded delimiters and guarded against formula injection: a leading
//! `=`, `+`, `-` or `@` gets a `'` prefix before quoting.

use super::rsvps::Rsvp;

/// The characters that mark a cell as a formula to spreadsheet tools
const FORMULA_LEADS: [char; 4] = ['=', '+', '-', '@'];

/// The column headers every response export carries
pub const EXPORT_HEADERS: [&str; 10] = [
    "Name",
    "Email",
    "Phone",
    "Attending",
    "Guests",
    "Branch",
    "Rank",
    "Unit",
    "Dietary",
    "Allergies",
];

/// Escape one cell for an export row
///
/// # Arguments
///
/// * `value` - The cell value to escape
/// * `delim` - The delimiter the export uses
#[must_use]
pub fn escape_cell(value: &str, delim: char) -> String {
    // guard formula injection before quoting
    let guarded = if value.starts_with(FORMULA_LEADS) {
        format!("'{value}")
    } else {
        value.to_owned()
    };
    // quote when the cell carries the delimiter, quotes or newlines
    if guarded.contains(delim) || guarded.contains('"') || guarded.contains('\n') {
        format!("\"{}\"", guarded.replace('"', "\"\""))
    } else {
        guarded
    }
}

/// Reverse [`escape_cell`]
///
/// # Arguments
///
/// * `raw` - The escaped cell to unescape
#[must_use]
pub fn unescape_cell(raw: &str) -> String {
    // unquote and undouble first
    let unquoted = if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        raw[1..raw.len() - 1].replace("\"\"", "\"")
    } else {
        raw.to_owned()
    };
    // drop the formula guard restoring the original lead
    match unquoted.strip_prefix('\'') {
        Some(rest) if rest.starts_with(FORMULA_LEADS) => rest.to_owned(),
        _ => unquoted,
    }
}

/// Join escaped cells into an export row
///
/// # Arguments
///
/// * `cells` - The raw cell values for this row
/// * `delim` - The delimiter the export uses
#[must_use]
pub fn to_row(cells: &[String], delim: char) -> String {
    cells
        .iter()
        .map(|cell| escape_cell(cell, delim))
        .collect::<Vec<String>>()
        .join(&delim.to_string())
}

/// Split an export row back into escaped cells
///
/// Quoted cells may carry the delimiter and doubled quotes; the formula
/// guard prefix survives the split and is only dropped by
/// [`unescape_cell`].
///
/// # Arguments
///
/// * `line` - The row to split
/// * `delim` - The delimiter the export uses
#[must_use]
pub fn parse_row(line: &str, delim: char) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if quoted {
            if c == '"' {
                // a doubled quote inside a quoted cell is a literal quote
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                    current.push('"');
                } else {
                    quoted = false;
                    current.push('"');
                }
            } else {
                current.push(c);
            }
        } else if c == '"' && current.is_empty() {
            quoted = true;
            current.push('"');
        } else if c == delim {
            cells.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    cells.push(current);
    cells
}

/// Build the export text for a response list
///
/// Every cell comes from guest input so the whole table rides
/// [`escape_cell`].
///
/// # Arguments
///
/// * `rows` - The responses to export
/// * `delim` - The delimiter to export with
#[must_use]
pub fn responses_export(rows: &[Rsvp], delim: char) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    let headers: Vec<String> = EXPORT_HEADERS.iter().map(|h| (*h).to_owned()).collect();
    lines.push(to_row(&headers, delim));
    for rsvp in rows {
        let cells = vec![
            rsvp.name.clone(),
            rsvp.email.clone(),
            rsvp.phone.clone().unwrap_or_default(),
            if rsvp.attending { "Yes" } else { "No" }.to_owned(),
            rsvp.guest_count.to_string(),
            rsvp.branch.clone().unwrap_or_default(),
            rsvp.rank.clone().unwrap_or_default(),
            rsvp.unit.clone().unwrap_or_default(),
            rsvp.dietary.join("; "),
            rsvp.allergies.clone().unwrap_or_default(),
        ];
        lines.push(to_row(&cells, delim));
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
