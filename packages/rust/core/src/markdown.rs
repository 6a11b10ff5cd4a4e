//! Markdown building blocks shared by the report templates.

use std::fmt::Write;

/// Make `value` safe inside a table cell: `|` is escaped and newlines
/// become spaces.
pub fn safe_cell(value: &str) -> String {
    value
        .replace('|', "\\|")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}

/// Column alignment for [`Table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// A pipe table rendered with escaped cells.
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<(String, Align)>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: headers.into_iter().map(|h| (h.into(), Align::Left)).collect(),
            rows: Vec::new(),
        }
    }

    /// Right-align column `index`.
    pub fn align_right(mut self, index: usize) -> Self {
        if let Some(col) = self.columns.get_mut(index) {
            col.1 = Align::Right;
        }
        self
    }

    /// Append a row; missing cells render empty, extra cells are dropped.
    pub fn row<I, S>(&mut self, cells: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.rows
            .push(cells.into_iter().map(|c| safe_cell(c.as_ref())).collect());
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render header, alignment row and body, one line each, no trailing newline.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let width = self.columns.len();

        let headers: Vec<String> = self.columns.iter().map(|(h, _)| safe_cell(h)).collect();
        let _ = write!(out, "| {} |", headers.join(" | "));

        let aligns: Vec<&str> = self
            .columns
            .iter()
            .map(|(_, a)| match a {
                Align::Left => "---",
                Align::Right => "---:",
            })
            .collect();
        let _ = write!(out, "\n|{}|", aligns.join("|"));

        for row in &self.rows {
            let cells: Vec<&str> = (0..width)
                .map(|i| row.get(i).map(String::as_str).unwrap_or(""))
                .collect();
            let _ = write!(out, "\n| {} |", cells.join(" | "));
        }
        out
    }
}

/// Price cell text: the raw text when the parsed amount is zero, otherwise
/// the amount.
pub fn format_price(price: f64, raw: &str) -> String {
    if price == 0.0 {
        raw.to_string()
    } else {
        price.to_string()
    }
}

/// Markdown heading anchor as rendered by GitHub: lowercase, spaces to
/// hyphens, punctuation dropped.
pub fn anchor(title: &str) -> String {
    title
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('-'),
            '-' | '_' => Some(c),
            c if c.is_alphanumeric() => Some(c),
            _ => None,
        })
        .collect()
}
