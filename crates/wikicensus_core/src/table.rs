//! Row ordering shared by the renderer and the browser-side sort script.
//!
//! Cells that read as plain decimal numbers compare numerically and come
//! before everything else; the rest compare by code point after lowercasing,
//! with the raw text as a tie-breaker. That keeps the order total, so mixed
//! columns sort without surprises. `assets/sortable.js` applies the same
//! rules without locale collation, so accented titles such as `école` sort
//! after `zeta` in both places.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCell {
    /// Plain text the row is sorted by.
    pub text: String,
    /// Markup shown in the cell.
    pub html: String,
    pub numeric: bool,
}

impl TableCell {
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            html: crate::html::escape(&text),
            text,
            numeric: false,
        }
    }

    pub fn number(value: u64) -> Self {
        let text = value.to_string();
        Self {
            html: text.clone(),
            text,
            numeric: true,
        }
    }

    pub fn optional_number(value: Option<u64>) -> Self {
        match value {
            Some(value) => Self::number(value),
            None => Self {
                numeric: true,
                ..Self::text("")
            },
        }
    }

    pub fn html(text: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: html.into(),
            numeric: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRow {
    pub class: Option<String>,
    pub cells: Vec<TableCell>,
}

impl TableRow {
    pub fn new(cells: Vec<TableCell>) -> Self {
        Self { class: None, cells }
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.class = Some(class.to_string());
        self
    }

    fn sort_text(&self, column: usize) -> &str {
        self.cells
            .get(column)
            .map(|cell| cell.text.as_str())
            .unwrap_or("")
    }
}

/// `[+-]digits[.digits]`, ignoring surrounding whitespace and `,` separators.
pub fn parse_number(value: &str) -> Option<f64> {
    let cleaned: String = value.trim().chars().filter(|ch| *ch != ',').collect();
    let unsigned = cleaned
        .strip_prefix('-')
        .or_else(|| cleaned.strip_prefix('+'))
        .unwrap_or(&cleaned);
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (unsigned, None),
    };
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || fraction.is_some_and(|part| !all_digits(part)) {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

pub fn compare_cells(left: &str, right: &str) -> Ordering {
    match (parse_number(left), parse_number(right)) {
        (Some(a), Some(b)) => a.total_cmp(&b).then_with(|| left.cmp(right)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => left
            .to_lowercase()
            .cmp(&right.to_lowercase())
            .then_with(|| left.cmp(right)),
    }
}

/// Stable sort of `rows` by one column.
pub fn sorted_rows(
    mut rows: Vec<TableRow>,
    column: usize,
    direction: SortDirection,
) -> Vec<TableRow> {
    rows.sort_by(|a, b| {
        let ordering = compare_cells(a.sort_text(column), b.sort_text(column));
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
    rows
}
