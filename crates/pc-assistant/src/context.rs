//! Plain-text rendering of search results for the prompt.

use pc_core::{Row, SearchBundle};
use serde_json::Value;
use std::borrow::Cow;

/// Returned when every category came back empty.
pub const NO_RESULTS: &str = "No search results found in the database.";

/// Longest field value emitted before truncation.
pub const MAX_FIELD_CHARS: usize = 200;

const ELLIPSIS: &str = "...";
const MISSING: &str = "N/A";

#[derive(Clone, Copy)]
enum Kind {
    Text,
    Money,
}

struct Section {
    heading: &'static str,
    rows: fn(&SearchBundle) -> &[Row],
    /// (label, column, kind)
    fields: &'static [(&'static str, &'static str, Kind)],
}

fn notes(b: &SearchBundle) -> &[Row] {
    &b.notes
}
fn claims(b: &SearchBundle) -> &[Row] {
    &b.claims
}
fn expenses(b: &SearchBundle) -> &[Row] {
    &b.expenses
}
fn payments(b: &SearchBundle) -> &[Row] {
    &b.payments
}
fn attachments(b: &SearchBundle) -> &[Row] {
    &b.attachments
}

const SECTIONS: [Section; 5] = [
    Section {
        heading: "NOTES",
        rows: notes,
        fields: &[
            ("Title", "title", Kind::Text),
            ("Category", "category", Kind::Text),
            ("Content", "content", Kind::Text),
            ("Created", "created_at", Kind::Text),
        ],
    },
    Section {
        heading: "CLAIMS",
        rows: claims,
        fields: &[
            ("Claim Number", "claim_number", Kind::Text),
            ("Status", "status", Kind::Text),
            ("Injury", "injury_description", Kind::Text),
            ("Employer", "employer", Kind::Text),
            ("Date of Injury", "date_of_injury", Kind::Text),
        ],
    },
    Section {
        heading: "EXPENSES",
        rows: expenses,
        fields: &[
            ("Description", "description", Kind::Text),
            ("Amount", "amount", Kind::Money),
            ("Date", "expense_date", Kind::Text),
            ("Supplier", "supplier_name", Kind::Text),
            ("Category", "category", Kind::Text),
            ("Source", "expense_source", Kind::Text),
        ],
    },
    Section {
        heading: "PAYMENTS",
        rows: payments,
        fields: &[
            ("Amount", "amount", Kind::Money),
            ("Date", "payment_date", Kind::Text),
            ("Reference", "reference", Kind::Text),
            ("Method", "payment_method", Kind::Text),
            ("Status", "status", Kind::Text),
        ],
    },
    Section {
        heading: "ATTACHMENTS",
        rows: attachments,
        fields: &[
            ("File Name", "file_name", Kind::Text),
            ("Type", "file_type", Kind::Text),
            ("Uploaded", "created_at", Kind::Text),
            ("OCR Text", "ocr_text", Kind::Text),
        ],
    },
];

/// Renders a bundle as the context block embedded in the prompt.
///
/// Deterministic for a given bundle. Every field value is capped at
/// [`MAX_FIELD_CHARS`] characters.
pub fn build_context(bundle: &SearchBundle) -> String {
    if bundle.is_empty() {
        return NO_RESULTS.to_string();
    }

    let mut blocks = Vec::new();
    for section in SECTIONS.iter() {
        let rows = (section.rows)(bundle);
        if rows.is_empty() {
            continue;
        }
        let mut block = format!("{}:", section.heading);
        for (i, row) in rows.iter().enumerate() {
            block.push_str(&format!("\n{}. ID: {}", i + 1, render(row.get("id"), Kind::Text)));
            for (label, column, kind) in section.fields {
                block.push_str(&format!("\n   {}: {}", label, render(row.get(*column), *kind)));
            }
        }
        blocks.push(block);
    }
    blocks.join("\n\n")
}

fn render(value: Option<&Value>, kind: Kind) -> String {
    let text = match (value, kind) {
        (None | Some(Value::Null), _) => return MISSING.to_string(),
        (Some(Value::Number(n)), Kind::Money) => match n.as_f64() {
            Some(v) => format!("${:.2}", v),
            None => n.to_string(),
        },
        (Some(Value::String(s)), _) if s.trim().is_empty() => return MISSING.to_string(),
        // numeric columns may arrive string-encoded
        (Some(Value::String(s)), Kind::Money) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => format!("${:.2}", v),
            _ => s.clone(),
        },
        (Some(Value::String(s)), _) => s.clone(),
        (Some(other), _) => other.to_string(),
    };
    truncate_text(&text, MAX_FIELD_CHARS).into_owned()
}

/// Cuts `s` to `max_chars` characters plus an ellipsis; shorter input is borrowed as-is.
pub fn truncate_text(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Cow::Owned(format!("{}{}", &s[..byte_idx], ELLIPSIS)),
        None => Cow::Borrowed(s),
    }
}
