use chrono::{DateTime, Utc};

/// Length of the file name prefix, in UTF-16 code units.
const NAME_UNITS: usize = 30;
const EXTENSION: &str = "pdf";

/// File name for an exported thread.
///
/// Takes the first 30 UTF-16 code units of `first_text`, replaces everything
/// outside `[A-Za-z0-9]` with `_`, lowercases the result and appends `.pdf`. When the
/// first post has no usable text the name is `thread_<yyyymmdd_hhmmss>.pdf` (UTC).
pub fn derive_filename(first_text: Option<&str>, now: DateTime<Utc>) -> String {
    match first_text.filter(|t| !t.trim().is_empty()) {
        Some(text) => format!("{}.{EXTENSION}", base_name(text)),
        None => format!("thread_{}.{EXTENSION}", now.format("%Y%m%d_%H%M%S")),
    }
}

/// The name without extension.
///
/// Length is counted in UTF-16 code units so names match those produced by the
/// page script. Each unit of a non-alphanumeric character becomes one `_`; a
/// surrogate pair cut at the limit contributes a single `_`.
pub fn base_name(text: &str) -> String {
    let mut name = String::with_capacity(NAME_UNITS);
    let mut units = 0;
    for c in text.chars() {
        if units == NAME_UNITS {
            break;
        }
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_lowercase());
            units += 1;
        } else {
            let width = c.len_utf16().min(NAME_UNITS - units);
            name.extend(std::iter::repeat('_').take(width));
            units += width;
        }
    }
    name
}
