use serde::{Deserialize, Serialize};

//==============================================================================
// Cell values on the wire and on disk
//==============================================================================

/// A cell value as it appears in JSON: a number when the contents are fully
/// numeric, otherwise the raw text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Value sent to clients: any fully numeric contents become a number.
    pub fn for_display(contents: &str) -> Self {
        match parse_number(contents) {
            Some(number) => CellValue::Number(number),
            None => CellValue::Text(contents.to_string()),
        }
    }

    /// Value written to a sheet record. Only contents whose canonical number
    /// text is identical are stored as numbers, so loading gives back the
    /// exact same string.
    pub fn for_storage(contents: &str) -> Self {
        match parse_number(contents) {
            Some(number) if format_number(number) == contents => CellValue::Number(number),
            _ => CellValue::Text(contents.to_string()),
        }
    }

    /// Normalize back to the string form the sheet store holds.
    pub fn into_contents(self) -> String {
        match self {
            CellValue::Number(number) => format_number(number),
            CellValue::Text(text) => text,
        }
    }
}

impl From<&str> for CellValue {
    fn from(text: &str) -> Self {
        CellValue::Text(text.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(number: f64) -> Self {
        CellValue::Number(number)
    }
}

//==============================================================================
// Content classification
//==============================================================================

/// Parse contents that consist entirely of a finite number.
pub fn parse_number(contents: &str) -> Option<f64> {
    contents
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
}

/// Formula contents start with `=`.
pub fn is_formula(contents: &str) -> bool {
    contents.starts_with('=')
}

/// Contents allowed in a cell that other cells depend on.
pub fn is_referenceable(contents: &str) -> bool {
    is_formula(contents) || parse_number(contents).is_some()
}

fn format_number(number: f64) -> String {
    format!("{number}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_accepts_whole_string_only() {
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number("-1.5e3"), Some(-1500.0));
        assert_eq!(parse_number("12abc"), None);
        assert_eq!(parse_number(" 12"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_parse_number_rejects_non_finite() {
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn test_referenceable_contents() {
        assert!(is_referenceable("=A1*5"));
        assert!(is_referenceable("3.25"));
        assert!(!is_referenceable("meow"));
        assert!(!is_referenceable(""));
    }

    #[test]
    fn test_storage_keeps_non_canonical_numbers_as_text() {
        assert_eq!(CellValue::for_storage("1"), CellValue::Number(1.0));
        assert_eq!(CellValue::for_storage("1.50"), CellValue::Text("1.50".into()));
        assert_eq!(CellValue::for_display("1.50"), CellValue::Number(1.5));
    }

    #[test]
    fn test_into_contents_normalizes_numbers() {
        assert_eq!(CellValue::Number(5.0).into_contents(), "5");
        assert_eq!(CellValue::Number(0.25).into_contents(), "0.25");
        assert_eq!(CellValue::from("=B2").into_contents(), "=B2");
    }
}
