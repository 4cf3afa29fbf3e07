//! Human-facing document numbers.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generates a number of the form `PREFIX-YYYYMMDD-XXXXXXXX`.
///
/// The suffix is eight uppercase hex digits taken from a fresh v4 UUID.
pub fn document_number(prefix: &str, at: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{prefix}-{}-{}", at.format("%Y%m%d"), &random[..8])
}

pub fn order_number(at: DateTime<Utc>) -> String {
    document_number("ORD", at)
}

pub fn invoice_number(at: DateTime<Utc>) -> String {
    document_number("INV", at)
}

/// Generates a payment reference to hand to the gateway.
pub fn payment_reference(at: DateTime<Utc>) -> String {
    document_number("PAY", at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn number_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let number = order_number(at);
        assert!(number.starts_with("ORD-20240309-"));

        let suffix = &number["ORD-20240309-".len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn numbers_are_unique() {
        let at = Utc::now();
        assert_ne!(invoice_number(at), invoice_number(at));
        assert!(payment_reference(at).starts_with("PAY-"));
    }
}
