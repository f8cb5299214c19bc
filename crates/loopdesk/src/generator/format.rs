//! Resolution of loop attributes and per-type value formatting.
//!
//! Every output strategy renders values through [`format_value`], so a
//! mapping produces the same text whatever the template format.

use chrono::{DateTime, Datelike, NaiveDate};

use crate::loops::Loop;
use crate::templates::{FieldType, LoopField};

/// A loop attribute before formatting.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Absent,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl FieldValue {
    fn text(value: Option<&str>) -> Self {
        match value {
            Some(s) if !s.is_empty() => FieldValue::Text(s.to_string()),
            _ => FieldValue::Absent,
        }
    }
}

/// Reads one allow-listed attribute off a loop.
pub fn resolve_field(record: &Loop, field: LoopField) -> FieldValue {
    match field {
        LoopField::PropertyAddress => FieldValue::text(Some(&record.property_address)),
        LoopField::ClientName => FieldValue::text(record.client_name.as_deref()),
        LoopField::ClientEmail => FieldValue::text(record.client_email.as_deref()),
        LoopField::ClientPhone => FieldValue::text(record.client_phone.as_deref()),
        LoopField::Sale => record
            .sale
            .map(FieldValue::Number)
            .unwrap_or(FieldValue::Absent),
        LoopField::Status => FieldValue::Text(record.status.as_str().to_string()),
        LoopField::Type => FieldValue::text(Some(&record.loop_type)),
        LoopField::StartDate => record
            .start_date
            .map(FieldValue::Date)
            .unwrap_or(FieldValue::Absent),
        LoopField::EndDate => record
            .end_date
            .map(FieldValue::Date)
            .unwrap_or(FieldValue::Absent),
        LoopField::Tags => FieldValue::text(record.tags.as_deref()),
        LoopField::Notes => FieldValue::text(record.notes.as_deref()),
        LoopField::CreatorName => FieldValue::text(record.creator_name.as_deref()),
    }
}

pub fn format_value(value: &FieldValue, field_type: FieldType) -> String {
    match field_type {
        FieldType::Currency => format_currency(as_number(value)),
        FieldType::Date => format_date(value),
        FieldType::Number => format_number(as_number(value)),
        FieldType::Text => match value {
            FieldValue::Absent => String::new(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        },
    }
}

fn as_number(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Number(n) => Some(*n),
        FieldValue::Text(s) => crate::loops::validation::parse_sale(s)
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok()),
        FieldValue::Absent | FieldValue::Date(_) => None,
    }
    .filter(|n| n.is_finite())
}

/// `$1,234.50`; absent or zero renders as `$0`.
pub fn format_currency(amount: Option<f64>) -> String {
    match amount {
        None => "$0".to_string(),
        Some(n) if n == 0.0 => "$0".to_string(),
        Some(n) => {
            let sign = if n < 0.0 { "-" } else { "" };
            let fixed = format!("{:.2}", n.abs());
            let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
            format!("{}${}.{}", sign, group_thousands(whole), cents)
        }
    }
}

/// Shortest plain rendering; absent renders as `0`.
pub fn format_number(value: Option<f64>) -> String {
    match value {
        None => "0".to_string(),
        Some(n) => n.to_string(),
    }
}

/// `M/D/YYYY`; absent renders as an empty string. Text that does not look
/// like a date is passed through unchanged.
fn format_date(value: &FieldValue) -> String {
    match value {
        FieldValue::Absent => String::new(),
        FieldValue::Date(d) => month_day_year(*d),
        FieldValue::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(s.trim()).ok().map(|dt| dt.date_naive()))
            .map(month_day_year)
            .unwrap_or_else(|| s.clone()),
        FieldValue::Number(n) => n.to_string(),
    }
}

fn month_day_year(d: NaiveDate) -> String {
    format!("{}/{}/{}", d.month(), d.day(), d.year())
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loops::LoopStatus;

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(None), "$0");
        assert_eq!(format_currency(Some(0.0)), "$0");
        assert_eq!(format_currency(Some(1234.5)), "$1,234.50");
        assert_eq!(format_currency(Some(425000.0)), "$425,000.00");
        assert_eq!(format_currency(Some(999.999)), "$1,000.00");
        assert_eq!(format_currency(Some(12.0)), "$12.00");
        assert_eq!(format_currency(Some(-1500.25)), "-$1,500.25");
        assert_eq!(format_currency(Some(1234567.891)), "$1,234,567.89");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(None), "0");
        assert_eq!(format_number(Some(1500.0)), "1500");
        assert_eq!(format_number(Some(12.5)), "12.5");
        assert_eq!(format_number(Some(0.0)), "0");
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_value(&FieldValue::Absent, FieldType::Date), "");
        let d = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert_eq!(format_value(&FieldValue::Date(d), FieldType::Date), "1/5/2026");
        assert_eq!(
            format_value(&FieldValue::Text("2026-12-31".to_string()), FieldType::Date),
            "12/31/2026"
        );
        assert_eq!(
            format_value(&FieldValue::Text("next week".to_string()), FieldType::Date),
            "next week"
        );
    }

    #[test]
    fn test_format_text() {
        assert_eq!(format_value(&FieldValue::Absent, FieldType::Text), "");
        assert_eq!(
            format_value(&FieldValue::Text("Jane Doe".to_string()), FieldType::Text),
            "Jane Doe"
        );
        assert_eq!(format_value(&FieldValue::Number(250000.0), FieldType::Text), "250000");
        let d = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        assert_eq!(format_value(&FieldValue::Date(d), FieldType::Text), "2026-04-01");
    }

    #[test]
    fn test_text_values_coerce_to_numbers() {
        assert_eq!(
            format_value(&FieldValue::Text("1200".to_string()), FieldType::Currency),
            "$1,200.00"
        );
        assert_eq!(
            format_value(&FieldValue::Text("abc".to_string()), FieldType::Number),
            "0"
        );
        assert_eq!(
            format_value(&FieldValue::Text("abc".to_string()), FieldType::Currency),
            "$0"
        );
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands("1"), "1");
        assert_eq!(group_thousands("123"), "123");
        assert_eq!(group_thousands("1234"), "1,234");
        assert_eq!(group_thousands("123456"), "123,456");
        assert_eq!(group_thousands("1234567"), "1,234,567");
    }

    #[test]
    fn test_resolve_field() {
        let mut record = crate::test_support::sample_loop();
        record.client_name = Some("Jane Doe".to_string());
        record.client_email = Some(String::new());
        record.sale = Some(350000.0);
        record.status = LoopStatus::UnderContract;
        record.creator_name = None;

        assert_eq!(
            resolve_field(&record, LoopField::ClientName),
            FieldValue::Text("Jane Doe".to_string())
        );
        assert_eq!(resolve_field(&record, LoopField::ClientEmail), FieldValue::Absent);
        assert_eq!(
            resolve_field(&record, LoopField::Sale),
            FieldValue::Number(350000.0)
        );
        assert_eq!(
            resolve_field(&record, LoopField::Status),
            FieldValue::Text("under-contract".to_string())
        );
        assert_eq!(resolve_field(&record, LoopField::CreatorName), FieldValue::Absent);
        assert_eq!(
            resolve_field(&record, LoopField::EndDate),
            FieldValue::Date(NaiveDate::from_ymd_opt(2026, 4, 15).unwrap())
        );

        record.end_date = None;
        assert_eq!(resolve_field(&record, LoopField::EndDate), FieldValue::Absent);
    }
}
