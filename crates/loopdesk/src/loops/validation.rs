//! Input validation for loop creation and patches.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;

use super::{LoopFields, LoopPatch, LoopStatus, NewLoop};
use crate::error::ValidationError;

static RE_EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

static RE_PHONE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9+\-().\s]+$").unwrap());

const PHONE_MIN_DIGITS: usize = 7;
const PHONE_MAX_DIGITS: usize = 15;

/// Validates a creation payload into typed fields.
pub fn validate_new(input: &NewLoop) -> Result<LoopFields, ValidationError> {
    let loop_type = required(input.loop_type.as_deref(), "type")?;
    let property_address = required(input.property_address.as_deref(), "property_address")?;

    let fields = LoopFields {
        loop_type,
        property_address,
        sale: optional(input.sale.as_deref())
            .map(parse_sale)
            .transpose()?,
        status: match optional(input.status.as_deref()) {
            Some(s) => parse_status(s)?,
            None => LoopStatus::default(),
        },
        client_name: optional(input.client_name.as_deref()).map(str::to_string),
        client_email: optional(input.client_email.as_deref())
            .map(parse_email)
            .transpose()?,
        client_phone: optional(input.client_phone.as_deref())
            .map(parse_phone)
            .transpose()?,
        notes: optional(input.notes.as_deref()).map(str::to_string),
        tags: optional(input.tags.as_deref()).map(str::to_string),
        start_date: optional(input.start_date.as_deref())
            .map(|s| parse_date("start_date", s))
            .transpose()?,
        end_date: optional(input.end_date.as_deref())
            .map(|s| parse_date("end_date", s))
            .transpose()?,
    };

    check_date_order(&fields)?;
    Ok(fields)
}

/// Applies a patch onto the current fields, returning the merged fields and
/// the names of the fields whose value changed.
pub fn apply_patch(
    current: &LoopFields,
    patch: &LoopPatch,
) -> Result<(LoopFields, Vec<&'static str>), ValidationError> {
    let mut next = current.clone();

    if let Some(v) = patch.loop_type.as_deref() {
        next.loop_type = required(Some(v), "type")?;
    }
    if let Some(v) = patch.property_address.as_deref() {
        next.property_address = required(Some(v), "property_address")?;
    }
    if let Some(v) = patch.sale.as_deref() {
        next.sale = optional(Some(v)).map(parse_sale).transpose()?;
    }
    if let Some(v) = patch.status.as_deref() {
        next.status = parse_status(v)?;
    }
    if let Some(v) = patch.client_name.as_deref() {
        next.client_name = optional(Some(v)).map(str::to_string);
    }
    if let Some(v) = patch.client_email.as_deref() {
        next.client_email = optional(Some(v)).map(parse_email).transpose()?;
    }
    if let Some(v) = patch.client_phone.as_deref() {
        next.client_phone = optional(Some(v)).map(parse_phone).transpose()?;
    }
    if let Some(v) = patch.notes.as_deref() {
        next.notes = optional(Some(v)).map(str::to_string);
    }
    if let Some(v) = patch.tags.as_deref() {
        next.tags = optional(Some(v)).map(str::to_string);
    }
    if let Some(v) = patch.start_date.as_deref() {
        next.start_date = optional(Some(v))
            .map(|s| parse_date("start_date", s))
            .transpose()?;
    }
    if let Some(v) = patch.end_date.as_deref() {
        next.end_date = optional(Some(v))
            .map(|s| parse_date("end_date", s))
            .transpose()?;
    }

    check_date_order(&next)?;

    let changed = changed_fields(current, &next);
    Ok((next, changed))
}

fn changed_fields(before: &LoopFields, after: &LoopFields) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if before.loop_type != after.loop_type {
        changed.push("type");
    }
    if before.sale != after.sale {
        changed.push("sale");
    }
    if before.status != after.status {
        changed.push("status");
    }
    if before.property_address != after.property_address {
        changed.push("property_address");
    }
    if before.client_name != after.client_name {
        changed.push("client_name");
    }
    if before.client_email != after.client_email {
        changed.push("client_email");
    }
    if before.client_phone != after.client_phone {
        changed.push("client_phone");
    }
    if before.notes != after.notes {
        changed.push("notes");
    }
    if before.tags != after.tags {
        changed.push("tags");
    }
    if before.start_date != after.start_date {
        changed.push("start_date");
    }
    if before.end_date != after.end_date {
        changed.push("end_date");
    }
    changed
}

fn required(value: Option<&str>, field: &'static str) -> Result<String, ValidationError> {
    optional(value)
        .map(str::to_string)
        .ok_or(ValidationError::MissingField { field })
}

/// Trims and treats blank strings as absent.
fn optional(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Parses a sale amount. Accepts a leading `$` and thousands separators.
pub fn parse_sale(raw: &str) -> Result<f64, ValidationError> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    let amount: f64 = cleaned
        .parse()
        .map_err(|_| ValidationError::invalid("sale", format!("'{}' is not a number", raw)))?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(ValidationError::invalid(
            "sale",
            "must be a non-negative amount",
        ));
    }
    Ok(amount)
}

pub fn parse_status(raw: &str) -> Result<LoopStatus, ValidationError> {
    LoopStatus::parse(raw)
        .ok_or_else(|| ValidationError::invalid("status", format!("unknown status '{}'", raw)))
}

pub fn parse_email(raw: &str) -> Result<String, ValidationError> {
    if RE_EMAIL.is_match(raw) {
        Ok(raw.to_string())
    } else {
        Err(ValidationError::invalid(
            "client_email",
            format!("'{}' is not a valid email address", raw),
        ))
    }
}

pub fn parse_phone(raw: &str) -> Result<String, ValidationError> {
    let digits = raw.chars().filter(|c| c.is_ascii_digit()).count();
    if !RE_PHONE_CHARS.is_match(raw) || !(PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&digits) {
        return Err(ValidationError::invalid(
            "client_phone",
            format!("'{}' is not a valid phone number", raw),
        ));
    }
    Ok(raw.to_string())
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp (date part kept).
pub fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
        .map_err(|_| ValidationError::invalid(field, format!("'{}' is not a date (YYYY-MM-DD)", raw)))
}

fn check_date_order(fields: &LoopFields) -> Result<(), ValidationError> {
    if let (Some(start), Some(end)) = (fields.start_date, fields.end_date) {
        if end < start {
            return Err(ValidationError::invalid(
                "end_date",
                "must not be before start_date",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> NewLoop {
        NewLoop {
            loop_type: Some("Purchase".to_string()),
            property_address: Some("123 Main St".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_minimal_loop_defaults() {
        let fields = validate_new(&minimal()).unwrap();
        assert_eq!(fields.loop_type, "Purchase");
        assert_eq!(fields.property_address, "123 Main St");
        assert_eq!(fields.status, LoopStatus::PreOffer);
        assert_eq!(fields.sale, None);
        assert_eq!(fields.client_email, None);
    }

    #[test]
    fn test_missing_property_address() {
        let input = NewLoop {
            property_address: None,
            ..minimal()
        };
        assert_eq!(
            validate_new(&input).unwrap_err(),
            ValidationError::MissingField {
                field: "property_address"
            }
        );

        let blank = NewLoop {
            property_address: Some("   ".to_string()),
            ..minimal()
        };
        assert!(matches!(
            validate_new(&blank),
            Err(ValidationError::MissingField { field: "property_address" })
        ));
    }

    #[test]
    fn test_missing_type() {
        let input = NewLoop {
            loop_type: None,
            ..minimal()
        };
        assert!(matches!(
            validate_new(&input),
            Err(ValidationError::MissingField { field: "type" })
        ));
    }

    #[test]
    fn test_invalid_email_and_phone() {
        let input = NewLoop {
            client_email: Some("jane-at-example".to_string()),
            ..minimal()
        };
        assert!(matches!(
            validate_new(&input),
            Err(ValidationError::InvalidField { field: "client_email", .. })
        ));

        let input = NewLoop {
            client_phone: Some("call me".to_string()),
            ..minimal()
        };
        assert!(matches!(
            validate_new(&input),
            Err(ValidationError::InvalidField { field: "client_phone", .. })
        ));

        assert!(parse_phone("(555) 123-4567").is_ok());
        assert!(parse_phone("+1 555.123.4567").is_ok());
        assert!(parse_phone("12345").is_err());
    }

    #[test]
    fn test_sale_parsing() {
        assert_eq!(parse_sale("425000").unwrap(), 425000.0);
        assert_eq!(parse_sale("$1,234.50").unwrap(), 1234.5);
        assert!(parse_sale("-5").is_err());
        assert!(parse_sale("lots").is_err());
        assert!(parse_sale("inf").is_err());
    }

    #[test]
    fn test_dates_and_order() {
        let input = NewLoop {
            start_date: Some("2026-03-01".to_string()),
            end_date: Some("2026-02-01".to_string()),
            ..minimal()
        };
        assert!(matches!(
            validate_new(&input),
            Err(ValidationError::InvalidField { field: "end_date", .. })
        ));

        let input = NewLoop {
            start_date: Some("2026-03-01T12:00:00Z".to_string()),
            end_date: Some("2026-04-15".to_string()),
            ..minimal()
        };
        let fields = validate_new(&input).unwrap();
        assert_eq!(fields.start_date, NaiveDate::from_ymd_opt(2026, 3, 1));

        assert!(parse_date("start_date", "03/01/2026").is_err());
    }

    #[test]
    fn test_legacy_status_accepted() {
        let input = NewLoop {
            status: Some("closing".to_string()),
            ..minimal()
        };
        assert_eq!(
            validate_new(&input).unwrap().status,
            LoopStatus::UnderContract
        );
    }

    #[test]
    fn test_patch_keeps_absent_and_clears_blank() {
        let current = validate_new(&NewLoop {
            client_name: Some("Jane Doe".to_string()),
            notes: Some("call after 5".to_string()),
            ..minimal()
        })
        .unwrap();

        let patch = LoopPatch {
            notes: Some(String::new()),
            sale: Some("500000".to_string()),
            ..Default::default()
        };
        let (next, changed) = apply_patch(&current, &patch).unwrap();
        assert_eq!(next.client_name.as_deref(), Some("Jane Doe"));
        assert_eq!(next.notes, None);
        assert_eq!(next.sale, Some(500000.0));
        assert_eq!(changed, vec!["sale", "notes"]);
    }

    #[test]
    fn test_patch_rejects_blank_required_field() {
        let current = validate_new(&minimal()).unwrap();
        let patch = LoopPatch {
            property_address: Some(String::new()),
            ..Default::default()
        };
        assert!(matches!(
            apply_patch(&current, &patch),
            Err(ValidationError::MissingField { field: "property_address" })
        ));
    }

    #[test]
    fn test_patch_checks_merged_date_order() {
        let current = validate_new(&NewLoop {
            start_date: Some("2026-05-01".to_string()),
            ..minimal()
        })
        .unwrap();
        let patch = LoopPatch {
            end_date: Some("2026-04-01".to_string()),
            ..Default::default()
        };
        assert!(apply_patch(&current, &patch).is_err());
    }

    #[test]
    fn test_patch_without_changes() {
        let current = validate_new(&minimal()).unwrap();
        let (next, changed) = apply_patch(&current, &LoopPatch::default()).unwrap();
        assert_eq!(next, current);
        assert!(changed.is_empty());
    }
}
