#![forbid(unsafe_code)]

use std::fmt;

use crate::tenancy::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion(pub u32);

/// Wall-clock nanoseconds since the Unix epoch, supplied by the caller so every stage of one
/// request observes the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonotonicTimeNs(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReasonCodeId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum ContractViolation {
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
        got: f64,
    },
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractViolation::InvalidValue { field, reason } => write!(f, "{field} {reason}"),
            ContractViolation::InvalidRange {
                field,
                min,
                max,
                got,
            } => write!(f, "{field} must be within [{min}, {max}], got {got}"),
        }
    }
}

impl std::error::Error for ContractViolation {}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}

pub fn validate_id(field: &'static str, value: &str, max_len: usize) -> Result<(), ContractViolation> {
    if value.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    if value.len() > max_len {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "exceeds max length",
        });
    }
    if !value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b':'))
    {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must contain only [A-Za-z0-9_.:-]",
        });
    }
    Ok(())
}

pub fn validate_text(field: &'static str, value: &str, max_len: usize) -> Result<(), ContractViolation> {
    if value.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    if value.chars().count() > max_len {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "exceeds max length",
        });
    }
    Ok(())
}

pub fn validate_opt_text(
    field: &'static str,
    value: &Option<String>,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if let Some(v) = value {
        validate_text(field, v, max_len)?;
    }
    Ok(())
}

/// Declares a validated string identifier newtype.
macro_rules! validated_id {
    ($(#[$meta:meta])* $name:ident, $field:literal, $max:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn new(v: impl Into<String>) -> Result<Self, $crate::ContractViolation> {
                let v = Self(v.into());
                $crate::Validate::validate(&v)?;
                Ok(v)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl $crate::Validate for $name {
            fn validate(&self) -> Result<(), $crate::ContractViolation> {
                $crate::common::validate_id($field, &self.0, $max)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

pub(crate) use validated_id;

/// ISO calendar date (`YYYY-MM-DD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

impl CalendarDate {
    pub fn parse(field: &'static str, s: &str) -> Result<Self, ContractViolation> {
        let bad = ContractViolation::InvalidValue {
            field,
            reason: "must be a valid YYYY-MM-DD date",
        };
        let b = s.as_bytes();
        if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
            return Err(bad);
        }
        let year: u16 = s[0..4].parse().map_err(|_| bad.clone())?;
        let month: u8 = s[5..7].parse().map_err(|_| bad.clone())?;
        let day: u8 = s[8..10].parse().map_err(|_| bad.clone())?;
        if year < 1900 || !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
            return Err(bad);
        }
        Ok(Self { year, month, day })
    }

    pub fn month(&self) -> CalendarMonth {
        CalendarMonth {
            year: self.year,
            month: self.month,
        }
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Calendar month (`YYYY-MM`), the unit of hours-of-rest sign-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarMonth {
    pub year: u16,
    pub month: u8,
}

impl CalendarMonth {
    pub fn parse(field: &'static str, s: &str) -> Result<Self, ContractViolation> {
        let bad = ContractViolation::InvalidValue {
            field,
            reason: "must be a valid YYYY-MM month",
        };
        let b = s.as_bytes();
        if b.len() != 7 || b[4] != b'-' {
            return Err(bad);
        }
        let year: u16 = s[0..4].parse().map_err(|_| bad.clone())?;
        let month: u8 = s[5..7].parse().map_err(|_| bad.clone())?;
        if year < 1900 || !(1..=12).contains(&month) {
            return Err(bad);
        }
        Ok(Self { year, month })
    }
}

impl fmt::Display for CalendarMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Free-text note attached to a fault or work order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityNote {
    pub author: UserId,
    pub body: String,
    pub created_at: MonotonicTimeNs,
}

impl Validate for EntityNote {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.author.validate()?;
        validate_text("entity_note.body", &self.body, 4_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_common_01_calendar_date_rejects_impossible_days() {
        assert!(CalendarDate::parse("d", "2024-02-29").is_ok());
        assert!(CalendarDate::parse("d", "2023-02-29").is_err());
        assert!(CalendarDate::parse("d", "2024-13-01").is_err());
        assert!(CalendarDate::parse("d", "2024-1-01").is_err());
        assert_eq!(
            CalendarDate::parse("d", "2024-06-03").unwrap().to_string(),
            "2024-06-03"
        );
    }

    #[test]
    fn at_common_02_calendar_month_round_trips_display() {
        let m = CalendarMonth::parse("m", "2025-01").unwrap();
        assert_eq!(m.to_string(), "2025-01");
        assert!(CalendarMonth::parse("m", "2025-00").is_err());
        assert_eq!(
            CalendarDate::parse("d", "2025-01-31").unwrap().month(),
            m
        );
    }

    #[test]
    fn at_common_03_id_validation_rejects_whitespace_and_symbols() {
        assert!(validate_id("x", "flt_000001", 64).is_ok());
        assert!(validate_id("x", "   ", 64).is_err());
        assert!(validate_id("x", "a b", 64).is_err());
        assert!(validate_id("x", &"a".repeat(65), 64).is_err());
    }
}
