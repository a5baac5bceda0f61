#![forbid(unsafe_code)]

use std::str::FromStr;

use keel_kernel_contracts::common::CalendarMonth;
use keel_kernel_contracts::hours_of_rest::{validate_rest_hours, HoursOfRestRecord};
use keel_kernel_contracts::ContractViolation;
use rust_decimal::Decimal;

/// Minimum rest in any 24-hour day.
pub const MIN_DAILY_REST_HOURS: Decimal = Decimal::TEN;

pub fn is_compliant(rest_hours: Decimal) -> bool {
    rest_hours >= MIN_DAILY_REST_HOURS
}

/// Parses a rest-hours value with at most two decimal places.
pub fn parse_rest_hours(raw: &str) -> Result<Decimal, ContractViolation> {
    let hours = Decimal::from_str(raw.trim()).map_err(|_| ContractViolation::InvalidValue {
        field: "rest_hours",
        reason: "must be a decimal number",
    })?;
    if hours.scale() > 2 {
        return Err(ContractViolation::InvalidValue {
            field: "rest_hours",
            reason: "must have at most two decimal places",
        });
    }
    validate_rest_hours(hours)?;
    Ok(hours.normalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthSummary {
    pub total_rest_hours: Decimal,
    pub recorded_days: u32,
    pub non_compliant_days: u32,
}

/// Summarizes one user's records for `month`. Records outside the month are ignored.
pub fn summarize_month<'a>(
    month: CalendarMonth,
    records: impl IntoIterator<Item = &'a HoursOfRestRecord>,
) -> MonthSummary {
    let mut summary = MonthSummary {
        total_rest_hours: Decimal::ZERO,
        recorded_days: 0,
        non_compliant_days: 0,
    };
    for r in records.into_iter().filter(|r| r.record_date.month() == month) {
        summary.total_rest_hours += r.rest_hours;
        summary.recorded_days += 1;
        if !is_compliant(r.rest_hours) {
            summary.non_compliant_days += 1;
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_kernel_contracts::common::CalendarDate;
    use keel_kernel_contracts::hours_of_rest::RestRecordId;
    use keel_kernel_contracts::tenancy::{UserId, YachtId};
    use keel_kernel_contracts::MonotonicTimeNs;

    fn record(date: &str, hours: &str) -> HoursOfRestRecord {
        let rest_hours = parse_rest_hours(hours).unwrap();
        HoursOfRestRecord {
            yacht_id: YachtId::new("yacht_a").unwrap(),
            record_id: RestRecordId::new(format!("hor_{date}")).unwrap(),
            user_id: UserId::new("user_crew").unwrap(),
            record_date: CalendarDate::parse("record_date", date).unwrap(),
            rest_hours,
            is_compliant: is_compliant(rest_hours),
            notes: None,
            created_at: MonotonicTimeNs(1),
            updated_at: MonotonicTimeNs(1),
        }
    }

    #[test]
    fn at_rest_compliance_01_ten_hours_is_the_threshold() {
        assert!(is_compliant(parse_rest_hours("10").unwrap()));
        assert!(is_compliant(parse_rest_hours("10.00").unwrap()));
        assert!(!is_compliant(parse_rest_hours("9.99").unwrap()));
    }

    #[test]
    fn at_rest_compliance_02_parse_rejects_out_of_range_and_precision() {
        assert!(parse_rest_hours("24.5").is_err());
        assert!(parse_rest_hours("-1").is_err());
        assert!(parse_rest_hours("8.125").is_err());
        assert!(parse_rest_hours("ten").is_err());
    }

    #[test]
    fn at_rest_compliance_03_month_summary_counts_only_that_month() {
        let rows = vec![
            record("2025-03-01", "11"),
            record("2025-03-02", "8.5"),
            record("2025-03-03", "10"),
            record("2025-04-01", "4"),
        ];
        let s = summarize_month(CalendarMonth::parse("month", "2025-03").unwrap(), &rows);
        assert_eq!(s.recorded_days, 3);
        assert_eq!(s.non_compliant_days, 1);
        assert_eq!(s.total_rest_hours, Decimal::from_str("29.5").unwrap());
    }
}
