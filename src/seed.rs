//! Built-in Schedule 1 catalogue.
//!
//! Two editions of the agreement are seeded: the 2024-25 rates and the
//! 2025-26 rates, which apply a 3% uplift from 1 July 2025. Both editions are
//! closed at the end of their financial year so later editions can be
//! installed on top. Hourly amounts are the session rates of the agreement
//! divided by the payable hours of the session.
use rust_decimal::Decimal;

use crate::catalog::{EffectiveWindow, PolicyVersion, RateAmount, RateCatalog, RateCode};
use crate::error::{CatalogError, ValidationError};
use crate::money::{Hours, Money};
use crate::types::{CalendarDate, Qualification, TaskType};

pub const AGREEMENT: &str = "University Casual Academic EA 2023";

const HIGH_BAND: &[Qualification] = &[Qualification::Phd, Qualification::Coordinator];
const STANDARD: &[Qualification] = &[Qualification::Standard];
const COORDINATOR: &[Qualification] = &[Qualification::Coordinator];
const ANY_TIER: &[Qualification] = &[];

struct SeedRate {
    code: &'static str,
    task_type: TaskType,
    description: &'static str,
    requires_phd: bool,
    is_repeatable: bool,
    clause: &'static str,
    // tenths of an hour
    delivery: u32,
    associated: u32,
    max_payable: u32,
    tiers: &'static [Qualification],
    hourly_cents: u32,
}

const RATES: &[SeedRate] = &[
    SeedRate {
        code: "TU1",
        task_type: TaskType::Tutorial,
        description: "Tutorial (PhD or unit coordinator)",
        requires_phd: true,
        is_repeatable: false,
        clause: "Schedule 1 Clause 2.1",
        delivery: 10,
        associated: 20,
        max_payable: 30,
        tiers: HIGH_BAND,
        hourly_cents: 7006,
    },
    SeedRate {
        code: "TU2",
        task_type: TaskType::Tutorial,
        description: "Tutorial",
        requires_phd: false,
        is_repeatable: false,
        clause: "Schedule 1 Clause 2.1",
        delivery: 10,
        associated: 20,
        max_payable: 30,
        tiers: STANDARD,
        hourly_cents: 5865,
    },
    SeedRate {
        code: "TU3",
        task_type: TaskType::Tutorial,
        description: "Repeat tutorial (PhD or unit coordinator)",
        requires_phd: true,
        is_repeatable: true,
        clause: "Schedule 1 Clause 2.2",
        delivery: 10,
        associated: 10,
        max_payable: 20,
        tiers: HIGH_BAND,
        hourly_cents: 7007,
    },
    SeedRate {
        code: "TU4",
        task_type: TaskType::Tutorial,
        description: "Repeat tutorial",
        requires_phd: false,
        is_repeatable: true,
        clause: "Schedule 1 Clause 2.2",
        delivery: 10,
        associated: 10,
        max_payable: 20,
        tiers: STANDARD,
        hourly_cents: 5865,
    },
    SeedRate {
        code: "P02",
        task_type: TaskType::Lecture,
        description: "Developed lecture (unit coordinator)",
        requires_phd: false,
        is_repeatable: false,
        clause: "Schedule 1 - Lecturing",
        delivery: 10,
        associated: 30,
        max_payable: 40,
        tiers: COORDINATOR,
        hourly_cents: 8170,
    },
    SeedRate {
        code: "P03",
        task_type: TaskType::Lecture,
        description: "Standard lecture",
        requires_phd: false,
        is_repeatable: false,
        clause: "Schedule 1 - Lecturing",
        delivery: 10,
        associated: 20,
        max_payable: 30,
        tiers: ANY_TIER,
        hourly_cents: 8169,
    },
    SeedRate {
        code: "P04",
        task_type: TaskType::Lecture,
        description: "Repeat lecture",
        requires_phd: false,
        is_repeatable: true,
        clause: "Schedule 1 - Lecturing",
        delivery: 10,
        associated: 10,
        max_payable: 20,
        tiers: ANY_TIER,
        hourly_cents: 8171,
    },
    SeedRate {
        code: "AO1",
        task_type: TaskType::Oraa,
        description: "Other required academic activity (PhD or unit coordinator)",
        requires_phd: true,
        is_repeatable: false,
        clause: "Schedule 1 Clause 3.1(a)",
        delivery: 10,
        associated: 0,
        max_payable: 0,
        tiers: HIGH_BAND,
        hourly_cents: 6972,
    },
    SeedRate {
        code: "AO2",
        task_type: TaskType::Oraa,
        description: "Other required academic activity",
        requires_phd: false,
        is_repeatable: false,
        clause: "Schedule 1 Clause 3.1(a)",
        delivery: 10,
        associated: 0,
        max_payable: 0,
        tiers: STANDARD,
        hourly_cents: 5832,
    },
    SeedRate {
        code: "DE1",
        task_type: TaskType::Demo,
        description: "Demonstration (PhD or unit coordinator)",
        requires_phd: true,
        is_repeatable: false,
        clause: "Schedule 1 Clause 3.1(a)",
        delivery: 10,
        associated: 0,
        max_payable: 0,
        tiers: HIGH_BAND,
        hourly_cents: 6972,
    },
    SeedRate {
        code: "DE2",
        task_type: TaskType::Demo,
        description: "Demonstration",
        requires_phd: false,
        is_repeatable: false,
        clause: "Schedule 1 Clause 3.1(a)",
        delivery: 10,
        associated: 0,
        max_payable: 0,
        tiers: STANDARD,
        hourly_cents: 5832,
    },
    SeedRate {
        code: "M04",
        task_type: TaskType::Marking,
        description: "Marking (PhD or unit coordinator)",
        requires_phd: true,
        is_repeatable: false,
        clause: "Schedule 1 - Marking",
        delivery: 10,
        associated: 0,
        max_payable: 0,
        tiers: HIGH_BAND,
        hourly_cents: 6972,
    },
    SeedRate {
        code: "M05",
        task_type: TaskType::Marking,
        description: "Marking",
        requires_phd: false,
        is_repeatable: false,
        clause: "Schedule 1 - Marking",
        delivery: 10,
        associated: 0,
        max_payable: 0,
        tiers: STANDARD,
        hourly_cents: 5832,
    },
];

struct Edition {
    major: u32,
    minor: u32,
    year_label: &'static str,
    from: (i32, u32, u32),
    to: Option<(i32, u32, u32)>,
    // percentage applied to the base hourly rate
    uplift_percent: i64,
}

const EDITIONS: &[Edition] = &[
    Edition {
        major: 1,
        minor: 0,
        year_label: "2024-25",
        from: (2024, 7, 1),
        to: Some((2025, 7, 1)),
        uplift_percent: 100,
    },
    Edition {
        major: 1,
        minor: 1,
        year_label: "2025-26",
        from: (2025, 7, 1),
        to: Some((2026, 7, 1)),
        uplift_percent: 103,
    },
];

fn date((y, m, d): (i32, u32, u32)) -> CalendarDate {
    // the seed tables only hold real dates; fall back to the epoch of the agreement
    CalendarDate::from_ymd(y, m, d).unwrap_or(CalendarDate::from(chrono::NaiveDate::MIN))
}

/// The default catalogue. Every row passes through the same validation as
/// administrator supplied rows.
pub fn schedule_one() -> Result<RateCatalog, CatalogError> {
    let mut catalog = RateCatalog::new();

    for rate in RATES {
        catalog.add_rate_code(RateCode {
            code: rate.code.to_owned(),
            task_type: rate.task_type,
            description: rate.description.to_owned(),
            default_associated_hours: Hours::from_tenths(rate.associated),
            default_delivery_hours: Hours::from_tenths(rate.delivery),
            requires_phd: rate.requires_phd,
            is_repeatable: rate.is_repeatable,
            clause_reference: rate.clause.to_owned(),
        })?;
    }

    for edition in EDITIONS {
        let window = EffectiveWindow::new(date(edition.from), edition.to.map(date))?;
        let mut version = PolicyVersion::new(AGREEMENT, edition.major, edition.minor, window);
        version.notes = Some(format!("Schedule 1 rates for {}", edition.year_label));
        let key = version.key();
        catalog.add_policy_version(version)?;

        for rate in RATES {
            let hourly = uplifted(Money::from_cents(rate.hourly_cents), edition.uplift_percent)
                .map_err(|_| CatalogError::NonPositiveAmount(rate.code.to_owned()))?;
            let tiers: Vec<Option<Qualification>> = if rate.tiers.is_empty() {
                vec![None]
            } else {
                rate.tiers.iter().copied().map(Some).collect()
            };
            for qualification in tiers {
                catalog.add_rate_amount(RateAmount {
                    id: 0,
                    rate_code: rate.code.to_owned(),
                    policy_version: key.clone(),
                    year_label: edition.year_label.to_owned(),
                    window,
                    hourly_amount: hourly,
                    max_associated_hours: Hours::from_tenths(rate.associated),
                    max_payable_hours: Hours::from_tenths(rate.max_payable),
                    qualification,
                    notes: None,
                })?;
            }
        }
    }

    Ok(catalog)
}

fn uplifted(base: Money, percent: i64) -> Result<Money, ValidationError> {
    let factor = Decimal::new(percent, 2);
    let value = base
        .amount()
        .checked_mul(factor)
        .ok_or(ValidationError::Overflow)?;
    Money::new(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_catalog_builds() {
        let catalog = schedule_one().unwrap();
        assert_eq!(catalog.policy_versions().len(), 2);
        assert_eq!(catalog.rate_codes().len(), RATES.len());
        assert!(catalog.rate_amounts().iter().all(|a| !a.hourly_amount.is_zero()));
    }

    #[test]
    fn second_edition_applies_uplift() {
        let catalog = schedule_one().unwrap();
        let tu2: Vec<_> = catalog
            .rate_amounts()
            .iter()
            .filter(|a| a.rate_code == "TU2")
            .collect();
        assert_eq!(tu2.len(), 2);
        assert_eq!(tu2[0].hourly_amount, Money::parse("58.65").unwrap());
        assert_eq!(tu2[1].hourly_amount, Money::parse("60.41").unwrap());
    }
}
