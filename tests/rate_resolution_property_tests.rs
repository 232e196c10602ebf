//! Property-based tests for temporal rate resolution
//!
//! Resolution runs against the built-in Schedule 1 catalogue held in memory,
//! so no database is involved. The properties check the guarantees callers
//! rely on when they persist a price: the chosen row is the one in force on
//! the session date, it belongs to the requested tier (or to every tier), and
//! asking twice gives the same answer.

use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use timesheet_approval::{
    catalog::{RateAmount, RateCatalog},
    config::RateRules,
    resolver::{RateQuote, RateResolver},
    seed,
    types::{CalendarDate, Qualification, TaskType},
};

fn catalog() -> RateCatalog {
    seed::schedule_one().expect("seed catalogue builds")
}

fn row<'a>(catalog: &'a RateCatalog, quote: &RateQuote) -> &'a RateAmount {
    catalog
        .rate_amounts()
        .iter()
        .find(|a| a.id == quote.rate_amount_id)
        .expect("quote points at a catalogue row")
}

fn task_type_strategy() -> impl Strategy<Value = TaskType> {
    prop::sample::select(TaskType::ALL.to_vec())
}

fn qualification_strategy() -> impl Strategy<Value = Qualification> {
    prop::sample::select(Qualification::ALL.to_vec())
}

/// Any day from the start of 2023 to the end of 2027.
fn date_strategy() -> impl Strategy<Value = CalendarDate> {
    (0u64..(5 * 366)).prop_map(|offset| {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).expect("valid date");
        CalendarDate::from(start + Days::new(offset))
    })
}

/// Days covered by the seeded editions, 1 July 2024 to 30 June 2026.
fn seeded_date_strategy() -> impl Strategy<Value = CalendarDate> {
    (0u64..730).prop_map(|offset| {
        let start = NaiveDate::from_ymd_opt(2024, 7, 1).expect("valid date");
        CalendarDate::from(start + Days::new(offset))
    })
}

proptest! {
    /// The same inputs always produce the same row.
    #[test]
    fn resolution_is_deterministic(
        task in task_type_strategy(),
        tier in qualification_strategy(),
        date in date_strategy(),
        repeat in any::<bool>(),
    ) {
        let resolver = RateResolver::new(catalog(), RateRules::default());
        let first = resolver.resolve(task, tier, date, repeat).ok();
        let second = resolver.resolve(task, tier, date, repeat).ok();
        prop_assert_eq!(first, second);
    }

    /// A resolved row is in force on the session date and belongs to the
    /// requested task type and tier, or to every tier.
    #[test]
    fn resolved_row_governs_the_session(
        task in task_type_strategy(),
        tier in qualification_strategy(),
        date in date_strategy(),
        repeat in any::<bool>(),
    ) {
        let catalog = catalog();
        let resolver = RateResolver::new(&catalog, RateRules::default());
        if let Ok(quote) = resolver.resolve(task, tier, date, repeat) {
            let amount = row(&catalog, &quote);
            prop_assert!(amount.window.contains(date));
            prop_assert!(amount.qualification.is_none_or(|q| q == tier));
            prop_assert_eq!(quote.task_type, task);
            prop_assert!(!quote.hourly_rate.is_zero());
            prop_assert_eq!(quote.effective_from, amount.window.from);
        }
    }

    /// Every combination has a rate while the seeded editions are in force,
    /// and none outside them.
    #[test]
    fn seeded_editions_cover_every_combination(
        task in task_type_strategy(),
        tier in qualification_strategy(),
        date in seeded_date_strategy(),
        repeat in any::<bool>(),
    ) {
        let resolver = RateResolver::new(catalog(), RateRules::default());
        prop_assert!(resolver.resolve(task, tier, date, repeat).is_ok());

        let before = CalendarDate::from_ymd(2024, 6, 30).expect("valid date");
        prop_assert!(resolver.resolve(task, tier, before, repeat).is_err());
        let after = CalendarDate::from_ymd(2026, 7, 1).expect("valid date");
        prop_assert!(resolver.resolve(task, tier, after, repeat).is_err());
    }

    /// Standard tier tutors are never paid at a rate reserved for PhD holders.
    #[test]
    fn standard_tier_never_gets_a_phd_code(
        task in task_type_strategy(),
        date in seeded_date_strategy(),
        repeat in any::<bool>(),
    ) {
        let catalog = catalog();
        let resolver = RateResolver::new(&catalog, RateRules::default());
        let quote = resolver.resolve(task, Qualification::Standard, date, repeat);
        prop_assert!(quote.is_ok());
        if let Ok(quote) = quote {
            let code = catalog
                .rate_codes()
                .iter()
                .find(|c| c.code == quote.rate_code)
                .expect("quote points at a rate code");
            prop_assert!(!code.requires_phd);
        }
    }

    /// The 2025-26 edition never pays less than 2024-25 for the same work.
    #[test]
    fn later_edition_never_pays_less(
        task in task_type_strategy(),
        tier in qualification_strategy(),
        repeat in any::<bool>(),
        earlier in 0u64..365,
        later in 0u64..365,
    ) {
        let resolver = RateResolver::new(catalog(), RateRules::default());
        let first_year = NaiveDate::from_ymd_opt(2024, 7, 1).expect("valid date");
        let second_year = NaiveDate::from_ymd_opt(2025, 7, 1).expect("valid date");

        let old = resolver.resolve(task, tier, (first_year + Days::new(earlier)).into(), repeat);
        let new = resolver.resolve(task, tier, (second_year + Days::new(later)).into(), repeat);
        prop_assert!(old.is_ok() && new.is_ok());
        if let (Ok(old), Ok(new)) = (old, new) {
            prop_assert_eq!(&old.rate_code, &new.rate_code);
            prop_assert!(new.hourly_rate >= old.hourly_rate);
        }
    }
}

#[test]
fn seeded_windows_never_overlap_for_a_series() {
    let catalog = catalog();
    let rows = catalog.rate_amounts();
    for (i, a) in rows.iter().enumerate() {
        for b in &rows[i + 1..] {
            if a.rate_code == b.rate_code && a.qualification == b.qualification {
                assert!(
                    !a.window.overlaps(&b.window),
                    "{} rows {} and {} overlap",
                    a.rate_code,
                    a.id,
                    b.id
                );
            }
        }
    }
}

#[test]
fn seeded_policy_versions_never_overlap() {
    let catalog = catalog();
    let versions = catalog.policy_versions();
    assert_eq!(versions.len(), 2);
    assert!(!versions[0].window.overlaps(&versions[1].window));
}
