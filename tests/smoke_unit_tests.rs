//! Smoke Screen Unit tests for the timesheet approval components
//!
//! These are unit tests that span the codebase, testing behavior in
//! isolation from integration scenarios. They are intended as a smoke screen
//! and mostly test the happy path.

use chrono::{Datelike, Utc};
use timesheet_approval::{
    calculator::PayCalculator,
    config::{Config, PayRules, RateRules},
    events::{DomainEvent, EventBus},
    money::{Hours, Money},
    resolver::RateResolver,
    seed,
    types::{CalendarDate, Qualification, Role, TaskType, TimeStamp, TimesheetId, UserId},
    utils::new_uuid_to_bech32,
    workflow::{ApprovalAction, ApprovalStatus},
};

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// new_uuid_to_bech32 produces a bech32 string under the given prefix
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let encoded = new_uuid_to_bech32("tsht_").unwrap();
        assert!(encoded.starts_with("tsht_1"));
        assert!(encoded.len() > 10);
    }

    #[test]
    fn handles_empty_hrp() {
        assert!(new_uuid_to_bech32("").is_err());
    }

    /// Generated identifiers never repeat and carry their entity prefix
    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = TimesheetId::generate().unwrap();
        let b = TimesheetId::generate().unwrap();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("tsht_"));
        assert!(UserId::generate().unwrap().as_str().starts_with("user_"));
    }
}

// TYPES MODULE TESTS
#[cfg(test)]
mod types_tests {
    use super::*;

    /// TimeStamp::new() is close to the current time
    #[test]
    fn timestamp_new_creates_current_time() {
        let ts = TimeStamp::new();
        let diff = (Utc::now() - ts.to_datetime_utc()).num_seconds().abs();
        assert!(diff < 1);
    }

    #[test]
    fn timestamp_cbor_roundtrip() {
        let original = TimeStamp::new();
        let encoded = minicbor::to_vec(&original).unwrap();
        let decoded: TimeStamp<Utc> = minicbor::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn calendar_dates_parse_iso_format() {
        let date: CalendarDate = "2025-07-01".parse().unwrap();
        assert_eq!(date.date().year(), 2025);
        assert_eq!(date.to_string(), "2025-07-01");
        assert!("01/07/2025".parse::<CalendarDate>().is_err());
    }

    /// Enum wire names parse back to the same variant
    #[test]
    fn enum_names_parse() {
        assert_eq!("TUTORIAL".parse::<TaskType>().unwrap(), TaskType::Tutorial);
        assert_eq!("PHD".parse::<Qualification>().unwrap(), Qualification::Phd);
        assert_eq!("HR".parse::<Role>().unwrap(), Role::Hr);
        assert_eq!(
            "MODIFICATION_REQUESTED".parse::<ApprovalStatus>().unwrap(),
            ApprovalStatus::ModificationRequested
        );
        assert_eq!(ApprovalAction::HrConfirm.to_string(), "HR_CONFIRM");
        assert!("APPROVE".parse::<ApprovalAction>().is_err());
    }
}

// MONEY MODULE TESTS
#[cfg(test)]
mod money_tests {
    use super::*;

    #[test]
    fn money_rounds_half_up_to_cents() {
        assert_eq!(Money::parse("87.975").unwrap(), Money::parse("87.98").unwrap());
        assert_eq!(Money::parse("10").unwrap().to_string(), "$10.00");
        assert!(Money::parse("-1").is_err());
        assert!(Money::parse("ten").is_err());
    }

    #[test]
    fn hours_display_with_one_decimal_place() {
        assert_eq!(Hours::parse("2").unwrap().to_string(), "2.0h");
        assert_eq!(Hours::parse("1.50").unwrap().to_string(), "1.5h");
        assert!(Hours::parse("-0.5").is_err());
    }
}

// PRICING TESTS
#[cfg(test)]
mod pricing_tests {
    use super::*;

    /// A standard tutorial in 2024-25 pays one hour at the TU2 rate
    #[test]
    fn seeded_tutorial_is_priced() {
        let resolver = RateResolver::new(seed::schedule_one().unwrap(), RateRules::default());
        let quote = resolver
            .resolve(
                TaskType::Tutorial,
                Qualification::Standard,
                CalendarDate::from_ymd(2024, 9, 2).unwrap(),
                false,
            )
            .unwrap();
        let pay = PayCalculator::new(PayRules::default())
            .calculate_hours(Hours::parse("1").unwrap(), Hours::ZERO, &quote)
            .unwrap();
        assert_eq!(pay.rate_code, "TU2");
        assert_eq!(pay.amount, Money::parse("58.65").unwrap());
        assert!(pay.formula.ends_with("AUD"));
    }

    /// Marking has no cap on payable hours
    #[test]
    fn marking_is_paid_for_every_hour() {
        let resolver = RateResolver::new(seed::schedule_one().unwrap(), RateRules::default());
        let quote = resolver
            .resolve(
                TaskType::Marking,
                Qualification::Standard,
                CalendarDate::from_ymd(2024, 11, 4).unwrap(),
                false,
            )
            .unwrap();
        let pay = PayCalculator::new(PayRules::default())
            .calculate_hours(Hours::parse("10").unwrap(), Hours::ZERO, &quote)
            .unwrap();
        assert_eq!(pay.payable_hours, Hours::parse("10").unwrap());
        assert_eq!(pay.amount, Money::parse("583.20").unwrap());
    }
}

// CONFIG AND EVENTS TESTS
#[cfg(test)]
mod ambient_tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pay.currency, "AUD");
        assert_eq!(config.events.capacity, 1024);
    }

    #[test]
    fn zero_capacity_is_refused() {
        assert!(Config::from_json(r#"{ "events": { "capacity": 0 } }"#).is_err());
    }

    #[test]
    fn events_reach_every_subscriber() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        bus.publish(DomainEvent::UserRegistered {
            user_id: UserId::from("user_smoke"),
            role: Role::Tutor,
        });
        assert_eq!(first.try_recv().unwrap().event.name(), "user.registered");
        assert_eq!(second.try_recv().unwrap().event.name(), "user.registered");
    }
}
