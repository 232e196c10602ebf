//! Versioned pay policy: policy editions, rate codes and dated rate amounts.
//!
//! Rows are append-only. A correction to a rate is a new row with a later
//! effective date, never an edit of an existing one, so any past timesheet
//! can be repriced exactly as it was.
use crate::error::{CatalogError, StoreError};
use crate::money::{Hours, Money};
use crate::types::{CalendarDate, Qualification, TaskType};

/// Half-open `[from, to)` range of days. `to == None` is open ended.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveWindow {
    #[n(0)]
    pub from: CalendarDate,
    #[n(1)]
    pub to: Option<CalendarDate>,
}

impl EffectiveWindow {
    pub fn new(from: CalendarDate, to: Option<CalendarDate>) -> Result<Self, CatalogError> {
        if let Some(to) = to
            && to <= from
        {
            return Err(CatalogError::EmptyWindow { from, to });
        }
        Ok(Self { from, to })
    }
    pub fn open_ended(from: CalendarDate) -> Self {
        Self { from, to: None }
    }
    pub fn contains(&self, date: CalendarDate) -> bool {
        date >= self.from && self.to.is_none_or(|to| date < to)
    }
    pub fn overlaps(&self, other: &EffectiveWindow) -> bool {
        let starts_before_other_ends = other.to.is_none_or(|to| self.from < to);
        let other_starts_before_end = self.to.is_none_or(|to| other.from < to);
        starts_before_other_ends && other_starts_before_end
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct PolicyVersion {
    #[n(0)]
    pub agreement_reference: String,
    #[n(1)]
    pub major: u32,
    #[n(2)]
    pub minor: u32,
    #[n(3)]
    pub window: EffectiveWindow,
    #[n(4)]
    pub source_document: Option<String>,
    #[n(5)]
    pub notes: Option<String>,
}

impl PolicyVersion {
    pub fn new(agreement_reference: &str, major: u32, minor: u32, window: EffectiveWindow) -> Self {
        Self {
            agreement_reference: agreement_reference.to_owned(),
            major,
            minor,
            window,
            source_document: None,
            notes: None,
        }
    }
    pub fn key(&self) -> String {
        format!("{}:{}.{}", self.agreement_reference, self.major, self.minor)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct RateCode {
    #[n(0)]
    pub code: String,
    #[n(1)]
    pub task_type: TaskType,
    #[n(2)]
    pub description: String,
    #[n(3)]
    pub default_associated_hours: Hours,
    #[n(4)]
    pub default_delivery_hours: Hours,
    #[n(5)]
    pub requires_phd: bool,
    #[n(6)]
    pub is_repeatable: bool,
    #[n(7)]
    pub clause_reference: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct RateAmount {
    // assigned by the catalog on insert
    #[n(0)]
    pub id: u64,
    #[n(1)]
    pub rate_code: String,
    #[n(2)]
    pub policy_version: String,
    #[n(3)]
    pub year_label: String,
    #[n(4)]
    pub window: EffectiveWindow,
    #[n(5)]
    pub hourly_amount: Money,
    #[n(6)]
    pub max_associated_hours: Hours,
    /// Zero means the payable hours are not capped.
    #[n(7)]
    pub max_payable_hours: Hours,
    /// `None` applies to every tier.
    #[n(8)]
    pub qualification: Option<Qualification>,
    #[n(9)]
    pub notes: Option<String>,
}

/// Read access to rate data, served from memory or from the store.
pub trait RateSource {
    fn rate_codes_for(&self, task_type: TaskType) -> Result<Vec<RateCode>, StoreError>;
    fn rate_amounts_for(
        &self,
        rate_code: &str,
        on: CalendarDate,
    ) -> Result<Vec<RateAmount>, StoreError>;
    fn policy_version(&self, key: &str) -> Result<Option<PolicyVersion>, StoreError>;
}

impl<S: RateSource + ?Sized> RateSource for &S {
    fn rate_codes_for(&self, task_type: TaskType) -> Result<Vec<RateCode>, StoreError> {
        (**self).rate_codes_for(task_type)
    }
    fn rate_amounts_for(
        &self,
        rate_code: &str,
        on: CalendarDate,
    ) -> Result<Vec<RateAmount>, StoreError> {
        (**self).rate_amounts_for(rate_code, on)
    }
    fn policy_version(&self, key: &str) -> Result<Option<PolicyVersion>, StoreError> {
        (**self).policy_version(key)
    }
}

/// In-memory catalog. Every insert is validated against what is already
/// present so the catalog can never hold overlapping windows.
#[derive(Debug, Clone, Default)]
pub struct RateCatalog {
    policy_versions: Vec<PolicyVersion>,
    rate_codes: Vec<RateCode>,
    rate_amounts: Vec<RateAmount>,
}

impl RateCatalog {
    pub fn new() -> Self {
        Self::default()
    }
    /// Rebuilds a catalog from rows that were validated when first stored.
    pub fn from_parts(
        policy_versions: Vec<PolicyVersion>,
        rate_codes: Vec<RateCode>,
        rate_amounts: Vec<RateAmount>,
    ) -> Self {
        Self {
            policy_versions,
            rate_codes,
            rate_amounts,
        }
    }
    pub fn policy_versions(&self) -> &[PolicyVersion] {
        &self.policy_versions
    }
    pub fn rate_codes(&self) -> &[RateCode] {
        &self.rate_codes
    }
    pub fn rate_amounts(&self) -> &[RateAmount] {
        &self.rate_amounts
    }

    pub fn add_policy_version(&mut self, version: PolicyVersion) -> Result<(), CatalogError> {
        EffectiveWindow::new(version.window.from, version.window.to)?;
        let clash = self.policy_versions.iter().any(|existing| {
            existing.agreement_reference == version.agreement_reference
                && existing.window.overlaps(&version.window)
        });
        if clash {
            return Err(CatalogError::OverlappingWindow {
                subject: version.agreement_reference.clone(),
                from: version.window.from,
            });
        }
        self.policy_versions.push(version);
        Ok(())
    }

    pub fn add_rate_code(&mut self, code: RateCode) -> Result<(), CatalogError> {
        if self.rate_codes.iter().any(|c| c.code == code.code) {
            return Err(CatalogError::DuplicateRateCode(code.code));
        }
        self.rate_codes.push(code);
        Ok(())
    }

    /// Validates and appends the row, returning the id it was given.
    pub fn add_rate_amount(&mut self, mut amount: RateAmount) -> Result<u64, CatalogError> {
        EffectiveWindow::new(amount.window.from, amount.window.to)?;
        if amount.hourly_amount.is_zero() {
            return Err(CatalogError::NonPositiveAmount(amount.rate_code));
        }
        if !self.rate_codes.iter().any(|c| c.code == amount.rate_code) {
            return Err(CatalogError::UnknownRateCode(amount.rate_code));
        }
        if !self
            .policy_versions
            .iter()
            .any(|v| v.key() == amount.policy_version)
        {
            return Err(CatalogError::UnknownPolicyVersion(amount.policy_version));
        }
        let clash = self.rate_amounts.iter().any(|existing| {
            existing.rate_code == amount.rate_code
                && existing.qualification == amount.qualification
                && existing.window.overlaps(&amount.window)
        });
        if clash {
            let tier = amount.qualification.map_or("ANY", |q| q.as_str());
            return Err(CatalogError::OverlappingWindow {
                subject: format!("{}/{}", amount.rate_code, tier),
                from: amount.window.from,
            });
        }
        amount.id = self.rate_amounts.iter().map(|a| a.id + 1).max().unwrap_or(1);
        let id = amount.id;
        self.rate_amounts.push(amount);
        Ok(id)
    }

    /// Copies the rows of `other` that are not already present into this
    /// catalog, applying the same checks as the individual inserts.
    ///
    /// Rows identical to stored ones are skipped, so a new dated row can be
    /// shipped together with the code it prices.
    /// A code stored with a different definition is refused. Returns the rows
    /// that were actually added, with their assigned ids.
    pub fn merge(&mut self, other: &RateCatalog) -> Result<RateCatalog, CatalogError> {
        let mut added = RateCatalog::new();
        for version in &other.policy_versions {
            if self.policy_versions.contains(version) {
                continue;
            }
            self.add_policy_version(version.clone())?;
            added.policy_versions.push(version.clone());
        }
        for code in &other.rate_codes {
            match self.rate_codes.iter().find(|c| c.code == code.code) {
                Some(existing) if existing == code => continue,
                Some(_) => return Err(CatalogError::ConflictingRateCode(code.code.clone())),
                None => {
                    self.add_rate_code(code.clone())?;
                    added.rate_codes.push(code.clone());
                }
            }
        }
        for amount in &other.rate_amounts {
            // ids are assigned on insert, so compare everything else
            let present = self.rate_amounts.iter().any(|existing| {
                *existing == RateAmount { id: existing.id, ..amount.clone() }
            });
            if present {
                continue;
            }
            let id = self.add_rate_amount(amount.clone())?;
            added.rate_amounts.push(RateAmount {
                id,
                ..amount.clone()
            });
        }
        Ok(added)
    }
}

impl RateSource for RateCatalog {
    fn rate_codes_for(&self, task_type: TaskType) -> Result<Vec<RateCode>, StoreError> {
        Ok(self
            .rate_codes
            .iter()
            .filter(|c| c.task_type == task_type)
            .cloned()
            .collect())
    }
    fn rate_amounts_for(
        &self,
        rate_code: &str,
        on: CalendarDate,
    ) -> Result<Vec<RateAmount>, StoreError> {
        Ok(self
            .rate_amounts
            .iter()
            .filter(|a| a.rate_code == rate_code && a.window.contains(on))
            .cloned()
            .collect())
    }
    fn policy_version(&self, key: &str) -> Result<Option<PolicyVersion>, StoreError> {
        Ok(self.policy_versions.iter().find(|v| v.key() == key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> CalendarDate {
        CalendarDate::from_ymd(y, m, d).unwrap()
    }

    #[test]
    fn window_is_half_open() {
        let w = EffectiveWindow::new(day(2024, 7, 1), Some(day(2025, 7, 1))).unwrap();
        assert!(w.contains(day(2024, 7, 1)));
        assert!(w.contains(day(2025, 6, 30)));
        assert!(!w.contains(day(2025, 7, 1)));
        assert!(!w.contains(day(2024, 6, 30)));
    }

    #[test]
    fn adjacent_windows_do_not_overlap() {
        let a = EffectiveWindow::new(day(2024, 7, 1), Some(day(2025, 7, 1))).unwrap();
        let b = EffectiveWindow::open_ended(day(2025, 7, 1));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
        let c = EffectiveWindow::open_ended(day(2025, 6, 30));
        assert!(a.overlaps(&c));
    }

    #[test]
    fn empty_window_is_rejected() {
        assert!(EffectiveWindow::new(day(2024, 7, 1), Some(day(2024, 7, 1))).is_err());
    }

    #[test]
    fn overlapping_amounts_for_same_tier_are_rejected() {
        let mut catalog = RateCatalog::new();
        let version = PolicyVersion::new("EA", 1, 0, EffectiveWindow::open_ended(day(2024, 1, 1)));
        let key = version.key();
        catalog.add_policy_version(version).unwrap();
        catalog
            .add_rate_code(RateCode {
                code: "M05".into(),
                task_type: TaskType::Marking,
                description: "Marking".into(),
                default_associated_hours: Hours::ZERO,
                default_delivery_hours: Hours::ZERO,
                requires_phd: false,
                is_repeatable: false,
                clause_reference: "Schedule 1 - Marking".into(),
            })
            .unwrap();
        let row = RateAmount {
            id: 0,
            rate_code: "M05".into(),
            policy_version: key,
            year_label: "2024".into(),
            window: EffectiveWindow::open_ended(day(2024, 1, 1)),
            hourly_amount: Money::parse("58.32").unwrap(),
            max_associated_hours: Hours::ZERO,
            max_payable_hours: Hours::ZERO,
            qualification: Some(Qualification::Standard),
            notes: None,
        };
        let first = catalog.add_rate_amount(row.clone()).unwrap();
        assert_eq!(first, 1);
        assert!(matches!(
            catalog.add_rate_amount(row.clone()),
            Err(CatalogError::OverlappingWindow { .. })
        ));

        // a different tier is a separate series
        let phd = RateAmount {
            qualification: Some(Qualification::Phd),
            ..row
        };
        assert_eq!(catalog.add_rate_amount(phd).unwrap(), 2);
    }

    fn tutorial_code() -> RateCode {
        RateCode {
            code: "TU2".into(),
            task_type: TaskType::Tutorial,
            description: "Tutorial".into(),
            default_associated_hours: Hours::parse("2").unwrap(),
            default_delivery_hours: Hours::parse("1").unwrap(),
            requires_phd: false,
            is_repeatable: false,
            clause_reference: "Schedule 1 Clause 2.1".into(),
        }
    }

    fn edition(major: u32, from: CalendarDate, to: Option<CalendarDate>) -> PolicyVersion {
        PolicyVersion::new("EA", major, 0, EffectiveWindow::new(from, to).unwrap())
    }

    fn tutorial_row(version: &PolicyVersion, rate: &str) -> RateAmount {
        RateAmount {
            id: 0,
            rate_code: "TU2".into(),
            policy_version: version.key(),
            year_label: version.major.to_string(),
            window: version.window,
            hourly_amount: Money::parse(rate).unwrap(),
            max_associated_hours: Hours::parse("2").unwrap(),
            max_payable_hours: Hours::parse("3").unwrap(),
            qualification: Some(Qualification::Standard),
            notes: None,
        }
    }

    #[test]
    fn merge_adds_a_new_edition_for_a_known_code() {
        let first = edition(1, day(2024, 7, 1), Some(day(2025, 7, 1)));
        let mut stored = RateCatalog::new();
        stored.add_policy_version(first.clone()).unwrap();
        stored.add_rate_code(tutorial_code()).unwrap();
        stored.add_rate_amount(tutorial_row(&first, "58.65")).unwrap();

        let second = edition(2, day(2025, 7, 1), None);
        let mut update = RateCatalog::new();
        update.add_policy_version(first.clone()).unwrap();
        update.add_policy_version(second.clone()).unwrap();
        update.add_rate_code(tutorial_code()).unwrap();
        update.add_rate_amount(tutorial_row(&second, "60.41")).unwrap();

        let added = stored.merge(&update).unwrap();
        assert_eq!(added.policy_versions(), &[second]);
        assert!(added.rate_codes().is_empty());
        assert_eq!(added.rate_amounts().len(), 1);
        assert_eq!(added.rate_amounts()[0].id, 2);
        assert_eq!(stored.rate_amounts().len(), 2);
    }

    #[test]
    fn merging_the_same_rows_twice_adds_nothing() {
        let first = edition(1, day(2024, 7, 1), Some(day(2025, 7, 1)));
        let mut update = RateCatalog::new();
        update.add_policy_version(first.clone()).unwrap();
        update.add_rate_code(tutorial_code()).unwrap();
        update.add_rate_amount(tutorial_row(&first, "58.65")).unwrap();

        let mut stored = RateCatalog::new();
        assert_eq!(stored.merge(&update).unwrap().rate_amounts().len(), 1);
        let again = stored.merge(&update).unwrap();
        assert!(again.policy_versions().is_empty());
        assert!(again.rate_amounts().is_empty());
        assert_eq!(stored.rate_amounts().len(), 1);
    }

    #[test]
    fn merge_refuses_a_redefined_code() {
        let mut stored = RateCatalog::new();
        stored.add_rate_code(tutorial_code()).unwrap();

        let mut update = RateCatalog::new();
        update
            .add_rate_code(RateCode {
                requires_phd: true,
                ..tutorial_code()
            })
            .unwrap();

        assert_eq!(
            stored.merge(&update).unwrap_err(),
            CatalogError::ConflictingRateCode("TU2".into())
        );
    }
}
