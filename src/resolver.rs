//! Temporal rate resolution.
//!
//! Given a task type, pay tier, session date and repeat flag, pick the single
//! rate amount row that governs the session. A missing rate is an error;
//! there is no default price.
use tracing::debug;

use crate::catalog::{RateAmount, RateCode, RateSource};
use crate::config::RateRules;
use crate::error::RateError;
use crate::money::{Hours, Money};
use crate::types::{CalendarDate, Qualification, TaskType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateQuote {
    pub rate_code: String,
    pub task_type: TaskType,
    /// Tier of the matched row, `None` when a tier-agnostic row was used.
    pub qualification: Option<Qualification>,
    pub is_repeat: bool,
    pub hourly_rate: Money,
    pub max_associated_hours: Hours,
    pub max_payable_hours: Hours,
    pub clause_reference: String,
    pub effective_from: CalendarDate,
    pub policy_version: String,
    pub agreement_reference: Option<String>,
    pub year_label: String,
    pub rate_amount_id: u64,
}

pub struct RateResolver<S> {
    source: S,
    rules: RateRules,
}

impl<S: RateSource> RateResolver<S> {
    pub fn new(source: S, rules: RateRules) -> Self {
        Self { source, rules }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn resolve(
        &self,
        task_type: TaskType,
        qualification: Qualification,
        session_date: CalendarDate,
        is_repeat: bool,
    ) -> Result<RateQuote, RateError> {
        let not_found = || RateError::NotFound {
            task_type,
            qualification,
            date: session_date,
            repeat: is_repeat,
        };

        let codes = self.candidate_codes(task_type, qualification, is_repeat)?;

        let mut in_window: Vec<(RateAmount, &RateCode)> = Vec::new();
        for code in &codes {
            for amount in self.source.rate_amounts_for(&code.code, session_date)? {
                // sources filter by date already, this keeps the guarantee local
                if amount.window.contains(session_date) {
                    in_window.push((amount, code));
                }
            }
        }

        let tiered: Vec<_> = in_window
            .iter()
            .filter(|(a, _)| a.qualification == Some(qualification))
            .collect();
        let candidates = if !tiered.is_empty() || !self.rules.tier_agnostic_fallback {
            tiered
        } else {
            in_window
                .iter()
                .filter(|(a, _)| a.qualification.is_none())
                .collect()
        };

        let (amount, code) = candidates
            .into_iter()
            .max_by(|(a, ac), (b, bc)| {
                a.window
                    .from
                    .cmp(&b.window.from)
                    // reversed so the lowest code / id wins among equals
                    .then_with(|| bc.code.cmp(&ac.code))
                    .then_with(|| b.id.cmp(&a.id))
            })
            .ok_or_else(not_found)?;

        let agreement_reference = self
            .source
            .policy_version(&amount.policy_version)?
            .map(|v| v.agreement_reference);

        debug!(
            task_type = %task_type,
            qualification = %qualification,
            date = %session_date,
            repeat = is_repeat,
            rate_code = %code.code,
            rate = %amount.hourly_amount,
            "resolved rate"
        );

        Ok(RateQuote {
            rate_code: code.code.clone(),
            task_type,
            qualification: amount.qualification,
            is_repeat,
            hourly_rate: amount.hourly_amount,
            max_associated_hours: amount.max_associated_hours,
            max_payable_hours: amount.max_payable_hours,
            clause_reference: code.clause_reference.clone(),
            effective_from: amount.window.from,
            policy_version: amount.policy_version.clone(),
            agreement_reference,
            year_label: amount.year_label.clone(),
            rate_amount_id: amount.id,
        })
    }

    fn candidate_codes(
        &self,
        task_type: TaskType,
        qualification: Qualification,
        is_repeat: bool,
    ) -> Result<Vec<RateCode>, RateError> {
        let codes: Vec<RateCode> = self
            .source
            .rate_codes_for(task_type)?
            .into_iter()
            .filter(|c| !(c.requires_phd && qualification == Qualification::Standard))
            .collect();

        let (preferred, others): (Vec<_>, Vec<_>) = codes
            .into_iter()
            .partition(|c| c.is_repeatable == is_repeat);

        if !preferred.is_empty() {
            return Ok(preferred);
        }
        // a first delivery never borrows a repeat rate
        if is_repeat && self.rules.repeat_fallback {
            return Ok(others);
        }
        Ok(Vec::new())
    }
}
