//! Pay computation from claimed hours and a resolved rate.
use crate::config::PayRules;
use crate::error::ValidationError;
use crate::money::{Hours, Money};
use crate::resolver::RateQuote;
use crate::timesheet::Timesheet;

/// Result of pricing a session. Everything needed to reproduce the figure
/// is kept so it can be persisted alongside the timesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayCalculation {
    pub amount: Money,
    pub hourly_rate: Money,
    pub payable_hours: Hours,
    pub rate_code: String,
    pub formula: String,
    pub clause_reference: String,
}

impl PayCalculation {
    /// Writes the derived pay fields onto the timesheet.
    pub fn apply_to(self, timesheet: &mut Timesheet) {
        timesheet.calculated_amount = self.amount;
        timesheet.hourly_rate = self.hourly_rate;
        timesheet.payable_hours = self.payable_hours;
        timesheet.rate_code = self.rate_code;
        timesheet.calculation_formula = self.formula;
        timesheet.clause_reference = self.clause_reference;
    }
}

pub struct PayCalculator {
    rules: PayRules,
}

impl PayCalculator {
    pub fn new(rules: PayRules) -> Self {
        Self { rules }
    }

    pub fn calculate(
        &self,
        timesheet: &Timesheet,
        quote: &RateQuote,
    ) -> Result<PayCalculation, ValidationError> {
        self.calculate_hours(timesheet.delivery_hours, timesheet.associated_hours, quote)
    }

    pub fn calculate_hours(
        &self,
        delivery: Hours,
        associated: Hours,
        quote: &RateQuote,
    ) -> Result<PayCalculation, ValidationError> {
        let claimed = delivery
            .checked_add(associated)
            .ok_or(ValidationError::Overflow)?;

        let capped = !quote.max_payable_hours.is_zero() && claimed > quote.max_payable_hours;
        let payable = if capped {
            quote.max_payable_hours
        } else {
            claimed
        };

        let amount = quote
            .hourly_rate
            .times(payable)
            .ok_or(ValidationError::Overflow)?;

        let cap = if capped {
            format!(", capped at {}", quote.max_payable_hours)
        } else {
            String::new()
        };
        let formula = format!(
            "({delivery} delivery + {associated} associated{cap}) = {payable} × {}/h = {amount} {}",
            quote.hourly_rate, self.rules.currency
        );

        let clause_reference = if quote.clause_reference.trim().is_empty() {
            self.rules.default_clause_reference.clone()
        } else {
            quote.clause_reference.clone()
        };

        Ok(PayCalculation {
            amount,
            hourly_rate: quote.hourly_rate,
            payable_hours: payable,
            rate_code: quote.rate_code.clone(),
            formula,
            clause_reference,
        })
    }
}
