//! Timesheet entity and the builders used to create and amend it.
use chrono::Utc;
use rust_decimal::Decimal;

use crate::config::ValidationLimits;
use crate::error::{ValidationError, WorkflowError};
use crate::money::{Hours, Money};
use crate::types::{CalendarDate, CourseId, Qualification, TaskType, TimeStamp, TimesheetId, UserId};
use crate::workflow::ApprovalStatus;

/// One claimed teaching session. The pay fields (`calculated_amount` through
/// `clause_reference`) are derived and only written by the pay calculator.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Timesheet {
    #[n(0)]
    pub id: TimesheetId,
    // the tutor being paid
    #[n(1)]
    pub tutor_id: UserId,
    #[n(2)]
    pub course_id: CourseId,
    #[n(3)]
    pub session_date: CalendarDate,
    #[n(4)]
    pub delivery_hours: Hours,
    #[n(5)]
    pub associated_hours: Hours,
    #[n(6)]
    pub task_type: TaskType,
    #[n(7)]
    pub qualification: Qualification,
    #[n(8)]
    pub is_repeat: bool,
    #[n(9)]
    pub description: String,
    #[n(10)]
    pub status: ApprovalStatus,
    #[n(11)]
    pub calculated_amount: Money,
    #[n(12)]
    pub hourly_rate: Money,
    #[n(13)]
    pub payable_hours: Hours,
    #[n(14)]
    pub rate_code: String,
    #[n(15)]
    pub calculation_formula: String,
    #[n(16)]
    pub clause_reference: String,
    #[n(17)]
    pub created_by: UserId,
    #[n(18)]
    pub created_at: TimeStamp<Utc>,
    #[n(19)]
    pub updated_at: TimeStamp<Utc>,
    /// Bumped on every save, used for optimistic concurrency.
    #[n(20)]
    pub version: u64,
}

impl Timesheet {
    pub fn validate(&self, limits: &ValidationLimits) -> Result<(), ValidationError> {
        check_hours("delivery hours", self.delivery_hours, limits.max_delivery_hours)?;
        check_hours(
            "associated hours",
            self.associated_hours,
            limits.max_associated_hours,
        )?;
        if self.delivery_hours.is_zero() && self.associated_hours.is_zero() {
            return Err(ValidationError::NoHoursClaimed);
        }
        check_description(&self.description, limits.max_description_length)
    }

    pub fn touch(&mut self) {
        self.updated_at = TimeStamp::new();
    }
}

fn check_hours(field: &'static str, hours: Hours, max: Decimal) -> Result<(), ValidationError> {
    if hours.value() > max {
        return Err(ValidationError::HoursAboveLimit {
            field,
            value: hours.value(),
            max,
        });
    }
    Ok(())
}

fn check_description(description: &str, max: usize) -> Result<(), ValidationError> {
    if description.trim().is_empty() {
        return Err(ValidationError::BlankDescription);
    }
    let len = description.chars().count();
    if len > max {
        return Err(ValidationError::DescriptionTooLong { len, max });
    }
    Ok(())
}

/// Builder for a new timesheet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TimesheetDraft {
    tutor_id: Option<UserId>,
    course_id: Option<CourseId>,
    session_date: Option<CalendarDate>,
    delivery_hours: Option<Hours>,
    associated_hours: Hours,
    task_type: Option<TaskType>,
    qualification: Option<Qualification>,
    is_repeat: bool,
    description: Option<String>,
}

impl TimesheetDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_tutor(mut self, tutor_id: UserId) -> Self {
        self.tutor_id = Some(tutor_id);
        self
    }
    pub fn set_course(mut self, course_id: CourseId) -> Self {
        self.course_id = Some(course_id);
        self
    }
    pub fn set_session_date(mut self, date: CalendarDate) -> Self {
        self.session_date = Some(date);
        self
    }
    pub fn set_delivery_hours(mut self, hours: Hours) -> Self {
        self.delivery_hours = Some(hours);
        self
    }
    pub fn set_associated_hours(mut self, hours: Hours) -> Self {
        self.associated_hours = hours;
        self
    }
    pub fn set_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }
    pub fn set_qualification(mut self, qualification: Qualification) -> Self {
        self.qualification = Some(qualification);
        self
    }
    pub fn set_repeat(mut self, is_repeat: bool) -> Self {
        self.is_repeat = is_repeat;
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }

    pub fn tutor_id(&self) -> Option<&UserId> {
        self.tutor_id.as_ref()
    }
    pub fn course_id(&self) -> Option<&CourseId> {
        self.course_id.as_ref()
    }

    /// Checks every field is present and valid and produces a DRAFT
    /// timesheet with no pay computed yet.
    pub fn finalise(
        self,
        created_by: UserId,
        limits: &ValidationLimits,
    ) -> Result<Timesheet, WorkflowError> {
        let now = TimeStamp::new();
        let timesheet = Timesheet {
            id: TimesheetId::generate()?,
            tutor_id: self.tutor_id.ok_or(ValidationError::MissingField("tutor"))?,
            course_id: self.course_id.ok_or(ValidationError::MissingField("course"))?,
            session_date: self
                .session_date
                .ok_or(ValidationError::MissingField("session date"))?,
            delivery_hours: self
                .delivery_hours
                .ok_or(ValidationError::MissingField("delivery hours"))?,
            associated_hours: self.associated_hours,
            task_type: self
                .task_type
                .ok_or(ValidationError::MissingField("task type"))?,
            qualification: self
                .qualification
                .ok_or(ValidationError::MissingField("qualification"))?,
            is_repeat: self.is_repeat,
            description: self
                .description
                .ok_or(ValidationError::MissingField("description"))?,
            status: ApprovalStatus::Draft,
            calculated_amount: Money::ZERO,
            hourly_rate: Money::ZERO,
            payable_hours: Hours::ZERO,
            rate_code: String::new(),
            calculation_formula: String::new(),
            clause_reference: String::new(),
            created_by,
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        };
        timesheet.validate(limits)?;
        Ok(timesheet)
    }
}

/// Changes to apply to an editable timesheet. Unset fields are left alone.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TimesheetPatch {
    session_date: Option<CalendarDate>,
    delivery_hours: Option<Hours>,
    associated_hours: Option<Hours>,
    task_type: Option<TaskType>,
    qualification: Option<Qualification>,
    is_repeat: Option<bool>,
    description: Option<String>,
}

impl TimesheetPatch {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_session_date(mut self, date: CalendarDate) -> Self {
        self.session_date = Some(date);
        self
    }
    pub fn set_delivery_hours(mut self, hours: Hours) -> Self {
        self.delivery_hours = Some(hours);
        self
    }
    pub fn set_associated_hours(mut self, hours: Hours) -> Self {
        self.associated_hours = Some(hours);
        self
    }
    pub fn set_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }
    pub fn set_qualification(mut self, qualification: Qualification) -> Self {
        self.qualification = Some(qualification);
        self
    }
    pub fn set_repeat(mut self, is_repeat: bool) -> Self {
        self.is_repeat = Some(is_repeat);
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_owned());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the patch and reports whether any field that feeds the pay
    /// calculation actually changed.
    pub fn apply(&self, timesheet: &mut Timesheet) -> bool {
        let mut pay_changed = false;

        fn set<T: PartialEq + Clone>(field: &mut T, value: &Option<T>, changed: &mut bool) {
            if let Some(v) = value
                && field != v
            {
                *field = v.clone();
                *changed = true;
            }
        }

        set(&mut timesheet.session_date, &self.session_date, &mut pay_changed);
        set(&mut timesheet.delivery_hours, &self.delivery_hours, &mut pay_changed);
        set(&mut timesheet.associated_hours, &self.associated_hours, &mut pay_changed);
        set(&mut timesheet.task_type, &self.task_type, &mut pay_changed);
        set(&mut timesheet.qualification, &self.qualification, &mut pay_changed);
        set(&mut timesheet.is_repeat, &self.is_repeat, &mut pay_changed);

        if let Some(description) = &self.description {
            timesheet.description = description.clone();
        }

        pay_changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> TimesheetDraft {
        TimesheetDraft::new()
            .set_tutor(UserId::from("user_tutor"))
            .set_course(CourseId::from("course_comp1511"))
            .set_session_date(CalendarDate::from_ymd(2025, 7, 7).unwrap())
            .set_delivery_hours(Hours::parse("1.0").unwrap())
            .set_task_type(TaskType::Tutorial)
            .set_qualification(Qualification::Standard)
            .set_description("Week 1 tutorial")
    }

    #[test]
    fn finalised_draft_starts_in_draft() {
        let ts = draft()
            .finalise(UserId::from("user_lecturer"), &ValidationLimits::default())
            .unwrap();
        assert_eq!(ts.status, ApprovalStatus::Draft);
        assert_eq!(ts.version, 1);
        assert!(ts.calculated_amount.is_zero());
    }

    #[test]
    fn missing_fields_are_reported() {
        let err = TimesheetDraft::new()
            .set_tutor(UserId::from("user_tutor"))
            .finalise(UserId::from("user_lecturer"), &ValidationLimits::default())
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation(ValidationError::MissingField("course"))
        ));
    }

    #[test]
    fn hours_above_the_limit_are_rejected() {
        let err = draft()
            .set_delivery_hours(Hours::parse("38.5").unwrap())
            .finalise(UserId::from("user_lecturer"), &ValidationLimits::default())
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation(ValidationError::HoursAboveLimit { .. })
        ));
    }

    #[test]
    fn blank_description_is_rejected() {
        let err = draft()
            .set_description("   ")
            .finalise(UserId::from("user_lecturer"), &ValidationLimits::default())
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation(ValidationError::BlankDescription)
        ));
    }

    #[test]
    fn patch_reports_pay_changes_only() {
        let mut ts = draft()
            .finalise(UserId::from("user_lecturer"), &ValidationLimits::default())
            .unwrap();

        let description_only = TimesheetPatch::new().set_description("Week 1 tutorial, room change");
        assert!(!description_only.apply(&mut ts));
        assert_eq!(ts.description, "Week 1 tutorial, room change");

        let same_hours = TimesheetPatch::new().set_delivery_hours(Hours::parse("1").unwrap());
        assert!(!same_hours.apply(&mut ts));

        let more_hours = TimesheetPatch::new().set_delivery_hours(Hours::parse("2").unwrap());
        assert!(more_hours.apply(&mut ts));
    }

    #[test]
    fn timesheet_encoding() {
        let ts = draft()
            .finalise(UserId::from("user_lecturer"), &ValidationLimits::default())
            .unwrap();
        let encoding = minicbor::to_vec(&ts).unwrap();
        let decoded: Timesheet = minicbor::decode(&encoding).unwrap();
        assert_eq!(ts, decoded);
    }
}
