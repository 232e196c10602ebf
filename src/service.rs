//! Service layer API for the timesheet workflow.
//!
//! Every mutation follows the same sequence: load the actor, timesheet and
//! course, authorize, check the state machine, apply, reprice when needed,
//! then persist the timesheet together with its approval record.
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::approval::Approval;
use crate::calculator::{PayCalculation, PayCalculator};
use crate::catalog::RateCatalog;
use crate::config::Config;
use crate::error::{ValidationError, WorkflowError};
use crate::events::{DomainEvent, EventBus, EventEnvelope};
use crate::money::Hours;
use crate::policy::{self, Operation, Queue};
use crate::resolver::{RateQuote, RateResolver};
use crate::seed;
use crate::store::SledStore;
use crate::timesheet::{Timesheet, TimesheetDraft, TimesheetPatch};
use crate::types::{CalendarDate, Course, CourseId, Qualification, Role, TaskType, TimesheetId, User, UserId};
use crate::workflow::{ApprovalAction, ApprovalStatus, next_status};

/// A committed transition: the timesheet as saved and the history record
/// written with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub timesheet: Timesheet,
    pub approval: Approval,
}

/// Inputs for pricing a session that has not been saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub task_type: TaskType,
    pub qualification: Qualification,
    pub session_date: CalendarDate,
    pub is_repeat: bool,
    pub delivery_hours: Hours,
    pub associated_hours: Hours,
}

/// Runs `attempt`, and once more when it lost a race with another writer.
/// A second conflict goes back to the caller.
fn retry_once<T>(
    timesheet_id: &TimesheetId,
    operation: &str,
    mut attempt: impl FnMut() -> Result<T, WorkflowError>,
) -> Result<T, WorkflowError> {
    match attempt() {
        Err(WorkflowError::ConcurrencyConflict { .. }) => {
            warn!(timesheet = %timesheet_id, operation, "concurrent write, retrying once");
            attempt()
        }
        other => other,
    }
}

pub struct TimesheetService {
    store: SledStore,
    resolver: RateResolver<SledStore>,
    calculator: PayCalculator,
    events: Arc<EventBus>,
    config: Config,
}

impl TimesheetService {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, WorkflowError> {
        Self::with_config(instance, Config::default())
    }

    pub fn with_config(instance: Arc<sled::Db>, config: Config) -> Result<Self, WorkflowError> {
        config.validate()?;
        let store = SledStore::open(instance)?;
        Ok(Self {
            resolver: RateResolver::new(store.clone(), config.rates.clone()),
            calculator: PayCalculator::new(config.pay.clone()),
            events: Arc::new(EventBus::new(config.events.capacity)),
            store,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SledStore {
        &self.store
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    fn load_user(&self, id: &UserId) -> Result<User, WorkflowError> {
        self.store.user(id)?.ok_or_else(|| WorkflowError::NotFound {
            entity: "user",
            id: id.to_string(),
        })
    }

    fn load_course(&self, id: &CourseId) -> Result<Course, WorkflowError> {
        self.store.course(id)?.ok_or_else(|| WorkflowError::NotFound {
            entity: "course",
            id: id.to_string(),
        })
    }

    fn load_timesheet(&self, id: &TimesheetId) -> Result<Timesheet, WorkflowError> {
        self.store.timesheet(id)?.ok_or_else(|| WorkflowError::NotFound {
            entity: "timesheet",
            id: id.to_string(),
        })
    }

    /// Actor, timesheet and the course it belongs to.
    fn load_context(
        &self,
        actor_id: &UserId,
        timesheet_id: &TimesheetId,
    ) -> Result<(User, Timesheet, Course), WorkflowError> {
        let actor = self.load_user(actor_id)?;
        let timesheet = self.load_timesheet(timesheet_id)?;
        let course = self.load_course(&timesheet.course_id)?;
        Ok((actor, timesheet, course))
    }

    fn denied(actor: &User, operation: Operation, timesheet: Option<&Timesheet>) -> WorkflowError {
        warn!(
            actor = %actor.id,
            role = %actor.role,
            operation = %operation,
            timesheet = timesheet.map_or("-", |t| t.id.as_str()),
            "authorization denied"
        );
        WorkflowError::AuthorizationDenied {
            actor: actor.id.clone(),
            role: actor.role,
            operation,
            timesheet: timesheet.map(|t| t.id.clone()),
            status: timesheet.map(|t| t.status),
        }
    }

    fn reprice(&self, timesheet: &mut Timesheet) -> Result<(), WorkflowError> {
        let quote = self.resolver.resolve(
            timesheet.task_type,
            timesheet.qualification,
            timesheet.session_date,
            timesheet.is_repeat,
        )?;
        self.calculator.calculate(timesheet, &quote)?.apply_to(timesheet);
        Ok(())
    }

    /// Adds a user. Identity management lives elsewhere; this only records
    /// who the workflow knows about.
    pub fn register_user(&self, user: &User) -> Result<(), WorkflowError> {
        self.store.put_user(user)?;
        info!(user = %user.id, role = %user.role, "user registered");
        self.events.publish(DomainEvent::UserRegistered {
            user_id: user.id.clone(),
            role: user.role,
        });
        Ok(())
    }

    pub fn create_course(
        &self,
        actor_id: &UserId,
        code: &str,
        name: &str,
        lecturer_id: &UserId,
    ) -> Result<Course, WorkflowError> {
        let actor = self.load_user(actor_id)?;
        if !(actor.is_active && actor.role == Role::Admin) {
            return Err(Self::denied(&actor, Operation::Administer, None));
        }
        let lecturer = self.load_user(lecturer_id)?;
        if lecturer.role != Role::Lecturer {
            return Err(ValidationError::WrongRole {
                expected: Role::Lecturer,
                actual: lecturer.role,
            }
            .into());
        }

        let course = Course::new(code, name, lecturer.id.clone())?;
        self.store.put_course(&course)?;
        info!(course = %course.id, code, lecturer = %lecturer.id, "course created");
        self.events.publish(DomainEvent::CourseCreated {
            course_id: course.id.clone(),
            code: course.code.clone(),
            lecturer_id: course.lecturer_id.clone(),
        });
        Ok(course)
    }

    /// Appends rate rows after checking them against what is already stored.
    /// Rows already present unchanged are skipped. Returns the number of rate
    /// amounts added.
    pub fn install_catalog(
        &self,
        actor_id: &UserId,
        catalog: &RateCatalog,
    ) -> Result<usize, WorkflowError> {
        let actor = self.load_user(actor_id)?;
        if !(actor.is_active && actor.role == Role::Admin) {
            return Err(Self::denied(&actor, Operation::Administer, None));
        }

        let mut merged = self.store.load_catalog()?;
        let added = merged.merge(catalog)?;
        self.store.append_catalog_rows(
            added.policy_versions(),
            added.rate_codes(),
            added.rate_amounts(),
        )?;
        info!(
            actor = %actor.id,
            policy_versions = added.policy_versions().len(),
            rate_codes = added.rate_codes().len(),
            rate_amounts = added.rate_amounts().len(),
            "rate catalog installed"
        );
        Ok(added.rate_amounts().len())
    }

    /// Installs the built-in Schedule 1 catalogue unless rates already exist.
    pub fn install_default_catalog(&self, actor_id: &UserId) -> Result<usize, WorkflowError> {
        if !self.store.load_catalog()?.rate_codes().is_empty() {
            return Ok(0);
        }
        self.install_catalog(actor_id, &seed::schedule_one()?)
    }

    pub fn resolve_rate(
        &self,
        task_type: TaskType,
        qualification: Qualification,
        session_date: CalendarDate,
        is_repeat: bool,
    ) -> Result<RateQuote, WorkflowError> {
        Ok(self
            .resolver
            .resolve(task_type, qualification, session_date, is_repeat)?)
    }

    /// Prices a session without saving anything.
    pub fn quote(
        &self,
        actor_id: &UserId,
        request: &QuoteRequest,
    ) -> Result<PayCalculation, WorkflowError> {
        let actor = self.load_user(actor_id)?;
        if !policy::can_create_timesheet(&actor) {
            return Err(Self::denied(&actor, Operation::Create, None));
        }
        let quote = self.resolve_rate(
            request.task_type,
            request.qualification,
            request.session_date,
            request.is_repeat,
        )?;
        Ok(self.calculator.calculate_hours(
            request.delivery_hours,
            request.associated_hours,
            &quote,
        )?)
    }

    /// Creates a DRAFT timesheet on behalf of the tutor named in the draft.
    pub fn create_timesheet(
        &self,
        actor_id: &UserId,
        draft: TimesheetDraft,
    ) -> Result<Timesheet, WorkflowError> {
        let actor = self.load_user(actor_id)?;
        if !policy::can_create_timesheet(&actor) {
            return Err(Self::denied(&actor, Operation::Create, None));
        }

        let tutor_id = draft.tutor_id().ok_or(ValidationError::MissingField("tutor"))?;
        let course_id = draft
            .course_id()
            .ok_or(ValidationError::MissingField("course"))?;
        let tutor = self.load_user(tutor_id)?;
        let course = self.load_course(course_id)?;
        if !policy::can_create_timesheet_for(&actor, &tutor, &course) {
            return Err(Self::denied(&actor, Operation::Create, None));
        }

        let mut timesheet = draft.finalise(actor.id.clone(), &self.config.validation)?;
        self.reprice(&mut timesheet)?;
        self.store.insert_timesheet(&timesheet)?;

        info!(
            timesheet = %timesheet.id,
            tutor = %timesheet.tutor_id,
            course = %course.code,
            amount = %timesheet.calculated_amount,
            rate_code = %timesheet.rate_code,
            "timesheet created"
        );
        self.events.publish(DomainEvent::TimesheetCreated {
            timesheet_id: timesheet.id.clone(),
            tutor_id: timesheet.tutor_id.clone(),
            course_id: timesheet.course_id.clone(),
            created_by: actor.id,
            amount: timesheet.calculated_amount,
        });
        Ok(timesheet)
    }

    /// Edits an editable timesheet. Pay is recomputed when any field feeding
    /// it changed. A concurrent write is retried once against a fresh read.
    pub fn update_timesheet(
        &self,
        actor_id: &UserId,
        timesheet_id: &TimesheetId,
        patch: &TimesheetPatch,
    ) -> Result<Timesheet, WorkflowError> {
        retry_once(timesheet_id, "update", || {
            self.try_update(actor_id, timesheet_id, patch)
        })
    }

    fn try_update(
        &self,
        actor_id: &UserId,
        timesheet_id: &TimesheetId,
        patch: &TimesheetPatch,
    ) -> Result<Timesheet, WorkflowError> {
        let (actor, mut timesheet, course) = self.load_context(actor_id, timesheet_id)?;
        if !policy::can_edit_timesheet(&actor, &timesheet, &course) {
            return Err(Self::denied(&actor, Operation::Edit, Some(&timesheet)));
        }
        if patch.is_empty() {
            return Ok(timesheet);
        }

        let expected = timesheet.version;
        let recalculated = patch.apply(&mut timesheet);
        timesheet.validate(&self.config.validation)?;
        if recalculated {
            self.reprice(&mut timesheet)?;
        }
        timesheet.version += 1;
        timesheet.touch();
        self.store.save_timesheet(&timesheet, expected)?;

        info!(
            timesheet = %timesheet.id,
            actor = %actor.id,
            recalculated,
            amount = %timesheet.calculated_amount,
            "timesheet updated"
        );
        self.events.publish(DomainEvent::TimesheetUpdated {
            timesheet_id: timesheet.id.clone(),
            updated_by: actor.id,
            amount: timesheet.calculated_amount,
            recalculated,
        });
        Ok(timesheet)
    }

    pub fn delete_timesheet(
        &self,
        actor_id: &UserId,
        timesheet_id: &TimesheetId,
    ) -> Result<(), WorkflowError> {
        let (actor, timesheet, course) = self.load_context(actor_id, timesheet_id)?;
        if !policy::can_delete_timesheet(&actor, &timesheet, &course) {
            return Err(Self::denied(&actor, Operation::Delete, Some(&timesheet)));
        }
        self.store.delete_timesheet(&timesheet.id, timesheet.version)?;

        info!(timesheet = %timesheet.id, actor = %actor.id, "timesheet deleted");
        self.events.publish(DomainEvent::TimesheetDeleted {
            timesheet_id: timesheet.id,
            deleted_by: actor.id,
        });
        Ok(())
    }

    /// Applies a workflow action. Retried once on a concurrent write.
    pub fn perform_action(
        &self,
        actor_id: &UserId,
        timesheet_id: &TimesheetId,
        action: ApprovalAction,
        comment: Option<&str>,
    ) -> Result<ActionOutcome, WorkflowError> {
        retry_once(timesheet_id, action.as_str(), || {
            self.try_perform(actor_id, timesheet_id, action, comment)
        })
    }

    fn try_perform(
        &self,
        actor_id: &UserId,
        timesheet_id: &TimesheetId,
        action: ApprovalAction,
        comment: Option<&str>,
    ) -> Result<ActionOutcome, WorkflowError> {
        let (actor, mut timesheet, course) = self.load_context(actor_id, timesheet_id)?;

        if !policy::can_perform_action(&actor, action, &timesheet, &course) {
            return Err(Self::denied(
                &actor,
                Operation::Perform(action),
                Some(&timesheet),
            ));
        }
        let previous_status = timesheet.status;
        let new_status =
            next_status(action, previous_status).ok_or(WorkflowError::InvalidTransition {
                timesheet: timesheet.id.clone(),
                action,
                status: previous_status,
            })?;

        let expected = timesheet.version;
        timesheet.status = new_status;
        timesheet.version += 1;
        timesheet.touch();
        // content is frozen once submitted, so price it against the catalog as it leaves editing
        if action == ApprovalAction::SubmitForApproval {
            self.reprice(&mut timesheet)?;
        }

        let previous = self.store.latest_approval(&timesheet.id)?;
        let approval = Approval::new(
            timesheet.id.clone(),
            timesheet.version,
            actor.id.clone(),
            action,
            previous_status,
            new_status,
            comment.map(str::to_owned),
            previous.as_ref(),
        )?;
        self.store.save_transition(&timesheet, expected, &approval)?;

        info!(
            timesheet = %timesheet.id,
            actor = %actor.id,
            role = %actor.role,
            %action,
            from = %previous_status,
            to = %new_status,
            "timesheet transitioned"
        );
        self.events.publish(DomainEvent::ApprovalProcessed {
            timesheet_id: timesheet.id.clone(),
            actor_id: actor.id,
            action,
            previous_status,
            new_status,
            comment: approval.comment.clone(),
        });
        Ok(ActionOutcome {
            timesheet,
            approval,
        })
    }

    pub fn submit_for_approval(
        &self,
        actor_id: &UserId,
        timesheet_id: &TimesheetId,
        comment: Option<&str>,
    ) -> Result<ActionOutcome, WorkflowError> {
        self.perform_action(actor_id, timesheet_id, ApprovalAction::SubmitForApproval, comment)
    }

    pub fn tutor_confirm(
        &self,
        actor_id: &UserId,
        timesheet_id: &TimesheetId,
        comment: Option<&str>,
    ) -> Result<ActionOutcome, WorkflowError> {
        self.perform_action(actor_id, timesheet_id, ApprovalAction::TutorConfirm, comment)
    }

    pub fn lecturer_confirm(
        &self,
        actor_id: &UserId,
        timesheet_id: &TimesheetId,
        comment: Option<&str>,
    ) -> Result<ActionOutcome, WorkflowError> {
        self.perform_action(actor_id, timesheet_id, ApprovalAction::LecturerConfirm, comment)
    }

    pub fn hr_confirm(
        &self,
        actor_id: &UserId,
        timesheet_id: &TimesheetId,
        comment: Option<&str>,
    ) -> Result<ActionOutcome, WorkflowError> {
        self.perform_action(actor_id, timesheet_id, ApprovalAction::HrConfirm, comment)
    }

    pub fn request_modification(
        &self,
        actor_id: &UserId,
        timesheet_id: &TimesheetId,
        comment: Option<&str>,
    ) -> Result<ActionOutcome, WorkflowError> {
        self.perform_action(
            actor_id,
            timesheet_id,
            ApprovalAction::RequestModification,
            comment,
        )
    }

    pub fn reject(
        &self,
        actor_id: &UserId,
        timesheet_id: &TimesheetId,
        comment: Option<&str>,
    ) -> Result<ActionOutcome, WorkflowError> {
        self.perform_action(actor_id, timesheet_id, ApprovalAction::Reject, comment)
    }

    pub fn get_timesheet(
        &self,
        actor_id: &UserId,
        timesheet_id: &TimesheetId,
    ) -> Result<Timesheet, WorkflowError> {
        let (actor, timesheet, course) = self.load_context(actor_id, timesheet_id)?;
        if !policy::can_view_timesheet(&actor, &timesheet, &course) {
            return Err(Self::denied(&actor, Operation::View, Some(&timesheet)));
        }
        Ok(timesheet)
    }

    pub fn approval_history(
        &self,
        actor_id: &UserId,
        timesheet_id: &TimesheetId,
    ) -> Result<Vec<Approval>, WorkflowError> {
        let (actor, timesheet, course) = self.load_context(actor_id, timesheet_id)?;
        if !policy::can_view_timesheet(&actor, &timesheet, &course) {
            return Err(Self::denied(&actor, Operation::View, Some(&timesheet)));
        }
        Ok(self.store.approvals(&timesheet.id)?)
    }

    /// Actions this actor could take on the timesheet right now.
    pub fn available_actions(
        &self,
        actor_id: &UserId,
        timesheet_id: &TimesheetId,
    ) -> Result<Vec<ApprovalAction>, WorkflowError> {
        let (actor, timesheet, course) = self.load_context(actor_id, timesheet_id)?;
        if !policy::can_view_timesheet(&actor, &timesheet, &course) {
            return Err(Self::denied(&actor, Operation::View, Some(&timesheet)));
        }
        Ok(policy::available_actions(&actor, &timesheet, &course))
    }

    fn timesheets_where(
        &self,
        keep: impl Fn(&Timesheet, Option<&Course>) -> bool,
    ) -> Result<Vec<Timesheet>, WorkflowError> {
        let courses: HashMap<CourseId, Course> = self
            .store
            .courses()?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        let mut found: Vec<Timesheet> = self
            .store
            .timesheets()?
            .into_iter()
            .filter(|t| keep(t, courses.get(&t.course_id)))
            .collect();
        found.sort_by(|a, b| {
            a.session_date
                .cmp(&b.session_date)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(found)
    }

    /// Timesheets waiting for the tutor's confirmation. Tutors see their own.
    pub fn pending_tutor_confirmation_queue(
        &self,
        actor_id: &UserId,
    ) -> Result<Vec<Timesheet>, WorkflowError> {
        let actor = self.load_user(actor_id)?;
        if !policy::can_view_pending_approval_queue(&actor) {
            return Err(Self::denied(
                &actor,
                Operation::ViewQueue(Queue::PendingTutorConfirmation),
                None,
            ));
        }
        self.timesheets_where(|t, _| {
            t.status == ApprovalStatus::PendingTutorConfirmation
                && (actor.role == Role::Admin || t.tutor_id == actor.id)
        })
    }

    /// Tutor-confirmed timesheets awaiting the lecturer, limited to courses
    /// the lecturer teaches.
    pub fn lecturer_final_approval_queue(
        &self,
        actor_id: &UserId,
    ) -> Result<Vec<Timesheet>, WorkflowError> {
        let actor = self.load_user(actor_id)?;
        if !policy::can_view_lecturer_final_approval_queue(&actor) {
            return Err(Self::denied(
                &actor,
                Operation::ViewQueue(Queue::LecturerFinalApproval),
                None,
            ));
        }
        self.timesheets_where(|t, course| {
            t.status == ApprovalStatus::TutorConfirmed
                && (actor.role == Role::Admin
                    || course.is_some_and(|c| policy::has_course_authority(&actor, c)))
        })
    }

    pub fn hr_queue(&self, actor_id: &UserId) -> Result<Vec<Timesheet>, WorkflowError> {
        let actor = self.load_user(actor_id)?;
        if !policy::can_view_hr_queue(&actor) {
            return Err(Self::denied(&actor, Operation::ViewQueue(Queue::Hr), None));
        }
        self.timesheets_where(|t, _| t.status == ApprovalStatus::LecturerConfirmed)
    }

    /// A tutor's timesheets, filtered to the ones the requester may view.
    pub fn timesheets_for_tutor(
        &self,
        actor_id: &UserId,
        tutor_id: &UserId,
    ) -> Result<Vec<Timesheet>, WorkflowError> {
        let actor = self.load_user(actor_id)?;
        if !policy::can_view_timesheets_by_tutor(&actor, tutor_id) {
            return Err(Self::denied(&actor, Operation::ViewTutorTimesheets, None));
        }
        self.timesheets_where(|t, course| {
            t.tutor_id == *tutor_id
                && course.is_some_and(|c| policy::can_view_timesheet(&actor, t, c))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn conflict(id: &TimesheetId) -> WorkflowError {
        WorkflowError::ConcurrencyConflict {
            timesheet: id.clone(),
            expected: Some(2),
            actual: Some(3),
        }
    }

    #[test]
    fn a_single_conflict_is_retried() {
        let id = TimesheetId::from("tsht_retry");
        let calls = Cell::new(0);
        let result = retry_once(&id, "update", || {
            calls.set(calls.get() + 1);
            if calls.get() == 1 { Err(conflict(&id)) } else { Ok(calls.get()) }
        });
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn a_second_conflict_is_surfaced() {
        let id = TimesheetId::from("tsht_retry");
        let calls = Cell::new(0);
        let result: Result<(), _> = retry_once(&id, "TUTOR_CONFIRM", || {
            calls.set(calls.get() + 1);
            Err(conflict(&id))
        });
        assert!(matches!(result, Err(WorkflowError::ConcurrencyConflict { .. })));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let id = TimesheetId::from("tsht_retry");
        let calls = Cell::new(0);
        let result: Result<(), _> = retry_once(&id, "update", || {
            calls.set(calls.get() + 1);
            Err(WorkflowError::NotFound {
                entity: "timesheet",
                id: id.to_string(),
            })
        });
        assert!(matches!(result, Err(WorkflowError::NotFound { .. })));
        assert_eq!(calls.get(), 1);
    }
}
