//! Who may do what to a timesheet.
//!
//! Every predicate is pure: it looks only at the actor, the timesheet and the
//! course handed to it. Inactive users are refused everything. Administrators
//! pass every ownership and course-authority check, but not the status gates
//! on editing and deleting.
use std::fmt;

use crate::timesheet::Timesheet;
use crate::types::{Course, Role, User, UserId};
use crate::workflow::{ApprovalAction, ApprovalStatus};

/// The operation an actor attempted, carried in authorization errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    View,
    Edit,
    Delete,
    Perform(ApprovalAction),
    ViewQueue(Queue),
    ViewTutorTimesheets,
    Administer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    PendingTutorConfirmation,
    LecturerFinalApproval,
    Hr,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => f.write_str("create timesheets"),
            Operation::View => f.write_str("view"),
            Operation::Edit => f.write_str("edit"),
            Operation::Delete => f.write_str("delete"),
            Operation::Perform(action) => write!(f, "perform {action}"),
            Operation::ViewQueue(Queue::PendingTutorConfirmation) => {
                f.write_str("view the pending tutor confirmation queue")
            }
            Operation::ViewQueue(Queue::LecturerFinalApproval) => {
                f.write_str("view the lecturer final approval queue")
            }
            Operation::ViewQueue(Queue::Hr) => f.write_str("view the HR queue"),
            Operation::ViewTutorTimesheets => f.write_str("view this tutor's timesheets"),
            Operation::Administer => f.write_str("administer courses and users"),
        }
    }
}

/// A party entitled to act on a timesheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Authority {
    /// The tutor the timesheet belongs to.
    Owner,
    /// The lecturer who created it, while they still teach the course.
    Creator,
    /// The lecturer of record for the course.
    CourseLecturer,
    HumanResources,
}

use Authority::*;

/// Capability table for workflow actions. `REJECT` depends on the stage the
/// timesheet is at, see [`reject_authorities`].
fn action_authorities(action: ApprovalAction, status: ApprovalStatus) -> &'static [Authority] {
    match action {
        ApprovalAction::SubmitForApproval => &[Owner, Creator],
        ApprovalAction::TutorConfirm => &[Owner],
        ApprovalAction::LecturerConfirm => &[CourseLecturer],
        ApprovalAction::HrConfirm => &[HumanResources],
        ApprovalAction::RequestModification => &[CourseLecturer],
        ApprovalAction::Reject => reject_authorities(status),
    }
}

fn reject_authorities(status: ApprovalStatus) -> &'static [Authority] {
    match status {
        ApprovalStatus::PendingTutorConfirmation => &[Owner, CourseLecturer],
        ApprovalStatus::LecturerConfirmed => &[HumanResources],
        _ => &[CourseLecturer],
    }
}

fn holds(authority: Authority, actor: &User, timesheet: &Timesheet, course: &Course) -> bool {
    match authority {
        Owner => is_owner(actor, timesheet),
        Creator => timesheet.created_by == actor.id && has_course_authority(actor, course),
        CourseLecturer => has_course_authority(actor, course),
        HumanResources => actor.role == Role::Hr,
    }
}

fn is_admin(user: &User) -> bool {
    user.is_active && user.role == Role::Admin
}

/// Lecturer of record for the course. Compared by id only.
pub fn has_course_authority(user: &User, course: &Course) -> bool {
    user.is_active && user.role == Role::Lecturer && course.lecturer_id == user.id
}

pub fn is_owner(user: &User, timesheet: &Timesheet) -> bool {
    user.is_active && user.role == Role::Tutor && timesheet.tutor_id == user.id
}

pub fn can_create_timesheet(creator: &User) -> bool {
    creator.is_active && matches!(creator.role, Role::Lecturer | Role::Admin)
}

pub fn can_create_timesheet_for(creator: &User, tutor: &User, course: &Course) -> bool {
    if !creator.is_active || !tutor.is_active {
        return false;
    }
    match creator.role {
        Role::Admin => true,
        Role::Lecturer => tutor.role == Role::Tutor && has_course_authority(creator, course),
        _ => false,
    }
}

pub fn can_view_timesheet(requester: &User, timesheet: &Timesheet, course: &Course) -> bool {
    if !requester.is_active {
        return false;
    }
    if requester.role.at_least(Role::Hr) {
        return true;
    }
    match requester.role {
        Role::Lecturer => has_course_authority(requester, course),
        _ => is_owner(requester, timesheet),
    }
}

pub fn can_modify_timesheet(requester: &User, timesheet: &Timesheet, course: &Course) -> bool {
    if !requester.is_active {
        return false;
    }
    match requester.role {
        Role::Admin => true,
        Role::Lecturer => has_course_authority(requester, course),
        Role::Tutor => is_owner(requester, timesheet),
        Role::Hr => false,
    }
}

/// Modify authority and an editable status. No role edits outside
/// DRAFT or MODIFICATION_REQUESTED.
pub fn can_edit_timesheet(requester: &User, timesheet: &Timesheet, course: &Course) -> bool {
    timesheet.status.is_editable() && can_modify_timesheet(requester, timesheet, course)
}

pub fn can_delete_timesheet(requester: &User, timesheet: &Timesheet, course: &Course) -> bool {
    timesheet.status.is_editable() && can_modify_timesheet(requester, timesheet, course)
}

/// Tutors see the timesheets waiting for their confirmation. Lecturers work
/// from the final approval queue instead and are refused here.
pub fn can_view_pending_approval_queue(requester: &User) -> bool {
    requester.is_active && matches!(requester.role, Role::Tutor | Role::Admin)
}

pub fn can_view_lecturer_final_approval_queue(requester: &User) -> bool {
    requester.is_active && matches!(requester.role, Role::Lecturer | Role::Admin)
}

pub fn can_view_hr_queue(requester: &User) -> bool {
    requester.is_active && requester.role.at_least(Role::Hr)
}

pub fn can_view_timesheets_by_tutor(requester: &User, tutor_id: &UserId) -> bool {
    if !requester.is_active {
        return false;
    }
    requester.role.at_least(Role::Lecturer) || requester.id == *tutor_id
}

pub fn can_perform_action(
    actor: &User,
    action: ApprovalAction,
    timesheet: &Timesheet,
    course: &Course,
) -> bool {
    if is_admin(actor) {
        return true;
    }
    actor.is_active
        && action_authorities(action, timesheet.status)
            .iter()
            .any(|a| holds(*a, actor, timesheet, course))
}

/// Actions the actor is entitled to and that are legal from the current status.
pub fn available_actions(actor: &User, timesheet: &Timesheet, course: &Course) -> Vec<ApprovalAction> {
    crate::workflow::valid_actions(timesheet.status)
        .into_iter()
        .filter(|action| can_perform_action(actor, *action, timesheet, course))
        .collect()
}
