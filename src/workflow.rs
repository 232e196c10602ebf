//! Approval state machine.
//!
//! Every legal move is a row in [`TRANSITIONS`]. Anything absent from the
//! table is an invalid transition, never a silent no-op.
use std::fmt;
use std::str::FromStr;

use crate::types::display_and_parse;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApprovalStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    PendingTutorConfirmation,
    #[n(2)]
    TutorConfirmed,
    #[n(3)]
    LecturerConfirmed,
    #[n(4)]
    FinalConfirmed,
    #[n(5)]
    ModificationRequested,
    #[n(6)]
    Rejected,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApprovalAction {
    #[n(0)]
    SubmitForApproval,
    #[n(1)]
    TutorConfirm,
    #[n(2)]
    LecturerConfirm,
    #[n(3)]
    HrConfirm,
    #[n(4)]
    RequestModification,
    #[n(5)]
    Reject,
}

use ApprovalAction::*;
use ApprovalStatus::*;

pub const TRANSITIONS: &[(ApprovalAction, ApprovalStatus, ApprovalStatus)] = &[
    (SubmitForApproval, Draft, PendingTutorConfirmation),
    (SubmitForApproval, ModificationRequested, PendingTutorConfirmation),
    (TutorConfirm, PendingTutorConfirmation, TutorConfirmed),
    (LecturerConfirm, TutorConfirmed, LecturerConfirmed),
    (HrConfirm, LecturerConfirmed, FinalConfirmed),
    (RequestModification, PendingTutorConfirmation, ModificationRequested),
    (RequestModification, TutorConfirmed, ModificationRequested),
    (RequestModification, LecturerConfirmed, ModificationRequested),
    (Reject, Draft, Rejected),
    (Reject, PendingTutorConfirmation, Rejected),
    (Reject, TutorConfirmed, Rejected),
    (Reject, LecturerConfirmed, Rejected),
    (Reject, ModificationRequested, Rejected),
];

impl ApprovalStatus {
    pub const ALL: [ApprovalStatus; 7] = [
        Draft,
        PendingTutorConfirmation,
        TutorConfirmed,
        LecturerConfirmed,
        FinalConfirmed,
        ModificationRequested,
        Rejected,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Draft => "DRAFT",
            PendingTutorConfirmation => "PENDING_TUTOR_CONFIRMATION",
            TutorConfirmed => "TUTOR_CONFIRMED",
            LecturerConfirmed => "LECTURER_CONFIRMED",
            FinalConfirmed => "FINAL_CONFIRMED",
            ModificationRequested => "MODIFICATION_REQUESTED",
            Rejected => "REJECTED",
        }
    }
    /// Content (hours, task, tier, date, description) may change.
    pub const fn is_editable(self) -> bool {
        matches!(self, Draft | ModificationRequested)
    }
    pub const fn is_terminal(self) -> bool {
        matches!(self, FinalConfirmed | Rejected)
    }
    /// Somewhere between submission and final confirmation.
    pub const fn is_pending(self) -> bool {
        matches!(
            self,
            PendingTutorConfirmation | TutorConfirmed | LecturerConfirmed
        )
    }
}

impl ApprovalAction {
    pub const ALL: [ApprovalAction; 6] = [
        SubmitForApproval,
        TutorConfirm,
        LecturerConfirm,
        HrConfirm,
        RequestModification,
        Reject,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            SubmitForApproval => "SUBMIT_FOR_APPROVAL",
            TutorConfirm => "TUTOR_CONFIRM",
            LecturerConfirm => "LECTURER_CONFIRM",
            HrConfirm => "HR_CONFIRM",
            RequestModification => "REQUEST_MODIFICATION",
            Reject => "REJECT",
        }
    }
}

display_and_parse!(ApprovalStatus);
display_and_parse!(ApprovalAction);

/// Status reached by applying `action` in `from`, if that move exists.
pub fn next_status(action: ApprovalAction, from: ApprovalStatus) -> Option<ApprovalStatus> {
    TRANSITIONS
        .iter()
        .find(|(a, f, _)| *a == action && *f == from)
        .map(|(_, _, to)| *to)
}

pub fn valid_actions(from: ApprovalStatus) -> Vec<ApprovalAction> {
    TRANSITIONS
        .iter()
        .filter(|(_, f, _)| *f == from)
        .map(|(a, _, _)| *a)
        .fold(Vec::new(), |mut acc, a| {
            if !acc.contains(&a) {
                acc.push(a);
            }
            acc
        })
}

/// Statuses other than DRAFT that no row of the table leads to. Empty for a
/// well formed table.
pub fn unreachable_statuses() -> Vec<ApprovalStatus> {
    ApprovalStatus::ALL
        .into_iter()
        .filter(|s| *s != Draft && !TRANSITIONS.iter().any(|(_, _, to)| to == s))
        .collect()
}
