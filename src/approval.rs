//! Append-only approval history.
//!
//! One [`Approval`] is written per successful transition. Each record carries
//! the digest of the one before it, so the history of a timesheet forms a
//! chain that can be checked for gaps or tampering.
use chrono::Utc;

use crate::error::StoreError;
use crate::types::{TimeStamp, TimesheetId, UserId};
use crate::utils::encode_with_digest;
use crate::workflow::{ApprovalAction, ApprovalStatus};

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct Approval {
    #[n(0)]
    pub timesheet_id: TimesheetId,
    // the timesheet version this transition produced, orders the history
    #[n(1)]
    pub sequence: u64,
    #[n(2)]
    pub approver_id: UserId,
    #[n(3)]
    pub action: ApprovalAction,
    #[n(4)]
    pub previous_status: ApprovalStatus,
    #[n(5)]
    pub new_status: ApprovalStatus,
    #[n(6)]
    pub comment: Option<String>,
    #[n(7)]
    pub timestamp: TimeStamp<Utc>,
    #[n(8)]
    pub is_active: bool,
    #[n(9)]
    pub previous_digest: Option<String>,
}

impl Approval {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timesheet_id: TimesheetId,
        sequence: u64,
        approver_id: UserId,
        action: ApprovalAction,
        previous_status: ApprovalStatus,
        new_status: ApprovalStatus,
        comment: Option<String>,
        previous: Option<&Approval>,
    ) -> Result<Self, StoreError> {
        let previous_digest = previous.map(|p| p.digest()).transpose()?;
        Ok(Self {
            timesheet_id,
            sequence,
            approver_id,
            action,
            previous_status,
            new_status,
            comment: comment.filter(|c| !c.trim().is_empty()),
            timestamp: TimeStamp::new(),
            is_active: true,
            previous_digest,
        })
    }

    /// sha256 of the cbor encoding, together with the encoding itself.
    pub fn build(&self) -> Result<(String, Vec<u8>), StoreError> {
        encode_with_digest(self)
    }

    pub fn digest(&self) -> Result<String, StoreError> {
        self.build().map(|(hash, _)| hash)
    }
}

/// Why a history failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainBreak {
    /// Record `index` does not start where the previous one ended.
    StatusGap { index: usize },
    /// Record `index` does not carry the digest of its predecessor.
    DigestMismatch { index: usize },
    /// Sequence numbers must strictly increase.
    OutOfOrder { index: usize },
    /// The first record claims a predecessor.
    DanglingStart,
}

/// Checks an ordered history. `Ok(())` for an empty history.
pub fn verify_chain(history: &[Approval]) -> Result<Result<(), ChainBreak>, StoreError> {
    let Some(first) = history.first() else {
        return Ok(Ok(()));
    };
    if first.previous_digest.is_some() {
        return Ok(Err(ChainBreak::DanglingStart));
    }
    for (index, pair) in history.windows(2).enumerate() {
        let (prev, next) = (&pair[0], &pair[1]);
        let index = index + 1;
        if next.sequence <= prev.sequence {
            return Ok(Err(ChainBreak::OutOfOrder { index }));
        }
        if next.previous_status != prev.new_status {
            return Ok(Err(ChainBreak::StatusGap { index }));
        }
        if next.previous_digest.as_deref() != Some(prev.digest()?.as_str()) {
            return Ok(Err(ChainBreak::DigestMismatch { index }));
        }
    }
    Ok(Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::next_status;

    fn chain() -> Vec<Approval> {
        let id = TimesheetId::from("tsht_test");
        let actor = UserId::from("user_test");
        let mut status = ApprovalStatus::Draft;
        let mut history: Vec<Approval> = Vec::new();
        for (seq, action) in [
            ApprovalAction::SubmitForApproval,
            ApprovalAction::TutorConfirm,
            ApprovalAction::LecturerConfirm,
        ]
        .into_iter()
        .enumerate()
        {
            let next = next_status(action, status).unwrap();
            let record = Approval::new(
                id.clone(),
                seq as u64 + 2,
                actor.clone(),
                action,
                status,
                next,
                None,
                history.last(),
            )
            .unwrap();
            history.push(record);
            status = next;
        }
        history
    }

    #[test]
    fn intact_chain_verifies() {
        assert_eq!(verify_chain(&chain()).unwrap(), Ok(()));
    }

    #[test]
    fn edited_record_breaks_the_chain() {
        let mut history = chain();
        history[1].comment = Some("rewritten".into());
        assert_eq!(
            verify_chain(&history).unwrap(),
            Err(ChainBreak::DigestMismatch { index: 2 })
        );
    }

    #[test]
    fn removed_record_leaves_a_gap() {
        let mut history = chain();
        history.remove(1);
        assert!(verify_chain(&history).unwrap().is_err());
    }

    #[test]
    fn blank_comments_are_dropped() {
        let history = chain();
        let record = Approval::new(
            history[0].timesheet_id.clone(),
            9,
            history[0].approver_id.clone(),
            ApprovalAction::Reject,
            ApprovalStatus::LecturerConfirmed,
            ApprovalStatus::Rejected,
            Some("  ".into()),
            history.last(),
        )
        .unwrap();
        assert_eq!(record.comment, None);
    }
}
