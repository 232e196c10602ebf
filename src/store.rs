//! sled-backed persistence.
//!
//! Each record kind lives in its own tree and is stored as cbor. Timesheet
//! writes are guarded by the version stored with the timesheet: a save only
//! lands when the stored version is the one the caller loaded.
use std::sync::Arc;

use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionError, abort};

use crate::approval::Approval;
use crate::catalog::{PolicyVersion, RateAmount, RateCatalog, RateCode, RateSource};
use crate::error::StoreError;
use crate::timesheet::Timesheet;
use crate::types::{CalendarDate, Course, CourseId, TaskType, TimesheetId, User, UserId};
use crate::utils::to_cbor;

const USERS: &str = "users";
const COURSES: &str = "courses";
const TIMESHEETS: &str = "timesheets";
const APPROVALS: &str = "approvals";
const POLICY_VERSIONS: &str = "policy_versions";
const RATE_CODES: &str = "rate_codes";
const RATE_AMOUNTS: &str = "rate_amounts";

#[derive(Clone)]
pub struct SledStore {
    instance: Arc<sled::Db>,
    users: sled::Tree,
    courses: sled::Tree,
    timesheets: sled::Tree,
    approvals: sled::Tree,
    policy_versions: sled::Tree,
    rate_codes: sled::Tree,
    rate_amounts: sled::Tree,
}

// history keys sort by sequence within a timesheet
fn approval_key(id: &TimesheetId, sequence: u64) -> String {
    format!("{id}/{sequence:020}")
}

fn approval_prefix(id: &TimesheetId) -> String {
    format!("{id}/")
}

fn stored_version(raw: &[u8]) -> Result<u64, StoreError> {
    let timesheet: Timesheet = minicbor::decode(raw)?;
    Ok(timesheet.version)
}

fn unwrap_tx<T>(result: Result<T, TransactionError<StoreError>>) -> Result<T, StoreError> {
    result.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StoreError::Sled(e),
    })
}

fn decode_all<T>(tree: &sled::Tree) -> Result<Vec<T>, StoreError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    tree.iter()
        .map(|item| {
            let (_, raw) = item?;
            Ok(minicbor::decode(&raw)?)
        })
        .collect()
}

impl SledStore {
    pub fn open(instance: Arc<sled::Db>) -> Result<Self, StoreError> {
        Ok(Self {
            users: instance.open_tree(USERS)?,
            courses: instance.open_tree(COURSES)?,
            timesheets: instance.open_tree(TIMESHEETS)?,
            approvals: instance.open_tree(APPROVALS)?,
            policy_versions: instance.open_tree(POLICY_VERSIONS)?,
            rate_codes: instance.open_tree(RATE_CODES)?,
            rate_amounts: instance.open_tree(RATE_AMOUNTS)?,
            instance,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.instance.flush()?;
        Ok(())
    }

    pub fn put_user(&self, user: &User) -> Result<(), StoreError> {
        self.users.insert(user.id.as_str().as_bytes(), to_cbor(user)?)?;
        Ok(())
    }

    pub fn user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        match self.users.get(id.as_str().as_bytes())? {
            Some(raw) => Ok(Some(minicbor::decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn put_course(&self, course: &Course) -> Result<(), StoreError> {
        self.courses
            .insert(course.id.as_str().as_bytes(), to_cbor(course)?)?;
        Ok(())
    }

    pub fn course(&self, id: &CourseId) -> Result<Option<Course>, StoreError> {
        match self.courses.get(id.as_str().as_bytes())? {
            Some(raw) => Ok(Some(minicbor::decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn courses(&self) -> Result<Vec<Course>, StoreError> {
        decode_all(&self.courses)
    }

    pub fn timesheet(&self, id: &TimesheetId) -> Result<Option<Timesheet>, StoreError> {
        match self.timesheets.get(id.as_str().as_bytes())? {
            Some(raw) => Ok(Some(minicbor::decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn timesheets(&self) -> Result<Vec<Timesheet>, StoreError> {
        decode_all(&self.timesheets)
    }

    /// Writes a brand new timesheet. Fails if the id is already taken.
    pub fn insert_timesheet(&self, timesheet: &Timesheet) -> Result<(), StoreError> {
        let key = timesheet.id.as_str().as_bytes();
        let value = to_cbor(timesheet)?;

        unwrap_tx(self.timesheets.transaction(|tx| {
            if let Some(raw) = tx.get(key)? {
                let actual = stored_version(&raw).map_err(ConflictableTransactionError::Abort)?;
                return abort(StoreError::VersionMismatch {
                    id: timesheet.id.clone(),
                    expected: None,
                    actual: Some(actual),
                });
            }
            tx.insert(key, value.as_slice())?;
            Ok(())
        }))
    }

    /// Replaces a timesheet whose stored version is `expected_version`.
    pub fn save_timesheet(
        &self,
        timesheet: &Timesheet,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        let key = timesheet.id.as_str().as_bytes();
        let value = to_cbor(timesheet)?;

        unwrap_tx(self.timesheets.transaction(|tx| {
            let actual = match tx.get(key)? {
                Some(raw) => {
                    Some(stored_version(&raw).map_err(ConflictableTransactionError::Abort)?)
                }
                None => None,
            };
            if actual != Some(expected_version) {
                return abort(StoreError::VersionMismatch {
                    id: timesheet.id.clone(),
                    expected: Some(expected_version),
                    actual,
                });
            }
            tx.insert(key, value.as_slice())?;
            Ok(())
        }))
    }

    /// Writes the timesheet and its new approval record as one unit. Neither
    /// lands unless the stored version is `expected_version`.
    pub fn save_transition(
        &self,
        timesheet: &Timesheet,
        expected_version: u64,
        approval: &Approval,
    ) -> Result<(), StoreError> {
        let key = timesheet.id.as_str().as_bytes();
        let value = to_cbor(timesheet)?;
        let history_key = approval_key(&approval.timesheet_id, approval.sequence);
        let record = to_cbor(approval)?;

        unwrap_tx((&self.timesheets, &self.approvals).transaction(|(ts, ap)| {
            let actual = match ts.get(key)? {
                Some(raw) => {
                    Some(stored_version(&raw).map_err(ConflictableTransactionError::Abort)?)
                }
                None => None,
            };
            if actual != Some(expected_version) {
                return abort(StoreError::VersionMismatch {
                    id: timesheet.id.clone(),
                    expected: Some(expected_version),
                    actual,
                });
            }
            ts.insert(key, value.as_slice())?;
            ap.insert(history_key.as_bytes(), record.as_slice())?;
            Ok(())
        }))
    }

    /// Removes the timesheet. Its approval history is kept.
    pub fn delete_timesheet(
        &self,
        id: &TimesheetId,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        let key = id.as_str().as_bytes();

        unwrap_tx(self.timesheets.transaction(|tx| {
            let actual = match tx.get(key)? {
                Some(raw) => {
                    Some(stored_version(&raw).map_err(ConflictableTransactionError::Abort)?)
                }
                None => None,
            };
            if actual != Some(expected_version) {
                return abort(StoreError::VersionMismatch {
                    id: id.clone(),
                    expected: Some(expected_version),
                    actual,
                });
            }
            tx.remove(key)?;
            Ok(())
        }))
    }

    /// Approval history of a timesheet, oldest first.
    pub fn approvals(&self, id: &TimesheetId) -> Result<Vec<Approval>, StoreError> {
        self.approvals
            .scan_prefix(approval_prefix(id).as_bytes())
            .map(|item| {
                let (_, raw) = item?;
                Ok(minicbor::decode(&raw)?)
            })
            .collect()
    }

    pub fn latest_approval(&self, id: &TimesheetId) -> Result<Option<Approval>, StoreError> {
        match self
            .approvals
            .scan_prefix(approval_prefix(id).as_bytes())
            .next_back()
        {
            Some(item) => {
                let (_, raw) = item?;
                Ok(Some(minicbor::decode(&raw)?))
            }
            None => Ok(None),
        }
    }

    /// Everything in the rate trees, as a catalog.
    pub fn load_catalog(&self) -> Result<RateCatalog, StoreError> {
        Ok(RateCatalog::from_parts(
            decode_all(&self.policy_versions)?,
            decode_all(&self.rate_codes)?,
            decode_all(&self.rate_amounts)?,
        ))
    }

    /// Appends catalog rows in one transaction. Validation against the
    /// existing rows is the caller's job, see [`RateCatalog::merge`]. A key
    /// that is already taken aborts the whole append, so stored rows are
    /// never replaced.
    pub fn append_catalog_rows(
        &self,
        versions: &[PolicyVersion],
        codes: &[RateCode],
        amounts: &[RateAmount],
    ) -> Result<(), StoreError> {
        let versions = versions
            .iter()
            .map(|v| Ok((v.key().into_bytes(), v.key(), to_cbor(v)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;
        let codes = codes
            .iter()
            .map(|c| Ok((c.code.clone().into_bytes(), c.code.clone(), to_cbor(c)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;
        let amounts = amounts
            .iter()
            .map(|a| Ok((a.id.to_be_bytes().to_vec(), a.id.to_string(), to_cbor(a)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        unwrap_tx(
            (&self.policy_versions, &self.rate_codes, &self.rate_amounts).transaction(
                |(pv, rc, ra)| {
                    for (tree, name, rows) in [
                        (pv, POLICY_VERSIONS, &versions),
                        (rc, RATE_CODES, &codes),
                        (ra, RATE_AMOUNTS, &amounts),
                    ] {
                        for (key, label, value) in rows {
                            if tree.get(key)?.is_some() {
                                return abort(StoreError::DuplicateKey {
                                    tree: name,
                                    key: label.clone(),
                                });
                            }
                            tree.insert(key.as_slice(), value.as_slice())?;
                        }
                    }
                    Ok::<(), ConflictableTransactionError<StoreError>>(())
                },
            ),
        )
    }
}

impl RateSource for SledStore {
    fn rate_codes_for(&self, task_type: TaskType) -> Result<Vec<RateCode>, StoreError> {
        Ok(decode_all::<RateCode>(&self.rate_codes)?
            .into_iter()
            .filter(|c| c.task_type == task_type)
            .collect())
    }

    fn rate_amounts_for(
        &self,
        rate_code: &str,
        on: CalendarDate,
    ) -> Result<Vec<RateAmount>, StoreError> {
        Ok(decode_all::<RateAmount>(&self.rate_amounts)?
            .into_iter()
            .filter(|a| a.rate_code == rate_code && a.window.contains(on))
            .collect())
    }

    fn policy_version(&self, key: &str) -> Result<Option<PolicyVersion>, StoreError> {
        match self.policy_versions.get(key.as_bytes())? {
            Some(raw) => Ok(Some(minicbor::decode(&raw)?)),
            None => Ok(None),
        }
    }
}
