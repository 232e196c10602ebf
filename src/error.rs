use rust_decimal::Decimal;

use crate::policy::Operation;
use crate::types::{CalendarDate, Qualification, Role, TaskType, TimesheetId, UserId};
use crate::workflow::{ApprovalAction, ApprovalStatus};

#[derive(thiserror::Error, Debug)]
pub enum IdError {
    #[error("invalid identifier prefix: {0}")]
    Prefix(String),
    #[error("failed to bech32 encode identifier: {0}")]
    Encoding(String),
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("hours cannot be negative, got {0}")]
    NegativeHours(Decimal),
    #[error("amount cannot be negative, got {0}")]
    NegativeAmount(Decimal),
    #[error("'{0}' is not a decimal number")]
    Unparseable(String),
    #[error("{field} of {value} exceeds the maximum of {max}")]
    HoursAboveLimit {
        field: &'static str,
        value: Decimal,
        max: Decimal,
    },
    #[error("at least some hours must be claimed")]
    NoHoursClaimed,
    #[error("description must not be blank")]
    BlankDescription,
    #[error("description is {len} characters, the limit is {max}")]
    DescriptionTooLong { len: usize, max: usize },
    #[error("{0} is not set")]
    MissingField(&'static str),
    #[error("expected a {expected}, found a {actual}")]
    WrongRole { expected: Role, actual: Role },
    #[error("pay calculation overflowed")]
    Overflow,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("window starting {from} must end after it starts, got {to}")]
    EmptyWindow {
        from: CalendarDate,
        to: CalendarDate,
    },
    #[error("{subject} already has a window covering {from}")]
    OverlappingWindow {
        subject: String,
        from: CalendarDate,
    },
    #[error("rate for {0} must be greater than zero")]
    NonPositiveAmount(String),
    #[error("rate code {0} already exists")]
    DuplicateRateCode(String),
    #[error("rate code {0} is already defined differently")]
    ConflictingRateCode(String),
    #[error("unknown rate code {0}")]
    UnknownRateCode(String),
    #[error("unknown policy version {0}")]
    UnknownPolicyVersion(String),
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Sled(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(String),
    #[error(transparent)]
    Decode(#[from] minicbor::decode::Error),
    #[error("{tree} already holds a record under {key}")]
    DuplicateKey { tree: &'static str, key: String },
    #[error("timesheet {id} is at version {actual:?}, expected {expected:?}")]
    VersionMismatch {
        id: TimesheetId,
        expected: Option<u64>,
        actual: Option<u64>,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum RateError {
    #[error(
        "no rate for {task_type} / {qualification} on {date} (repeat: {repeat})"
    )]
    NotFound {
        task_type: TaskType,
        qualification: Qualification,
        date: CalendarDate,
        repeat: bool,
    },
    #[error(transparent)]
    Source(#[from] StoreError),
}

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("{actor} ({role}) may not {operation}{}", describe_target(.timesheet, .status))]
    AuthorizationDenied {
        actor: UserId,
        role: Role,
        operation: Operation,
        timesheet: Option<TimesheetId>,
        status: Option<ApprovalStatus>,
    },
    #[error("{action} is not allowed on timesheet {timesheet} while {status}")]
    InvalidTransition {
        timesheet: TimesheetId,
        action: ApprovalAction,
        status: ApprovalStatus,
    },
    #[error(
        "no rate for {task_type} / {qualification} on {date} (repeat: {repeat})"
    )]
    RateNotFound {
        task_type: TaskType,
        qualification: Qualification,
        date: CalendarDate,
        repeat: bool,
    },
    #[error("timesheet {timesheet} changed concurrently, expected version {expected:?}, found {actual:?}")]
    ConcurrencyConflict {
        timesheet: TimesheetId,
        expected: Option<u64>,
        actual: Option<u64>,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Storage(StoreError),
    #[error(transparent)]
    Id(#[from] IdError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn describe_target(timesheet: &Option<TimesheetId>, status: &Option<ApprovalStatus>) -> String {
    match (timesheet, status) {
        (Some(id), Some(status)) => format!(" on timesheet {id} ({status})"),
        (Some(id), None) => format!(" on timesheet {id}"),
        _ => String::new(),
    }
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::VersionMismatch {
                id,
                expected,
                actual,
            } => WorkflowError::ConcurrencyConflict {
                timesheet: id,
                expected,
                actual,
            },
            other => WorkflowError::Storage(other),
        }
    }
}

impl From<RateError> for WorkflowError {
    fn from(value: RateError) -> Self {
        match value {
            RateError::NotFound {
                task_type,
                qualification,
                date,
                repeat,
            } => WorkflowError::RateNotFound {
                task_type,
                qualification,
                date,
                repeat,
            },
            RateError::Source(e) => e.into(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
