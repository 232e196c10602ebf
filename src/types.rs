//! Identifiers, calendar types and the people/course records the workflow reasons about
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

use crate::error::IdError;
use crate::utils::new_uuid_to_bech32;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $hrp:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $hrp;

            pub fn generate() -> Result<Self, IdError> {
                new_uuid_to_bech32($hrp).map(Self)
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl<C> minicbor::Encode<C> for $name {
            fn encode<W: minicbor::encode::Write>(
                &self,
                e: &mut minicbor::Encoder<W>,
                _: &mut C,
            ) -> Result<(), minicbor::encode::Error<W::Error>> {
                e.str(&self.0)?.ok()
            }
        }

        impl<'b, C> minicbor::Decode<'b, C> for $name {
            fn decode(
                d: &mut minicbor::Decoder<'b>,
                _: &mut C,
            ) -> Result<Self, minicbor::decode::Error> {
                d.str().map(|s| Self(s.to_owned()))
            }
        }
    };
}

entity_id!(
    /// A tutor, lecturer, HR officer or administrator.
    UserId,
    "user_"
);
entity_id!(CourseId, "course_");
entity_id!(TimesheetId, "tsht_");

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// derived ordering would require `Utc: Ord`, the instant alone decides
impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// A calendar day with no time or zone attached. Session dates and policy
/// windows are expressed in these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarDate(NaiveDate);

impl CalendarDate {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }
    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for CalendarDate {
    fn from(value: NaiveDate) -> Self {
        Self(value)
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for CalendarDate {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Self)
    }
}

// days since 0001-01-01, keeps the encoding a single small integer
impl<C> minicbor::Encode<C> for CalendarDate {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i32(self.0.num_days_from_ce())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for CalendarDate {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let days = d.i32()?;

        NaiveDate::from_num_days_from_ce_opt(days)
            .map(CalendarDate)
            .ok_or(minicbor::decode::Error::message(
                "calendar date out of range",
            ))
    }
}

/// Roles are ordered by privilege: tutor < lecturer < hr < admin.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    #[n(1)]
    Tutor,
    #[n(2)]
    Lecturer,
    #[n(3)]
    Hr,
    #[n(4)]
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Tutor, Role::Lecturer, Role::Hr, Role::Admin];

    pub const fn rank(self) -> u8 {
        match self {
            Role::Tutor => 1,
            Role::Lecturer => 2,
            Role::Hr => 3,
            Role::Admin => 4,
        }
    }
    pub fn at_least(self, other: Role) -> bool {
        self.rank() >= other.rank()
    }
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Tutor => "TUTOR",
            Role::Lecturer => "LECTURER",
            Role::Hr => "HR",
            Role::Admin => "ADMIN",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    #[n(0)]
    Lecture,
    #[n(1)]
    Tutorial,
    /// Other required academic activity.
    #[n(2)]
    Oraa,
    #[n(3)]
    Demo,
    #[n(4)]
    Marking,
}

impl TaskType {
    pub const ALL: [TaskType; 5] = [
        TaskType::Lecture,
        TaskType::Tutorial,
        TaskType::Oraa,
        TaskType::Demo,
        TaskType::Marking,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            TaskType::Lecture => "LECTURE",
            TaskType::Tutorial => "TUTORIAL",
            TaskType::Oraa => "ORAA",
            TaskType::Demo => "DEMO",
            TaskType::Marking => "MARKING",
        }
    }
}

/// Pay tier of the tutor for a given session.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Qualification {
    #[n(0)]
    Standard,
    #[n(1)]
    Coordinator,
    #[n(2)]
    Phd,
}

impl Qualification {
    pub const ALL: [Qualification; 3] = [
        Qualification::Standard,
        Qualification::Coordinator,
        Qualification::Phd,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Qualification::Standard => "STANDARD",
            Qualification::Coordinator => "COORDINATOR",
            Qualification::Phd => "PHD",
        }
    }
}

macro_rules! display_and_parse {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = crate::error::ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .into_iter()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
                    .ok_or_else(|| crate::error::ParseEnumError {
                        kind: stringify!($name),
                        value: s.to_owned(),
                    })
            }
        }
    };
}

pub(crate) use display_and_parse;

display_and_parse!(Role);
display_and_parse!(TaskType);
display_and_parse!(Qualification);

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct User {
    #[n(0)]
    pub id: UserId,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub email: String,
    #[n(3)]
    pub role: Role,
    #[n(4)]
    pub is_active: bool,
}

impl User {
    pub fn new(name: &str, email: &str, role: Role) -> Result<Self, IdError> {
        Ok(Self {
            id: UserId::generate()?,
            name: name.to_owned(),
            email: email.to_owned(),
            role,
            is_active: true,
        })
    }
    pub fn deactivate(mut self) -> Self {
        self.is_active = false;
        self
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Course {
    #[n(0)]
    pub id: CourseId,
    #[n(1)]
    pub code: String,
    #[n(2)]
    pub name: String,
    // lecturer of record, authority checks compare against this id only
    #[n(3)]
    pub lecturer_id: UserId,
    #[n(4)]
    pub is_active: bool,
}

impl Course {
    pub fn new(code: &str, name: &str, lecturer_id: UserId) -> Result<Self, IdError> {
        Ok(Self {
            id: CourseId::generate()?,
            code: code.to_owned(),
            name: name.to_owned(),
            lecturer_id,
            is_active: true,
        })
    }
}
