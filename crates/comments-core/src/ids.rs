//! Opaque identifiers for the five persisted record kinds.
//!
//! All ids are backed by `i64` (matching a `BIGSERIAL`-style primary key in
//! the relational store the engine assumes) but are wrapped in distinct
//! newtypes so an `InstanceId` can never be accidentally used where a
//! `CommentId` is expected.

use std::fmt;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

macro_rules! def_id {
    ($(#[$outer:meta])* $name:ident) => {
        $(#[$outer])*
        #[derive(
            Debug, Encode, Decode, Serialize, Deserialize,
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
        )]
        pub struct $name(pub i64);

        impl $name {
            pub const MIN: Self = Self(i64::MIN);
            pub const MAX: Self = Self(i64::MAX);

            pub fn new(v: i64) -> Self {
                Self(v)
            }

            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $name {
            fn from(v: i64) -> Self {
                Self(v)
            }
        }
    };
}

def_id! {
    /// Primary key of an `instance` row (the synthetic root of a tree).
    InstanceId
}

def_id! {
    /// Primary key of a `comment` row.
    CommentId
}

def_id! {
    /// Id of the user performing a request; not a foreign key in this
    /// system, just the actor used for authorship/ownership checks.
    UserId
}

def_id! {
    /// Primary key of a `dl_request` row.
    DlRequestId
}

def_id! {
    /// Primary key of an `event_log` row.
    EventLogId
}

/// Kind of mutation recorded in the append-only event log.
#[derive(Debug, Encode, Decode, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Created,
    Changed,
    Deleted,
}

/// Lifecycle state of a materialized [`crate::ids::DlRequestId`] report.
#[derive(Debug, Encode, Decode, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DlState {
    Valid,
    Invalid,
}

/// Report output format. Only XML is implemented; the type exists so the
/// cache key and storage layer are not hard-coded to a single format.
#[derive(Debug, Encode, Decode, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DlFormat {
    Xml,
}

impl DlFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DlFormat::Xml => "xml",
        }
    }

    pub fn channel_prefix(self) -> &'static str {
        match self {
            DlFormat::Xml => "xml",
        }
    }
}

impl fmt::Display for DlFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
