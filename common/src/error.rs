use serde::Serialize;
use thiserror::Error;

use crate::types::{GroupMode, MemberRole};

/// Errors surfaced synchronously to whoever configures or commands a group.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GroupError {
    #[error("invalid value: {0}")]
    Validation(String),
    #[error("mode {mode} requires at least one {missing}")]
    UnsupportedMode { mode: GroupMode, missing: MemberRole },
    #[error("member {0} is already part of the group")]
    DuplicateMember(String),
    #[error("a group needs at least one heater or cooler")]
    EmptyGroup,
    #[error("unknown member {0}")]
    UnknownMember(String),
}

/// Why a single member command did not go through. Recorded on the member,
/// never returned from controller operations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum CommandFailure {
    #[error("command timed out")]
    Timeout,
    #[error("device unavailable")]
    Unavailable,
    #[error("device rejected command: {0}")]
    Rejected(String),
}
