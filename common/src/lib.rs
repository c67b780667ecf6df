pub mod config;
pub mod controller;
pub mod error;
pub mod registry;
pub mod source;
pub mod topics;
pub mod types;

pub use config::{GroupConfig, MemberSpec, NetworkConfig, PersistedSettings, RuntimeConfig, SourceSpec};
pub use controller::GroupController;
pub use error::{CommandFailure, GroupError};
pub use registry::{Member, MemberRegistry};
pub use source::{SourceReading, TemperatureSource};
pub use topics::*;
pub use types::{
    DeviceKind, GroupAction, GroupMode, GroupState, MemberCommand, MemberRole, MemberStatus,
    PlannedCommand, SourceKind,
};
