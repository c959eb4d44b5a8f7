//! Fundamental types shared across the comments service: opaque ids,
//! timestamps, and the Farey/mediant rational arithmetic the tree engine is
//! built on.

pub mod ids;
pub mod ratio;
pub mod time;

pub use ids::{CommentId, DlFormat, DlRequestId, DlState, EventLogId, EventType, InstanceId, UserId};
pub use ratio::Frac;
pub use time::Timestamp;
