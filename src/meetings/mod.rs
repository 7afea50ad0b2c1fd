//! Meeting domain — data model and lifecycle controller.

pub mod lifecycle;
pub mod model;

pub use lifecycle::{MeetingLifecycle, SummaryStatus, TriggerOutcome};
