//! Domain model (IDs, tasks, payloads, events, ...).
//!
//! ここは I/O を持たない。時刻は呼び出し側が渡す。

pub mod compose;
pub mod errors;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod payload;
pub mod refs;
pub mod state;
pub mod task;
pub mod task_set;
pub mod view;

pub use compose::{ComposeFields, ControlHandle, ControlId, ControlRole};
pub use errors::{ExtractionError, PipelineError, SchedulerError, StoreError};
pub use events::DomainEvent;
pub use ids::TaskId;
pub use outcome::SendOutcome;
pub use payload::{ComposeKind, DisplayMeta, SendPayload};
pub use refs::{DraftRef, HostSessionRef};
pub use state::TaskState;
pub use task::Task;
pub use task_set::TaskSet;
pub use view::TaskView;
