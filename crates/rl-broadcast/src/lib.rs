//! Live feed of newly visible reports.
//!
//! - [`SequenceCursor`]: last processed seq, owned by the detector task and
//!   published read-only through a watch channel.
//! - [`ChangeDetector`]: polls a [`ReportSource`] on a fixed interval and
//!   hands each non-empty ordered batch to the hub.
//! - [`BroadcastHub`]: single run loop owning the subscriber registry.
//! - [`ReportReader`]: on-demand reads under the same visibility rules.

pub mod cursor;
pub mod detector;
pub mod hub;
pub mod source;

pub use cursor::{CursorReader, SequenceCursor};
pub use detector::{ChangeDetector, DetectorConfig, TickOutcome};
pub use hub::{BroadcastHub, ClientId, ClientSubscription, HubConfig, HubHandle, HubStats};
pub use rl_schemas::SlowClientPolicy;
pub use source::{CheckpointStore, GeoBox, ReportQuery, ReportReader, ReportSource, KM_PER_DEGREE};
