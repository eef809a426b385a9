pub mod activity;
pub mod aggregator;
pub mod classifier;
pub mod clock;
pub mod commands;
pub mod controller;
pub mod scheduler;

pub use activity::{Activity, ActivityKind, DocumentLink};
pub use aggregator::{aggregate, cleanup_backlog, Aggregation, ChannelFailure, CleanupReport};
pub use classifier::{AgendaCard, AgendaView, Bucket, BucketCounts};
pub use clock::{Clock, FixedClock, MinuteOfDay, SystemClock};
pub use controller::{ActivityEdit, AgendaController, AgendaSnapshot};
pub use scheduler::{DropPreview, DropSide, DropTarget, ScheduleError, Slot};
