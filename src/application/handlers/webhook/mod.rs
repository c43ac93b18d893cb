//! Webhook pipeline command and query handlers.

mod get_event;
mod ingest_event;
mod list_events;
mod process_event;
mod reprocess_event;

pub use get_event::GetEventHandler;
pub use ingest_event::{IngestEventCommand, IngestEventHandler, IngestOutcome};
pub use list_events::{ListEventsHandler, ListEventsQuery, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use process_event::ProcessEventHandler;
pub use reprocess_event::{ReprocessEventCommand, ReprocessEventHandler, ReprocessOutcome};
