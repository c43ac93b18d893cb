//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod webhook;

pub use webhook::{
    // Ingestion gate
    IngestEventCommand, IngestEventHandler, IngestOutcome,
    // Worker side
    ProcessEventHandler,
    // Inspection and operations
    GetEventHandler, ListEventsHandler, ListEventsQuery,
    ReprocessEventCommand, ReprocessEventHandler, ReprocessOutcome,
};
