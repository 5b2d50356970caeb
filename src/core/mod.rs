//! Core synchronization types.

mod entry;
mod orchestrator;
mod registry;
mod reload;
mod validation;
mod writer;

pub use entry::{ENTRY_DELIMITER, FIELD_DELIMITER, WatchedEntry, WatchedEntrySet};
pub use orchestrator::{ChangeOutcome, Orchestrator, OrchestratorBuilder, StartReport};
pub use registry::{EntryRegistry, EntrySlot};
pub use reload::{
    CommandRunner, CommandSpec, CommandStatus, ReloadInvoker, ReloadOutcome, ReloadPhase,
    SystemCommandRunner,
};
pub use validation::Validate;
pub use writer::LocalFileWriter;
