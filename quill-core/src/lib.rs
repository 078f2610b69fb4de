//! quill-core: shared types for the Quill blog engine.
//!
//! Everything the blob layer and the post service agree on lives here: the
//! caller-facing error taxonomy, the configuration store and the actor
//! identity handed over by the session layer.

pub mod actor;
pub mod config;
pub mod errors;
pub mod logging;

pub use actor::{Actor, ActorId};
pub use config::{QuillConfig, QuillConfigSnapshot};
pub use errors::{ErrorKind, QuillError, QuillResult, StorageFailure};
pub use logging::init_logging;
