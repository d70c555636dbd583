//! Job records behind the `/jobs` resource.
//!
//! Records live only in process memory. [`StoreSource`] connects them to the
//! runner: due records are claimed on each poll and executed as shell
//! commands, and their results are written back here.

pub mod memory;
pub mod record;
pub mod source;

pub use memory::JobStore;
pub use record::{JobRecord, JobStatus};
pub use source::StoreSource;
