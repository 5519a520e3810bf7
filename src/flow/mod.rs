//! Flow domain: validated records, the recursive tree builder, and the
//! collection loader.

pub mod builder;
pub mod loader;
pub mod record;

pub use builder::{FlowNode, FlowSet, Reply};
pub use record::FlowRecord;
