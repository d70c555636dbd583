pub mod cadence;
pub mod producer;

pub use cadence::Cadence;
pub use producer::{JobProducer, ProducerState};
