pub mod query_envelope;
pub mod row;

pub use query_envelope::{
    EnvelopeCommand, QUERY_ENVELOPE_SCHEMA_VERSION, QueryEnvelope, QueryEnvelopeCommandFailure,
};
pub use row::{CellValue, Row};
