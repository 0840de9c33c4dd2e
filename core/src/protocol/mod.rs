// Protocol module: path vocabulary and the envelopes that travel on it

pub mod envelope;
pub mod paths;

pub use envelope::{keys, ActionRequest, RequestError, ResultEnvelope};
pub use paths::{ContentPath, Outcome, Path, RequestPath};
