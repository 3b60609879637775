pub(crate) mod context;
pub(crate) mod request;
pub(crate) mod response;

pub use context::Context;
pub(crate) use context::{BodyLimits, RequestHead};
pub use request::{Body, Method, Request};
pub use response::{reason_phrase, Response};
