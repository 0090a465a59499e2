mod http_transport;
mod retry_policy;

pub use http_transport::{body_stream, ensure_success, BodyStream, HttpTransport};
pub use retry_policy::RetryPolicy;
