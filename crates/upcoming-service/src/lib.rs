mod http;
pub mod mock;
mod session;
mod traits;

pub use http::HttpBackend;
pub use mock::{MockBackend, MockCall};
pub use session::Session;
pub use traits::{Backend, ServiceError};
