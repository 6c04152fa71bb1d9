mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use error::problem;
pub use router::handle_request;
pub use types::{AppState, Request};
