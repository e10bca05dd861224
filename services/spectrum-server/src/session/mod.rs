//! Client sessions: the accept loop and the per-connection streaming loop

mod manager;
mod pacer;
mod state;
mod stream;

pub use manager::{ServerError, SessionManager, SessionSettings};
pub use stream::StreamContext;
