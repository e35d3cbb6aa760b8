//! HTTP front end
//!
//! A thin layer translating requests into calls on a shared [`KvEngine`].
//!
//! [`KvEngine`]: crate::engine::KvEngine

mod handlers;
mod server;

pub use handlers::AppState;
pub use server::{router, run_web_server};
