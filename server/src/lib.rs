pub mod config;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod request;
pub mod sink;

pub use dispatcher::Dispatcher;
