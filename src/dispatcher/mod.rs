pub mod http;
pub mod manager;
pub mod request;
pub mod scripted;
pub mod transport;

pub use http::HttpTransport;
pub use manager::{CommandDispatcher, DispatcherStats, WriteHandle};
pub use request::{
    CommandKind, CommandRequest, FailureKind, RefetchCommand, Settlement, WriteMode, WriteOptions,
};
pub use scripted::ScriptedTransport;
pub use transport::{CommandResponse, RetryingTransport, Transport, TransportError};
