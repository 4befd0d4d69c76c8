//! Command/response relay core.
//!
//! Sends a text command to a remote chat peer, polls the peer's history for
//! the replies that follow it, and publishes the aggregated result as a single
//! JSON document that other processes can read at any time.

pub mod aggregate;
pub mod command;
pub mod engine;
pub mod error;
pub mod janitor;
pub mod publish;
pub mod response;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use {
    aggregate::ResponseAggregator,
    command::{Command, CommandError},
    engine::{CorrelationEngine, PollSettings, RelaySettings},
    error::{Error, Result},
    janitor::{SweepReport, TempJanitor},
    publish::Publisher,
    response::{AggregatedResponse, ResponseKind, ResponseStatus},
    session::{SessionManager, SessionState},
    transport::{
        AttachmentSource, Connector, RemoteAttachment, RemoteMessage, Transport, TransportError,
    },
};
