//! server: authenticated local socket front-end for the stream pipeline.

pub mod auth;
pub mod broker;
pub mod rendezvous;
pub mod types;

pub use auth::authenticate;
pub use broker::{serve_stdio, BrokerConfig, BrokerReport, ConnectionBroker};
pub use rendezvous::{EndpointAddress, Rendezvous, Token};
pub use types::{AuthError, BrokerError, RendezvousError};
