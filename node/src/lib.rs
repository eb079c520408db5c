pub mod clock;
mod config;
mod graph;
mod mixer;
mod node;
mod ports;
mod stp;
mod transport;

pub use {
  bytes::Bytes,
  config::{Config, ConfigError},
  mixnet_primitives::{
    Address,
    Frame,
    LsaPayload,
    Payload,
    PingDirection,
    PingPayload,
    RoutingHeader,
    StpPayload,
    WireError,
  },
  node::{Node, NodeError},
  transport::{Link, Switchboard, Transport, TransportError, UserHandle},
};
