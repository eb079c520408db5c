mod address;
mod wire;

pub use {
  address::Address,
  wire::{
    Frame,
    LsaPayload,
    Payload,
    PingDirection,
    PingPayload,
    RoutingHeader,
    StpPayload,
    WireError,
  },
};
