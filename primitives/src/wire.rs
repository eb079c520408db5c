//! Binary wire protocol spoken between directly connected mixnet peers.
//!
//! Every frame is a fixed envelope followed by a typed payload. All
//! integers are little-endian and the layout is bit-exact: two nodes
//! built from different checkouts must interoperate on raw bytes.

use {
  crate::Address,
  bytes::{Buf, BufMut, Bytes, BytesMut},
  thiserror::Error,
};

const TYPE_STP: u8 = 1;
const TYPE_FLOOD: u8 = 2;
const TYPE_LSA: u8 = 3;
const TYPE_DATA: u8 = 4;
const TYPE_PING: u8 = 5;

/// src (2) + dst (2) + type (1) + payload_size (2)
const ENVELOPE_LEN: usize = 7;
/// root (2) + path_length (2) + origin (2)
const STP_LEN: usize = 6;
/// origin (2) + neighbor_count (2)
const LSA_HEADER_LEN: usize = 4;
/// route_length (2) + hop_index (2)
const ROUTING_HEADER_LEN: usize = 4;
/// direction (1) + origin (2) + reserved (1) + send_time_us (8)
const PING_TRAILER_LEN: usize = 12;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
  #[error("buffer too short for the frame envelope")]
  TruncatedEnvelope,

  #[error("declared payload of {declared} bytes, only {available} on the wire")]
  TruncatedPayload { declared: usize, available: usize },

  #[error("{0} payload shorter than its fixed header")]
  TruncatedBody(&'static str),

  #[error("invalid ping direction {0}")]
  InvalidDirection(u8),

  #[error("unknown frame type {0}")]
  UnknownType(u8),
}

/// Spanning-tree advertisement: the sender's current belief about the
/// root, its own distance to it, and its own identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StpPayload {
  pub root: Address,
  pub path_length: u16,
  pub origin: Address,
}

/// Link-state advertisement: a node's declaration of its neighbor set.
/// `origin` survives forwarding unchanged; only the envelope source is
/// rewritten hop by hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsaPayload {
  pub origin: Address,
  pub neighbors: Vec<Address>,
}

/// Source route carried by data and ping frames. The route lists the
/// intermediate hops only: the final destination lives in the envelope
/// and is never part of the route.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutingHeader {
  pub hop_index: u16,
  pub route: Vec<Address>,
}

impl RoutingHeader {
  pub fn route_length(&self) -> u16 {
    self.route.len() as u16
  }

  /// The address the frame must be handed to next: the hop under
  /// `hop_index`, or `dst` once the route is exhausted.
  pub fn next_recipient(&self, dst: Address) -> Address {
    match self.route.get(self.hop_index as usize) {
      Some(hop) => *hop,
      None => dst,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingDirection {
  Request,
  Response,
}

/// Like an LSA's origin, `origin` names the node that stamped the
/// request and survives forwarding unchanged while the envelope source
/// is rewritten hop by hop; the destination routes its response back
/// to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPayload {
  pub direction: PingDirection,
  pub origin: Address,
  pub send_time_us: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
  Stp(StpPayload),
  Flood,
  Lsa(LsaPayload),
  Data(RoutingHeader, Bytes),
  Ping(RoutingHeader, PingPayload),
}

impl Payload {
  fn type_code(&self) -> u8 {
    match self {
      Payload::Stp(_) => TYPE_STP,
      Payload::Flood => TYPE_FLOOD,
      Payload::Lsa(_) => TYPE_LSA,
      Payload::Data(..) => TYPE_DATA,
      Payload::Ping(..) => TYPE_PING,
    }
  }

  fn encoded_len(&self) -> usize {
    match self {
      Payload::Stp(_) => STP_LEN,
      Payload::Flood => 0,
      Payload::Lsa(lsa) => LSA_HEADER_LEN + 2 * lsa.neighbors.len(),
      Payload::Data(header, data) => {
        ROUTING_HEADER_LEN + 2 * header.route.len() + data.len()
      }
      Payload::Ping(header, _) => {
        ROUTING_HEADER_LEN + 2 * header.route.len() + PING_TRAILER_LEN
      }
    }
  }
}

/// One framed message as it crosses a single link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
  /// Most recent forwarder, rewritten on every hop.
  pub src: Address,
  /// Final destination; [`Address::NONE`] for floods.
  pub dst: Address,
  pub payload: Payload,
}

impl Frame {
  pub fn encode(&self) -> Bytes {
    let payload_len = self.payload.encoded_len();
    let mut buf = BytesMut::with_capacity(ENVELOPE_LEN + payload_len);

    buf.put_u16_le(self.src.into());
    buf.put_u16_le(self.dst.into());
    buf.put_u8(self.payload.type_code());
    buf.put_u16_le(payload_len as u16);

    match &self.payload {
      Payload::Stp(stp) => {
        buf.put_u16_le(stp.root.into());
        buf.put_u16_le(stp.path_length);
        buf.put_u16_le(stp.origin.into());
      }
      Payload::Flood => {}
      Payload::Lsa(lsa) => {
        buf.put_u16_le(lsa.origin.into());
        buf.put_u16_le(lsa.neighbors.len() as u16);
        for neighbor in &lsa.neighbors {
          buf.put_u16_le((*neighbor).into());
        }
      }
      Payload::Data(header, data) => {
        put_routing_header(&mut buf, header);
        buf.put_slice(data);
      }
      Payload::Ping(header, ping) => {
        put_routing_header(&mut buf, header);
        buf.put_u8(match ping.direction {
          PingDirection::Request => 0,
          PingDirection::Response => 1,
        });
        buf.put_u16_le(ping.origin.into());
        buf.put_u8(0); // reserved
        buf.put_u64_le(ping.send_time_us);
      }
    }

    buf.freeze()
  }

  pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
    if buf.len() < ENVELOPE_LEN {
      return Err(WireError::TruncatedEnvelope);
    }

    let mut cursor = buf;
    let src = Address(cursor.get_u16_le());
    let dst = Address(cursor.get_u16_le());
    let type_code = cursor.get_u8();
    let declared = cursor.get_u16_le() as usize;

    if cursor.remaining() < declared {
      return Err(WireError::TruncatedPayload {
        declared,
        available: cursor.remaining(),
      });
    }
    let mut payload = &cursor[..declared];

    let payload = match type_code {
      TYPE_STP => {
        if payload.len() < STP_LEN {
          return Err(WireError::TruncatedBody("stp"));
        }
        Payload::Stp(StpPayload {
          root: Address(payload.get_u16_le()),
          path_length: payload.get_u16_le(),
          origin: Address(payload.get_u16_le()),
        })
      }
      TYPE_FLOOD => Payload::Flood,
      TYPE_LSA => {
        if payload.len() < LSA_HEADER_LEN {
          return Err(WireError::TruncatedBody("lsa"));
        }
        let origin = Address(payload.get_u16_le());
        let count = payload.get_u16_le() as usize;
        if payload.remaining() < 2 * count {
          return Err(WireError::TruncatedBody("lsa"));
        }
        let mut neighbors = Vec::with_capacity(count);
        for _ in 0..count {
          neighbors.push(Address(payload.get_u16_le()));
        }
        Payload::Lsa(LsaPayload { origin, neighbors })
      }
      TYPE_DATA => {
        let header = get_routing_header(&mut payload, "data")?;
        Payload::Data(header, Bytes::copy_from_slice(payload))
      }
      TYPE_PING => {
        let header = get_routing_header(&mut payload, "ping")?;
        if payload.remaining() < PING_TRAILER_LEN {
          return Err(WireError::TruncatedBody("ping"));
        }
        let direction = match payload.get_u8() {
          0 => PingDirection::Request,
          1 => PingDirection::Response,
          other => return Err(WireError::InvalidDirection(other)),
        };
        let origin = Address(payload.get_u16_le());
        payload.advance(1); // reserved
        let send_time_us = payload.get_u64_le();
        Payload::Ping(header, PingPayload {
          direction,
          origin,
          send_time_us,
        })
      }
      other => return Err(WireError::UnknownType(other)),
    };

    Ok(Frame { src, dst, payload })
  }
}

fn put_routing_header(buf: &mut BytesMut, header: &RoutingHeader) {
  buf.put_u16_le(header.route.len() as u16);
  buf.put_u16_le(header.hop_index);
  for hop in &header.route {
    buf.put_u16_le((*hop).into());
  }
}

fn get_routing_header(
  payload: &mut &[u8],
  kind: &'static str,
) -> Result<RoutingHeader, WireError> {
  if payload.len() < ROUTING_HEADER_LEN {
    return Err(WireError::TruncatedBody(kind));
  }
  let route_length = payload.get_u16_le() as usize;
  let hop_index = payload.get_u16_le();
  if payload.remaining() < 2 * route_length {
    return Err(WireError::TruncatedBody(kind));
  }
  let mut route = Vec::with_capacity(route_length);
  for _ in 0..route_length {
    route.push(Address(payload.get_u16_le()));
  }
  Ok(RoutingHeader { hop_index, route })
}
