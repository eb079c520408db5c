//! The substrate that moves framed bytes between directly connected
//! nodes.
//!
//! The engine only ever talks to the [`Transport`] trait: one
//! non-blocking receive and one fire-and-forget send, addressed by
//! port index. Ports `0..num_neighbors` lead to peers in configuration
//! order; port `num_neighbors` is the user port facing the locally
//! attached application.
//!
//! [`Switchboard`] is the in-process implementation used by tests and
//! local deployments: per-edge FIFO queues behind mutexes, with a
//! liveness flag per link so harnesses can cut cables.

use {
  crate::Config,
  bytes::Bytes,
  mixnet_primitives::{Address, Frame},
  parking_lot::Mutex,
  std::{
    collections::{HashMap, VecDeque},
    sync::{
      atomic::{AtomicBool, Ordering},
      Arc,
    },
  },
  thiserror::Error,
};

#[derive(Debug, Error)]
pub enum TransportError {
  #[error("port {0} is not wired to anything")]
  UnknownPort(usize),
}

pub trait Transport {
  /// Non-blocking: returns the next inbound frame and the port it
  /// arrived on, or `None` when nothing is waiting.
  fn recv(&mut self) -> Option<(usize, Bytes)>;

  /// Hands a frame to the substrate. Ownership of the bytes passes on
  /// send; the caller must not touch them afterwards.
  fn send(&mut self, port: usize, frame: Bytes) -> Result<(), TransportError>;
}

type Queue = Arc<Mutex<VecDeque<Bytes>>>;

fn ordered(a: Address, b: Address) -> (Address, Address) {
  if a <= b {
    (a, b)
  } else {
    (b, a)
  }
}

/// In-memory transport fabric connecting any number of node engines in
/// one process. Attach every node's configuration first, then hand out
/// per-node [`Link`]s and [`UserHandle`]s.
#[derive(Default)]
pub struct Switchboard {
  /// Directed per-edge FIFO queues, keyed (from, to).
  queues: HashMap<(Address, Address), Queue>,
  /// One liveness flag per undirected link.
  links: HashMap<(Address, Address), Arc<AtomicBool>>,
  neighbors: HashMap<Address, Vec<Address>>,
  user_in: HashMap<Address, Queue>,
  user_out: HashMap<Address, Queue>,
}

impl Switchboard {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a node and wires queues for all its links. Both
  /// endpoints of an edge may attach in any order.
  pub fn attach(&mut self, config: &Config) {
    for neighbor in &config.neighbors {
      self.queues.entry((config.addr, *neighbor)).or_default();
      self.queues.entry((*neighbor, config.addr)).or_default();
      self
        .links
        .entry(ordered(config.addr, *neighbor))
        .or_insert_with(|| Arc::new(AtomicBool::new(true)));
    }
    self.neighbors.insert(config.addr, config.neighbors.clone());
    self.user_in.entry(config.addr).or_default();
    self.user_out.entry(config.addr).or_default();
  }

  /// The transport handle a node engine runs against.
  pub fn handle(&self, addr: Address) -> Option<Link> {
    let neighbors = self.neighbors.get(&addr)?.clone();
    let mut inbound = Vec::with_capacity(neighbors.len() + 1);
    let mut outbound = Vec::with_capacity(neighbors.len());
    for neighbor in &neighbors {
      inbound.push(self.queues.get(&(*neighbor, addr))?.clone());
      outbound.push(Wire {
        queue: self.queues.get(&(addr, *neighbor))?.clone(),
        up: self.links.get(&ordered(addr, *neighbor))?.clone(),
      });
    }
    inbound.push(self.user_in.get(&addr)?.clone());
    Some(Link {
      inbound,
      outbound,
      user_out: self.user_out.get(&addr)?.clone(),
    })
  }

  /// The application side of a node's user port.
  pub fn user(&self, addr: Address) -> Option<UserHandle> {
    Some(UserHandle {
      into_node: self.user_in.get(&addr)?.clone(),
      from_node: self.user_out.get(&addr)?.clone(),
    })
  }

  /// Cuts or restores a link. While down, frames sent across it vanish
  /// silently, as if the cable were unplugged.
  pub fn set_link(&self, a: Address, b: Address, up: bool) {
    if let Some(flag) = self.links.get(&ordered(a, b)) {
      flag.store(up, Ordering::Relaxed);
    }
  }
}

#[derive(Clone)]
struct Wire {
  queue: Queue,
  up: Arc<AtomicBool>,
}

/// One node's view of the switchboard: its inbound queues in port
/// order (user port last) and the outbound side of each link.
pub struct Link {
  inbound: Vec<Queue>,
  outbound: Vec<Wire>,
  user_out: Queue,
}

impl Transport for Link {
  fn recv(&mut self) -> Option<(usize, Bytes)> {
    for (port, queue) in self.inbound.iter().enumerate() {
      if let Some(frame) = queue.lock().pop_front() {
        return Some((port, frame));
      }
    }
    None
  }

  fn send(&mut self, port: usize, frame: Bytes) -> Result<(), TransportError> {
    if port == self.outbound.len() {
      self.user_out.lock().push_back(frame);
      return Ok(());
    }
    match self.outbound.get(port) {
      Some(wire) => {
        if wire.up.load(Ordering::Relaxed) {
          wire.queue.lock().push_back(frame);
        }
        Ok(())
      }
      None => Err(TransportError::UnknownPort(port)),
    }
  }
}

/// What the locally attached application holds: inject frames into the
/// node's user port, collect the frames the node delivers up.
pub struct UserHandle {
  into_node: Queue,
  from_node: Queue,
}

impl UserHandle {
  pub fn inject(&self, frame: &Frame) {
    self.into_node.lock().push_back(frame.encode());
  }

  pub fn try_recv(&self) -> Option<Frame> {
    let bytes = self.from_node.lock().pop_front()?;
    Some(Frame::decode(&bytes).expect("node delivered a malformed frame"))
  }

  pub fn drain(&self) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Some(frame) = self.try_recv() {
      frames.push(frame);
    }
    frames
  }
}
