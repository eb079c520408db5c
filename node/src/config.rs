use {
  mixnet_primitives::Address,
  serde::{Deserialize, Serialize},
  std::time::Duration,
  thiserror::Error,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
  #[error("node {0} lists itself as a neighbor")]
  SelfNeighbor(Address),

  #[error("neighbor {0} appears more than once")]
  DuplicateNeighbor(Address),

  #[error("mixing factor must be at least 1")]
  ZeroMixingFactor,
}

/// Immutable per-node configuration, supplied once at startup by
/// whoever wires the overlay together. The neighbor list is fixed for
/// the lifetime of the node; its order defines the port numbering, and
/// the slot just past the last neighbor is the user-facing port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
  /// This node's own overlay address.
  pub addr: Address,

  /// Directly connected peers; port index = position in this list.
  pub neighbors: Vec<Address>,

  /// How often the believed root re-announces itself.
  pub root_hello_interval: Duration,

  /// Silence threshold after which a non-root node declares the root
  /// dead and re-elects itself. Must exceed the hello interval; this is
  /// assumed, not enforced.
  pub reelection_interval: Duration,

  /// Outbound data frames are withheld until this many have
  /// accumulated, then released as one batch. 1 disables batching.
  pub mixing_factor: usize,

  /// Route the first originated data frame through a random detour
  /// instead of the shortest path.
  pub random_routing: bool,

  /// Seed for the detour-selection stream, so that runs are
  /// reproducible under test.
  pub rng_seed: u64,
}

impl Config {
  pub fn new(addr: Address, neighbors: Vec<Address>) -> Self {
    Self {
      addr,
      neighbors,
      root_hello_interval: Duration::from_millis(100),
      reelection_interval: Duration::from_millis(400),
      mixing_factor: 1,
      random_routing: false,
      rng_seed: addr.0 as u64,
    }
  }

  /// The logical port facing the locally attached application.
  pub fn user_port(&self) -> usize {
    self.neighbors.len()
  }

  /// Port toward a directly connected peer, if there is one. Lookup is
  /// a linear scan over the configured neighbor order.
  pub fn port_of(&self, addr: Address) -> Option<usize> {
    self.neighbors.iter().position(|n| *n == addr)
  }

  pub fn is_neighbor(&self, addr: Address) -> bool {
    self.port_of(addr).is_some()
  }

  pub(crate) fn validate(&self) -> Result<(), ConfigError> {
    if self.mixing_factor == 0 {
      return Err(ConfigError::ZeroMixingFactor);
    }
    for (i, neighbor) in self.neighbors.iter().enumerate() {
      if *neighbor == self.addr {
        return Err(ConfigError::SelfNeighbor(self.addr));
      }
      if self.neighbors[..i].contains(neighbor) {
        return Err(ConfigError::DuplicateNeighbor(*neighbor));
      }
    }
    Ok(())
  }
}
