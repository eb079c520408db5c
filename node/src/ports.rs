use {crate::Config, mixnet_primitives::Address, tracing::warn};

/// Per-neighbor forwarding state for the active spanning tree, one slot
/// per configured neighbor. Open slots let flood and LSA traffic cross;
/// blocked slots silently swallow it. STP advertisements and
/// source-routed frames ignore this table entirely.
#[derive(Debug, Clone)]
pub(crate) struct PortTable {
  open: Vec<bool>,
}

impl PortTable {
  /// All ports begin open; the election closes redundant ones.
  pub fn new(num_neighbors: usize) -> Self {
    Self {
      open: vec![true; num_neighbors],
    }
  }

  pub fn open_all(&mut self) {
    self.open.fill(true);
  }

  #[allow(unused)] // used for testing
  pub fn close_all(&mut self) {
    self.open.fill(false);
  }

  pub fn set(&mut self, port: usize, open: bool) {
    match self.open.get_mut(port) {
      Some(slot) => *slot = open,
      None => warn!("port {port} out of range, table has {}", self.open.len()),
    }
  }

  /// No-op when `addr` is not a configured neighbor.
  pub fn set_by_addr(&mut self, config: &Config, addr: Address, open: bool) {
    if let Some(port) = config.port_of(addr) {
      self.set(port, open);
    }
  }

  pub fn is_open(&self, port: usize) -> bool {
    self.open.get(port).copied().unwrap_or(false)
  }
}

#[cfg(test)]
mod tests {
  use {super::PortTable, crate::Config, mixnet_primitives::Address};

  fn config() -> Config {
    Config::new(Address(1), vec![Address(4), Address(2), Address(9)])
  }

  #[test]
  fn starts_fully_open() {
    let ports = PortTable::new(3);
    assert!((0..3).all(|p| ports.is_open(p)));
  }

  #[test]
  fn set_by_addr_resolves_port() {
    let config = config();
    let mut ports = PortTable::new(3);
    ports.set_by_addr(&config, Address(2), false);
    assert!(ports.is_open(0));
    assert!(!ports.is_open(1));
  }

  #[test]
  fn set_by_addr_ignores_strangers() {
    let config = config();
    let mut ports = PortTable::new(3);
    ports.set_by_addr(&config, Address(77), false);
    assert!((0..3).all(|p| ports.is_open(p)));
  }

  #[test]
  fn bulk_toggles() {
    let mut ports = PortTable::new(3);
    ports.close_all();
    assert!((0..3).all(|p| !ports.is_open(p)));
    ports.open_all();
    assert!((0..3).all(|p| ports.is_open(p)));
  }

  #[test]
  fn out_of_range_access_is_harmless() {
    let mut ports = PortTable::new(2);
    ports.set(7, false);
    assert!(!ports.is_open(7));
  }
}
