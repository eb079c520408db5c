use mixnet_primitives::{Address, StpPayload};

/// The neighbor this node routes through to reach the believed root,
/// remembered together with the path length it advertised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Parent {
  pub addr: Address,
  pub path_length: u16,
}

/// This node's current belief in the spanning-tree election: who the
/// root is, how far away it is, and which neighbor leads to it.
///
/// Invariant: `path_length == 0` iff `root == self` iff
/// `next_hop == self`, and the parent is present exactly when this
/// node is not the root.
#[derive(Debug, Clone)]
pub(crate) struct StpState {
  addr: Address,
  root: Address,
  path_length: u16,
  next_hop: Address,
  parent: Option<Parent>,
}

impl StpState {
  /// A freshly booted node believes it is the root.
  pub fn new(addr: Address) -> Self {
    Self {
      addr,
      root: addr,
      path_length: 0,
      next_hop: addr,
      parent: None,
    }
  }

  pub fn is_root(&self) -> bool {
    self.root == self.addr
  }

  pub fn root(&self) -> Address {
    self.root
  }

  pub fn path_length(&self) -> u16 {
    self.path_length
  }

  pub fn next_hop(&self) -> Address {
    self.next_hop
  }

  pub fn parent(&self) -> Option<Parent> {
    self.parent
  }

  /// The belief this node advertises to its neighbors.
  pub fn advertisement(&self) -> StpPayload {
    StpPayload {
      root: self.root,
      path_length: self.path_length,
      origin: self.addr,
    }
  }

  /// Follows an advertiser toward its root: one hop farther than the
  /// advertiser, through the advertiser.
  pub fn follow(&mut self, adv: &StpPayload) {
    self.root = adv.root;
    self.path_length = adv.path_length + 1;
    self.next_hop = adv.origin;
    self.parent = Some(Parent {
      addr: adv.origin,
      path_length: adv.path_length,
    });
  }

  /// Keeps the current root and distance but routes through a
  /// different equally-distant neighbor.
  pub fn swap_parent(&mut self, new_parent: Address) {
    self.next_hop = new_parent;
    if let Some(parent) = self.parent.as_mut() {
      parent.addr = new_parent;
    }
  }

  /// Forgets everything learned from the old tree; the node believes
  /// it is the root again.
  pub fn reset(&mut self) {
    self.root = self.addr;
    self.path_length = 0;
    self.next_hop = self.addr;
    self.parent = None;
  }
}
