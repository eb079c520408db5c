//! Shared harness for the end-to-end scenarios: builds a network of
//! real node engines over an in-process switchboard and drives them
//! cooperatively on one thread.

// Not every scenario binary touches every helper.
#![allow(dead_code)]

use {
  mixnet_node::{Address, Config, Link, Node, Switchboard, UserHandle},
  std::{
    collections::BTreeMap,
    sync::Once,
    time::{Duration, Instant},
  },
};

static TRACING: Once = Once::new();

/// Honor RUST_LOG when a scenario needs a play-by-play.
fn init_tracing() {
  TRACING.call_once(|| {
    let _ = tracing_subscriber::fmt()
      .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
      .with_test_writer()
      .try_init();
  });
}

pub const HELLO: Duration = Duration::from_millis(20);
pub const REELECT: Duration = Duration::from_millis(90);

pub struct Net {
  pub board: Switchboard,
  nodes: BTreeMap<Address, Node<Link>>,
}

impl Net {
  /// Builds a network from undirected edges. Each node's neighbor
  /// order, and so its port numbering, follows first mention in the
  /// edge list.
  pub fn build(edges: &[(u16, u16)]) -> Self {
    Self::build_with(edges, |_| {})
  }

  pub fn build_with(
    edges: &[(u16, u16)],
    mut tweak: impl FnMut(&mut Config),
  ) -> Self {
    init_tracing();

    let mut neighbors: BTreeMap<u16, Vec<Address>> = BTreeMap::new();
    for (a, b) in edges {
      neighbors.entry(*a).or_default().push(Address(*b));
      neighbors.entry(*b).or_default().push(Address(*a));
    }

    let mut board = Switchboard::new();
    let mut configs = Vec::new();
    for (addr, list) in neighbors {
      let mut config = Config::new(Address(addr), list);
      config.root_hello_interval = HELLO;
      config.reelection_interval = REELECT;
      tweak(&mut config);
      board.attach(&config);
      configs.push(config);
    }

    let mut nodes = BTreeMap::new();
    for config in configs {
      let link = board.handle(config.addr).expect("node was attached");
      let addr = config.addr;
      nodes.insert(addr, Node::new(config, link).expect("valid config"));
    }
    Net { board, nodes }
  }

  pub fn node(&self, addr: u16) -> &Node<Link> {
    &self.nodes[&Address(addr)]
  }

  pub fn user(&self, addr: u16) -> UserHandle {
    self.board.user(Address(addr)).expect("node was attached")
  }

  /// One cooperative round: every node takes one event-loop step.
  pub fn step_all(&mut self) {
    for node in self.nodes.values_mut() {
      node.step();
    }
  }

  /// Keeps stepping everyone until the wall-clock duration elapses,
  /// long enough for the periodic timers to fire a few times.
  pub fn run_for(&mut self, duration: Duration) {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
      self.step_all();
      std::thread::sleep(Duration::from_micros(200));
    }
  }

  /// Converge the election and link-state discovery from a cold boot.
  pub fn converge(&mut self) {
    self.run_for(HELLO * 5);
  }
}
