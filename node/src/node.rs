//! The per-node protocol engine: one cooperative event loop driving
//! the spanning-tree election, tree-scoped flooding, link-state
//! dissemination, and source-routed data and ping forwarding.

use {
  crate::{
    clock::now_micros,
    config::{Config, ConfigError},
    graph::Topology,
    mixer::MixBuffer,
    ports::PortTable,
    stp::StpState,
    transport::Transport,
  },
  bytes::Bytes,
  metrics::increment_counter,
  mixnet_primitives::{
    Address,
    Frame,
    LsaPayload,
    Payload,
    PingDirection,
    PingPayload,
    RoutingHeader,
    StpPayload,
  },
  rand::{rngs::StdRng, SeedableRng},
  std::{
    collections::HashSet,
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
  },
  thiserror::Error,
  tracing::{debug, info, warn},
};

#[derive(Debug, Error)]
pub enum NodeError {
  #[error("invalid configuration: {0}")]
  Config(#[from] ConfigError),
}

/// One mixnet node. Owns every piece of protocol state for its
/// address; any number of nodes can coexist in one process, each
/// driving its own transport handle.
pub struct Node<T> {
  config: Config,
  transport: T,
  ports: PortTable,
  stp: StpState,
  graph: Topology,
  mixer: MixBuffer,
  rng: StdRng,

  /// LSA origins already forwarded once; breaks dissemination cycles.
  lsa_seen: HashSet<Address>,
  lsa_originated: bool,
  /// The first originated data frame takes the random detour; the
  /// rest ride the shortest path.
  detour_spent: bool,

  hello_ticks: u64,
  last_hello_sent: Instant,
  last_root_seen: Instant,
}

impl<T: Transport> Node<T> {
  pub fn new(config: Config, transport: T) -> Result<Self, NodeError> {
    config.validate()?;

    let mut graph = Topology::new();
    graph.add_neighbors(config.addr, &config.neighbors);

    let mut lsa_seen = HashSet::new();
    lsa_seen.insert(config.addr);

    let now = Instant::now();
    let mut node = Self {
      ports: PortTable::new(config.neighbors.len()),
      stp: StpState::new(config.addr),
      mixer: MixBuffer::new(config.mixing_factor),
      rng: StdRng::seed_from_u64(config.rng_seed),
      graph,
      lsa_seen,
      lsa_originated: false,
      detour_spent: false,
      hello_ticks: 1,
      last_hello_sent: now,
      last_root_seen: now,
      config,
      transport,
    };

    // A booting node is trivially its own root; announce it.
    node.broadcast_stp(None);
    Ok(node)
  }

  /// Drives the engine until the stop flag falsifies. The flag is
  /// polled once per iteration; queued work is not drained on exit.
  pub fn run(&mut self, keep_running: &AtomicBool) {
    info!(
      "[{}] node up with {} neighbors",
      self.config.addr,
      self.config.neighbors.len()
    );
    while keep_running.load(Ordering::Relaxed) {
      self.step();
    }
  }

  /// One event-loop iteration: fire due timers, then process at most
  /// one inbound frame. Public so harnesses can interleave many nodes
  /// cooperatively on a single thread.
  pub fn step(&mut self) {
    let now = Instant::now();

    if self.stp.is_root()
      && now.duration_since(self.last_hello_sent)
        >= self.config.root_hello_interval
    {
      self.broadcast_stp(None);
      self.last_hello_sent = now;
      self.hello_ticks += 1;
      // The root joins link-state discovery on its second hello tick,
      // once the tree under it has had a chance to form.
      if self.hello_ticks >= 2 && !self.lsa_originated {
        self.originate_lsa();
      }
    }

    if self.config.mixing_factor > 1
      && self.mixer.pending() >= self.config.mixing_factor
    {
      increment_counter!("mix_flushes");
      for (port, frame) in self.mixer.flush() {
        self.send(port, frame);
      }
    }

    match self.transport.recv() {
      Some((port, bytes)) => self.dispatch(port, bytes),
      None => {
        if !self.stp.is_root()
          && now.duration_since(self.last_root_seen)
            >= self.config.reelection_interval
        {
          self.reelect();
        }
      }
    }
  }

  pub fn addr(&self) -> Address {
    self.config.addr
  }

  /// The root this node currently believes in.
  pub fn root(&self) -> Address {
    self.stp.root()
  }

  /// Hops between this node and its believed root; 0 when it is the
  /// root itself.
  pub fn path_length(&self) -> u16 {
    self.stp.path_length()
  }

  /// The neighbor leading toward the root, if this node is not it.
  pub fn parent(&self) -> Option<Address> {
    self.stp.parent().map(|parent| parent.addr)
  }

  pub fn is_port_open(&self, port: usize) -> bool {
    self.ports.is_open(port)
  }
}

// frame dispatch and per-type handlers
impl<T: Transport> Node<T> {
  fn dispatch(&mut self, port: usize, bytes: Bytes) {
    let frame = match Frame::decode(&bytes) {
      Ok(frame) => frame,
      Err(err) => {
        debug!(
          "[{}] dropping malformed frame on port {port}: {err}",
          self.config.addr
        );
        increment_counter!("dropped_frames");
        return;
      }
    };

    match frame.payload {
      Payload::Stp(adv) => self.consume_stp(port, adv),
      Payload::Flood => self.consume_flood(port, bytes),
      Payload::Lsa(lsa) => self.consume_lsa(port, lsa),
      Payload::Data(header, data) => {
        self.consume_data(port, frame.dst, header, data, bytes)
      }
      Payload::Ping(header, ping) => {
        self.consume_ping(port, frame.dst, header, ping, bytes)
      }
    }
  }

  /// Spanning-tree election step for one received advertisement.
  ///
  /// Lower root address wins; among equal roots the shorter path wins;
  /// among equal paths the lower advertiser address wins. A frame that
  /// merely restates the current belief is the root's heartbeat: it is
  /// relayed down the tree and resets the re-election deadline.
  fn consume_stp(&mut self, port: usize, adv: StpPayload) {
    if port == self.config.user_port() {
      return;
    }
    increment_counter!("received_stp");

    let mut hello_root = true;
    let mut changed = false;

    if adv.root < self.stp.root() {
      // Better root; follow the advertiser.
      hello_root = false;
      changed = true;
      self.stp.follow(&adv);
      self.ports.set(port, true);
      info!(
        "[{}] adopted root {} via {}",
        self.config.addr, adv.root, adv.origin
      );
    } else if adv.root == self.stp.root() {
      if adv.path_length + 1 < self.stp.path_length() {
        // Same root, strictly shorter path; reroute through the
        // advertiser.
        self.stp.follow(&adv);
        self.ports.set(port, true);
        hello_root = false;
        changed = true;
      } else {
        match self.stp.parent() {
          Some(parent) if adv.path_length == parent.path_length => {
            if adv.origin < parent.addr {
              // Equal-length offer from a lower address: it becomes
              // the parent, the old one is cut off.
              self.ports.set_by_addr(&self.config, parent.addr, false);
              self.ports.set(port, true);
              self.stp.swap_parent(adv.origin);
              hello_root = false;
              changed = true;
            } else if adv.origin > parent.addr {
              // Redundant peer losing the tie-break.
              self.ports.set(port, false);
              hello_root = false;
            }
            // adv.origin == parent: the parent relaying the root
            // hello; nothing to update.
          }
          _ => hello_root = false,
        }
      }

      if adv.path_length == self.stp.path_length() {
        // Same distance to the root: a peer, never parent nor child.
        self.ports.set(port, false);
      }
    } else {
      // The advertiser is downstream of us: a child.
      hello_root = false;
      self.ports.set(port, true);
    }

    if changed {
      self.broadcast_stp(Some(port));
    }

    if hello_root && !self.stp.is_root() {
      // Relay the heartbeat to everyone but the informant and refresh
      // the deadline that guards against a silent root.
      self.broadcast_stp(Some(port));
      if !self.lsa_originated {
        self.originate_lsa();
      }
      self.last_root_seen = Instant::now();
    }
  }

  fn consume_flood(&mut self, port: usize, bytes: Bytes) {
    increment_counter!("received_flood");
    if port == self.config.user_port() {
      // Locally originated broadcast.
      self.broadcast_flood(None);
      return;
    }
    if self.ports.is_open(port) {
      self.deliver_user(bytes);
      self.broadcast_flood(Some(port));
    } else {
      debug!(
        "[{}] flood discarded on blocked port {port}",
        self.config.addr
      );
    }
  }

  fn consume_lsa(&mut self, port: usize, lsa: LsaPayload) {
    if port == self.config.user_port() {
      return;
    }
    increment_counter!("received_lsa");

    if self.graph.add_neighbors(lsa.origin, &lsa.neighbors) {
      increment_counter!("lsa_merges");
      self.graph.recompute(self.config.addr);
    }

    // Hearing anyone else's advertisement is the last call to put our
    // own on the wire.
    if !self.lsa_originated {
      self.originate_lsa();
    }

    if self.lsa_seen.insert(lsa.origin) {
      self.forward_lsa(port, &lsa);
    }
  }

  fn consume_data(
    &mut self,
    port: usize,
    dst: Address,
    header: RoutingHeader,
    data: Bytes,
    bytes: Bytes,
  ) {
    increment_counter!("received_data");
    if port == self.config.user_port() {
      self.originate_data(dst, data);
    } else if dst == self.config.addr {
      // Arrived; hand it up untouched.
      self.deliver_user(bytes);
    } else {
      self.forward_data(dst, header, data);
    }
  }

  fn consume_ping(
    &mut self,
    port: usize,
    dst: Address,
    mut header: RoutingHeader,
    ping: PingPayload,
    bytes: Bytes,
  ) {
    increment_counter!("received_ping");
    if port == self.config.user_port() {
      self.originate_ping(dst);
    } else if dst == self.config.addr {
      match ping.direction {
        PingDirection::Request => {
          // The envelope source only names the last forwarder; the
          // payload origin is the node that actually asked.
          self.deliver_user(bytes);
          self.answer_ping(ping.origin, ping.send_time_us);
        }
        PingDirection::Response => self.deliver_user(bytes),
      }
    } else {
      // Transit: same forwarding rule as data, but probes never wait
      // in the mix buffer.
      header.hop_index += 1;
      let next = header.next_recipient(dst);
      let Some(egress) = self.config.port_of(next) else {
        self.drop_unroutable(next);
        return;
      };
      let frame = Frame {
        src: self.config.addr,
        dst,
        payload: Payload::Ping(header, ping),
      };
      self.send(egress, frame.encode());
    }
  }
}

// origination and forwarding
impl<T: Transport> Node<T> {
  fn originate_data(&mut self, dst: Address, data: Bytes) {
    let route = if self.config.random_routing && !self.detour_spent {
      self.detour_spent = true;
      self.graph.random_route(&self.config, &mut self.rng, dst)
    } else {
      self.graph.hops(dst).map(<[Address]>::to_vec)
    };
    let Some(route) = route else {
      warn!("[{}] no route to {dst}, dropping data", self.config.addr);
      increment_counter!("dropped_frames");
      return;
    };

    let header = RoutingHeader {
      hop_index: 0,
      route,
    };
    let next = header.next_recipient(dst);
    let Some(egress) = self.config.port_of(next) else {
      self.drop_unroutable(next);
      return;
    };

    let frame = Frame {
      src: self.config.addr,
      dst,
      payload: Payload::Data(header, data),
    };
    let bytes = frame.encode();
    if self.config.mixing_factor > 1 {
      self.mixer.stash_source(egress, bytes);
    } else {
      self.send(egress, bytes);
    }
  }

  fn forward_data(
    &mut self,
    dst: Address,
    mut header: RoutingHeader,
    data: Bytes,
  ) {
    header.hop_index += 1;
    let next = header.next_recipient(dst);
    let Some(egress) = self.config.port_of(next) else {
      self.drop_unroutable(next);
      return;
    };

    let frame = Frame {
      src: self.config.addr,
      dst,
      payload: Payload::Data(header, data),
    };
    let bytes = frame.encode();
    if self.config.mixing_factor > 1 {
      self.mixer.stash_forward(egress, bytes);
    } else {
      self.send(egress, bytes);
    }
  }

  fn originate_ping(&mut self, dst: Address) {
    let Some(route) = self.graph.hops(dst).map(<[Address]>::to_vec) else {
      warn!("[{}] no route to {dst}, dropping ping", self.config.addr);
      increment_counter!("dropped_frames");
      return;
    };
    let header = RoutingHeader {
      hop_index: 0,
      route,
    };
    let next = header.next_recipient(dst);
    let Some(egress) = self.config.port_of(next) else {
      self.drop_unroutable(next);
      return;
    };
    let frame = Frame {
      src: self.config.addr,
      dst,
      payload: Payload::Ping(header, PingPayload {
        direction: PingDirection::Request,
        origin: self.config.addr,
        send_time_us: now_micros(),
      }),
    };
    self.send(egress, frame.encode());
  }

  /// Sends a ping response back to `to`, echoing the request's
  /// timestamp so the origin can compute the round trip.
  fn answer_ping(&mut self, to: Address, send_time_us: u64) {
    let Some(route) = self.graph.hops(to).map(<[Address]>::to_vec) else {
      warn!(
        "[{}] no return route to {to}, dropping ping response",
        self.config.addr
      );
      increment_counter!("dropped_frames");
      return;
    };
    let header = RoutingHeader {
      hop_index: 0,
      route,
    };
    let next = header.next_recipient(to);
    let Some(egress) = self.config.port_of(next) else {
      self.drop_unroutable(next);
      return;
    };
    let frame = Frame {
      src: self.config.addr,
      dst: to,
      payload: Payload::Ping(header, PingPayload {
        direction: PingDirection::Response,
        origin: self.config.addr,
        send_time_us,
      }),
    };
    self.send(egress, frame.encode());
  }

  /// Advertises the current belief on every neighbor port. STP frames
  /// ignore the open/blocked state; `except` implements the
  /// all-but-the-informant rule.
  fn broadcast_stp(&mut self, except: Option<usize>) {
    let adv = self.stp.advertisement();
    for port in 0..self.config.neighbors.len() {
      if Some(port) == except {
        continue;
      }
      let frame = Frame {
        src: self.config.addr,
        dst: self.config.neighbors[port],
        payload: Payload::Stp(adv),
      };
      self.send(port, frame.encode());
    }
  }

  /// Emits a flood frame on every open port, minus the split-horizon
  /// exception.
  fn broadcast_flood(&mut self, except: Option<usize>) {
    for port in 0..self.config.neighbors.len() {
      if Some(port) == except || !self.ports.is_open(port) {
        continue;
      }
      let frame = Frame {
        src: self.config.addr,
        dst: Address::NONE,
        payload: Payload::Flood,
      };
      self.send(port, frame.encode());
    }
  }

  /// Puts this node's own adjacency on the wire, once per lifetime.
  fn originate_lsa(&mut self) {
    self.lsa_originated = true;
    debug!("[{}] originating own LSA", self.config.addr);
    for port in 0..self.config.neighbors.len() {
      if !self.ports.is_open(port) {
        continue;
      }
      let frame = Frame {
        src: self.config.addr,
        dst: self.config.neighbors[port],
        payload: Payload::Lsa(LsaPayload {
          origin: self.config.addr,
          neighbors: self.config.neighbors.clone(),
        }),
      };
      self.send(port, frame.encode());
    }
  }

  /// Relays someone else's LSA verbatim; only the envelope source is
  /// rewritten to us.
  fn forward_lsa(&mut self, inbound: usize, lsa: &LsaPayload) {
    for port in 0..self.config.neighbors.len() {
      if port == inbound || !self.ports.is_open(port) {
        continue;
      }
      let frame = Frame {
        src: self.config.addr,
        dst: self.config.neighbors[port],
        payload: Payload::Lsa(lsa.clone()),
      };
      self.send(port, frame.encode());
    }
  }

  /// The believed root went silent; forget the stale tree and stand
  /// for election again.
  fn reelect(&mut self) {
    increment_counter!("stp_elections");
    info!(
      "[{}] root {} went silent, re-electing",
      self.config.addr,
      self.stp.root()
    );
    self.stp.reset();
    self.ports.open_all();
    // The graph itself survives; only the routes derived from the old
    // tree are suspect now.
    self.graph.invalidate_routes();
    self.broadcast_stp(None);

    let now = Instant::now();
    self.last_hello_sent = now;
    self.last_root_seen = now;
  }

  fn deliver_user(&mut self, bytes: Bytes) {
    let user_port = self.config.user_port();
    self.send(user_port, bytes);
  }

  fn drop_unroutable(&mut self, next: Address) {
    warn!(
      "[{}] next hop {next} is not a neighbor, dropping",
      self.config.addr
    );
    increment_counter!("dropped_frames");
  }

  /// Send failures are transient by policy: log, count, move on.
  fn send(&mut self, port: usize, frame: Bytes) {
    increment_counter!("sent_frames");
    if let Err(err) = self.transport.send(port, frame) {
      warn!("[{}] send on port {port} failed: {err}", self.config.addr);
      increment_counter!("dropped_frames");
    }
  }
}
