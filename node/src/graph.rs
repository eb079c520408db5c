//! Link-state view of the whole overlay and the route planner on top
//! of it.
//!
//! The graph is cyclic by nature, so vertices never point at each other
//! directly: each vertex record keys on an address and stores its
//! declared adjacency as an ordered list of addresses. Hop lists are
//! owned by the vertex they lead to and are rebuilt wholesale whenever
//! the graph changes.

use {
  crate::Config,
  mixnet_primitives::Address,
  rand::{rngs::StdRng, Rng},
  std::collections::{HashMap, HashSet, VecDeque},
};

#[derive(Debug, Clone)]
struct Vertex {
  addr: Address,
  /// Declared adjacency in arrival order. Edges are directed as
  /// declared; the planner follows them as such.
  neighbors: Vec<Address>,
  /// Intermediate hops from the local node to this vertex, excluding
  /// both endpoints. `Some(vec![])` means a direct neighbor; `None`
  /// means unknown or unreachable.
  hops: Option<Vec<Address>>,
}

#[derive(Debug, Default)]
pub(crate) struct Topology {
  vertices: Vec<Vertex>,
  index: HashMap<Address, usize>,
}

impl Topology {
  pub fn new() -> Self {
    Self::default()
  }

  fn ensure_vertex(&mut self, addr: Address) -> (usize, bool) {
    match self.index.get(&addr) {
      Some(&i) => (i, false),
      None => {
        let i = self.vertices.len();
        self.index.insert(addr, i);
        self.vertices.push(Vertex {
          addr,
          neighbors: Vec::new(),
          hops: None,
        });
        (i, true)
      }
    }
  }

  /// Merges a declared neighbor set into the graph. Returns true iff a
  /// new vertex or edge was introduced; re-feeding known information is
  /// a no-op.
  pub fn add_neighbors(
    &mut self,
    origin: Address,
    neighbors: &[Address],
  ) -> bool {
    let (i, mut changed) = self.ensure_vertex(origin);
    for neighbor in neighbors {
      if !self.vertices[i].neighbors.contains(neighbor) {
        self.vertices[i].neighbors.push(*neighbor);
        changed = true;
      }
    }
    changed
  }

  pub fn hops(&self, dst: Address) -> Option<&[Address]> {
    self
      .index
      .get(&dst)
      .and_then(|&i| self.vertices[i].hops.as_deref())
  }

  /// Drops every cached hop list, keeping vertices and edges.
  pub fn invalidate_routes(&mut self) {
    for vertex in &mut self.vertices {
      vertex.hops = None;
    }
  }

  /// Rebuilds all hop lists with a breadth-first traversal from
  /// `origin`. The first-discovered path to each vertex wins; ties are
  /// broken by adjacency insertion order.
  pub fn recompute(&mut self, origin: Address) {
    self.invalidate_routes();
    let Some(&start) = self.index.get(&origin) else {
      return;
    };

    let mut discovered: HashSet<Address> = HashSet::new();
    discovered.insert(origin);

    let mut queue: VecDeque<(Address, Vec<Address>)> = VecDeque::new();
    for neighbor in self.vertices[start].neighbors.clone() {
      if discovered.insert(neighbor) {
        queue.push_back((neighbor, Vec::new()));
      }
    }

    while let Some((addr, hops)) = queue.pop_front() {
      // A vertex may be known only through someone else's adjacency;
      // it still gets a record and a hop list, it just cannot be
      // expanded further.
      let (i, _) = self.ensure_vertex(addr);
      let neighbors = self.vertices[i].neighbors.clone();
      for neighbor in neighbors {
        if discovered.insert(neighbor) {
          let mut path = hops.clone();
          path.push(addr);
          queue.push_back((neighbor, path));
        }
      }
      self.vertices[i].hops = Some(hops);
    }
  }

  fn declares_neighbor(&self, from: Address, to: Address) -> bool {
    self
      .index
      .get(&from)
      .map_or(false, |&i| self.vertices[i].neighbors.contains(&to))
  }

  /// Builds a route to `dst` through a randomly chosen detour vertex,
  /// falling back to the shortest path when no usable detour exists.
  /// Detour routes may revisit addresses; that is the point of them.
  pub fn random_route(
    &self,
    config: &Config,
    rng: &mut StdRng,
    dst: Address,
  ) -> Option<Vec<Address>> {
    let shortest = self.hops(dst)?.to_vec();

    // Prefer a detour outside our own neighborhood; in tiny graphs
    // every other vertex is a neighbor, so retry without that
    // restriction before giving up.
    let via = self
      .pick_detour(config, rng, dst, &shortest, true)
      .or_else(|| self.pick_detour(config, rng, dst, &shortest, false));
    let Some(via) = via else {
      return Some(shortest);
    };

    let via_hops = self
      .hops(via)
      .expect("pick_detour only returns routable vertices")
      .to_vec();
    let mut route = via_hops.clone();
    route.push(via);

    if self.declares_neighbor(via, dst) {
      return Some(route);
    }

    // Retrace the detour path back toward us until it re-meets the
    // shortest path, then ride that the rest of the way.
    for back in via_hops.iter().rev() {
      route.push(*back);
      if let Some(k) = shortest.iter().position(|hop| hop == back) {
        route.extend_from_slice(&shortest[k + 1..]);
        return Some(route);
      }
    }

    Some(shortest)
  }

  fn pick_detour(
    &self,
    config: &Config,
    rng: &mut StdRng,
    dst: Address,
    shortest: &[Address],
    exclude_neighbors: bool,
  ) -> Option<Address> {
    if self.vertices.is_empty() {
      return None;
    }
    let start = rng.gen_range(0..self.vertices.len());
    for i in 0..self.vertices.len() {
      let vertex = &self.vertices[(start + i) % self.vertices.len()];
      if vertex.addr == config.addr || vertex.addr == dst {
        continue;
      }
      if exclude_neighbors && config.is_neighbor(vertex.addr) {
        continue;
      }
      if shortest.contains(&vertex.addr) {
        continue;
      }
      if vertex.hops.is_none() {
        continue;
      }
      return Some(vertex.addr);
    }
    None
  }
}
