//! Spanning-tree election scenarios: unique root, loop-free tree,
//! port consistency, and recovery from a partitioned root.

mod common;

use {
  common::{Net, HELLO, REELECT},
  mixnet_node::Address,
};

#[test]
fn two_node_line_elects_the_lower_address() {
  let mut net = Net::build(&[(2, 7)]);
  net.converge();

  assert_eq!(net.node(2).root(), Address(2));
  assert_eq!(net.node(7).root(), Address(2));
  assert_eq!(net.node(2).path_length(), 0);
  assert_eq!(net.node(7).path_length(), 1);
  assert_eq!(net.node(7).parent(), Some(Address(2)));
  assert!(net.node(2).is_port_open(0));
  assert!(net.node(7).is_port_open(0));
}

#[test]
fn triangle_blocks_the_redundant_edge() {
  let mut net = Net::build(&[(1, 2), (1, 3), (2, 3)]);
  net.converge();

  for addr in [1, 2, 3] {
    assert_eq!(net.node(addr).root(), Address(1));
  }
  assert_eq!(net.node(2).parent(), Some(Address(1)));
  assert_eq!(net.node(3).parent(), Some(Address(1)));

  // Node 2's ports: [1, 3]; node 3's ports: [1, 2]. The direct link
  // between the two equal-depth peers is blocked on both ends.
  assert!(net.node(2).is_port_open(0));
  assert!(!net.node(2).is_port_open(1));
  assert!(net.node(3).is_port_open(0));
  assert!(!net.node(3).is_port_open(1));
  assert!(net.node(1).is_port_open(0));
  assert!(net.node(1).is_port_open(1));
}

#[test]
fn line_of_four_forms_a_chain() {
  let mut net = Net::build(&[(1, 2), (2, 3), (3, 4)]);
  net.converge();

  for addr in [1, 2, 3, 4] {
    assert_eq!(net.node(addr).root(), Address(1));
  }
  assert_eq!(net.node(1).path_length(), 0);
  assert_eq!(net.node(2).path_length(), 1);
  assert_eq!(net.node(3).path_length(), 2);
  assert_eq!(net.node(4).path_length(), 3);
  assert_eq!(net.node(2).parent(), Some(Address(1)));
  assert_eq!(net.node(3).parent(), Some(Address(2)));
  assert_eq!(net.node(4).parent(), Some(Address(3)));

  // No redundant edges anywhere: every port is parent- or child-facing
  // and stays open.
  assert!(net.node(2).is_port_open(0) && net.node(2).is_port_open(1));
  assert!(net.node(3).is_port_open(0) && net.node(3).is_port_open(1));
  assert!(net.node(4).is_port_open(0));
}

#[test]
fn square_opens_exactly_parent_and_child_ports() {
  let mut net = Net::build(&[(1, 2), (2, 3), (3, 4), (4, 1)]);
  net.converge();

  assert_eq!(net.node(2).parent(), Some(Address(1)));
  assert_eq!(net.node(3).parent(), Some(Address(2)));
  assert_eq!(net.node(4).parent(), Some(Address(1)));

  // Node 3's ports: [2, 4]; node 4's ports: [3, 1]. The 3-4 edge is
  // outside the tree: node 3 blocks its side (node 4 is a losing
  // equal-length parent candidate), while node 4 keeps its side open
  // because node 3 sits strictly deeper, like a child.
  assert!(net.node(3).is_port_open(0));
  assert!(!net.node(3).is_port_open(1));
  assert!(net.node(4).is_port_open(0));
  assert!(net.node(4).is_port_open(1));

  // Root and node 2 face only tree edges.
  assert!(net.node(1).is_port_open(0) && net.node(1).is_port_open(1));
  assert!(net.node(2).is_port_open(0) && net.node(2).is_port_open(1));
}

/// Walks every node's parent chain to the root, failing on any cycle
/// or on a chain that ends anywhere else.
fn assert_spanning_tree(net: &Net, root: u16, members: &[u16]) {
  for &addr in members {
    assert_eq!(net.node(addr).root(), Address(root), "root at node {addr}");
    let mut seen = vec![Address(addr)];
    let mut cursor = addr;
    while let Some(parent) = net.node(cursor).parent() {
      assert!(!seen.contains(&parent), "parent cycle through {parent}");
      seen.push(parent);
      cursor = parent.0;
    }
    assert_eq!(cursor, root, "parent chain from {addr} ends at {cursor}");
  }
}

#[test]
fn six_node_mesh_settles_into_one_tree() {
  let mut net = Net::build(&[
    (1, 2),
    (1, 3),
    (2, 3),
    (2, 4),
    (3, 5),
    (4, 5),
    (4, 6),
    (5, 6),
  ]);
  net.converge();

  assert_spanning_tree(&net, 1, &[1, 2, 3, 4, 5, 6]);
  assert_eq!(net.node(2).path_length(), 1);
  assert_eq!(net.node(3).path_length(), 1);
  assert_eq!(net.node(4).path_length(), 2);
  assert_eq!(net.node(5).path_length(), 2);
  assert_eq!(net.node(6).path_length(), 3);
  // Node 6 hears equal-length offers from 4 and 5; the lower address
  // becomes its parent.
  assert_eq!(net.node(6).parent(), Some(Address(4)));

  // The cross edges joining equal-depth peers are blocked on both
  // sides: 2-3 at depth one, 4-5 at depth two. Port order follows
  // first mention in the edge list.
  assert!(!net.node(2).is_port_open(1)); // 2's ports: [1, 3, 4]
  assert!(!net.node(3).is_port_open(1)); // 3's ports: [1, 2, 5]
  assert!(!net.node(4).is_port_open(1)); // 4's ports: [2, 5, 6]
  assert!(!net.node(5).is_port_open(1)); // 5's ports: [3, 4, 6]
}

#[test]
fn partitioned_leaf_reelects_itself_then_rejoins() {
  let mut net = Net::build(&[(1, 2), (1, 3), (1, 4), (1, 5)]);
  net.converge();
  for addr in [2, 3, 4, 5] {
    assert_eq!(net.node(addr).root(), Address(1));
  }

  // Unplug leaf 5 until its re-election deadline passes.
  net.board.set_link(Address(1), Address(5), false);
  net.run_for(REELECT + HELLO * 3);
  assert_eq!(net.node(5).root(), Address(5));
  assert_eq!(net.node(5).path_length(), 0);
  assert_eq!(net.node(5).parent(), None);

  // The rest of the star is unaffected.
  for addr in [2, 3, 4] {
    assert_eq!(net.node(addr).root(), Address(1));
  }

  // Plug it back in; the old root's hellos win again.
  net.board.set_link(Address(1), Address(5), true);
  net.run_for(HELLO * 4);
  assert_eq!(net.node(5).root(), Address(1));
  assert_eq!(net.node(5).path_length(), 1);
  assert_eq!(net.node(5).parent(), Some(Address(1)));
}
