use {
  core::fmt::{self, Debug, Display},
  serde::{Deserialize, Serialize},
};

/// Identifies one node in the mixnet overlay.
///
/// Addresses are plain 16-bit values assigned by whoever wires up the
/// topology. Every protocol tie-break (root election, parent selection)
/// compares addresses directly and the lower one wins.
#[derive(
  Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Address(pub u16);

impl Address {
  /// Placeholder used in envelope fields that do not name a real node,
  /// such as the destination of a flood.
  pub const NONE: Address = Address(0);
}

impl From<u16> for Address {
  fn from(value: u16) -> Self {
    Self(value)
  }
}

impl From<Address> for u16 {
  fn from(value: Address) -> Self {
    value.0
  }
}

impl Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    Display::fmt(&self.0, f)
  }
}

impl Debug for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    Display::fmt(&self.0, f)
  }
}
