use bytes::Bytes;

/// Holding pen for outbound data frames when mixing is enabled.
///
/// Frames are stashed fully prepared, already encoded and paired with
/// their egress port, so a flush is nothing but a burst of sends. The
/// batch releases all-or-nothing: source-originated frames drain first
/// in insertion order, then forwarded frames in insertion order.
#[derive(Debug, Default)]
pub(crate) struct MixBuffer {
  source: Vec<(usize, Bytes)>,
  forward: Vec<(usize, Bytes)>,
  pending: usize,
}

impl MixBuffer {
  pub fn new(mixing_factor: usize) -> Self {
    Self {
      source: Vec::with_capacity(mixing_factor),
      forward: Vec::with_capacity(mixing_factor),
      pending: 0,
    }
  }

  /// Data frames received on the ingress side but not yet released.
  pub fn pending(&self) -> usize {
    self.pending
  }

  pub fn stash_source(&mut self, port: usize, frame: Bytes) {
    self.source.push((port, frame));
    self.pending += 1;
  }

  pub fn stash_forward(&mut self, port: usize, frame: Bytes) {
    self.forward.push((port, frame));
    self.pending += 1;
  }

  /// Drains the whole batch and resets the pending count.
  pub fn flush(&mut self) -> Vec<(usize, Bytes)> {
    let mut batch = std::mem::take(&mut self.source);
    batch.append(&mut self.forward);
    self.pending = 0;
    batch
  }
}
