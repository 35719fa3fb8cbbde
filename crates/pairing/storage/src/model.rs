use pairing_types::{PairingEdge, PairingRun};

/// A run together with its full edge set, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRun {
    pub run: PairingRun,
    pub edges: Vec<PairingEdge>,
}
