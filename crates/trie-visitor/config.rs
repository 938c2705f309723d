/// Tunables for one traversal. Passed explicitly into [`crate::visit_all`];
/// nothing about a traversal is global state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisitorConfig {
    pub worker_count: usize,
    pub batch_size: usize,
    pub throttle: usize,
    /// When set, account nodes do not enqueue their storage child.
    pub storage_pruning: bool,
}

impl Default for VisitorConfig {
    fn default() -> Self {
        Self {
            worker_count: 16,
            batch_size: 1000,
            throttle: 100_000,
            storage_pruning: false,
        }
    }
}
