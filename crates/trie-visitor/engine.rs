use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Barrier, Condvar, Mutex};
use std::thread::Builder;
use std::time::Duration;

use crossbeam::channel::{unbounded, Sender};

use trie_node::{Node, NodeId, TrieConfig};
use trie_source::NodeSource;

use crate::cancel::CancellationToken;
use crate::children::{child_ids, children_of};
use crate::config::VisitorConfig;
use crate::error::VisitorError;
use crate::position::Position;

/// The identity handed to the visitor callback for each delivered node.
/// Deliberately thin: the callback only ever needs to know *which* node it
/// received, since the node itself is passed alongside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: NodeId,
}

/// What the visitor wants to happen after seeing a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Visit this node's children next.
    Continue,
    /// Skip this node's children, continue with its siblings.
    Prune,
    /// Stop the traversal immediately.
    Abort,
}

struct Shared {
    queue: Mutex<BinaryHeap<Reverse<(Position, NodeId)>>>,
    responses: Mutex<HashMap<NodeId, Node>>,
    response_ready: Condvar,
    capacity_available: Condvar,
    done: AtomicBool,
    throttle: usize,
}

/// Pops one request, fetches it, and (on success) enqueues its children.
/// Returns `false` if the queue had nothing to do.
///
/// `force` skips the capacity-throttle wait below. Only the consumer's own
/// self-prefetch (engine.rs's `'search` loop) ever passes `true`: the
/// consumer is the sole thread that drains `responses` and the sole thread
/// that notifies `capacity_available` after a drain, so if its own
/// self-prefetch call blocked on that same condition, nothing would be left
/// to wake it — the exact deadlock self-prefetch exists to avoid. A worker
/// never forces; inserting one response past the throttle from the
/// consumer's own path is self-limiting (the consumer consumes it
/// immediately), unlike an unbounded worker racing ahead of a slow consumer.
fn prefetch_once(
    source: &mut NodeSource,
    shared: &Shared,
    storage_pruning: bool,
    errors: &Sender<VisitorError>,
    force: bool,
) -> bool {
    let popped = shared.queue.lock().unwrap().pop();
    let (position, id) = match popped {
        Some(Reverse(pair)) => pair,
        None => return false,
    };
    match source.get(id) {
        Ok(node) => {
            let children = children_of(&node, &position, storage_pruning);
            {
                let mut responses = shared.responses.lock().unwrap();
                if !force {
                    while responses.len() > shared.throttle && !shared.done.load(Ordering::Acquire) {
                        responses = shared.capacity_available.wait(responses).unwrap();
                    }
                }
                responses.insert(id, node);
            }
            shared.response_ready.notify_all();
            if !children.is_empty() {
                let mut queue = shared.queue.lock().unwrap();
                for (child_position, child_id) in children {
                    queue.push(Reverse((child_position, child_id)));
                }
            }
        }
        Err(source_error) => {
            let _ = errors.send(VisitorError::from(source_error));
            shared.done.store(true, Ordering::Release);
            shared.response_ready.notify_all();
            shared.capacity_available.notify_all();
        }
    }
    true
}

fn worker_loop(
    mut source: NodeSource,
    shared: &Shared,
    barrier: &Barrier,
    batch_size: usize,
    storage_pruning: bool,
    errors: &Sender<VisitorError>,
) {
    loop {
        barrier.wait();
        if shared.done.load(Ordering::Acquire) {
            break;
        }
        for _ in 0..batch_size {
            if shared.done.load(Ordering::Acquire) {
                break;
            }
            if !prefetch_once(&mut source, shared, storage_pruning, errors, false) {
                break;
            }
        }
    }
    if let Err(close_err) = source.close() {
        let _ = errors.send(VisitorError::CloseFailed(close_err));
    }
}

/// Delivers every reachable node from `root` to `visitor` in pre-order
/// depth-first order, fetching nodes off disk through a pool of workers
/// that race ahead of the single-threaded consumer under a shared
/// priority queue.
///
/// From the visitor's perspective the result is indistinguishable from a
/// naive single-threaded walk: the concurrency only hides I/O latency.
#[tracing::instrument(skip(visitor_config, cancellation, visitor), fields(dir = %dir.display()))]
pub fn visit_all<F>(
    dir: &Path,
    trie_config: TrieConfig,
    visitor_config: VisitorConfig,
    root: NodeId,
    cancellation: &CancellationToken,
    mut visitor: F,
) -> Result<(), VisitorError>
where
    F: FnMut(&NodeInfo, &Node) -> Decision,
{
    if root.is_empty() {
        let info = NodeInfo { id: root };
        visitor(&info, &Node::Empty);
        return Ok(());
    }

    let mut consumer_source = NodeSource::open(dir, trie_config)?;
    let mut worker_sources = Vec::with_capacity(visitor_config.worker_count);
    for _ in 0..visitor_config.worker_count {
        worker_sources.push(NodeSource::open(dir, trie_config)?);
    }

    let shared = Shared {
        queue: Mutex::new(BinaryHeap::new()),
        responses: Mutex::new(HashMap::new()),
        response_ready: Condvar::new(),
        capacity_available: Condvar::new(),
        done: AtomicBool::new(false),
        throttle: visitor_config.throttle,
    };
    shared
        .queue
        .lock()
        .unwrap()
        .push(Reverse((Position::root(), root)));

    let (error_tx, error_rx) = unbounded::<VisitorError>();
    let consumer_error_tx = error_tx.clone();
    let barrier = Barrier::new(visitor_count(visitor_config.worker_count));

    let outcome: Result<(), VisitorError> = std::thread::scope(|scope| {
        for (i, source) in worker_sources.into_iter().enumerate() {
            let shared_ref = &shared;
            let barrier_ref = &barrier;
            let tx = error_tx.clone();
            let _ = Builder::new()
                .name(format!("trie-visitor-worker-{i}"))
                .spawn_scoped(scope, move || {
                    worker_loop(
                        source,
                        shared_ref,
                        barrier_ref,
                        visitor_config.batch_size,
                        visitor_config.storage_pruning,
                        &tx,
                    );
                });
        }
        drop(error_tx);

        let mut stack = vec![root];

        let result = loop {
            let cur = match stack.pop() {
                Some(cur) => cur,
                None => break Ok(()),
            };

            if cancellation.is_cancelled() {
                break Err(VisitorError::Cancelled);
            }

            let node = 'search: loop {
                {
                    let mut responses = shared.responses.lock().unwrap();
                    if let Some(node) = responses.remove(&cur) {
                        drop(responses);
                        shared.capacity_available.notify_all();
                        break 'search Some(node);
                    }
                    if shared.done.load(Ordering::Acquire) {
                        break 'search None;
                    }
                }
                if !prefetch_once(
                    &mut consumer_source,
                    &shared,
                    visitor_config.storage_pruning,
                    &consumer_error_tx,
                    true,
                ) {
                    let responses = shared.responses.lock().unwrap();
                    let _ = shared
                        .response_ready
                        .wait_timeout(responses, Duration::from_millis(5))
                        .unwrap();
                }
            };

            let node = match node {
                Some(node) => node,
                None => {
                    // A worker (or this consumer's own prefetch) hit a
                    // fatal error before `cur` was ever produced.
                    break if let Ok(err) = error_rx.try_recv() {
                        Err(err)
                    } else {
                        Err(VisitorError::Cancelled)
                    };
                }
            };

            let info = NodeInfo { id: cur };
            match visitor(&info, &node) {
                Decision::Abort => break Ok(()),
                Decision::Prune => {}
                Decision::Continue => {
                    let mut children = child_ids(&node, visitor_config.storage_pruning);
                    children.reverse();
                    stack.extend(children);
                }
            }
        };

        shared.done.store(true, Ordering::Release);
        shared.capacity_available.notify_all();
        result
    });

    // Every worker has already closed its own source inside `worker_loop`
    // (reporting any failure through `error_tx`) by the time the scope
    // above returns, since `thread::scope` joins all spawned threads
    // before yielding control back here. Only the consumer's source still
    // needs closing, and its result is joined onto the traversal's own
    // outcome rather than dropped, per the "close errors are joined with
    // the originating error" rule.
    let outcome = VisitorError::join_close(outcome, consumer_source.close());

    while let Ok(err) = error_rx.try_recv() {
        if outcome.is_ok() {
            return Err(err);
        }
    }

    outcome
}

fn visitor_count(worker_count: usize) -> usize {
    worker_count.max(1)
}
