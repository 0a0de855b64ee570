//! Participant topology and collective operations
//!
//! A completion run is a group of participants, each owning one layer of
//! mode-0 slices. Everything the run needs from its peers is expressed with
//! one primitive, [`Communicator::exchange`]: every participant contributes a
//! buffer and receives the buffers of all participants in rank order. Sums,
//! counts, agreement flags and gathers are built on top of it.
//!
//! - [`SoloCommunicator`]: topology of one, every collective is the identity
//! - [`LocalCommunicator`]: in-process group of threads synchronized with a
//!   generation barrier
//!
//! Collectives must be called by every participant of the group in the same
//! order.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Collective communication between the participants of a run
pub trait Communicator: Send + Sync {
    /// Index of this participant, `0..world_size()`
    fn rank(&self) -> usize;

    /// Number of participants
    fn world_size(&self) -> usize;

    /// Contribute `local` and receive every participant's buffer, in rank order
    fn exchange(&self, local: Vec<f64>) -> Vec<Vec<f64>>;

    /// Whether this participant is the one that prints and writes
    fn is_root(&self) -> bool {
        self.rank() == 0
    }

    /// Elementwise sum of `values` over all participants, in place
    ///
    /// Contributions are added in rank order, so every participant gets the
    /// same bits.
    fn all_reduce_sum(&self, values: &mut [f64]) {
        if self.world_size() == 1 {
            return;
        }
        let all = self.exchange(values.to_vec());
        values.iter_mut().for_each(|v| *v = 0.0);
        for contribution in &all {
            for (v, c) in values.iter_mut().zip(contribution) {
                *v += c;
            }
        }
    }

    /// Sum of a count over all participants
    fn all_reduce_count(&self, count: usize) -> usize {
        if self.world_size() == 1 {
            return count;
        }
        self.exchange(vec![count as f64])
            .iter()
            .map(|c| c.first().copied().unwrap_or(0.0) as usize)
            .sum()
    }

    /// Whether `flag` is set on any participant
    ///
    /// A missing contribution counts as set.
    fn any(&self, flag: bool) -> bool {
        if self.world_size() == 1 {
            return flag;
        }
        self.exchange(vec![if flag { 1.0 } else { 0.0 }])
            .iter()
            .any(|c| c.first().map_or(true, |&v| v != 0.0))
    }

    /// Collect every participant's buffer on the root
    ///
    /// Returns the buffers in rank order on the root and `None` elsewhere.
    fn gather(&self, local: Vec<f64>) -> Option<Vec<Vec<f64>>> {
        let all = if self.world_size() == 1 {
            vec![local]
        } else {
            self.exchange(local)
        };
        self.is_root().then_some(all)
    }
}

/// Topology of one
#[derive(Debug, Clone, Copy, Default)]
pub struct SoloCommunicator;

impl Communicator for SoloCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn exchange(&self, local: Vec<f64>) -> Vec<Vec<f64>> {
        vec![local]
    }
}

struct GroupState {
    buffers: Vec<Option<Vec<f64>>>,
    arrived: usize,
    departed: usize,
    generation: u64,
}

struct SharedState {
    state: Mutex<GroupState>,
    cond: Condvar,
}

impl SharedState {
    /// Block until every participant still in the group has arrived
    fn wait(&self, world_size: usize) {
        let mut state = self.state.lock();
        state.arrived += 1;
        if state.arrived + state.departed >= world_size {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cond.notify_all();
            return;
        }
        let generation = state.generation;
        while state.generation == generation {
            self.cond.wait(&mut state);
        }
    }
}

/// One member of an in-process participant group
///
/// A member that calls [`LocalCommunicator::leave`] no longer takes part in
/// collectives. Its contribution to later exchanges is an empty buffer, and
/// [`Communicator::any`] reads that as a raised flag.
///
/// # Examples
///
/// ```
/// use tenrso_completion::topology::{Communicator, LocalCommunicator};
///
/// let comms = LocalCommunicator::group(3);
/// let totals: Vec<usize> = std::thread::scope(|s| {
///     let handles: Vec<_> = comms
///         .iter()
///         .map(|comm| s.spawn(move || comm.all_reduce_count(comm.rank() + 1)))
///         .collect();
///     handles.into_iter().map(|h| h.join().unwrap()).collect()
/// });
/// assert_eq!(totals, vec![6, 6, 6]);
/// ```
pub struct LocalCommunicator {
    rank: usize,
    world_size: usize,
    shared: Arc<SharedState>,
}

impl LocalCommunicator {
    /// Create the communicators of a group of `world_size` participants
    pub fn group(world_size: usize) -> Vec<Self> {
        let world_size = world_size.max(1);
        let shared = Arc::new(SharedState {
            state: Mutex::new(GroupState {
                buffers: vec![None; world_size],
                arrived: 0,
                departed: 0,
                generation: 0,
            }),
            cond: Condvar::new(),
        });

        (0..world_size)
            .map(|rank| Self {
                rank,
                world_size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Withdraw from the group so the remaining members are not blocked
    ///
    /// Must not be followed by further collectives on this member.
    pub fn leave(&self) {
        let mut state = self.shared.state.lock();
        state.buffers[self.rank] = None;
        state.departed += 1;
        if state.arrived > 0 && state.arrived + state.departed >= self.world_size {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.shared.cond.notify_all();
        }
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn exchange(&self, local: Vec<f64>) -> Vec<Vec<f64>> {
        self.shared.state.lock().buffers[self.rank] = Some(local);

        // all contributions written
        self.shared.wait(self.world_size);

        let all = self
            .shared
            .state
            .lock()
            .buffers
            .iter()
            .map(|buf| buf.clone().unwrap_or_default())
            .collect();

        // all contributions read before the next exchange overwrites them
        self.shared.wait(self.world_size);

        all
    }
}
