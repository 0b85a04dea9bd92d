//! Collective coordination of cooperating workers.
//!
//! Metadata operations on a [`Dataset`](crate::dataset::Dataset) (create, open, flush, close) are *collective*:
//! every worker of a group issues the call, and it does not complete for any of them until all have issued it.
//! Workers exchange messages through a [`Communicator`], supplied by whatever launched them.
//!
//!  - [`SingleProcess`] is a group of one.
//!  - [`ThreadCommunicator`] is a group of workers running on threads of one process.
//!
//! There are no timeouts.
//! A worker that never reaches a collective call blocks every other worker of its group indefinitely.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use parking_lot::{Condvar, Mutex};

/// Collective communication between the workers of a group.
///
/// Every method is collective: all workers must call it, in the same order.
pub trait Communicator: Send + Sync + core::fmt::Debug {
    /// The zero-based rank of this worker.
    fn rank(&self) -> usize;

    /// The number of workers in the group.
    fn size(&self) -> usize;

    /// Contribute `bytes` and receive the contributions of every worker, indexed by rank.
    fn all_gather(&self, bytes: Vec<u8>) -> Vec<Vec<u8>>;

    /// Block until every worker has called `barrier`.
    fn barrier(&self) {
        self.all_gather(vec![]);
    }

    /// Receive the `bytes` contributed by worker `root`. The `bytes` of other workers are ignored.
    ///
    /// Returns empty bytes if `root` is not a rank of the group.
    fn broadcast(&self, root: usize, bytes: Vec<u8>) -> Vec<u8> {
        let bytes = if self.rank() == root { bytes } else { vec![] };
        self.all_gather(bytes)
            .into_iter()
            .nth(root)
            .unwrap_or_default()
    }

    /// Contribute `value` and receive the values of every worker, indexed by rank.
    fn all_gather_u64(&self, value: u64) -> Vec<u64> {
        self.all_gather(value.to_le_bytes().to_vec())
            .iter()
            .map(|bytes| {
                let mut bytes = bytes.as_slice();
                if bytes.remaining() >= 8 {
                    bytes.get_u64_le()
                } else {
                    0
                }
            })
            .collect()
    }
}

/// A group of one worker.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather(&self, bytes: Vec<u8>) -> Vec<Vec<u8>> {
        vec![bytes]
    }
}

#[derive(Debug)]
struct GroupState {
    generation: u64,
    arrived: usize,
    slots: Vec<Vec<u8>>,
    gathered: Arc<Vec<Vec<u8>>>,
}

#[derive(Debug)]
struct Group {
    size: usize,
    state: Mutex<GroupState>,
    condvar: Condvar,
}

/// A group of workers running on threads of one process.
///
/// Each member is moved to its own thread.
/// ```rust
/// # use densefile::collective::{Communicator, ThreadCommunicator};
/// let ranks = ThreadCommunicator::run_group(4, |communicator| {
///     let gathered = communicator.all_gather(vec![communicator.rank() as u8]);
///     assert_eq!(gathered, vec![vec![0], vec![1], vec![2], vec![3]]);
///     communicator.rank()
/// });
/// assert_eq!(ranks, vec![0, 1, 2, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct ThreadCommunicator {
    rank: usize,
    group: Arc<Group>,
}

impl ThreadCommunicator {
    /// Create the members of a group of `size` workers, ordered by rank.
    #[must_use]
    pub fn group(size: usize) -> Vec<Self> {
        let group = Arc::new(Group {
            size,
            state: Mutex::new(GroupState {
                generation: 0,
                arrived: 0,
                slots: vec![vec![]; size],
                gathered: Arc::new(vec![]),
            }),
            condvar: Condvar::new(),
        });
        (0..size)
            .map(|rank| Self {
                rank,
                group: group.clone(),
            })
            .collect()
    }

    /// Run `worker` on each member of a group of `size` workers, each on its own scoped thread.
    ///
    /// Returns the result of each worker, ordered by rank.
    ///
    /// # Panics
    /// Panics if a worker panics.
    pub fn run_group<T, F>(size: usize, worker: F) -> Vec<T>
    where
        T: Send,
        F: Fn(Self) -> T + Sync,
    {
        let worker = &worker;
        std::thread::scope(|scope| {
            let handles: Vec<_> = Self::group(size)
                .into_iter()
                .map(|communicator| scope.spawn(move || worker(communicator)))
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.group.size
    }

    fn all_gather(&self, bytes: Vec<u8>) -> Vec<Vec<u8>> {
        let mut state = self.group.state.lock();
        let generation = state.generation;
        state.slots[self.rank] = bytes;
        state.arrived += 1;
        if state.arrived == self.group.size {
            let gathered = std::mem::replace(&mut state.slots, vec![vec![]; self.group.size]);
            state.gathered = Arc::new(gathered);
            state.arrived = 0;
            state.generation += 1;
            self.group.condvar.notify_all();
        } else {
            while state.generation == generation {
                self.group.condvar.wait(&mut state);
            }
        }
        // The next generation cannot complete until this worker contributes to it
        state.gathered.as_ref().clone()
    }
}

/// Pack byte frames into one message: a little-endian `u64` frame count, then each frame prefixed by its `u64` length.
pub(crate) fn pack_frames(frames: &[Vec<u8>]) -> Vec<u8> {
    let len = 8 + frames.iter().map(|frame| 8 + frame.len()).sum::<usize>();
    let mut message = BytesMut::with_capacity(len);
    message.put_u64_le(frames.len() as u64);
    for frame in frames {
        message.put_u64_le(frame.len() as u64);
        message.put_slice(frame);
    }
    message.to_vec()
}

/// Unpack a message packed with [`pack_frames`].
///
/// Returns [`None`] if the message is malformed.
pub(crate) fn unpack_frames(mut message: &[u8]) -> Option<Vec<Vec<u8>>> {
    if message.remaining() < 8 {
        return None;
    }
    let count = usize::try_from(message.get_u64_le()).ok()?;
    let mut frames = Vec::with_capacity(count.min(message.remaining() / 8));
    for _ in 0..count {
        if message.remaining() < 8 {
            return None;
        }
        let len = usize::try_from(message.get_u64_le()).ok()?;
        if message.remaining() < len {
            return None;
        }
        frames.push(message[..len].to_vec());
        message.advance(len);
    }
    message.is_empty().then_some(frames)
}
