//! Collective operations over the partitions of an event set.
//!
//! Every partition owns a disjoint slice of the events. The only things they
//! ever do together are gather arrays to the root, sum-reduce arrays to the
//! root, and wait at a barrier. Files are only touched by the root; see
//! [`on_root`].

mod threaded;

pub use threaded::ThreadComm;

use thiserror::Error;

/// The partition that receives gathered/reduced data and writes files.
pub const ROOT_RANK: usize = 0;

#[derive(Error, Debug)]
pub enum CommError {
    #[error("a communicator group needs at least one rank")]
    EmptyGroup,

    #[error("rank {rank} lost its connection to rank {peer}; the collective can't complete")]
    Disconnected { rank: usize, peer: usize },

    #[error("rank {rank} expected a {expected} packet from rank {peer}, but got something else")]
    UnexpectedPacket {
        rank: usize,
        peer: usize,
        expected: &'static str,
    },

    #[error(
        "cannot reduce arrays of different lengths (rank {peer} sent {got}, expected {expected})"
    )]
    ShapeMismatch {
        peer: usize,
        got: usize,
        expected: usize,
    },
}

/// The collective operations needed to aggregate events across partitions.
///
/// All methods are collective: every rank of the group must call them in the
/// same order, otherwise the group deadlocks or reports
/// [`CommError::UnexpectedPacket`].
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == ROOT_RANK
    }

    /// Concatenate every rank's `local` on the root, in rank order. Non-root
    /// ranks get `None`.
    fn gather_f64(&self, local: &[f64]) -> Result<Option<Vec<f64>>, CommError>;

    /// As [`Communicator::gather_f64`], for integer columns.
    fn gather_i32(&self, local: &[i32]) -> Result<Option<Vec<i32>>, CommError>;

    /// Elementwise sum of every rank's `local` on the root. All ranks must
    /// supply the same length.
    fn reduce_sum_u64(&self, local: &[u64]) -> Result<Option<Vec<u64>>, CommError>;

    /// Sum of every rank's `local`, returned to all ranks.
    fn all_reduce_sum(&self, local: u64) -> Result<u64, CommError>;

    fn barrier(&self) -> Result<(), CommError>;
}

/// The communicator of a run without any parallelism. Every collective is the
/// identity on local data.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        ROOT_RANK
    }

    fn size(&self) -> usize {
        1
    }

    fn gather_f64(&self, local: &[f64]) -> Result<Option<Vec<f64>>, CommError> {
        Ok(Some(local.to_vec()))
    }

    fn gather_i32(&self, local: &[i32]) -> Result<Option<Vec<i32>>, CommError> {
        Ok(Some(local.to_vec()))
    }

    fn reduce_sum_u64(&self, local: &[u64]) -> Result<Option<Vec<u64>>, CommError> {
        Ok(Some(local.to_vec()))
    }

    fn all_reduce_sum(&self, local: u64) -> Result<u64, CommError> {
        Ok(local)
    }

    fn barrier(&self) -> Result<(), CommError> {
        Ok(())
    }
}

/// Run `f` on the root rank only, then hold every rank at a barrier until the
/// root is done. The root gets `Some` of whatever `f` returned; everyone else
/// gets `None`.
///
/// The barrier is reached even if `f` fails, so other ranks never wait on a
/// root that has given up. `f`'s error is reported after the barrier.
pub fn on_root<T, E, F>(comm: &dyn Communicator, f: F) -> Result<Option<T>, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<CommError>,
{
    let result = if comm.is_root() { Some(f()) } else { None };
    comm.barrier()?;
    result.transpose()
}

/// The half-open range of rows that `rank` should read out of `num_rows` rows
/// shared by `size` ranks.
pub(crate) fn partition_rows(num_rows: usize, rank: usize, size: usize) -> std::ops::Range<usize> {
    let start = rank * num_rows / size;
    let end = (rank + 1) * num_rows / size;
    start..end
}
