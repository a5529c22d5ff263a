//! A communicator whose ranks are threads of one process.
//!
//! Each worker rank has one channel up to the root and one channel down from
//! it. The root receives from workers in rank order, which is all that's
//! needed to keep gathered records in rank order.

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::trace;

use super::{CommError, Communicator, ROOT_RANK};

enum Packet {
    F64(Vec<f64>),
    I32(Vec<i32>),
    U64(Vec<u64>),
    Barrier,
}

impl Packet {
    fn kind(&self) -> &'static str {
        match self {
            Packet::F64(_) => "f64",
            Packet::I32(_) => "i32",
            Packet::U64(_) => "u64",
            Packet::Barrier => "barrier",
        }
    }
}

enum Link {
    Root {
        /// Indexed by `rank - 1`.
        from_workers: Vec<Receiver<Packet>>,
        /// Indexed by `rank - 1`.
        to_workers: Vec<Sender<Packet>>,
    },

    Worker {
        to_root: Sender<Packet>,
        from_root: Receiver<Packet>,
    },
}

/// One rank of an in-process communicator group. Create the whole group with
/// [`ThreadComm::group`] and move each member onto its own thread.
pub struct ThreadComm {
    rank: usize,
    size: usize,
    link: Link,
}

impl ThreadComm {
    /// Create `size` connected ranks. The returned vector is in rank order.
    pub fn group(size: usize) -> Result<Vec<ThreadComm>, CommError> {
        if size == 0 {
            return Err(CommError::EmptyGroup);
        }

        let mut from_workers = Vec::with_capacity(size - 1);
        let mut to_workers = Vec::with_capacity(size - 1);
        let mut workers = Vec::with_capacity(size - 1);
        for rank in 1..size {
            let (up_tx, up_rx) = unbounded();
            let (down_tx, down_rx) = unbounded();
            from_workers.push(up_rx);
            to_workers.push(down_tx);
            workers.push(ThreadComm {
                rank,
                size,
                link: Link::Worker {
                    to_root: up_tx,
                    from_root: down_rx,
                },
            });
        }

        let mut group = Vec::with_capacity(size);
        group.push(ThreadComm {
            rank: ROOT_RANK,
            size,
            link: Link::Root {
                from_workers,
                to_workers,
            },
        });
        group.extend(workers);
        Ok(group)
    }

    fn send_up(&self, to_root: &Sender<Packet>, packet: Packet) -> Result<(), CommError> {
        to_root.send(packet).map_err(|_| CommError::Disconnected {
            rank: self.rank,
            peer: ROOT_RANK,
        })
    }

    fn recv(&self, rx: &Receiver<Packet>, peer: usize) -> Result<Packet, CommError> {
        rx.recv().map_err(|_| CommError::Disconnected {
            rank: self.rank,
            peer,
        })
    }

    fn unexpected(&self, peer: usize, expected: &'static str) -> CommError {
        CommError::UnexpectedPacket {
            rank: self.rank,
            peer,
            expected,
        }
    }

    /// Gather packets from every worker (in rank order) onto the root.
    /// `unwrap_packet` pulls the payload out of a packet, returning `None` for
    /// the wrong kind.
    fn gather_packets<T, F>(
        &self,
        local: &[T],
        wrap: fn(Vec<T>) -> Packet,
        expected: &'static str,
        unwrap_packet: F,
    ) -> Result<Option<Vec<Vec<T>>>, CommError>
    where
        T: Clone,
        F: Fn(Packet) -> Option<Vec<T>>,
    {
        match &self.link {
            Link::Worker { to_root, .. } => {
                self.send_up(to_root, wrap(local.to_vec()))?;
                Ok(None)
            }

            Link::Root { from_workers, .. } => {
                let mut parts = Vec::with_capacity(self.size);
                parts.push(local.to_vec());
                for (i, rx) in from_workers.iter().enumerate() {
                    let peer = i + 1;
                    let packet = self.recv(rx, peer)?;
                    let part = unwrap_packet(packet)
                        .ok_or_else(|| self.unexpected(peer, expected))?;
                    trace!("Gathered {} {expected} values from rank {peer}", part.len());
                    parts.push(part);
                }
                Ok(Some(parts))
            }
        }
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn gather_f64(&self, local: &[f64]) -> Result<Option<Vec<f64>>, CommError> {
        let parts = self.gather_packets(local, Packet::F64, "f64", |p| match p {
            Packet::F64(v) => Some(v),
            _ => None,
        })?;
        Ok(parts.map(|p| p.concat()))
    }

    fn gather_i32(&self, local: &[i32]) -> Result<Option<Vec<i32>>, CommError> {
        let parts = self.gather_packets(local, Packet::I32, "i32", |p| match p {
            Packet::I32(v) => Some(v),
            _ => None,
        })?;
        Ok(parts.map(|p| p.concat()))
    }

    fn reduce_sum_u64(&self, local: &[u64]) -> Result<Option<Vec<u64>>, CommError> {
        let parts = match self.gather_packets(local, Packet::U64, "u64", |p| match p {
            Packet::U64(v) => Some(v),
            _ => None,
        })? {
            Some(parts) => parts,
            None => return Ok(None),
        };

        let mut sum = local.to_vec();
        for (peer, part) in parts.iter().enumerate().skip(1) {
            if part.len() != sum.len() {
                return Err(CommError::ShapeMismatch {
                    peer,
                    got: part.len(),
                    expected: sum.len(),
                });
            }
            sum.iter_mut().zip(part).for_each(|(s, p)| *s += p);
        }
        Ok(Some(sum))
    }

    fn all_reduce_sum(&self, local: u64) -> Result<u64, CommError> {
        match &self.link {
            Link::Worker { to_root, from_root } => {
                self.send_up(to_root, Packet::U64(vec![local]))?;
                match self.recv(from_root, ROOT_RANK)? {
                    Packet::U64(v) if v.len() == 1 => Ok(v[0]),
                    _ => Err(self.unexpected(ROOT_RANK, "u64")),
                }
            }

            Link::Root { to_workers, .. } => {
                let total = self
                    .reduce_sum_u64(&[local])?
                    .and_then(|v| v.first().copied())
                    .unwrap_or(local);
                for (i, tx) in to_workers.iter().enumerate() {
                    tx.send(Packet::U64(vec![total]))
                        .map_err(|_| CommError::Disconnected {
                            rank: self.rank,
                            peer: i + 1,
                        })?;
                }
                Ok(total)
            }
        }
    }

    fn barrier(&self) -> Result<(), CommError> {
        match &self.link {
            Link::Worker { to_root, from_root } => {
                self.send_up(to_root, Packet::Barrier)?;
                match self.recv(from_root, ROOT_RANK)? {
                    Packet::Barrier => Ok(()),
                    other => {
                        trace!("rank {} got a {} packet at a barrier", self.rank, other.kind());
                        Err(self.unexpected(ROOT_RANK, "barrier"))
                    }
                }
            }

            Link::Root {
                from_workers,
                to_workers,
            } => {
                for (i, rx) in from_workers.iter().enumerate() {
                    match self.recv(rx, i + 1)? {
                        Packet::Barrier => (),
                        _ => return Err(self.unexpected(i + 1, "barrier")),
                    }
                }
                for (i, tx) in to_workers.iter().enumerate() {
                    tx.send(Packet::Barrier)
                        .map_err(|_| CommError::Disconnected {
                            rank: self.rank,
                            peer: i + 1,
                        })?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread::scope;

    use super::*;

    /// Run `f` once per rank of a fresh group, returning each rank's result in
    /// rank order.
    fn run_group<T: Send, F>(size: usize, f: F) -> Vec<T>
    where
        F: Fn(ThreadComm) -> T + Sync,
    {
        let group = ThreadComm::group(size).unwrap();
        scope(|s| {
            let handles: Vec<_> = group
                .into_iter()
                .map(|comm| {
                    let f = &f;
                    s.spawn(move || f(comm))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn empty_group_is_an_error() {
        assert!(matches!(ThreadComm::group(0), Err(CommError::EmptyGroup)));
    }

    #[test]
    fn gather_preserves_rank_order_and_offsets() {
        for size in 1..=4 {
            // Rank r contributes r + 2 values, each encoding (rank, index).
            let results = run_group(size, |comm| {
                let r = comm.rank();
                let local: Vec<f64> = (0..r + 2).map(|i| (100 * r + i) as f64).collect();
                comm.gather_f64(&local).unwrap()
            });

            let gathered = results[0].as_ref().unwrap();
            let counts: Vec<usize> = (0..size).map(|r| r + 2).collect();
            assert_eq!(gathered.len(), counts.iter().sum::<usize>());
            let mut offset = 0;
            for (r, &n) in counts.iter().enumerate() {
                for i in 0..n {
                    assert_eq!(gathered[offset + i], (100 * r + i) as f64);
                }
                offset += n;
            }
            assert!(results[1..].iter().all(|r| r.is_none()));
        }
    }

    #[test]
    fn gather_handles_empty_partitions() {
        let results = run_group(3, |comm| {
            let local: Vec<i32> = if comm.rank() == 1 {
                vec![]
            } else {
                vec![comm.rank() as i32; 2]
            };
            comm.gather_i32(&local).unwrap()
        });
        assert_eq!(results[0], Some(vec![0, 0, 2, 2]));
    }

    #[test]
    fn reduce_and_all_reduce_sum() {
        let results = run_group(3, |comm| {
            let r = comm.rank() as u64;
            let reduced = comm.reduce_sum_u64(&[r, 1, 10 * r]).unwrap();
            let total = comm.all_reduce_sum(r + 1).unwrap();
            comm.barrier().unwrap();
            (reduced, total)
        });
        assert_eq!(results[0].0, Some(vec![3, 3, 30]));
        assert!(results[1].0.is_none());
        assert!(results.iter().all(|(_, total)| *total == 6));
    }

    #[test]
    fn reduce_rejects_mismatched_shapes() {
        let results = run_group(2, |comm| {
            let local = vec![1; comm.rank() + 1];
            comm.reduce_sum_u64(&local)
        });
        assert!(matches!(results[0], Err(CommError::ShapeMismatch { peer: 1, .. })));
    }

    #[test]
    fn crashed_worker_is_fatal() {
        let mut group = ThreadComm::group(2).unwrap();
        // Drop the worker without it ever taking part.
        group.truncate(1);
        let root = group.pop().unwrap();
        assert!(matches!(
            root.barrier(),
            Err(CommError::Disconnected { rank: 0, peer: 1 })
        ));
    }
}
