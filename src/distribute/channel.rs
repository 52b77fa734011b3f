use std::sync::mpsc::{Receiver, Sender, channel};

use crate::buffer::Dimensions;
use crate::distribute::{Communicator, Replicate};
use crate::foundation::core::WorkerId;
use crate::foundation::error::{CrossfadeError, CrossfadeResult};

#[derive(Debug)]
enum Msg {
    Dimensions(Dimensions),
    Buffer(Vec<u8>),
    Go,
}

struct Peer {
    tx: Sender<Msg>,
    ack: Receiver<()>,
}

enum Role {
    Owner(Vec<Peer>),
    Member { inbox: Receiver<Msg>, ack: Sender<()> },
}

/// In-process group whose ranks exchange owned messages over channels.
///
/// Ranks share no buffers: every receiver ends up with its own copy, the same as separate
/// processes would. Used for the thread-launched distributed backend and for tests.
pub struct ChannelCommunicator {
    rank: WorkerId,
    size: usize,
    role: Role,
}

impl ChannelCommunicator {
    /// Build a connected group of `size` endpoints, indexed by rank.
    pub fn group(size: usize) -> CrossfadeResult<Vec<ChannelCommunicator>> {
        if size == 0 {
            return Err(CrossfadeError::validation("group size must be >= 1"));
        }
        let mut peers = Vec::with_capacity(size - 1);
        let mut members = Vec::with_capacity(size - 1);
        for r in 1..size {
            let (tx, inbox) = channel::<Msg>();
            let (ack_tx, ack_rx) = channel::<()>();
            peers.push(Peer { tx, ack: ack_rx });
            members.push(ChannelCommunicator {
                rank: WorkerId(r),
                size,
                role: Role::Member { inbox, ack: ack_tx },
            });
        }

        let mut out = Vec::with_capacity(size);
        out.push(ChannelCommunicator {
            rank: WorkerId::OWNER,
            size,
            role: Role::Owner(peers),
        });
        out.extend(members);
        Ok(out)
    }

    fn broadcast(peers: &[Peer], mut make: impl FnMut() -> Msg) -> CrossfadeResult<()> {
        for (i, peer) in peers.iter().enumerate() {
            peer.tx.send(make()).map_err(|_| {
                CrossfadeError::distribution(format!("rank {} is no longer receiving", i + 1))
            })?;
        }
        Ok(())
    }

    fn recv(inbox: &Receiver<Msg>, rank: WorkerId) -> CrossfadeResult<Msg> {
        inbox.recv().map_err(|_| {
            CrossfadeError::distribution(format!("rank {rank}: owner hung up during replication"))
        })
    }
}

impl Communicator for ChannelCommunicator {
    fn rank(&self) -> WorkerId {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn announce_dimensions(&mut self, dims: Option<Dimensions>) -> CrossfadeResult<Dimensions> {
        match (&self.role, dims) {
            (Role::Owner(peers), Some(d)) => {
                Self::broadcast(peers, || Msg::Dimensions(d))?;
                Ok(d)
            }
            (Role::Owner(_), None) => Err(CrossfadeError::distribution(
                "owner did not provide dimensions",
            )),
            (Role::Member { inbox, .. }, _) => match Self::recv(inbox, self.rank)? {
                Msg::Dimensions(d) => Ok(d),
                other => Err(CrossfadeError::distribution(format!(
                    "rank {}: expected dimensions, got {other:?}",
                    self.rank
                ))),
            },
        }
    }

    fn replicate_buffer(&mut self, op: Replicate<'_>) -> CrossfadeResult<()> {
        match (&self.role, op) {
            (Role::Owner(peers), Replicate::Send(bytes)) => {
                Self::broadcast(peers, || Msg::Buffer(bytes.to_vec()))
            }
            (Role::Member { inbox, .. }, Replicate::Receive(dst)) => {
                match Self::recv(inbox, self.rank)? {
                    Msg::Buffer(bytes) if bytes.len() == dst.len() => {
                        dst.copy_from_slice(&bytes);
                        Ok(())
                    }
                    Msg::Buffer(bytes) => Err(CrossfadeError::distribution(format!(
                        "rank {}: buffer size mismatch: announced {} bytes, received {}",
                        self.rank,
                        dst.len(),
                        bytes.len()
                    ))),
                    other => Err(CrossfadeError::distribution(format!(
                        "rank {}: expected a buffer, got {other:?}",
                        self.rank
                    ))),
                }
            }
            _ => Err(CrossfadeError::distribution(format!(
                "rank {}: replication direction does not match role",
                self.rank
            ))),
        }
    }

    fn barrier(&mut self) -> CrossfadeResult<()> {
        match &self.role {
            Role::Owner(peers) => {
                for (i, peer) in peers.iter().enumerate() {
                    peer.ack.recv().map_err(|_| {
                        CrossfadeError::distribution(format!(
                            "rank {} left before reaching the barrier",
                            i + 1
                        ))
                    })?;
                }
                Self::broadcast(peers, || Msg::Go)
            }
            Role::Member { inbox, ack } => {
                ack.send(()).map_err(|_| {
                    CrossfadeError::distribution(format!(
                        "rank {}: owner hung up at the barrier",
                        self.rank
                    ))
                })?;
                match Self::recv(inbox, self.rank)? {
                    Msg::Go => Ok(()),
                    other => Err(CrossfadeError::distribution(format!(
                        "rank {}: expected go, got {other:?}",
                        self.rank
                    ))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{ImageBuffer, SourceBuffers};
    use crate::distribute::replicate_sources;

    #[test]
    fn every_rank_receives_an_identical_copy() {
        let dims = Dimensions::new(3, 2).unwrap();
        let src = SourceBuffers::from_color(
            ImageBuffer::from_raw(dims, (0u8..18).map(|v| v * 13).collect()).unwrap(),
        );

        let mut group = ChannelCommunicator::group(4).unwrap().into_iter();
        let mut owner = group.next().unwrap();
        let received = std::thread::scope(|scope| {
            let handles: Vec<_> = group
                .map(|mut comm| {
                    scope.spawn(move || replicate_sources(&mut comm, None).map(|c| c.into_owned()))
                })
                .collect();
            replicate_sources(&mut owner, Some(&src)).unwrap();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect::<Vec<_>>()
        });

        assert_eq!(received.len(), 3);
        for copy in received {
            assert_eq!(copy, src);
        }
    }

    #[test]
    fn members_fail_when_owner_aborts() {
        let mut group = ChannelCommunicator::group(2).unwrap();
        let mut member = group.pop().unwrap();
        let mut owner = group.pop().unwrap();

        assert!(replicate_sources(&mut owner, None).is_err());
        drop(owner);
        let err = replicate_sources(&mut member, None).unwrap_err();
        assert!(matches!(err, CrossfadeError::Distribution(_)), "{err}");
    }

    #[test]
    fn short_buffer_is_rejected() {
        let mut group = ChannelCommunicator::group(2).unwrap();
        let mut member = group.pop().unwrap();
        let mut owner = group.pop().unwrap();

        let dims = Dimensions::new(1, 1).unwrap();
        owner.announce_dimensions(Some(dims)).unwrap();
        owner.replicate_buffer(Replicate::Send(&[1, 2])).unwrap();

        assert_eq!(member.announce_dimensions(None).unwrap(), dims);
        let mut dst = vec![0u8; dims.sample_len()];
        let err = member
            .replicate_buffer(Replicate::Receive(&mut dst))
            .unwrap_err();
        assert!(err.to_string().contains("mismatch"), "{err}");
    }
}
