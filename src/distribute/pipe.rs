use std::io::{Read, Write};

use crate::buffer::Dimensions;
use crate::distribute::wire::{self, Control};
use crate::distribute::{Communicator, Replicate};
use crate::foundation::core::WorkerId;
use crate::foundation::error::{CrossfadeError, CrossfadeResult};

/// A byte-stream connection to one peer.
pub struct PipeLink<R, W> {
    /// The rank on the other end.
    pub peer: WorkerId,
    pub reader: R,
    pub writer: W,
}

/// Prefix a distribution failure with the peer it happened on.
fn at_peer(peer: WorkerId) -> impl FnOnce(CrossfadeError) -> CrossfadeError {
    move |e| match e {
        CrossfadeError::Distribution(msg) => {
            CrossfadeError::distribution(format!("rank {peer}: {msg}"))
        }
        other => other,
    }
}

enum Role<R, W> {
    Owner(Vec<PipeLink<R, W>>),
    Member(PipeLink<R, W>),
}

/// Communicator over byte streams, speaking the [`wire`] protocol.
///
/// The owner holds one link per worker process (child stdin/stdout); a worker holds a single
/// link back to the owner (its own stdin/stdout).
pub struct PipeCommunicator<R, W> {
    rank: WorkerId,
    size: usize,
    role: Role<R, W>,
}

impl<R: Read + Send, W: Write + Send> PipeCommunicator<R, W> {
    /// Owner endpoint. `links` must cover ranks `1..size` exactly once.
    pub fn owner(size: usize, links: Vec<PipeLink<R, W>>) -> CrossfadeResult<Self> {
        if links.len() + 1 != size {
            return Err(CrossfadeError::validation(format!(
                "owner of a {size}-rank group needs {} links, got {}",
                size.saturating_sub(1),
                links.len()
            )));
        }
        let mut ranks: Vec<usize> = links.iter().map(|l| l.peer.0).collect();
        ranks.sort_unstable();
        if ranks.iter().copied().ne(1..size) {
            return Err(CrossfadeError::validation(
                "owner links must cover ranks 1..size exactly once",
            ));
        }
        Ok(Self {
            rank: WorkerId::OWNER,
            size,
            role: Role::Owner(links),
        })
    }

    /// Worker endpoint for `rank`, linked to the owner.
    pub fn member(rank: WorkerId, size: usize, reader: R, writer: W) -> CrossfadeResult<Self> {
        if rank.is_owner() || rank.0 >= size {
            return Err(CrossfadeError::validation(format!(
                "member rank {rank} invalid for a {size}-rank group"
            )));
        }
        Ok(Self {
            rank,
            size,
            role: Role::Member(PipeLink {
                peer: WorkerId::OWNER,
                reader,
                writer,
            }),
        })
    }
}

impl<R: Read + Send, W: Write + Send> Communicator for PipeCommunicator<R, W> {
    fn rank(&self) -> WorkerId {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn announce_dimensions(&mut self, dims: Option<Dimensions>) -> CrossfadeResult<Dimensions> {
        match (&mut self.role, dims) {
            (Role::Owner(links), Some(d)) => {
                for link in links.iter_mut() {
                    wire::write_control(&mut link.writer, Control::Dimensions(d))
                        .map_err(at_peer(link.peer))?;
                }
                Ok(d)
            }
            (Role::Owner(_), None) => Err(CrossfadeError::distribution(
                "owner did not provide dimensions",
            )),
            (Role::Member(link), _) => match wire::read_control(&mut link.reader)? {
                Control::Dimensions(d) => Ok(d),
                other => Err(CrossfadeError::distribution(format!(
                    "rank {}: expected dimensions, got {other:?}",
                    self.rank
                ))),
            },
        }
    }

    fn replicate_buffer(&mut self, op: Replicate<'_>) -> CrossfadeResult<()> {
        match (&mut self.role, op) {
            (Role::Owner(links), Replicate::Send(bytes)) => {
                for link in links.iter_mut() {
                    wire::write_buffer(&mut link.writer, bytes).map_err(at_peer(link.peer))?;
                }
                Ok(())
            }
            (Role::Member(link), Replicate::Receive(dst)) => {
                wire::read_buffer_into(&mut link.reader, dst)
            }
            _ => Err(CrossfadeError::distribution(format!(
                "rank {}: replication direction does not match role",
                self.rank
            ))),
        }
    }

    fn barrier(&mut self) -> CrossfadeResult<()> {
        match &mut self.role {
            Role::Owner(links) => {
                for link in links.iter_mut() {
                    match wire::read_control(&mut link.reader).map_err(at_peer(link.peer))? {
                        Control::Ack(r) if r == link.peer => {}
                        other => {
                            return Err(CrossfadeError::distribution(format!(
                                "rank {}: expected ack, got {other:?}",
                                link.peer
                            )));
                        }
                    }
                }
                for link in links.iter_mut() {
                    wire::write_control(&mut link.writer, Control::Go)
                        .map_err(at_peer(link.peer))?;
                }
                Ok(())
            }
            Role::Member(link) => {
                wire::write_control(&mut link.writer, Control::Ack(self.rank))?;
                match wire::read_control(&mut link.reader)? {
                    Control::Go => Ok(()),
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
    use std::io::{PipeReader, PipeWriter, pipe};

    type Endpoint = PipeCommunicator<PipeReader, PipeWriter>;

    fn connected(size: usize) -> (Endpoint, Vec<Endpoint>) {
        let mut links = Vec::new();
        let mut members = Vec::new();
        for r in 1..size {
            let (down_r, down_w) = pipe().unwrap();
            let (up_r, up_w) = pipe().unwrap();
            links.push(PipeLink {
                peer: WorkerId(r),
                reader: up_r,
                writer: down_w,
            });
            members.push(PipeCommunicator::member(WorkerId(r), size, down_r, up_w).unwrap());
        }
        (PipeCommunicator::owner(size, links).unwrap(), members)
    }

    #[test]
    fn replication_over_pipes_yields_identical_copies() {
        let dims = Dimensions::new(4, 3).unwrap();
        let src = SourceBuffers::from_color(
            ImageBuffer::from_raw(dims, (0..dims.sample_len()).map(|i| i as u8).collect())
                .unwrap(),
        );
        let (mut owner, members) = connected(3);

        let copies = std::thread::scope(|scope| {
            let handles: Vec<_> = members
                .into_iter()
                .map(|mut m| {
                    scope.spawn(move || replicate_sources(&mut m, None).map(|c| c.into_owned()))
                })
                .collect();
            replicate_sources(&mut owner, Some(&src)).unwrap();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect::<Vec<_>>()
        });

        assert_eq!(copies.len(), 2);
        assert!(copies.iter().all(|c| *c == src));
    }

    #[test]
    fn member_fails_when_owner_closes_early() {
        let (owner, mut members) = connected(2);
        drop(owner);
        let mut m = members.pop().unwrap();
        let err = replicate_sources(&mut m, None).unwrap_err();
        assert!(matches!(err, CrossfadeError::Distribution(_)), "{err}");
    }

    #[test]
    fn owner_send_failure_names_the_rank() {
        let (mut owner, mut members) = connected(3);
        drop(members.pop());
        let err = owner
            .announce_dimensions(Some(Dimensions::new(2, 2).unwrap()))
            .unwrap_err();
        assert!(matches!(err, CrossfadeError::Distribution(_)), "{err}");
        assert!(err.to_string().contains("rank 2: failed to send"), "{err}");
    }

    #[test]
    fn go_broadcast_failure_names_the_rank() {
        let (up_r, mut up_w) = pipe().unwrap();
        let (down_r, down_w) = pipe().unwrap();
        let links = vec![PipeLink {
            peer: WorkerId(1),
            reader: up_r,
            writer: down_w,
        }];
        let mut owner = PipeCommunicator::owner(2, links).unwrap();
        wire::write_control(&mut up_w, Control::Ack(WorkerId(1))).unwrap();
        drop(down_r);

        let err = owner.barrier().unwrap_err();
        assert!(err.to_string().contains("rank 1: failed to send Go"), "{err}");
    }

    #[test]
    fn owner_rejects_incomplete_links() {
        let (down_r, _down_w) = pipe().unwrap();
        let (_up_r, up_w) = pipe().unwrap();
        let links = vec![PipeLink {
            peer: WorkerId(2),
            reader: down_r,
            writer: up_w,
        }];
        assert!(PipeCommunicator::owner(2, links).is_err());
    }
}
