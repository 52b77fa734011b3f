//! Making the source buffers available to every worker before any frame is rendered.
//!
//! A [`Communicator`] is one rank's endpoint of a collective group. [`replicate_sources`] drives
//! the same three steps on every rank: announce dimensions, replicate both buffers, then wait on a
//! barrier. Only after the barrier returns may a rank start rendering its partition.

use std::borrow::Cow;

use crate::buffer::{Dimensions, ImageBuffer, SourceBuffers};
use crate::foundation::core::WorkerId;
use crate::foundation::error::{CrossfadeError, CrossfadeResult};

pub mod channel;
pub mod pipe;
pub mod process;
pub mod wire;

pub use channel::ChannelCommunicator;
pub use pipe::PipeCommunicator;
pub use process::{ProcessGroup, ProcessLauncher, WorkerJob};

/// One side of a collective buffer replication.
pub enum Replicate<'a> {
    /// Owner: the bytes every other rank must end up with.
    Send(&'a [u8]),
    /// Receiver: local storage already sized from the announced dimensions.
    Receive(&'a mut [u8]),
}

/// Endpoint of a replicate-then-barrier group.
///
/// All methods are collective: every rank of the group calls them in the same order.
pub trait Communicator: Send {
    /// This endpoint's rank. Rank 0 is the owner.
    fn rank(&self) -> WorkerId;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Owner passes `Some(dims)`; everybody returns the owner's dimensions.
    fn announce_dimensions(&mut self, dims: Option<Dimensions>) -> CrossfadeResult<Dimensions>;

    /// Copy one buffer from the owner into every receiver's local storage.
    fn replicate_buffer(&mut self, op: Replicate<'_>) -> CrossfadeResult<()>;

    /// Returns once every rank has reached the barrier.
    fn barrier(&mut self) -> CrossfadeResult<()>;
}

/// The single-rank group used by the in-process backends. Every operation is a no-op.
#[derive(Clone, Copy, Debug, Default)]
pub struct SoloCommunicator;

impl Communicator for SoloCommunicator {
    fn rank(&self) -> WorkerId {
        WorkerId::OWNER
    }

    fn size(&self) -> usize {
        1
    }

    fn announce_dimensions(&mut self, dims: Option<Dimensions>) -> CrossfadeResult<Dimensions> {
        dims.ok_or_else(|| CrossfadeError::distribution("owner did not provide dimensions"))
    }

    fn replicate_buffer(&mut self, op: Replicate<'_>) -> CrossfadeResult<()> {
        match op {
            Replicate::Send(_) => Ok(()),
            Replicate::Receive(_) => Err(CrossfadeError::distribution(
                "single-rank group has nobody to receive from",
            )),
        }
    }

    fn barrier(&mut self) -> CrossfadeResult<()> {
        Ok(())
    }
}

/// Replicate the owner's sources onto `comm`'s rank.
///
/// The owner passes `Some(sources)` and gets them back borrowed; every other rank passes `None`
/// and receives its own copy. A missing owner buffer fails before anything is sent.
#[tracing::instrument(skip_all, fields(rank = comm.rank().0, size = comm.size()))]
pub fn replicate_sources<'a, C: Communicator + ?Sized>(
    comm: &mut C,
    owned: Option<&'a SourceBuffers>,
) -> CrossfadeResult<Cow<'a, SourceBuffers>> {
    if comm.rank().is_owner() {
        let sources = owned.ok_or_else(|| {
            CrossfadeError::distribution("owner has no source buffers to distribute")
        })?;
        comm.announce_dimensions(Some(sources.dims()))?;
        comm.replicate_buffer(Replicate::Send(sources.color().as_bytes()))?;
        comm.replicate_buffer(Replicate::Send(sources.gray().as_bytes()))?;
        comm.barrier()?;
        tracing::debug!("sources replicated");
        return Ok(Cow::Borrowed(sources));
    }

    if owned.is_some() {
        return Err(CrossfadeError::distribution(format!(
            "rank {} was handed source buffers; only the owner loads them",
            comm.rank()
        )));
    }

    let dims = comm.announce_dimensions(None)?;
    let mut color = ImageBuffer::zeroed(dims);
    comm.replicate_buffer(Replicate::Receive(color.as_bytes_mut()))?;
    let mut gray = ImageBuffer::zeroed(dims);
    comm.replicate_buffer(Replicate::Receive(gray.as_bytes_mut()))?;
    comm.barrier()?;
    tracing::debug!(width = dims.width, height = dims.height, "sources received");
    Ok(Cow::Owned(SourceBuffers::from_parts(color, gray)?))
}
