//! Streaming the compressed root filesystem into the new pool.
//!
//! `xzcat root.zfs.xz | zfs receive -F <pool>/ROOT/default`
//!
//! The stream is usually gigabytes and the installer often runs from a live
//! system with 1-2GB of RAM, so the decompressed bytes only ever exist in the
//! pipe between the two processes.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::root_dataset;
use crate::host::Host;
use crate::process::{Cmd, PipeSide, PipelineError};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("ZFS stream file not found: {}", .0.display())]
    StreamMissing(PathBuf),

    #[error("ZFS stream file is empty: {}", .0.display())]
    StreamEmpty(PathBuf),

    #[error("cannot access ZFS stream file {}", .path.display())]
    StreamAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The decompressor failed; the stream file is likely corrupt or truncated.
    #[error("xzcat decompression failed")]
    Decompress(#[source] PipelineError),

    /// The receiver failed; the pool or dataset is the problem.
    #[error("zfs receive failed")]
    Receive(#[source] PipelineError),
}

impl TransferError {
    fn from_pipeline(err: PipelineError) -> Self {
        match err.side() {
            Some(PipeSide::Producer) => TransferError::Decompress(err),
            // An unwritable output is impossible here (no output file); treat
            // anything unattributed as the receiving side.
            Some(PipeSide::Consumer) | None => TransferError::Receive(err),
        }
    }
}

/// Check the stream file before anything is started.
fn check_stream(stream: &Path) -> Result<(), TransferError> {
    let meta = match std::fs::metadata(stream) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(TransferError::StreamMissing(stream.to_path_buf()))
        }
        Err(source) => {
            return Err(TransferError::StreamAccess {
                path: stream.to_path_buf(),
                source,
            })
        }
    };
    if !meta.is_file() {
        return Err(TransferError::StreamMissing(stream.to_path_buf()));
    }
    if meta.len() == 0 {
        return Err(TransferError::StreamEmpty(stream.to_path_buf()));
    }
    Ok(())
}

/// Decompress `stream` straight into `zfs receive` on the pool's root dataset.
pub fn transfer(host: &impl Host, stream: &Path, pool: &str) -> Result<(), TransferError> {
    check_stream(stream)?;

    let decompress = Cmd::new("xzcat").arg_path(stream);
    let receive = Cmd::new("zfs").args(["receive", "-F"]).arg(root_dataset(pool));

    host.run_piped(decompress, receive)
        .map_err(TransferError::from_pipeline)
}
