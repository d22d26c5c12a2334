//! Background writer for per-step ensemble snapshots.
//!
//! The estimation loop hands each deep-copied snapshot to a channel and moves on;
//! a single worker thread drains the channel and writes one CSV per step. The
//! writer must be finished (joined) before the program exits.

use std::error::Error;
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use log::debug;
use trackest::EstimationError;
use trackest::particle::EnsembleSnapshot;
use trackest::sim::write_snapshot;

pub struct SnapshotWriter {
    sender: Sender<EnsembleSnapshot>,
    handle: JoinHandle<Result<usize, EstimationError>>,
}
impl SnapshotWriter {
    /// Start the worker thread writing into `dir` (which must exist).
    pub fn spawn(dir: PathBuf) -> Self {
        let (sender, receiver) = mpsc::channel::<EnsembleSnapshot>();
        let handle = thread::spawn(move || {
            let mut written = 0;
            for snapshot in receiver {
                let path = write_snapshot(&snapshot, &dir)?;
                debug!("wrote snapshot {}", path.display());
                written += 1;
            }
            Ok(written)
        });
        SnapshotWriter { sender, handle }
    }
    /// Queue a snapshot. Returns `false` if the worker has already stopped.
    pub fn send(&self, snapshot: EnsembleSnapshot) -> bool {
        self.sender.send(snapshot).is_ok()
    }
    /// Close the queue, wait for the worker and return the number of files written.
    pub fn finish(self) -> Result<usize, Box<dyn Error>> {
        let SnapshotWriter { sender, handle } = self;
        drop(sender);
        match handle.join() {
            Ok(result) => Ok(result?),
            Err(_) => Err("snapshot writer thread panicked".into()),
        }
    }
}
