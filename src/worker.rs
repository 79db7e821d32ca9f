//! Scans on a background thread, polled from a UI loop.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use crate::config::ScanConfig;
use crate::crawler::{FileCrawler, ScanError, ScanProgress};
use crate::node::ScanResult;

enum Message {
    Progress(ScanProgress),
    Finished(Result<ScanResult, ScanError>),
}

/// Handle to one running scan.
pub struct ScanWorker {
    path: PathBuf,
    rx: Receiver<Message>,
    progress: Option<ScanProgress>,
}

impl ScanWorker {
    pub fn spawn(path: impl Into<PathBuf>, config: ScanConfig) -> Self {
        let path = path.into();
        let (tx, rx) = mpsc::channel();
        let scan_path = path.clone();

        let spawned = thread::Builder::new()
            .name("diskmap-scan".to_string())
            .spawn(move || {
                let progress_tx = tx.clone();
                let reporter = Arc::new(move |progress| {
                    let _ = progress_tx.send(Message::Progress(progress));
                });
                let result = FileCrawler::new(config).scan_with_progress(&scan_path, Some(reporter));
                let _ = tx.send(Message::Finished(result));
            });
        // On failure the sender is dropped and poll reports an interruption
        if let Err(e) = spawned {
            tracing::error!("Cannot start scan thread: {}", e);
        }

        Self {
            path,
            rx,
            progress: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Latest progress received by [`ScanWorker::poll`].
    pub fn progress(&self) -> Option<&ScanProgress> {
        self.progress.as_ref()
    }

    /// Drain pending messages without blocking. Returns the outcome once the
    /// scan has ended; `None` means it is still running.
    pub fn poll(&mut self) -> Option<Result<ScanResult, ScanError>> {
        loop {
            match self.rx.try_recv() {
                Ok(Message::Progress(progress)) => self.progress = Some(progress),
                Ok(Message::Finished(result)) => return Some(result),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => return Some(Err(ScanError::Interrupted)),
            }
        }
    }

    /// Block until the scan ends.
    pub fn wait(mut self) -> Result<ScanResult, ScanError> {
        while let Ok(message) = self.rx.recv() {
            match message {
                Message::Progress(progress) => self.progress = Some(progress),
                Message::Finished(result) => return result,
            }
        }
        Err(ScanError::Interrupted)
    }
}
