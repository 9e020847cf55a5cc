//! Background draining of PTY output.
//!
//! PTY reads block, so the reader runs on Tokio's blocking pool and hands
//! each chunk to a delivery callback in the order it was read.

use std::io::Read;

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::native::{PtyReader, ReadChunk};

/// Why a [`SessionReader`] stopped.
#[derive(Debug)]
pub enum ReadOutcome {
    /// The child exited and the stream is drained.
    EndOfStream,
    /// A read failed with an I/O error.
    Failed(std::io::Error),
    /// Delivery was refused because the session already ended.
    Stopped,
}

/// Drains one PTY master until it ends.
///
/// There is exactly one reader per session; it owns the reading half
/// outright so reads never contend with writes or resizes.
pub struct SessionReader<R: Read + Send + 'static> {
    reader: PtyReader<R>,
    label: String,
}

impl<R: Read + Send + 'static> SessionReader<R> {
    /// Create a reader. `label` names the session in logs.
    pub fn new(reader: PtyReader<R>, label: impl Into<String>) -> Self {
        Self {
            reader,
            label: label.into(),
        }
    }

    /// Run the read loop on the blocking pool.
    ///
    /// `deliver` receives each chunk and returns `false` to stop reading.
    /// `finish` is called exactly once with the reason the loop ended.
    pub fn spawn<D, F>(self, deliver: D, finish: F) -> JoinHandle<()>
    where
        D: FnMut(Vec<u8>) -> bool + Send + 'static,
        F: FnOnce(ReadOutcome) + Send + 'static,
    {
        tokio::task::spawn_blocking(move || {
            let label = self.label.clone();
            let outcome = self.run(deliver);
            match &outcome {
                ReadOutcome::EndOfStream => debug!(session = %label, "PTY reader: EOF"),
                ReadOutcome::Failed(e) => error!(session = %label, error = %e, "PTY reader error"),
                ReadOutcome::Stopped => debug!(session = %label, "PTY reader: delivery stopped"),
            }
            finish(outcome);
        })
    }

    fn run<D>(mut self, mut deliver: D) -> ReadOutcome
    where
        D: FnMut(Vec<u8>) -> bool,
    {
        loop {
            match self.reader.read_chunk() {
                Ok(ReadChunk::Data(data)) => {
                    if !deliver(data) {
                        return ReadOutcome::Stopped;
                    }
                }
                Ok(ReadChunk::EndOfStream) => return ReadOutcome::EndOfStream,
                Err(e) => return ReadOutcome::Failed(e),
            }
        }
    }
}

/// Wait for a reader task, logging a panic instead of propagating it.
pub(crate) async fn join_reader(handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        warn!("PTY reader task panicked: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    struct FailAfter {
        data: Option<Vec<u8>>,
    }

    impl Read for FailAfter {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.data.take() {
                Some(data) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read failed",
                )),
            }
        }
    }

    #[tokio::test]
    async fn test_reader_delivers_in_order() {
        let data = b"Hello, World!\nTest line 2\n".to_vec();
        let reader = PtyReader::new(Cursor::new(data.clone())).with_buffer_size(4);

        let (chunk_tx, chunk_rx) = std_mpsc::channel();
        let (done_tx, done_rx) = std_mpsc::channel();

        let handle = SessionReader::new(reader, "test").spawn(
            move |chunk| chunk_tx.send(chunk).is_ok(),
            move |outcome| {
                let _ = done_tx.send(outcome);
            },
        );
        join_reader(handle).await;

        let received: Vec<u8> = chunk_rx.try_iter().flatten().collect();
        assert_eq!(received, data);
        assert!(matches!(
            done_rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            ReadOutcome::EndOfStream
        ));
    }

    #[tokio::test]
    async fn test_reader_empty() {
        let reader = PtyReader::new(Cursor::new(Vec::new()));
        let (done_tx, done_rx) = std_mpsc::channel();

        let handle = SessionReader::new(reader, "empty").spawn(
            |_| panic!("no data expected"),
            move |outcome| {
                let _ = done_tx.send(outcome);
            },
        );
        join_reader(handle).await;

        assert!(matches!(done_rx.try_recv().unwrap(), ReadOutcome::EndOfStream));
    }

    #[tokio::test]
    async fn test_reader_stops_when_delivery_refused() {
        let reader = PtyReader::new(Cursor::new(b"abcdef".to_vec())).with_buffer_size(2);
        let (done_tx, done_rx) = std_mpsc::channel();
        let mut delivered = 0;

        let handle = SessionReader::new(reader, "refuse").spawn(
            move |_| {
                delivered += 1;
                delivered < 2
            },
            move |outcome| {
                let _ = done_tx.send(outcome);
            },
        );
        join_reader(handle).await;

        assert!(matches!(done_rx.try_recv().unwrap(), ReadOutcome::Stopped));
    }

    #[tokio::test]
    async fn test_reader_reports_io_error() {
        let reader = PtyReader::new(FailAfter {
            data: Some(b"partial".to_vec()),
        });
        let (chunk_tx, chunk_rx) = std_mpsc::channel();
        let (done_tx, done_rx) = std_mpsc::channel();

        let handle = SessionReader::new(reader, "failing").spawn(
            move |chunk| chunk_tx.send(chunk).is_ok(),
            move |outcome| {
                let _ = done_tx.send(outcome);
            },
        );
        join_reader(handle).await;

        assert_eq!(chunk_rx.try_recv().unwrap(), b"partial".to_vec());
        match done_rx.try_recv().unwrap() {
            ReadOutcome::Failed(e) => assert_eq!(e.kind(), std::io::ErrorKind::PermissionDenied),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
