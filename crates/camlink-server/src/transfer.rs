//! Bulk file delivery over the negotiated frame size.
//!
//! One transfer runs at a time. Frames go to every subscriber of the bulk
//! channel; sends are issued concurrently and awaited in batches of
//! `batch_per_subscriber * subscribers`, with a short pause between batches.
//! A failed send aborts the transfer.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use camlink_protocol::{Channel, segment_bulk};
use futures_util::future::try_join_all;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::TransferError;
use crate::negotiate::NegotiatedSize;
use crate::transport::Transport;

/// Where the bytes of a transfer come from.
#[derive(Debug, Clone)]
pub enum ByteSource {
    File(PathBuf),
    Memory { name: String, bytes: Arc<[u8]> },
}

impl ByteSource {
    /// Bytes read from `path` when the transfer starts.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// In-memory bytes labelled `name` in reports.
    pub fn memory(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Memory {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    async fn resolve(&self) -> Result<Arc<[u8]>, TransferError> {
        match self {
            Self::File(path) => tokio::fs::read(path)
                .await
                .map(Arc::from)
                .map_err(|source| TransferError::SourceMissing {
                    path: path.clone(),
                    source,
                }),
            Self::Memory { bytes, .. } => Ok(bytes.clone()),
        }
    }
}

impl fmt::Display for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Memory { name, .. } => write!(f, "memory:{name}"),
        }
    }
}

/// Batching parameters of the engine.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub channel: Uuid,
    pub batch_per_subscriber: usize,
    pub inter_batch_delay: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            channel: Channel::FileTransfer.uuid(),
            batch_per_subscriber: 5,
            inter_batch_delay: Duration::from_millis(5),
        }
    }
}

impl From<&ServerConfig> for TransferConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            batch_per_subscriber: config.batch_per_subscriber.max(1),
            inter_batch_delay: config.inter_batch_delay,
            ..Self::default()
        }
    }
}

/// Progress after a batch flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub frames_sent: usize,
    pub total_frames: usize,
    pub percent: u8,
}

/// Receives progress updates.
pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Summary of a finished transfer.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub source: String,
    pub bytes: usize,
    pub frames: usize,
    pub frame_size: usize,
    pub subscribers: usize,
    pub elapsed: Duration,
}

impl TransferReport {
    /// Bytes per second, zero for an instantaneous transfer.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }
}

/// Clears the busy slot on every exit path.
struct BusyGuard<'a> {
    slot: &'a Mutex<Option<String>>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        lock_slot(self.slot).take();
    }
}

fn lock_slot(slot: &Mutex<Option<String>>) -> MutexGuard<'_, Option<String>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sends byte sources as bulk frames, one transfer at a time.
pub struct BulkTransferEngine<T: Transport> {
    transport: Arc<T>,
    size: NegotiatedSize,
    config: TransferConfig,
    busy: Arc<Mutex<Option<String>>>,
    progress: Option<ProgressCallback>,
}

impl<T: Transport> Clone for BulkTransferEngine<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            size: self.size.clone(),
            config: self.config.clone(),
            busy: self.busy.clone(),
            progress: self.progress.clone(),
        }
    }
}

impl<T: Transport> BulkTransferEngine<T> {
    /// Engine sending on `config.channel` at the frame size held by `size`.
    pub fn new(transport: Arc<T>, size: NegotiatedSize, config: TransferConfig) -> Self {
        Self {
            transport,
            size,
            config,
            busy: Arc::new(Mutex::new(None)),
            progress: None,
        }
    }

    /// Builder: report progress after every batch.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Whether a transfer is in progress.
    pub fn is_busy(&self) -> bool {
        lock_slot(&self.busy).is_some()
    }

    /// Source of the transfer in progress.
    pub fn current_source(&self) -> Option<String> {
        lock_slot(&self.busy).clone()
    }

    fn acquire(&self, source: &ByteSource) -> Result<BusyGuard<'_>, TransferError> {
        let mut slot = lock_slot(&self.busy);
        if let Some(current) = slot.as_ref() {
            return Err(TransferError::Busy {
                current: current.clone(),
            });
        }
        *slot = Some(source.to_string());
        Ok(BusyGuard { slot: &self.busy })
    }

    /// Runs a transfer to completion.
    ///
    /// Refuses with `Busy`, `ChannelNotFound`, `NoSubscribers` or
    /// `SourceMissing` (checked in that order) before sending anything.
    /// Subscribers are taken once at the start.
    pub async fn start(&self, source: &ByteSource) -> Result<TransferReport, TransferError> {
        let _guard = self.acquire(source)?;
        let channel = self.config.channel;

        if !self.transport.has_channel(&channel) {
            return Err(TransferError::ChannelNotFound { channel });
        }
        let subscribers = self.transport.subscribers(&channel);
        if subscribers.is_empty() {
            return Err(TransferError::NoSubscribers { channel });
        }
        let data = source.resolve().await?;

        let frame_size = self.size.get();
        let segments = segment_bulk(&data, frame_size)?;
        let total_frames = segments.len();
        let batch_limit = self.config.batch_per_subscriber.max(1) * subscribers.len();
        info!(
            source = %source,
            bytes = data.len(),
            frames = total_frames,
            frame_size,
            subscribers = subscribers.len(),
            "Starting bulk transfer"
        );

        let started = Instant::now();
        let mut pending = Vec::with_capacity(batch_limit);
        let mut frames_sent = 0;

        for (index, frame) in segments.enumerate() {
            let bytes = frame.encode(frame_size)?;
            for &subscriber in &subscribers {
                pending.push(self.transport.notify(channel, subscriber, bytes.clone()));
            }

            let last = index + 1 == total_frames;
            if pending.len() < batch_limit && !last {
                continue;
            }

            try_join_all(pending.drain(..))
                .await
                .map_err(|source| TransferError::Send {
                    frames_sent,
                    source,
                })?;
            frames_sent = index + 1;

            let progress = TransferProgress {
                frames_sent,
                total_frames,
                percent: (frames_sent * 100 / total_frames) as u8,
            };
            debug!(
                frames_sent,
                total_frames,
                percent = progress.percent,
                "Batch flushed"
            );
            if let Some(callback) = &self.progress {
                callback(progress);
            }

            if !last && !self.config.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.config.inter_batch_delay).await;
            }
        }

        let report = TransferReport {
            source: source.to_string(),
            bytes: data.len(),
            frames: total_frames,
            frame_size,
            subscribers: subscribers.len(),
            elapsed: started.elapsed(),
        };
        info!(
            source = %report.source,
            bytes = report.bytes,
            frames = report.frames,
            elapsed_ms = report.elapsed.as_millis() as u64,
            throughput_bps = report.throughput() as u64,
            "Bulk transfer complete"
        );
        Ok(report)
    }

    /// Runs [`start`](Self::start) on a detached task and logs the outcome.
    pub fn spawn(&self, source: ByteSource) -> JoinHandle<Result<TransferReport, TransferError>> {
        let engine = self.clone();
        tokio::spawn(async move {
            let result = engine.start(&source).await;
            match &result {
                Ok(_) => {}
                Err(e) if e.is_precondition() => {
                    warn!(source = %source, error = %e, "Bulk transfer not started")
                }
                Err(e) => error!(source = %source, error = %e, "Bulk transfer failed"),
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackTransport;
    use camlink_protocol::{AssemblyProgress, BulkAssembler, BulkFrame};

    fn bulk() -> Uuid {
        Channel::FileTransfer.uuid()
    }

    fn engine(
        transport: &LoopbackTransport,
        config: TransferConfig,
    ) -> BulkTransferEngine<LoopbackTransport> {
        BulkTransferEngine::new(Arc::new(transport.clone()), NegotiatedSize::default(), config)
    }

    fn source(len: usize) -> ByteSource {
        let bytes: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        ByteSource::memory("clip", bytes)
    }

    #[tokio::test]
    async fn segments_2000_bytes_into_four_frames() {
        let transport = LoopbackTransport::with_channels([bulk()]);
        let sub = transport.subscribe(bulk());
        let engine = engine(&transport, TransferConfig::default());

        let report = engine.start(&source(2000)).await.unwrap();
        assert_eq!((report.bytes, report.frames, report.frame_size), (2000, 4, 512));

        let frames: Vec<BulkFrame> = transport
            .delivered_to(&bulk(), sub)
            .iter()
            .map(|b| {
                assert_eq!(b.len(), 512);
                BulkFrame::decode(b).unwrap()
            })
            .collect();
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|f| f.total_length == 2000 && f.total_count == 4));
        assert_eq!(frames[3].payload.len(), 491);
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn batches_and_reports_progress() {
        let transport = LoopbackTransport::with_channels([bulk()]);
        let a = transport.subscribe(bulk());
        let b = transport.subscribe(bulk());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let config = TransferConfig {
            batch_per_subscriber: 1,
            inter_batch_delay: Duration::ZERO,
            ..TransferConfig::default()
        };
        let engine = engine(&transport, config).with_progress(Arc::new(move |p| {
            sink.lock().unwrap().push(p.percent);
        }));

        engine.start(&source(2000)).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![25, 50, 75, 100]);
        assert_eq!(transport.delivered_to(&bulk(), a).len(), 4);
        assert_eq!(transport.delivered_to(&bulk(), b).len(), 4);
    }

    #[tokio::test]
    async fn honours_negotiated_size() {
        let transport = LoopbackTransport::with_channels([bulk()]);
        let sub = transport.subscribe(bulk());
        let size = NegotiatedSize::new(100);
        let engine =
            BulkTransferEngine::new(Arc::new(transport.clone()), size, TransferConfig::default());

        let data = source(1000);
        let report = engine.start(&data).await.unwrap();
        assert_eq!(report.frames, 11);

        let mut assembler = BulkAssembler::new();
        let mut result = AssemblyProgress::Ignored;
        for bytes in transport.delivered_to(&bulk(), sub) {
            assert_eq!(bytes.len(), 100);
            result = assembler.accept_bytes(&bytes);
        }
        let ByteSource::Memory { bytes, .. } = data else {
            unreachable!()
        };
        assert_eq!(result, AssemblyProgress::Complete(bytes.to_vec()));
    }

    #[tokio::test]
    async fn precondition_failures_send_nothing() {
        let no_channel = LoopbackTransport::new();
        let err = engine(&no_channel, TransferConfig::default())
            .start(&source(10))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::ChannelNotFound { .. }));

        let transport = LoopbackTransport::with_channels([bulk()]);
        let engine = engine(&transport, TransferConfig::default());
        let err = engine.start(&source(10)).await.unwrap_err();
        assert!(matches!(err, TransferError::NoSubscribers { .. }));

        transport.subscribe(bulk());
        let dir = tempfile::tempdir().unwrap();
        let missing = ByteSource::file(dir.path().join("missing.mp4"));
        let err = engine.start(&missing).await.unwrap_err();
        assert!(matches!(err, TransferError::SourceMissing { .. }));
        assert!(err.is_precondition());

        assert!(transport.delivered().is_empty());
        assert!(!engine.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_start_is_busy() {
        let transport =
            LoopbackTransport::with_channels([bulk()]).with_latency(Duration::from_millis(20));
        transport.subscribe(bulk());
        let engine = engine(&transport, TransferConfig::default());
        let clip = source(5000);

        let first = {
            let engine = engine.clone();
            let clip = clip.clone();
            tokio::spawn(async move { engine.start(&clip).await })
        };
        while !engine.is_busy() {
            tokio::task::yield_now().await;
        }
        assert_eq!(engine.current_source().as_deref(), Some("memory:clip"));

        let second = engine.start(&clip).await;
        assert!(matches!(second, Err(TransferError::Busy { .. })));

        let report = first.await.unwrap().unwrap();
        assert_eq!(transport.delivered().len(), report.frames);
        assert!(!engine.is_busy());

        let third = engine.start(&clip).await.unwrap();
        assert_eq!(transport.delivered().len(), report.frames + third.frames);
    }

    #[tokio::test]
    async fn send_failure_aborts_and_releases() {
        let transport = LoopbackTransport::with_channels([bulk()]);
        let good = transport.subscribe(bulk());
        let bad = transport.subscribe(bulk());
        transport.fail_after(bad, 6);

        let config = TransferConfig {
            batch_per_subscriber: 5,
            inter_batch_delay: Duration::ZERO,
            ..TransferConfig::default()
        };
        let engine = engine(&transport, config);

        let err = engine.start(&source(503 * 20)).await.unwrap_err();
        match err {
            TransferError::Send { frames_sent, .. } => assert_eq!(frames_sent, 5),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!engine.is_busy());
        // Nothing past the failing batch was issued.
        assert!(transport.delivered_to(&bulk(), good).len() <= 10);

        transport.heal(bad);
        assert!(engine.start(&source(100)).await.is_ok());
    }

    #[tokio::test]
    async fn file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.bin");
        std::fs::write(&path, vec![9u8; 1500]).unwrap();

        let transport = LoopbackTransport::with_channels([bulk()]);
        transport.subscribe(bulk());
        let engine = engine(&transport, TransferConfig::default());

        let handle = engine.spawn(ByteSource::file(&path));
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.bytes, 1500);
        assert_eq!(report.frames, 3);
        assert!(report.source.ends_with("preview.bin"));
    }
}
