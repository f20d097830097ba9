//! Inbound transport events: reads, writes and subscription changes.
//!
//! Writes are reassembled into messages and routed to the negotiator or the
//! recording controller. Reads are served one page at a time from a message
//! generated fresh at the start of each page sequence.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use camlink_core::{RecordingError, RecordingState, format_duration};
use camlink_protocol::{
    CONTROL_MARKER, Channel, ControlFrame, EventKind, PendingUpload, RecordingEvent,
    ResponseEnvelope, hex, split_message,
};
use futures_util::future::join_all;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{PageError, ServerResult, TransferError, TransportError};
use crate::negotiate::{NegotiatedSize, NegotiationOutcome, PacketSizeNegotiator};
use crate::pagination::PaginationCache;
use crate::reassembly::{ReassemblyOutcome, ReassemblyTable};
use crate::session::RecordingController;
use crate::transfer::{
    BulkTransferEngine, ByteSource, ProgressCallback, TransferConfig, TransferReport,
};
use crate::transport::Transport;

/// Reassembly scope for the negotiation channel.
pub const NEGOTIATION_SCOPE: &str = "negotiation";

/// Size of the buffer sent to new negotiation subscribers.
pub const PROBE_LEN: usize = 512;

/// Which answer the device info channel serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceQuery {
    #[default]
    Device,
    RecordTime,
    Status,
}

impl DeviceQuery {
    fn from_event(kind: EventKind) -> Option<Self> {
        match kind {
            EventKind::GetDevice => Some(Self::Device),
            EventKind::GetRecordTime => Some(Self::RecordTime),
            EventKind::CheckDeviceStatus => Some(Self::Status),
            _ => None,
        }
    }
}

/// Device facts served on reads.
#[derive(Debug)]
pub struct DeviceState {
    pub device_id: String,
    pub device_name: String,
    /// Recording id from the last `start_recording`.
    pub current_id: Option<i64>,
    /// Recording id from the last `preview_recording`.
    pub preview_id: Option<i64>,
    pub last_query: DeviceQuery,
    pub pending_uploads: Vec<PendingUpload>,
}

impl DeviceState {
    /// Idle state with no recording id and the device query selected.
    pub fn new(device_id: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: device_name.into(),
            current_id: None,
            preview_id: None,
            last_query: DeviceQuery::default(),
            pending_uploads: Vec::new(),
        }
    }
}

/// Device state shared with the embedding application.
pub type SharedDeviceState = Arc<RwLock<DeviceState>>;

/// Creates the shared device state from configuration.
pub fn new_device_state(config: &ServerConfig) -> SharedDeviceState {
    Arc::new(RwLock::new(DeviceState::new(
        config.device_id.clone(),
        config.device_name.clone(),
    )))
}

/// Answer to a read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResponse {
    /// One encoded control frame.
    Value(Vec<u8>),
    /// The read cannot be served; the transport reports a protocol error.
    ProtocolError(PageError),
}

/// What a write did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Fragment stored, message incomplete.
    Pending { received: usize, total: u8 },
    Negotiated(NegotiationOutcome),
    Dispatched(EventKind),
    /// Recording event refused by the state machine.
    Rejected { kind: EventKind, error: RecordingError },
    UnknownEvent(String),
    /// Complete text that is not a recording event.
    NotParsable,
    /// Complete message that is not UTF-8.
    Binary { len: usize },
    /// Dropped without processing.
    Ignored,
}

/// Result of [`PeripheralHandler::broadcast`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub frames: usize,
    pub subscribers: usize,
    /// Subscribers skipped after a failed notification.
    pub failed: usize,
}

/// Handles transport events for one peripheral.
pub struct PeripheralHandler<T: Transport> {
    transport: Arc<T>,
    config: ServerConfig,
    state: SharedDeviceState,
    reassembly: ReassemblyTable,
    pages: PaginationCache,
    negotiator: PacketSizeNegotiator,
    transfers: BulkTransferEngine<T>,
    preview: Mutex<Option<JoinHandle<Result<TransferReport, TransferError>>>>,
    recording: RecordingController,
}

impl<T: Transport> PeripheralHandler<T> {
    /// Creates a handler with fresh device state.
    ///
    /// Fails with a configuration error if `config` does not validate.
    pub fn new(transport: Arc<T>, config: ServerConfig) -> ServerResult<Self> {
        let state = new_device_state(&config);
        Self::with_state(transport, config, state)
    }

    /// Creates a handler around existing device state.
    pub fn with_state(
        transport: Arc<T>,
        config: ServerConfig,
        state: SharedDeviceState,
    ) -> ServerResult<Self> {
        config.validate()?;
        let size = NegotiatedSize::new(config.default_packet_size);
        let transfers =
            BulkTransferEngine::new(transport.clone(), size.clone(), TransferConfig::from(&config));
        Ok(Self {
            recording: RecordingController::new(config.tick_interval),
            negotiator: PacketSizeNegotiator::new(size),
            reassembly: ReassemblyTable::new(),
            pages: PaginationCache::new(),
            transport,
            config,
            state,
            transfers,
            preview: Mutex::new(None),
        })
    }

    /// Builder: report bulk transfer progress.
    pub fn with_transfer_progress(mut self, callback: ProgressCallback) -> Self {
        self.transfers = self.transfers.with_progress(callback);
        self
    }

    /// Shared device state served on reads.
    pub fn state(&self) -> SharedDeviceState {
        self.state.clone()
    }

    /// Recording state machine driven by write events.
    pub fn recording(&self) -> &RecordingController {
        &self.recording
    }

    /// Engine running preview transfers.
    pub fn transfers(&self) -> &BulkTransferEngine<T> {
        &self.transfers
    }

    /// Negotiator owning the bulk frame size.
    pub fn negotiator(&self) -> &PacketSizeNegotiator {
        &self.negotiator
    }

    /// In-progress write reassembly sessions.
    pub fn reassembly(&self) -> &ReassemblyTable {
        &self.reassembly
    }

    /// Serves the next page of the channel's response.
    #[tracing::instrument(skip(self), fields(channel = %channel))]
    pub async fn on_read(&self, channel: Uuid) -> ReadResponse {
        // Generation is async and cannot run under the page lock. Skip it while
        // a sequence is in progress; if another reader takes the last page in
        // between, the second attempt always brings a message.
        let mut served = Err(PageError::Exhausted);
        for attempt in 0..2 {
            let fresh = if attempt == 0 && self.pages.contains(&channel) {
                None
            } else {
                self.read_message(channel).await
            };
            let generated = fresh.is_some();
            served = self.pages.next_or_prepare(channel, move || fresh);
            if served.is_ok() || generated {
                break;
            }
            trace!("Page sequence finished concurrently, regenerating");
        }

        match served {
            Ok(frame) => {
                debug!(
                    page = frame.sequence,
                    total = frame.total_count,
                    "Read served"
                );
                ReadResponse::Value(frame.encode().to_vec())
            }
            Err(e) => {
                self.pages.remove(&channel);
                warn!(error = %e, "Read cannot be served");
                ReadResponse::ProtocolError(e)
            }
        }
    }

    /// Builds the full JSON response for a read on `uuid`.
    async fn read_message(&self, uuid: Uuid) -> Option<Vec<u8>> {
        let envelope = match Channel::from_uuid(&uuid) {
            Some(channel) => self.channel_data(channel, uuid).await,
            None => None,
        }
        .map_or_else(ResponseEnvelope::unsupported, ResponseEnvelope::success);

        match envelope.to_bytes() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "Failed to encode response");
                None
            }
        }
    }

    async fn channel_data(&self, channel: Channel, uuid: Uuid) -> Option<Value> {
        let characteristic_id = uuid.to_string();
        let state = self.state.read().await;

        let data = match channel {
            Channel::ConnectionStatus => json!({
                "device_status": "wait",
                "server_status": "connect",
                "characteristic_id": characteristic_id,
            }),
            Channel::DeviceInfo => match state.last_query {
                DeviceQuery::Device => json!({
                    "device_id": state.device_id,
                    "device_name": state.device_name,
                }),
                DeviceQuery::RecordTime => {
                    let elapsed = if self.recording.state() == RecordingState::Recording {
                        self.recording.duration()
                    } else {
                        chrono::Duration::zero()
                    };
                    json!(format_duration(elapsed))
                }
                DeviceQuery::Status => json!({
                    "characteristic_id": characteristic_id,
                    "device_status": self.recording.state().as_str(),
                }),
            },
            Channel::StartRecording
            | Channel::PauseRecording
            | Channel::ResumeRecording
            | Channel::StopRecording
            | Channel::UploadNotice
            | Channel::DeleteCached => json!({
                "characteristic_id": characteristic_id,
                "id": state.current_id.unwrap_or(0).to_string(),
            }),
            Channel::PendingUploads => json!({
                "uploadfailed_videoes": state.pending_uploads,
                "characteristic_id": characteristic_id,
            }),
            Channel::PacketSize => json!({
                "max_package_size": self.negotiator.current(),
                "characteristic_id": characteristic_id,
            }),
            Channel::FileTransfer => return None,
        };
        Some(data)
    }

    /// Processes bytes written by the central.
    #[tracing::instrument(skip(self, bytes), fields(channel = %channel, len = bytes.len()))]
    pub async fn on_write(&self, channel: Uuid, bytes: &[u8]) -> WriteOutcome {
        let Some(known) = Channel::from_uuid(&channel) else {
            warn!("Write on unknown channel dropped");
            return WriteOutcome::Ignored;
        };
        if known.is_bulk() {
            warn!("Write on notify-only bulk channel dropped");
            return WriteOutcome::Ignored;
        }

        self.reassembly.evict_older_than(self.config.reassembly_ttl);

        let Some(frame) = ControlFrame::decode(bytes) else {
            if known.is_negotiation() {
                debug!("Raw negotiation write");
                return WriteOutcome::Negotiated(self.negotiator.apply(bytes));
            }
            log_raw(bytes);
            return WriteOutcome::Ignored;
        };

        let scope = if known.is_negotiation() {
            NEGOTIATION_SCOPE.to_string()
        } else {
            channel.to_string()
        };
        let message = match self.reassembly.accept(&scope, &frame) {
            ReassemblyOutcome::Pending { received, total } => {
                return WriteOutcome::Pending { received, total };
            }
            ReassemblyOutcome::Complete(message) => message,
        };

        if known.is_negotiation() {
            return WriteOutcome::Negotiated(self.negotiator.apply(&message));
        }
        self.on_message(known, &message).await
    }

    async fn on_message(&self, channel: Channel, message: &[u8]) -> WriteOutcome {
        let Ok(text) = std::str::from_utf8(message) else {
            info!(hex = %hex(message), "Binary message received");
            return WriteOutcome::Binary { len: message.len() };
        };
        let event = match RecordingEvent::from_slice(message) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, text = %text, "Message is not a recording event");
                return WriteOutcome::NotParsable;
            }
        };
        let Some(kind) = event.kind() else {
            warn!(event = %event.event, "Unknown recording event");
            return WriteOutcome::UnknownEvent(event.event);
        };

        if channel == Channel::DeviceInfo {
            if let Some(query) = DeviceQuery::from_event(kind) {
                self.state.write().await.last_query = query;
                debug!(?query, "Device info query selected");
            }
        }

        let transition = match kind {
            EventKind::StartRecording => {
                if let Some(data) = &event.data {
                    info!(
                        id = ?data.id,
                        title = ?data.title,
                        myteam = ?data.myteam_name,
                        opponentteam = ?data.opponentteam_name,
                        starttime = ?data.starttime,
                        push_uri = ?data.push_auth_uri,
                        "Start recording requested"
                    );
                }
                if let Some(id) = event.recording_id() {
                    self.state.write().await.current_id = Some(id);
                }
                Some(self.recording.start())
            }
            EventKind::StopRecording => Some(self.recording.stop()),
            EventKind::PauseRecording => Some(self.recording.pause()),
            EventKind::ContinueRecording => Some(self.recording.resume()),
            EventKind::PreviewRecording => {
                self.state.write().await.preview_id = event.recording_id();
                self.start_preview();
                None
            }
            EventKind::GetDevice | EventKind::GetRecordTime | EventKind::CheckDeviceStatus => {
                None
            }
        };

        match transition {
            Some(Err(error)) => {
                warn!(%kind, %error, "Recording event rejected");
                WriteOutcome::Rejected { kind, error }
            }
            _ => WriteOutcome::Dispatched(kind),
        }
    }

    fn start_preview(&self) {
        let Some(path) = &self.config.preview_source else {
            warn!("Preview requested but no preview source is configured");
            return;
        };
        if let Some(current) = self.transfers.current_source() {
            info!(current = %current, "Preview ignored, transfer already in progress");
            return;
        }
        let handle = self.transfers.spawn(ByteSource::file(path));
        let previous = self
            .preview
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if previous.is_some() {
            debug!("Replaced handle of an earlier preview transfer");
        }
    }

    /// Waits for the last preview transfer started by a `preview_recording`
    /// event. Returns `None` if none is outstanding.
    pub async fn finish_preview(&self) -> Option<Result<TransferReport, TransferError>> {
        let handle = self
            .preview
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        match handle.await {
            Ok(result) => Some(result),
            Err(e) => {
                error!(error = %e, "Preview transfer task did not finish");
                None
            }
        }
    }

    /// Reacts to a change in a channel's subscriber set.
    ///
    /// New negotiation subscribers receive a probe buffer. Returns how many
    /// probes were delivered.
    #[tracing::instrument(skip(self), fields(channel = %channel))]
    pub async fn on_subscribers_changed(&self, channel: Uuid) -> usize {
        let subscribers = self.transport.subscribers(&channel);
        info!(subscribers = subscribers.len(), "Subscribers changed");

        let is_negotiation = Channel::from_uuid(&channel).is_some_and(Channel::is_negotiation);
        if !is_negotiation || !self.config.negotiation_probe || subscribers.is_empty() {
            return 0;
        }

        let probe = vec![CONTROL_MARKER; PROBE_LEN];
        let results = join_all(
            subscribers
                .iter()
                .map(|&s| self.transport.notify(channel, s, probe.clone())),
        )
        .await;

        let mut delivered = 0;
        for (subscriber, result) in subscribers.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!(%subscriber, error = %e, "Negotiation probe failed"),
            }
        }
        debug!(delivered, "Negotiation probes sent");
        delivered
    }

    /// Notifies `message` as control frames to every subscriber of `channel`.
    ///
    /// A subscriber whose notification fails is skipped for the remaining
    /// frames; the others continue.
    #[tracing::instrument(skip(self, message), fields(channel = %channel, len = message.len()))]
    pub async fn broadcast(&self, channel: Uuid, message: &[u8]) -> ServerResult<BroadcastReport> {
        if !self.transport.has_channel(&channel) {
            return Err(TransportError::UnknownChannel { channel }.into());
        }
        let frames = split_message(message)?;
        let subscribers = self.transport.subscribers(&channel);
        let mut failed = HashSet::new();

        for (index, frame) in frames.iter().enumerate() {
            let bytes = frame.encode();
            for &subscriber in &subscribers {
                if failed.contains(&subscriber) {
                    continue;
                }
                if let Err(e) = self
                    .transport
                    .notify(channel, subscriber, bytes.to_vec())
                    .await
                {
                    warn!(%subscriber, error = %e, "Broadcast notify failed, skipping subscriber");
                    failed.insert(subscriber);
                }
            }
            if index + 1 < frames.len() && !self.config.broadcast_delay.is_zero() {
                tokio::time::sleep(self.config.broadcast_delay).await;
            }
        }

        let report = BroadcastReport {
            frames: frames.len(),
            subscribers: subscribers.len(),
            failed: failed.len(),
        };
        info!(
            frames = report.frames,
            subscribers = report.subscribers,
            failed = report.failed,
            "Broadcast finished"
        );
        Ok(report)
    }
}

fn log_raw(bytes: &[u8]) {
    match std::str::from_utf8(bytes) {
        Ok(text) => info!(text = %text, "Raw write"),
        Err(_) => info!(hex = %hex(bytes), "Raw write"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use crate::transport::LoopbackTransport;
    use camlink_protocol::MAX_BULK_FRAME_SIZE;
    use std::time::Duration;

    fn handler() -> (PeripheralHandler<LoopbackTransport>, LoopbackTransport) {
        let transport = LoopbackTransport::with_channels(Channel::ALL.map(Channel::uuid));
        let config = ServerConfig::default()
            .with_device("dev-42", "Sim Camera")
            .with_broadcast_delay(Duration::ZERO);
        (
            PeripheralHandler::new(Arc::new(transport.clone()), config).unwrap(),
            transport,
        )
    }

    async fn write_message(
        handler: &PeripheralHandler<LoopbackTransport>,
        channel: Channel,
        message: &[u8],
    ) -> WriteOutcome {
        let mut outcome = WriteOutcome::Ignored;
        for frame in split_message(message).unwrap() {
            outcome = handler.on_write(channel.uuid(), &frame.encode()).await;
        }
        outcome
    }

    async fn read_all(handler: &PeripheralHandler<LoopbackTransport>, channel: Uuid) -> Value {
        let mut frames = Vec::new();
        loop {
            let ReadResponse::Value(bytes) = handler.on_read(channel).await else {
                panic!("read failed");
            };
            let frame = ControlFrame::decode(&bytes).unwrap();
            let done = frame.sequence == frame.total_count;
            frames.push(frame);
            if done {
                break;
            }
        }
        let declared = usize::from(frames[0].declared_length);
        let mut message: Vec<u8> = frames.iter().flat_map(|f| f.payload).collect();
        message.truncate(declared);
        serde_json::from_slice(&message).unwrap()
    }

    #[tokio::test]
    async fn connection_status_read() {
        let (handler, _) = handler();
        let uuid = Channel::ConnectionStatus.uuid();
        let value = read_all(&handler, uuid).await;
        assert_eq!(value["errorcode"], 0);
        assert_eq!(value["data"]["server_status"], "connect");
        assert_eq!(value["data"]["characteristic_id"], uuid.to_string());
    }

    #[tokio::test]
    async fn unknown_channel_read_is_unsupported_envelope() {
        let (handler, _) = handler();
        let value = read_all(&handler, Uuid::nil()).await;
        assert_eq!(value, json!({"errorcode": 1, "msg": "uuid not supported"}));
    }

    #[tokio::test]
    async fn device_info_follows_last_query() {
        let (handler, _) = handler();
        let info = Channel::DeviceInfo.uuid();

        let value = read_all(&handler, info).await;
        assert_eq!(value["data"]["device_id"], "dev-42");
        assert_eq!(value["data"]["device_name"], "Sim Camera");

        let outcome =
            write_message(&handler, Channel::DeviceInfo, br#"{"event":"check_device_status"}"#)
                .await;
        assert_eq!(outcome, WriteOutcome::Dispatched(EventKind::CheckDeviceStatus));
        let value = read_all(&handler, info).await;
        assert_eq!(value["data"]["device_status"], "idle");

        write_message(&handler, Channel::DeviceInfo, br#"{"event":"get_record_time"}"#).await;
        let value = read_all(&handler, info).await;
        assert_eq!(value["data"], "00:00:00");
    }

    #[tokio::test]
    async fn start_sets_current_id_and_state() {
        let (handler, _) = handler();
        let outcome = write_message(
            &handler,
            Channel::StartRecording,
            br#"{"sign":"s","time":1,"event":"start_recording","data":{"id":"77","title":"Final"}}"#,
        )
        .await;
        assert_eq!(outcome, WriteOutcome::Dispatched(EventKind::StartRecording));
        assert_eq!(handler.recording().state(), RecordingState::Recording);

        let value = read_all(&handler, Channel::StopRecording.uuid()).await;
        assert_eq!(value["data"]["id"], "77");

        let outcome =
            write_message(&handler, Channel::StartRecording, br#"{"event":"start_recording"}"#)
                .await;
        assert!(matches!(outcome, WriteOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn unknown_and_unparsable_messages() {
        let (handler, _) = handler();
        assert_eq!(
            write_message(&handler, Channel::UploadNotice, br#"{"event":"reboot"}"#).await,
            WriteOutcome::UnknownEvent("reboot".to_string())
        );
        assert_eq!(
            write_message(&handler, Channel::UploadNotice, b"hello there").await,
            WriteOutcome::NotParsable
        );
        assert_eq!(
            write_message(&handler, Channel::UploadNotice, &[0xff, 0xfe, 0x00]).await,
            WriteOutcome::Binary { len: 3 }
        );
    }

    #[tokio::test]
    async fn malformed_and_raw_writes_are_ignored() {
        let (handler, _) = handler();
        let uuid = Channel::StartRecording.uuid();
        assert_eq!(handler.on_write(uuid, &[0xAA; 19]).await, WriteOutcome::Ignored);
        assert_eq!(handler.on_write(uuid, b"plain text").await, WriteOutcome::Ignored);
        assert_eq!(
            handler.on_write(Channel::FileTransfer.uuid(), &[0xAA; 20]).await,
            WriteOutcome::Ignored
        );
        assert_eq!(handler.on_write(Uuid::nil(), &[0xAA; 20]).await, WriteOutcome::Ignored);
        assert!(handler.reassembly().is_empty());
    }

    #[tokio::test]
    async fn negotiation_framed_and_raw() {
        let (handler, _) = handler();
        let outcome = write_message(&handler, Channel::PacketSize, br#"{"data":1024}"#).await;
        assert_eq!(
            outcome,
            WriteOutcome::Negotiated(NegotiationOutcome::Applied {
                previous: 512,
                current: 1024
            })
        );

        let raw = handler
            .on_write(Channel::PacketSize.uuid(), &[0, 0, 1, 0])
            .await;
        assert_eq!(
            raw,
            WriteOutcome::Negotiated(NegotiationOutcome::Applied {
                previous: 1024,
                current: 256
            })
        );

        let value = read_all(&handler, Channel::PacketSize.uuid()).await;
        assert_eq!(value["data"]["max_package_size"], 256);
    }

    #[tokio::test]
    async fn probe_sent_to_negotiation_subscribers() {
        let (handler, transport) = handler();
        let uuid = Channel::PacketSize.uuid();
        let sub = transport.subscribe(uuid);

        assert_eq!(handler.on_subscribers_changed(uuid).await, 1);
        let delivered = transport.delivered_to(&uuid, sub);
        assert_eq!(delivered, vec![vec![0xAA; PROBE_LEN]]);

        let other = Channel::ConnectionStatus.uuid();
        transport.subscribe(other);
        assert_eq!(handler.on_subscribers_changed(other).await, 0);
    }

    #[tokio::test]
    async fn broadcast_skips_failing_subscriber() {
        let (handler, transport) = handler();
        let uuid = Channel::UploadNotice.uuid();
        let good = transport.subscribe(uuid);
        let bad = transport.subscribe(uuid);
        transport.fail_after(bad, 1);

        let message = vec![b'n'; 40];
        let report = handler.broadcast(uuid, &message).await.unwrap();
        assert_eq!(
            report,
            BroadcastReport {
                frames: 3,
                subscribers: 2,
                failed: 1
            }
        );
        assert_eq!(transport.delivered_to(&uuid, good).len(), 3);
        assert_eq!(transport.delivered_to(&uuid, bad).len(), 1);

        assert!(handler.broadcast(Uuid::nil(), b"x").await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reads_on_one_channel_never_fail() {
        let (handler, _transport) = handler();
        let handler = Arc::new(handler);
        let channel = Channel::ConnectionStatus.uuid();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handler = handler.clone();
                tokio::spawn(async move {
                    let mut failures = 0;
                    for _ in 0..2_000 {
                        match handler.on_read(channel).await {
                            ReadResponse::Value(bytes) => {
                                assert!(ControlFrame::decode(&bytes).is_some());
                            }
                            ReadResponse::ProtocolError(_) => failures += 1,
                        }
                    }
                    failures
                })
            })
            .collect();

        for reader in readers {
            assert_eq!(reader.await.unwrap(), 0);
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let transport = Arc::new(LoopbackTransport::with_channels(
            Channel::ALL.map(Channel::uuid),
        ));
        let zero_tick = ServerConfig::default().with_tick_interval(Duration::ZERO);
        assert!(matches!(
            PeripheralHandler::new(transport.clone(), zero_tick),
            Err(ServerError::Config { .. })
        ));

        let oversized = ServerConfig::default().with_packet_size(MAX_BULK_FRAME_SIZE + 1);
        assert!(PeripheralHandler::new(transport, oversized).is_err());
    }

    #[tokio::test]
    async fn preview_without_source_is_noop() {
        let (handler, transport) = handler();
        transport.subscribe(Channel::FileTransfer.uuid());
        let outcome = write_message(
            &handler,
            Channel::StartRecording,
            br#"{"event":"preview_recording","data":{"id":5}}"#,
        )
        .await;
        assert_eq!(outcome, WriteOutcome::Dispatched(EventKind::PreviewRecording));
        assert!(handler.finish_preview().await.is_none());
        assert_eq!(handler.state().read().await.preview_id, Some(5));
    }
}
