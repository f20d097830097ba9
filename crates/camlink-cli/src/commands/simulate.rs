//! Simulate command: a scripted central drives an in-memory peripheral.
//!
//! The script connects, negotiates the bulk frame size, starts a recording,
//! reads status pages, pauses and resumes, pulls a preview transfer on every
//! bulk subscriber, verifies the reassembled bytes and stops the recording.

use std::path::PathBuf;
use std::sync::Arc;

use camlink_protocol::{
    AssemblyProgress, BulkAssembler, Channel, ControlFrame, EventKind, RecordingData,
    RecordingEvent, split_message,
};
use camlink_server::{
    ByteSource, LoopbackTransport, NegotiationOutcome, PeripheralHandler, ReadResponse,
    ServerConfig, SubscriberId, TransferProgress, TransferReport, WriteOutcome,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{CliError, CliResult};

/// Preview bytes generated when no source file is available.
const GENERATED_PREVIEW_LEN: usize = 64 * 1024;

/// Options for a simulation run.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Preview file; overrides the configured preview source.
    pub file: Option<PathBuf>,
    /// Frame size to negotiate; defaults to the configured packet size.
    pub packet_size: Option<usize>,
    pub subscribers: usize,
}

/// What the simulation observed.
#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub device_id: String,
    pub negotiated_size: usize,
    pub probes: usize,
    pub status_while_recording: String,
    pub transfer: TransferReport,
    /// Receivers whose reassembled bytes matched the source.
    pub verified_receivers: usize,
    pub recorded: String,
}

/// Runs the simulation and prints a summary.
pub async fn run(config: ServerConfig, options: SimulateOptions) -> CliResult<()> {
    let summary = simulate(config, options).await?;

    println!("device:      {}", summary.device_id);
    println!("probes:      {}", summary.probes);
    println!("packet size: {}", summary.negotiated_size);
    println!("status:      {}", summary.status_while_recording);
    println!(
        "transfer:    {} bytes in {} frames to {} subscribers ({:.0} B/s)",
        summary.transfer.bytes,
        summary.transfer.frames,
        summary.transfer.subscribers,
        summary.transfer.throughput()
    );
    println!(
        "verified:    {}/{}",
        summary.verified_receivers, summary.transfer.subscribers
    );
    println!("recorded:    {}", summary.recorded);
    Ok(())
}

/// Runs the script against a fresh peripheral.
pub async fn simulate(
    mut config: ServerConfig,
    options: SimulateOptions,
) -> CliResult<SimulationSummary> {
    if let Some(path) = options.file.clone() {
        config = config.with_preview_source(path);
    }
    let packet_size = options.packet_size.unwrap_or(config.default_packet_size);

    let transport = LoopbackTransport::with_channels(Channel::ALL.map(Channel::uuid));
    let handler = PeripheralHandler::new(Arc::new(transport.clone()), config.clone())?
        .with_transfer_progress(Arc::new(|p: TransferProgress| {
            info!(
                frames_sent = p.frames_sent,
                total_frames = p.total_frames,
                percent = p.percent,
                "Preview progress"
            );
        }));
    let central = Central {
        handler,
        transport,
    };

    // Connect.
    let negotiation = Channel::PacketSize.uuid();
    central.transport.subscribe(negotiation);
    let probes = central.handler.on_subscribers_changed(negotiation).await;
    let connection = central.read(Channel::ConnectionStatus).await?;
    debug!(response = %connection, "Connection status");

    let device = central.read(Channel::DeviceInfo).await?;
    let device_id = device["data"]["device_id"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    // Negotiate.
    let proposal = format!(r#"{{"data":{packet_size}}}"#);
    let negotiated_size = match central
        .write(Channel::PacketSize, proposal.as_bytes())
        .await?
    {
        WriteOutcome::Negotiated(NegotiationOutcome::Applied { current, .. }) => current,
        other => {
            return Err(CliError::simulation(
                "negotiate",
                format!("size {packet_size} not applied: {other:?}"),
            ));
        }
    };

    // Record.
    let start = RecordingEvent::new(EventKind::StartRecording).with_data(RecordingData {
        id: Some(1),
        title: Some("Simulated match".to_string()),
        myteam: Some("Home".to_string()),
        opponentteam: Some("Away".to_string()),
        ..RecordingData::default()
    });
    central.event(Channel::StartRecording, &start).await?;
    central
        .event(
            Channel::PauseRecording,
            &RecordingEvent::new(EventKind::PauseRecording),
        )
        .await?;
    central
        .event(
            Channel::ResumeRecording,
            &RecordingEvent::new(EventKind::ContinueRecording),
        )
        .await?;

    central
        .event(
            Channel::DeviceInfo,
            &RecordingEvent::new(EventKind::CheckDeviceStatus),
        )
        .await?;
    let status = central.read(Channel::DeviceInfo).await?;
    let status_while_recording = status["data"]["device_status"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    // Preview.
    let bulk = Channel::FileTransfer.uuid();
    let receivers: Vec<SubscriberId> = (0..options.subscribers.max(1))
        .map(|_| central.transport.subscribe(bulk))
        .collect();
    let (transfer, expected) = central.preview(config.preview_source.clone()).await?;

    let verified_receivers = receivers
        .iter()
        .filter(|&&receiver| {
            let frames = central.transport.delivered_to(&bulk, receiver);
            assemble(&frames).as_deref() == Some(expected.as_slice())
        })
        .count();

    // Stop.
    central
        .event(
            Channel::StopRecording,
            &RecordingEvent::new(EventKind::StopRecording),
        )
        .await?;
    let recorded = central.handler.recording().status_description();

    Ok(SimulationSummary {
        device_id,
        negotiated_size,
        probes,
        status_while_recording,
        transfer,
        verified_receivers,
        recorded,
    })
}

/// Central side of the loopback link.
struct Central {
    handler: PeripheralHandler<LoopbackTransport>,
    transport: LoopbackTransport,
}

impl Central {
    async fn write(&self, channel: Channel, message: &[u8]) -> CliResult<WriteOutcome> {
        let mut outcome = WriteOutcome::Ignored;
        for frame in split_message(message)? {
            outcome = self.handler.on_write(channel.uuid(), &frame.encode()).await;
        }
        Ok(outcome)
    }

    async fn event(&self, channel: Channel, event: &RecordingEvent) -> CliResult<()> {
        let message = serde_json::to_vec(event)
            .map_err(|e| CliError::simulation("encode event", e.to_string()))?;
        match self.write(channel, &message).await? {
            WriteOutcome::Dispatched(kind) => {
                info!(%kind, channel = %channel, "Event accepted");
                Ok(())
            }
            other => Err(CliError::simulation(
                "recording event",
                format!("{} on {}: {:?}", event.event, channel, other),
            )),
        }
    }

    /// Reads pages until the sequence is complete and parses the JSON.
    async fn read(&self, channel: Channel) -> CliResult<Value> {
        let mut message = Vec::new();
        loop {
            let bytes = match self.handler.on_read(channel.uuid()).await {
                ReadResponse::Value(bytes) => bytes,
                ReadResponse::ProtocolError(e) => {
                    return Err(CliError::simulation("read", format!("{channel}: {e}")));
                }
            };
            let frame = ControlFrame::decode(&bytes)
                .ok_or_else(|| CliError::simulation("read", "malformed page"))?;
            message.extend_from_slice(&frame.payload);
            if frame.sequence == frame.total_count {
                message.truncate(usize::from(frame.declared_length));
                break;
            }
        }
        serde_json::from_slice(&message).map_err(|e| CliError::simulation("read", e.to_string()))
    }

    /// Triggers the preview and returns the report with the bytes sent.
    async fn preview(&self, source: Option<PathBuf>) -> CliResult<(TransferReport, Vec<u8>)> {
        let Some(path) = source else {
            let bytes: Vec<u8> = (0..GENERATED_PREVIEW_LEN).map(|i| (i % 251) as u8).collect();
            let report = self
                .handler
                .transfers()
                .start(&ByteSource::memory("generated", bytes.clone()))
                .await?;
            return Ok((report, bytes));
        };

        let expected = tokio::fs::read(&path).await?;
        self.event(
            Channel::StartRecording,
            &RecordingEvent::new(EventKind::PreviewRecording),
        )
        .await?;
        let report = self
            .handler
            .finish_preview()
            .await
            .ok_or_else(|| CliError::simulation("preview", "transfer was not started"))??;
        Ok((report, expected))
    }
}

fn assemble(frames: &[Vec<u8>]) -> Option<Vec<u8>> {
    let mut assembler = BulkAssembler::new();
    frames
        .iter()
        .find_map(|frame| match assembler.accept_bytes(frame) {
            AssemblyProgress::Complete(bytes) => Some(bytes),
            _ => None,
        })
}
