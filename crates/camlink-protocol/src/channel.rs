//! Channel identifiers exposed by the peripheral.

use std::fmt;

use uuid::{Uuid, uuid};

/// Primary service advertised by the peripheral.
pub const SERVICE_UUID: Uuid = uuid!("12345678-1234-5678-1234-56789abcdef0");

/// A logical read/write/notify endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    ConnectionStatus,
    /// Device info, record time and device status queries.
    DeviceInfo,
    StartRecording,
    PauseRecording,
    ResumeRecording,
    StopRecording,
    UploadNotice,
    PendingUploads,
    DeleteCached,
    /// Bulk file delivery. Notify only.
    FileTransfer,
    /// Bulk frame size negotiation.
    PacketSize,
}

impl Channel {
    /// Every channel, in advertisement order.
    pub const ALL: [Channel; 11] = [
        Channel::ConnectionStatus,
        Channel::DeviceInfo,
        Channel::StartRecording,
        Channel::PauseRecording,
        Channel::ResumeRecording,
        Channel::StopRecording,
        Channel::UploadNotice,
        Channel::PendingUploads,
        Channel::DeleteCached,
        Channel::FileTransfer,
        Channel::PacketSize,
    ];

    /// Returns the channel's UUID.
    pub const fn uuid(self) -> Uuid {
        match self {
            Channel::ConnectionStatus => uuid!("12345678-1234-5678-1234-56789abcdef1"),
            Channel::DeviceInfo => uuid!("6f8d0b2c-4e1a-3c5d-7b9e-0f2a4c6e8b1d"),
            Channel::StartRecording => uuid!("8b7f1a2c-3e4d-4b8a-9c1e-2f6d7a8b9c0d"),
            Channel::PauseRecording => uuid!("1c2d3e4f-5a6b-7c8d-9e0f-1a2b3c4d5e6f"),
            Channel::ResumeRecording => uuid!("9a8b7c6d-5e4f-3a2b-1c0d-9e8f7a6b5c4d"),
            Channel::StopRecording => uuid!("2f4e6d8c-1b3a-5c7e-9d0f-2a4c6e8b1d3f"),
            Channel::UploadNotice => uuid!("7e6d5c4b-3a2f-1e0d-9c8b-7a6f5e4d3c2b"),
            Channel::PendingUploads => uuid!("0a1b2c3d-4e5f-6a7b-8c9d-0e1f2a3b4c5d"),
            Channel::DeleteCached => uuid!("3c5e7a9b-1d2f-4b6d-8e0f-3a5c7e9b1d2f"),
            Channel::FileTransfer => uuid!("4b5d6e7f-8a9b-1c2d-3e4f-5a6b7c8d9e0f"),
            Channel::PacketSize => uuid!("5d6f7a8b-9c0d-1e2f-3a4b-5c6d7e8f9a0b"),
        }
    }

    /// Looks up a channel by UUID.
    pub fn from_uuid(uuid: &Uuid) -> Option<Channel> {
        Self::ALL.into_iter().find(|c| c.uuid() == *uuid)
    }

    /// Returns true for the bulk delivery channel.
    pub fn is_bulk(self) -> bool {
        self == Channel::FileTransfer
    }

    /// Returns true for the frame size negotiation channel.
    pub fn is_negotiation(self) -> bool {
        self == Channel::PacketSize
    }

    /// Short name used in logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            Channel::ConnectionStatus => "connection-status",
            Channel::DeviceInfo => "device-info",
            Channel::StartRecording => "start-recording",
            Channel::PauseRecording => "pause-recording",
            Channel::ResumeRecording => "resume-recording",
            Channel::StopRecording => "stop-recording",
            Channel::UploadNotice => "upload-notice",
            Channel::PendingUploads => "pending-uploads",
            Channel::DeleteCached => "delete-cached",
            Channel::FileTransfer => "file-transfer",
            Channel::PacketSize => "packet-size",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn uuids_round_trip_and_are_unique() {
        let mut seen = HashSet::new();
        for channel in Channel::ALL {
            assert!(seen.insert(channel.uuid()));
            assert_eq!(Channel::from_uuid(&channel.uuid()), Some(channel));
        }
        assert!(!seen.contains(&SERVICE_UUID));
    }

    #[test]
    fn unknown_uuid() {
        assert_eq!(Channel::from_uuid(&Uuid::nil()), None);
    }

    #[test]
    fn reserved_channels() {
        assert!(Channel::FileTransfer.is_bulk());
        assert!(Channel::PacketSize.is_negotiation());
        assert_eq!(Channel::ALL.iter().filter(|c| c.is_bulk()).count(), 1);
    }
}
