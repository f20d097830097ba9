//! JSON payloads carried inside control frame sequences.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolResult;

/// Response body served on channel reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub errorcode: i32,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseEnvelope {
    /// Wraps `data` in a success envelope.
    pub fn success(data: Value) -> Self {
        Self {
            errorcode: 0,
            msg: "success".to_string(),
            data: Some(data),
        }
    }

    /// Envelope returned for reads on an unrecognized channel.
    pub fn unsupported() -> Self {
        Self {
            errorcode: 1,
            msg: "uuid not supported".to_string(),
            data: None,
        }
    }

    /// Returns true if the envelope reports success.
    pub fn is_success(&self) -> bool {
        self.errorcode == 0
    }

    /// Serializes the envelope to compact JSON bytes.
    pub fn to_bytes(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Recording control event written by the central.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign: Option<String>,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RecordingData>,
}

impl RecordingEvent {
    /// Builds an event with no payload.
    pub fn new(kind: EventKind) -> Self {
        Self {
            event: kind.as_str().to_string(),
            ..Self::default()
        }
    }

    /// Attaches a payload.
    pub fn with_data(mut self, data: RecordingData) -> Self {
        self.data = Some(data);
        self
    }

    /// Parses the event from assembled message bytes.
    pub fn from_slice(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Known event kind, or `None` for unrecognized names.
    pub fn kind(&self) -> Option<EventKind> {
        self.event.parse().ok()
    }

    /// Recording id carried in the payload, if any.
    pub fn recording_id(&self) -> Option<i64> {
        self.data.as_ref().and_then(|d| d.id)
    }
}

/// Recording event names understood by the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StartRecording,
    StopRecording,
    PauseRecording,
    ContinueRecording,
    PreviewRecording,
    GetDevice,
    GetRecordTime,
    CheckDeviceStatus,
}

impl EventKind {
    /// Wire name of the event.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::StartRecording => "start_recording",
            EventKind::StopRecording => "stop_recording",
            EventKind::PauseRecording => "pause_recording",
            EventKind::ContinueRecording => "continue_recording",
            EventKind::PreviewRecording => "preview_recording",
            EventKind::GetDevice => "get_device",
            EventKind::GetRecordTime => "get_record_time",
            EventKind::CheckDeviceStatus => "check_device_status",
        }
    }

    /// Returns true for the device info query events.
    pub fn is_device_query(self) -> bool {
        matches!(
            self,
            EventKind::GetDevice | EventKind::GetRecordTime | EventKind::CheckDeviceStatus
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start_recording" => Ok(EventKind::StartRecording),
            "stop_recording" => Ok(EventKind::StopRecording),
            "pause_recording" => Ok(EventKind::PauseRecording),
            "continue_recording" => Ok(EventKind::ContinueRecording),
            "preview_recording" => Ok(EventKind::PreviewRecording),
            "get_device" => Ok(EventKind::GetDevice),
            "get_record_time" => Ok(EventKind::GetRecordTime),
            "check_device_status" => Ok(EventKind::CheckDeviceStatus),
            other => Err(format!("unknown event: {other}")),
        }
    }
}

/// Match metadata attached to recording events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub myteam: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponentteam: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub match_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starttime: Option<String>,
    /// Accepts a JSON number or a numeric string.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "number_or_string"
    )]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_auth_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_auth_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alltype_live_auth_uri: Option<LiveAuthUris>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artc_push_auth_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub myteam_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponentteam_name: Option<String>,
}

/// Live stream endpoints per protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveAuthUris {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtmp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hls: Option<String>,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct NumberOrString;

    impl<'de> de::Visitor<'de> for NumberOrString {
        type Value = Option<i64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an integer or a numeric string")
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Option<i64>, E> {
            Ok(Some(value))
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Option<i64>, E> {
            i64::try_from(value)
                .map(Some)
                .map_err(|_| E::custom(format!("id out of range: {value}")))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Option<i64>, E> {
            let value = value.trim();
            if value.is_empty() {
                return Ok(None);
            }
            value
                .parse()
                .map(Some)
                .map_err(|_| E::custom(format!("invalid id: {value}")))
        }

        fn visit_unit<E: de::Error>(self) -> Result<Option<i64>, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(NumberOrString)
}

/// Negotiation message sent as JSON. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NegotiationEnvelope {
    #[serde(default)]
    pub data: Value,
}

impl NegotiationEnvelope {
    /// Integer held in `data`, given either as a number or a numeric string.
    pub fn packet_size(&self) -> Option<i64> {
        match &self.data {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// An entry of the pending uploads list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpload {
    pub id: String,
    pub push_auth_uri: String,
    pub title: String,
    pub myteam: String,
    pub opponentteam: String,
    pub address: String,
    #[serde(rename = "type")]
    pub match_type: String,
    pub created_at: String,
    pub thumb_image: String,
    pub second: String,
    pub finished_time: String,
}
