//! Simulated camera peripheral.
//!
//! This crate implements the peripheral side of the camlink protocol:
//! - Reassembly of control frame writes into messages
//! - Paginated read responses, one control frame per read
//! - Bulk frame size negotiation
//! - Bulk transfers fanned out to every subscriber
//! - The recording state machine with a periodic timer
//!
//! The platform radio stack is abstracted behind [`Transport`];
//! [`LoopbackTransport`] keeps everything in memory.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use camlink_protocol::Channel;
//! use camlink_server::{LoopbackTransport, PeripheralHandler, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> camlink_server::ServerResult<()> {
//!     let transport = Arc::new(LoopbackTransport::with_channels(
//!         Channel::ALL.map(Channel::uuid),
//!     ));
//!     let handler = PeripheralHandler::new(transport, ServerConfig::default())?;
//!
//!     let response = handler.on_read(Channel::ConnectionStatus.uuid()).await;
//!     println!("{response:?}");
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod handler;
mod negotiate;
mod pagination;
mod reassembly;
mod session;
mod transfer;
mod transport;

pub use config::{ServerConfig, default_device_id, default_device_name};
pub use error::{PageError, ServerError, ServerResult, TransferError, TransportError};
pub use handler::{
    BroadcastReport, DeviceQuery, DeviceState, NEGOTIATION_SCOPE, PROBE_LEN, PeripheralHandler,
    ReadResponse, SharedDeviceState, WriteOutcome, new_device_state,
};
pub use negotiate::{NegotiatedSize, NegotiationOutcome, PacketSizeNegotiator, parse_packet_size};
pub use pagination::PaginationCache;
pub use reassembly::{ReassemblyOutcome, ReassemblyTable, SessionKey};
pub use session::{RecordingController, TimerObserver};
pub use transfer::{
    BulkTransferEngine, ByteSource, ProgressCallback, TransferConfig, TransferProgress,
    TransferReport,
};
pub use transport::{LoopbackTransport, Notification, NotifyFuture, SubscriberId, Transport};
