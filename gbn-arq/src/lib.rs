//! `gbn-arq`: a Go-Back-N ARQ engine over pluggable channels.
//!
//! # Architecture
//!
//! ```text
//!  ┌───────────┐  Transmission  ┌──────────┐   batch    ┌─────────────┐
//!  │ GbnSender │───────────────▶│ Channel  │───────────▶│ GbnReceiver │
//!  └─────┬─────┘                └────┬─────┘            └──────┬──────┘
//!        │                           │                         │
//!        │  Verdict(RR | REJ)        │       RR | REJ | none   │
//!        │◀──────── or TimedOut ─────┘◀────────────────────────┘
//!        │
//!  one round at a time: same batch again on REJ / timeout
//! ```
//!
//! Each module has a single responsibility:
//! - [`window`]        — slicing the stream into rounds
//! - [`gbn_sender`]    — round loop, retry policy, round log
//! - [`gbn_receiver`]  — length validation, cumulative append, stale-drop
//! - [`fault`]         — scripted one-shot receiver faults
//! - [`channel`]       — the transport trait and the in-process channel
//! - [`tcp`]           — one-connection-per-round TCP binding
//! - [`frame`]         — transmissions, verdicts, and their wire layout
//! - [`config`]        — validated transfer parameters
//! - [`error`]         — what can end a transfer early

pub mod channel;
pub mod config;
pub mod error;
pub mod fault;
pub mod frame;
pub mod gbn_receiver;
pub mod gbn_sender;
pub mod tcp;
pub mod window;

pub use channel::{Channel, LocalChannel, Outcome};
pub use config::TransferConfig;
pub use error::{ConfigError, GbnError, TransportError};
pub use fault::{Fault, FaultPolicy, NoFaults, ScriptedFaults};
pub use frame::{Transmission, Verdict};
pub use gbn_receiver::{GbnReceiver, SharedReceiver};
pub use gbn_sender::{GbnSender, RoundEvent, Transfer, TransferReport};
pub use tcp::{TcpChannel, TcpReceiver};
