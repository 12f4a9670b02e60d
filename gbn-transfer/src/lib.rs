//! `gbn-transfer`: ordered single-file transfer over TCP with a Go-Back-N
//! sliding window.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐   DATA "<seq>:<bytes>"   ┌───────────────┐
//!  │  GbnSender   │─────────────────────────▶│  GbnReceiver  │
//!  └──────┬───────┘                          └───────┬───────┘
//!         │        ACK "<n>[|<size>]"                │
//!         │◀─────────────────────────────────────────┘
//!         │                                          │
//!  ┌──────▼───────┐                          ┌───────▼───────┐
//!  │    Client    │                          │    Session    │ one per connection
//!  │ (handshake,  │                          │ (handshake,   │ spawned by Server
//!  │  negotiate)  │                          │  negotiate)   │
//!  └──────┬───────┘                          └───────┬───────┘
//!         │        length-prefixed messages          │
//!  ┌──────▼──────────────────────────────────────────▼───────┐
//!  │                 Channel (tokio TcpStream)               │
//!  └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`frame`]        wire tokens and frame / ack codecs
//! - [`channel`]      message boundaries over a TCP stream
//! - [`handshake`]    `SIN` / `SIN/ACK` / `ACK` exchange
//! - [`negotiation`]  initial maximum payload size
//! - [`gbn_sender`]   sliding window, Go-Back-N resend, live resizing
//! - [`gbn_receiver`] reorder buffer and cumulative acks
//! - [`size_policy`]  receiver's choice of the next size directive
//! - [`state`]        session phase types
//! - [`session`]      server side of one connection
//! - [`server`]       accept loop, task per connection
//! - [`client`]       sending side of one connection
//! - [`config`]       `key: value` configuration files

pub mod channel;
pub mod client;
pub mod config;
pub mod frame;
pub mod gbn_receiver;
pub mod gbn_sender;
pub mod handshake;
pub mod negotiation;
pub mod server;
pub mod session;
pub mod size_policy;
pub mod state;
