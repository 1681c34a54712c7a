// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! StreamMaster Protocol - WebSocket + JSON hub communication layer
//!
//! This crate provides the wire protocol spoken with the StreamMaster
//! backend's real-time hub.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  streammaster-protocol                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RPC Layer: correlated Invocation/Completion + server push  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serialization: JSON records terminated by 0x1E             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: WebSocket (tokio-tungstenite)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use streammaster_protocol::{HubClient, HubClientConfig, HubEvent};
//!
//! let config = HubClientConfig {
//!     url: "ws://localhost:7095/hub".to_string(),
//!     ..Default::default()
//! };
//! let (client, mut events) = HubClient::connect(&config).await?;
//!
//! let page = client
//!     .invoke("GetPagedM3UFiles", vec![serde_json::json!({"pageNumber": 1, "pageSize": 10})])
//!     .await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         HubEvent::Invocation(inv) => println!("{} {:?}", inv.target, inv.arguments),
//!         HubEvent::Closed(reason) => break,
//!     }
//! }
//! ```

pub mod client;
pub mod frame;

pub use client::{ClientError, CloseReason, HubClient, HubClientConfig, HubEvent};
pub use frame::{
    Completion, FrameError, HandshakeRequest, HandshakeResponse, HubMessage, Invocation,
    MessageType, RECORD_SEPARATOR, RecordBuffer,
};
