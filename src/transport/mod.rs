//! WebSocket transport layer.
//!
//! This module handles communication between the Rust client and the
//! browser's remote-debugging endpoint over one persistent WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Session (Rust) │                              │  Browser        │
//! │                 │         WebSocket            │                 │
//! │  Connection     │◄────────────────────────────►│  DevTools       │
//! │  → EventSink    │   ws://host:port/devtools/…  │  endpoint       │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::connect` - WebSocket handshake with the endpoint
//! 2. `Connection::send` - Send commands, receive correlated responses
//! 3. `EventSink::dispatch` - Events delivered in arrival order
//! 4. `Connection::shutdown` - Close socket, reject everything pending
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket connection and event loop |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, EventSink};
