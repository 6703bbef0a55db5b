//! Actor-based monitoring services
//!
//! Each service runs as an independent async task that owns its state and is
//! reached through a cloneable handle.
//!
//! ## Architecture Overview
//!
//! ```text
//!   ┌──────────────────┐  Metrics / JobComplete / ThresholdBreach
//!   │ MetricsSampler   │───────────────┬──────────────────────────┐
//!   │ (timer, ledger,  │               │                          │
//!   │  history)        │               ▼                          ▼
//!   └────────▲─────────┘      ┌─────────────────┐       ┌──────────────────┐
//!            │ current()      │  AlertEngine    │ Alert │  BroadcastHub    │──▶ Envelope
//!   ┌────────┴─────────┐      │ (rules, alerts) │──────▶│ (subscriptions,  │    listeners
//!   │ HealthAggregator │◀─────┴─────────────────┘       │  polling tasks)  │
//!   │ (on demand)      │◀──────── health-status poll ───┤                  │
//!   └──────────────────┘                                └──────────────────┘
//! ```
//!
//! ## Actor Types
//!
//! - **MetricsSamplerActor**: samples queue/process/cache state on a timer
//! - **AlertEngineActor**: evaluates rules per snapshot and runs the alert lifecycle
//! - **BroadcastHubActor**: named subscriptions and envelope fan-out
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Events**: Actors publish events to broadcast channels for fan-out
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod alert_engine;
pub mod hub;
pub mod messages;
pub mod sampler;
