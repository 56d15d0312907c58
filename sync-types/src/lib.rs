//! # sync-types
//!
//! Wire and data types for the murmur real-time sync core.
//!
//! This crate provides the foundational types used across all murmur crates:
//! - [`PeerId`], [`GroupId`], [`ServerId`], [`LocalId`], [`Scope`] - Identity and scoping types
//! - [`Message`], [`ServerMessage`] - Local and server-confirmed message records
//! - [`RawFrame`], [`InboundEvent`], [`OutboundEvent`] - Event channel schemas
//! - [`SyncError`] - Classified error kinds

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod events;
mod ids;
mod messages;

pub use error::SyncError;
pub use events::{InboundEvent, OutboundEvent, RawFrame};
pub use ids::{Credential, GroupId, LocalId, PeerId, Scope, ServerId};
pub use messages::{ConversationSummary, DeliveryState, Message, OutgoingMessage, ServerMessage};
