//! routes decoded client messages into the ingest buffer.
//!
//! runs on the single ingest thread. staging is plain map updates; the only
//! side effect beyond the buffer is the immediate rating job scheduled for
//! a freshly connected user, so the first reply does not wait for the next
//! second tick.

use crate::clock;
use crate::error::{Result, ServiceError};
use crate::ingest::IngestEvents;
use crate::jobs::{JobDispatcher, UserIdJob};
use crate::state::DISCONNECTED;
use podium_proto::ClientMessage;
use std::sync::Arc;

pub struct MessageRouter {
    dispatcher: Arc<JobDispatcher>,
}

impl MessageRouter {
    pub fn new(dispatcher: Arc<JobDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// fold one message into the attached ingest buffer.
    pub fn route(&self, msg: ClientMessage, events: &mut IngestEvents) -> Result<()> {
        match msg {
            ClientMessage::Handshake { .. } => return Err(ServiceError::RepeatedHandshake),
            ClientMessage::UserRegistered { id, name } => {
                events.registered.insert(id, name);
            }
            ClientMessage::UserRenamed { id, name } => {
                events.renamed.insert(id, name);
            }
            ClientMessage::UserConnected { id } => {
                events
                    .connection_changes
                    .insert(id, clock::second_of_minute());

                // the user maps may not know this id until the next
                // recalculation folds the buffer in; a registration still
                // staged here is a promise that the id is real
                let promised = events.registered.contains_key(&id);
                self.dispatcher.enqueue_user_id(UserIdJob { id, promised });
            }
            ClientMessage::UserDisconnected { id } => {
                events.connection_changes.insert(id, DISCONNECTED);
            }
            ClientMessage::UserDealWon { id, amount } => {
                events.stage_deal(id, amount);
            }
        }

        Ok(())
    }
}
