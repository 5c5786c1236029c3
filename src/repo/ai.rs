//! AI prompt endpoint
//!
//! Prompt responses stream back over the realtime channel, so a prompt
//! establishes the channel first when it is not already connected.

use crate::channel::{ChannelState, RealtimeChannel};
use crate::error::Result;
use crate::transport::{ApiRequest, Transport};
use crate::types::AiPromptBody;
use serde_json::Value;
use std::sync::Arc;

const BASE_PATH: &str = "/api/v1/org/:orgId/instance/:instanceId/ai";

pub struct AiRepository {
    transport: Arc<Transport>,
    channel: Arc<RealtimeChannel>,
}

impl AiRepository {
    pub(crate) fn new(transport: Arc<Transport>, channel: Arc<RealtimeChannel>) -> Self {
        Self { transport, channel }
    }

    /// Send a prompt, connecting the realtime channel first if needed
    pub async fn prompt(&self, body: &AiPromptBody) -> Result<Value> {
        if self.channel.state() != ChannelState::Connected {
            self.channel.connect().await?;
        }
        self.transport
            .send(ApiRequest::post(format!("{}/prompt", BASE_PATH), body)?)
            .await
    }
}
