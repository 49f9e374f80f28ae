//! ChannelProfileWorker: channel metadata plus its latest uploads
//!
//! The two collaborator calls run concurrently and degrade independently.

use super::mailbox::Worker;
use super::policy::WorkerFault;
use crate::youtube::{map_channel, map_videos, VideoSource};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use vidlens_common::{ChannelProfile, VideoResult};

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelProfileData {
    pub channel_info: ChannelProfile,
    pub videos: Vec<VideoResult>,
}

pub enum ChannelMsg {
    Fetch {
        channel_id: String,
        reply: oneshot::Sender<ChannelProfileData>,
    },
}

pub struct ChannelProfileWorker {
    source: Arc<dyn VideoSource>,
    video_limit: usize,
}

impl ChannelProfileWorker {
    pub fn new(source: Arc<dyn VideoSource>, video_limit: usize) -> Self {
        Self { source, video_limit }
    }
}

async fn fetch_profile(
    source: Arc<dyn VideoSource>,
    channel_id: String,
    video_limit: usize,
) -> ChannelProfileData {
    let (info, recent) = tokio::join!(
        source.channel_info(&channel_id),
        source.recent_videos(&channel_id, video_limit)
    );

    let channel_info = match info {
        Ok(raw) => map_channel(raw, &channel_id),
        Err(e) => {
            warn!(channel = %channel_id, "Channel info failed, using sentinel: {}", e);
            ChannelProfile::unavailable(channel_id.clone())
        }
    };

    let videos = match recent {
        Ok(raws) => map_videos(raws),
        Err(e) => {
            warn!(channel = %channel_id, "Recent videos failed, using empty list: {}", e);
            Vec::new()
        }
    };

    ChannelProfileData {
        channel_info,
        videos,
    }
}

#[async_trait]
impl Worker for ChannelProfileWorker {
    type Message = ChannelMsg;

    async fn handle(&mut self, msg: ChannelMsg) -> Result<(), WorkerFault> {
        let ChannelMsg::Fetch { channel_id, reply } = msg;
        let source = self.source.clone();
        let limit = self.video_limit;

        tokio::spawn(async move {
            let data = fetch_profile(source, channel_id, limit).await;
            debug!(
                channel = %data.channel_info.channel_id,
                videos = data.videos.len(),
                "Channel profile assembled"
            );
            let _ = reply.send(data);
        });
        Ok(())
    }
}
