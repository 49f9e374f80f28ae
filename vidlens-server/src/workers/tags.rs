//! TagLookupWorker: videos matching a tag, and the tags of a single video

use super::mailbox::Worker;
use super::policy::WorkerFault;
use crate::youtube::{map_videos, VideoSource};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use vidlens_common::VideoResult;

#[derive(Debug, Clone, PartialEq)]
pub struct TagVideos {
    pub tag: String,
    pub videos: Vec<VideoResult>,
}

pub enum TagMsg {
    Lookup {
        tag: String,
        reply: oneshot::Sender<TagVideos>,
    },
    /// `None` when the video is unknown or the lookup failed
    VideoDetails {
        video_id: String,
        reply: oneshot::Sender<Option<VideoResult>>,
    },
}

pub struct TagLookupWorker {
    source: Arc<dyn VideoSource>,
    limit: usize,
}

impl TagLookupWorker {
    pub fn new(source: Arc<dyn VideoSource>, limit: usize) -> Self {
        Self { source, limit }
    }
}

#[async_trait]
impl Worker for TagLookupWorker {
    type Message = TagMsg;

    async fn handle(&mut self, msg: TagMsg) -> Result<(), WorkerFault> {
        match msg {
            TagMsg::Lookup { tag, reply } => self.lookup(tag, reply),
            TagMsg::VideoDetails { video_id, reply } => self.details(video_id, reply),
        }
        Ok(())
    }
}

impl TagLookupWorker {
    fn lookup(&self, tag: String, reply: oneshot::Sender<TagVideos>) {
        let source = self.source.clone();
        let limit = self.limit;

        tokio::spawn(async move {
            let videos = if tag.trim().is_empty() {
                Vec::new()
            } else {
                match source.videos_by_tag(&tag, limit).await {
                    Ok(raws) => map_videos(raws),
                    Err(e) => {
                        warn!(tag = %tag, "Tag lookup failed, using empty result: {}", e);
                        Vec::new()
                    }
                }
            };
            let _ = reply.send(TagVideos { tag, videos });
        });
    }

    fn details(&self, video_id: String, reply: oneshot::Sender<Option<VideoResult>>) {
        let source = self.source.clone();

        tokio::spawn(async move {
            let video = if video_id.trim().is_empty() {
                None
            } else {
                match source.video_details(&video_id).await {
                    Ok(raw) => map_videos(vec![raw]).into_iter().next(),
                    Err(e) => {
                        warn!(video_id = %video_id, "Video lookup failed: {}", e);
                        None
                    }
                }
            };
            debug!(video_id = %video_id, found = video.is_some(), "Video details looked up");
            let _ = reply.send(video);
        });
    }
}
