//! Channel and stream collaborators, and the registry of handled channels.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::binding::WindowId;
use crate::error::{Error, Result};

/// Channel type accepted by [`Engine::handle_channel`](crate::engine::Engine::handle_channel).
pub const STREAMED_MEDIA_CHANNEL_TYPE: &str = "org.freedesktop.Telepathy.Channel.Type.StreamedMedia";

/// Media carried by a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Audio,
    Video,
}

/// Connection state of a stream, as relayed to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Disconnected,
    Connecting,
    Connected,
}

/// Direction in which a stream is flowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamDirection {
    None,
    Send,
    Receive,
    Bidirectional,
}

/// A single negotiated media stream inside a channel.
///
/// Implementations live outside the resource manager; the engine only calls
/// into them from its control loop.
pub trait MediaStream: Send + Sync {
    /// Stream id, unique within its channel.
    fn id(&self) -> u32;

    fn media_type(&self) -> MediaType;

    /// Report a failure so the owner can renegotiate or close the stream.
    fn notify_error(&self, message: &str);

    /// Point the stream's output at `window`; [`WindowId::NONE`] revokes it.
    fn set_output_window(&self, window: WindowId) -> Result<()>;

    fn mute_input(&self, mute: bool) -> Result<()>;

    fn mute_output(&self, mute: bool) -> Result<()>;

    fn set_output_volume(&self, volume: f64) -> Result<()>;
}

/// A streamed-media channel handed to the engine.
pub trait MediaChannel: Send + Sync {
    /// Object path identifying the channel.
    fn path(&self) -> &str;

    /// Streams currently alive in the channel.
    fn streams(&self) -> Vec<Arc<dyn MediaStream>>;

    /// Forward an engine-wide error to the channel.
    fn error(&self, code: u32, message: &str);

    /// Look up a stream by id.
    fn stream(&self, id: u32) -> Option<Arc<dyn MediaStream>> {
        self.streams().into_iter().find(|s| s.id() == id)
    }
}

/// Handled channels keyed by object path.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: BTreeMap<String, Arc<dyn MediaChannel>>,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel; returns false if the path was already present.
    pub fn register(&mut self, channel: Arc<dyn MediaChannel>) -> bool {
        let path = channel.path().to_string();
        self.channels.insert(path, channel).is_none()
    }

    /// Forget a channel; returns the removed channel if it was present.
    pub fn unregister(&mut self, path: &str) -> Option<Arc<dyn MediaChannel>> {
        self.channels.remove(path)
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Arc<dyn MediaChannel>> {
        self.channels.get(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Object paths of every handled channel.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Every video stream across every handled channel.
    #[must_use]
    pub fn video_streams(&self) -> Vec<Arc<dyn MediaStream>> {
        self.channels
            .values()
            .flat_map(|channel| channel.streams())
            .filter(|stream| stream.media_type() == MediaType::Video)
            .collect()
    }

    /// Resolve a stream by channel path and stream id.
    pub fn find_stream(&self, path: &str, stream_id: u32) -> Result<Arc<dyn MediaStream>> {
        let channel = self.channels.get(path).ok_or_else(|| Error::ChannelNotFound(path.to_string()))?;
        channel
            .stream(stream_id)
            .ok_or_else(|| Error::StreamNotFound { channel: path.to_string(), stream_id })
    }

    /// Forward an error to every handled channel.
    pub fn broadcast_error(&self, code: u32, message: &str) {
        for channel in self.channels.values() {
            channel.error(code, message);
        }
    }
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.channels.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::testing::{FakeChannel, FakeStream};

    fn registry_with_call() -> (ChannelRegistry, Arc<FakeStream>, Arc<FakeStream>) {
        let audio = FakeStream::new(1, MediaType::Audio);
        let video = FakeStream::new(2, MediaType::Video);
        let channel = FakeChannel::new("/chan/1", vec![audio.clone(), video.clone()]);
        let mut registry = ChannelRegistry::new();
        assert!(registry.register(channel));
        (registry, audio, video)
    }

    #[test]
    fn test_video_streams_skip_audio() {
        let (registry, _audio, video) = registry_with_call();
        let streams = registry.video_streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].id(), video.id());
    }

    #[test]
    fn test_find_stream_misses() {
        let (registry, ..) = registry_with_call();
        assert_matches!(registry.find_stream("/chan/9", 1).err(), Some(Error::ChannelNotFound(_)));
        assert_matches!(
            registry.find_stream("/chan/1", 7).err(),
            Some(Error::StreamNotFound { stream_id: 7, .. })
        );
        assert!(registry.find_stream("/chan/1", 2).is_ok());
    }

    #[test]
    fn test_register_same_path_twice() {
        let (mut registry, ..) = registry_with_call();
        assert!(!registry.register(FakeChannel::new("/chan/1", Vec::new())));
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister("/chan/1").is_some());
        assert!(registry.is_empty());
    }
}
