//! JSON description of a demuxed source, used by the CLI and tests

use crate::error::{HostError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use workerlink_abi::{RawFormatContext, RawFrame, RawStreamInfo, StreamKind};

/// Raw kind value for a stream the demuxer could not classify
pub const UNCLASSIFIED_STREAM_KIND: u32 = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStream {
    pub index: u32,
    #[serde(default)]
    pub kind: Option<StreamKind>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub sample_rate: u32,
    #[serde(default)]
    pub channels: u32,
}

impl SourceStream {
    fn to_raw(&self) -> RawStreamInfo {
        RawStreamInfo {
            index: self.index,
            kind: self.kind.map_or(UNCLASSIFIED_STREAM_KIND, StreamKind::as_raw),
            width: self.width,
            height: self.height,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

/// One decoded frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameData {
    pub stream_index: u32,
    pub pts: i64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub sample_rate: u32,
    #[serde(default)]
    pub channels: u32,
    #[serde(default)]
    pub nb_samples: u32,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl FrameData {
    pub fn audio(stream_index: u32, pts: i64, sample_rate: u32, channels: u32, nb_samples: u32) -> Self {
        Self {
            stream_index,
            pts,
            sample_rate,
            channels,
            nb_samples,
            ..Default::default()
        }
    }

    pub fn video(stream_index: u32, pts: i64, width: u32, height: u32) -> Self {
        Self {
            stream_index,
            pts,
            width,
            height,
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Raw view borrowing `self.data`; must not outlive `self`.
    pub fn as_raw(&self) -> RawFrame {
        RawFrame {
            pts: self.pts,
            width: self.width,
            height: self.height,
            sample_rate: self.sample_rate,
            channels: self.channels,
            nb_samples: self.nb_samples,
            data: if self.data.is_empty() {
                std::ptr::null()
            } else {
                self.data.as_ptr()
            },
            data_len: self.data.len(),
        }
    }
}

/// Owns the stream table a [`RawFormatContext`] points into
#[derive(Debug, Clone)]
pub struct FormatContextView {
    streams: Vec<RawStreamInfo>,
}

impl FormatContextView {
    pub fn nb_streams(&self) -> usize {
        self.streams.len()
    }

    /// Raw context borrowing this view; must not outlive it.
    pub fn as_raw(&self) -> RawFormatContext {
        RawFormatContext {
            nb_streams: self.streams.len() as u32,
            streams: self.streams.as_ptr(),
        }
    }
}

/// Streams of a source plus the frames to feed through a media worker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    pub streams: Vec<SourceStream>,
    #[serde(default)]
    pub frames: Vec<FrameData>,
}

impl MediaSource {
    pub fn from_json(json: &str) -> Result<Self> {
        let source: MediaSource = serde_json::from_str(json)
            .map_err(|e| HostError::InvalidJob(format!("malformed source description: {}", e)))?;
        source.validate()?;
        Ok(source)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            HostError::InvalidJob(format!("cannot read source {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Stream indices must be dense and in order; frames must reference existing streams.
    pub fn validate(&self) -> Result<()> {
        for (position, stream) in self.streams.iter().enumerate() {
            if stream.index as usize != position {
                return Err(HostError::InvalidJob(format!(
                    "stream at position {} has index {}",
                    position, stream.index
                )));
            }
        }
        if let Some(frame) = self
            .frames
            .iter()
            .find(|f| f.stream_index as usize >= self.streams.len())
        {
            return Err(HostError::InvalidJob(format!(
                "frame at pts {} references missing stream {}",
                frame.pts, frame.stream_index
            )));
        }
        Ok(())
    }

    pub fn format_context(&self) -> FormatContextView {
        FormatContextView {
            streams: self.streams.iter().map(SourceStream::to_raw).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"{
        "streams": [
            {"index": 0, "kind": "video", "width": 1280, "height": 720},
            {"index": 1, "kind": "audio", "sample_rate": 48000, "channels": 2},
            {"index": 2, "kind": "data"},
            {"index": 3}
        ],
        "frames": [
            {"stream_index": 1, "pts": 1000, "sample_rate": 16000, "channels": 1, "nb_samples": 512}
        ]
    }"#;

    #[test]
    fn test_parse_source() {
        let source = MediaSource::from_json(SOURCE).unwrap();
        assert_eq!(4, source.streams.len());
        assert_eq!(None, source.streams[3].kind);
        assert_eq!(FrameData::audio(1, 1000, 16000, 1, 512), source.frames[0]);
    }

    #[test]
    fn test_format_context_view() {
        let source = MediaSource::from_json(SOURCE).unwrap();
        let view = source.format_context();
        let raw = view.as_raw();
        assert_eq!(4, raw.nb_streams);
        let streams = unsafe { std::slice::from_raw_parts(raw.streams, 4) };
        assert_eq!(StreamKind::Audio.as_raw(), streams[1].kind);
        assert_eq!(UNCLASSIFIED_STREAM_KIND, streams[3].kind);
    }

    #[test]
    fn test_rejects_sparse_indices() {
        let json = r#"{"streams": [{"index": 1, "kind": "audio"}]}"#;
        assert!(MediaSource::from_json(json).is_err());
    }

    #[test]
    fn test_rejects_frames_for_missing_streams() {
        let json = r#"{"streams": [{"index": 0, "kind": "audio"}], "frames": [{"stream_index": 4, "pts": 0}]}"#;
        let err = MediaSource::from_json(json).unwrap_err();
        assert!(err.to_string().contains("missing stream 4"));
    }

    #[test]
    fn test_frame_raw_view() {
        let frame = FrameData::video(0, 40, 640, 480).with_data(vec![0u8; 16]);
        let raw = frame.as_raw();
        assert_eq!(16, raw.data_len);
        assert!(!raw.data.is_null());
        assert!(FrameData::audio(0, 0, 8000, 1, 160).as_raw().data.is_null());
    }
}
