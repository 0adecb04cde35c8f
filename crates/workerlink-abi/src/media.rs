//! Borrowed views over the source description and decoded frames

use crate::abi::{RawFormatContext, RawFrame, RawStreamInfo, StreamKind};
use std::convert::TryFrom;
use std::os::raw::c_uint;

/// One input stream of the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub index: c_uint,
    /// `None` for streams the demuxer could not classify
    pub kind: Option<StreamKind>,
    pub width: c_uint,
    pub height: c_uint,
    pub sample_rate: c_uint,
    pub channels: c_uint,
}

impl From<&RawStreamInfo> for StreamInfo {
    fn from(raw: &RawStreamInfo) -> Self {
        Self {
            index: raw.index,
            kind: StreamKind::try_from(raw.kind).ok(),
            width: raw.width,
            height: raw.height,
            sample_rate: raw.sample_rate,
            channels: raw.channels,
        }
    }
}

/// Read-only stream table, borrowed for one `init_process` call
#[derive(Debug, Clone, Copy)]
pub struct FormatContext<'a> {
    streams: &'a [RawStreamInfo],
}

impl<'a> FormatContext<'a> {
    /// # Safety
    ///
    /// `raw` must be null or point at a context whose `streams` array holds
    /// `nb_streams` entries and outlives `'a`.
    pub unsafe fn from_raw(raw: *const RawFormatContext) -> Self {
        let streams = match raw.as_ref() {
            Some(ctx) if !ctx.streams.is_null() && ctx.nb_streams > 0 => {
                std::slice::from_raw_parts(ctx.streams, ctx.nb_streams as usize)
            }
            _ => &[],
        };
        Self { streams }
    }

    pub fn from_slice(streams: &'a [RawStreamInfo]) -> Self {
        Self { streams }
    }

    pub fn nb_streams(&self) -> usize {
        self.streams.len()
    }

    pub fn streams(&self) -> impl Iterator<Item = StreamInfo> + 'a {
        self.streams.iter().map(StreamInfo::from)
    }

    pub fn stream(&self, index: usize) -> Option<StreamInfo> {
        self.streams.get(index).map(StreamInfo::from)
    }
}

/// What a frame carries, derived from its populated fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Video {
        width: c_uint,
        height: c_uint,
    },
    Audio {
        sample_rate: c_uint,
        channels: c_uint,
        nb_samples: c_uint,
    },
    Unknown,
}

/// One decoded frame, valid for the duration of a `process_frame` call
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    raw: &'a RawFrame,
}

impl<'a> Frame<'a> {
    /// # Safety
    ///
    /// `raw` must be null or valid for `'a`, with `data` readable for `data_len` bytes.
    pub unsafe fn from_raw(raw: *const RawFrame) -> Option<Self> {
        raw.as_ref().map(|raw| Self { raw })
    }

    pub fn pts(&self) -> i64 {
        self.raw.pts
    }

    pub fn kind(&self) -> FrameKind {
        let raw = self.raw;
        if raw.width > 0 && raw.height > 0 {
            FrameKind::Video {
                width: raw.width,
                height: raw.height,
            }
        } else if raw.sample_rate > 0 && raw.channels > 0 {
            FrameKind::Audio {
                sample_rate: raw.sample_rate,
                channels: raw.channels,
                nb_samples: raw.nb_samples,
            }
        } else {
            FrameKind::Unknown
        }
    }

    pub fn data(&self) -> &'a [u8] {
        if self.raw.data.is_null() || self.raw.data_len == 0 {
            return &[];
        }
        // SAFETY: guaranteed by `from_raw`'s contract
        unsafe { std::slice::from_raw_parts(self.raw.data, self.raw.data_len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: c_uint, height: c_uint, sample_rate: c_uint, channels: c_uint) -> RawFrame {
        RawFrame {
            pts: 1000,
            width,
            height,
            sample_rate,
            channels,
            nb_samples: 512,
            data: std::ptr::null(),
            data_len: 0,
        }
    }

    #[test]
    fn test_frame_classification() {
        let video = frame(1920, 1080, 0, 0);
        let audio = frame(0, 0, 16000, 1);
        let empty = frame(0, 0, 0, 0);
        unsafe {
            assert_eq!(
                FrameKind::Video { width: 1920, height: 1080 },
                Frame::from_raw(&video).unwrap().kind()
            );
            assert_eq!(
                FrameKind::Audio { sample_rate: 16000, channels: 1, nb_samples: 512 },
                Frame::from_raw(&audio).unwrap().kind()
            );
            assert_eq!(FrameKind::Unknown, Frame::from_raw(&empty).unwrap().kind());
            assert!(Frame::from_raw(std::ptr::null()).is_none());
        }
    }

    #[test]
    fn test_frame_data() {
        let bytes = [1u8, 2, 3];
        let mut raw = frame(0, 0, 16000, 1);
        raw.data = bytes.as_ptr();
        raw.data_len = bytes.len();
        let frame = unsafe { Frame::from_raw(&raw) }.unwrap();
        assert_eq!(&[1, 2, 3], frame.data());
        assert_eq!(1000, frame.pts());
    }

    #[test]
    fn test_format_context_streams() {
        let streams = [
            RawStreamInfo { index: 0, kind: 0, width: 640, height: 480, ..Default::default() },
            RawStreamInfo { index: 1, kind: 1, sample_rate: 48000, channels: 2, ..Default::default() },
            RawStreamInfo { index: 2, kind: 255, ..Default::default() },
        ];
        let raw = RawFormatContext { nb_streams: 3, streams: streams.as_ptr() };
        let context = unsafe { FormatContext::from_raw(&raw) };
        assert_eq!(3, context.nb_streams());
        let kinds: Vec<_> = context.streams().map(|s| s.kind).collect();
        assert_eq!(vec![Some(StreamKind::Video), Some(StreamKind::Audio), None], kinds);
        assert_eq!(48000, context.stream(1).unwrap().sample_rate);

        let empty = unsafe { FormatContext::from_raw(std::ptr::null()) };
        assert_eq!(0, empty.nb_streams());
    }
}
