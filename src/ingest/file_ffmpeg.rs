//! Local video decoding using FFmpeg.
//!
//! Frames are decoded in-memory and converted to packed RGB24. At end of
//! input the decoder is flushed so trailing frames are not lost.

use ffmpeg_next as ffmpeg;

use super::SourceInfo;
use crate::error::{PipelineError, Result};
use crate::frame::Frame;

pub(crate) struct FfmpegVideoSource {
    path: String,
    info: SourceInfo,
    inner: Option<Decoding>,
    frames_read: u64,
}

struct Decoding {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
}

impl FfmpegVideoSource {
    pub(crate) fn open(path: &str) -> Result<Self> {
        let unreadable = |e: ffmpeg::Error| PipelineError::unreadable(path, e);

        ffmpeg::init().map_err(unreadable)?;
        let input = ffmpeg::format::input(&path).map_err(unreadable)?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| PipelineError::unreadable(path, "file has no video track"))?;
        let stream_index = input_stream.index();
        let rate = input_stream.avg_frame_rate();
        let fps = (rate.numerator() > 0 && rate.denominator() > 0).then(|| f64::from(rate));

        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .map_err(unreadable)?;
        let decoder = context.decoder().video().map_err(unreadable)?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(unreadable)?;

        let info = SourceInfo {
            fps,
            width: decoder.width(),
            height: decoder.height(),
        };
        log::info!(
            "VideoSource: opened {} (ffmpeg, {}x{}, fps {:?})",
            path,
            info.width,
            info.height,
            info.fps
        );

        Ok(Self {
            path: path.to_string(),
            info,
            inner: Some(Decoding {
                input,
                stream_index,
                decoder,
                scaler,
                eof_sent: false,
            }),
            frames_read: 0,
        })
    }

    pub(crate) fn info(&self) -> SourceInfo {
        self.info
    }

    pub(crate) fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(None);
        };
        let decode_err = |e: ffmpeg::Error| PipelineError::unreadable(self.path.clone(), e);

        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            match receive_step(inner.decoder.receive_frame(&mut decoded)).map_err(decode_err)? {
                DecodeStep::Frame => {
                    let mut rgb_frame = ffmpeg::frame::Video::empty();
                    inner
                        .scaler
                        .run(&decoded, &mut rgb_frame)
                        .map_err(decode_err)?;
                    let frame = frame_to_rgb(&rgb_frame, self.frames_read)
                        .ok_or_else(|| PipelineError::unreadable(self.path.clone(), "malformed decoded frame"))?;
                    self.frames_read += 1;
                    return Ok(Some(frame));
                }
                DecodeStep::Exhausted => return Ok(None),
                DecodeStep::NeedInput if inner.eof_sent => {
                    return Err(PipelineError::unreadable(
                        self.path.clone(),
                        "decoder stalled after end of input",
                    ));
                }
                DecodeStep::NeedInput => {}
            }

            let next = inner
                .input
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));
            match next {
                Some((index, packet)) if index == inner.stream_index => {
                    inner.decoder.send_packet(&packet).map_err(decode_err)?;
                }
                Some(_) => {}
                None => {
                    inner.decoder.send_eof().map_err(decode_err)?;
                    inner.eof_sent = true;
                }
            }
        }
    }

    pub(crate) fn release(&mut self) {
        if self.inner.take().is_some() {
            log::info!(
                "VideoSource: released {} after {} frames",
                self.path,
                self.frames_read
            );
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum DecodeStep {
    Frame,
    NeedInput,
    Exhausted,
}

/// Only EAGAIN asks for another packet; any other failure is a decode error.
fn receive_step(
    result: std::result::Result<(), ffmpeg::Error>,
) -> std::result::Result<DecodeStep, ffmpeg::Error> {
    match result {
        Ok(()) => Ok(DecodeStep::Frame),
        Err(ffmpeg::Error::Eof) => Ok(DecodeStep::Exhausted),
        Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {
            Ok(DecodeStep::NeedInput)
        }
        Err(e) => Err(e),
    }
}

fn frame_to_rgb(frame: &ffmpeg::frame::Video, index: u64) -> Option<Frame> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Frame::from_rgb(width, height, data.get(..row_bytes * height as usize)?.to_vec(), index);
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(data.get(start..start + row_bytes)?);
    }
    Frame::from_rgb(width, height, pixels, index)
}
