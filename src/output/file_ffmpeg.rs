//! Video encoding using FFmpeg.

use std::path::Path;

use anyhow::{anyhow, Context};
use ffmpeg_next as ffmpeg;
use image::RgbImage;

use super::{CodecChoice, FrameSink};
use crate::error::{PipelineError, Result};

pub(crate) struct FfmpegSink {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::video::Encoder,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    width: u32,
    height: u32,
    next_pts: i64,
    finished: bool,
}

impl FfmpegSink {
    pub(crate) fn open(
        path: &Path,
        choice: &CodecChoice,
        fps: f64,
        (width, height): (u32, u32),
    ) -> anyhow::Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let codec = ffmpeg::encoder::find_by_name(choice.encoder)
            .ok_or_else(|| anyhow!("encoder '{}' is not available", choice.encoder))?;
        let pixel_format = codec
            .video()
            .ok()
            .and_then(|video| video.formats())
            .and_then(|mut formats| formats.next())
            .unwrap_or(ffmpeg::format::Pixel::YUV420P);

        let mut output = match choice.container {
            Some(container) => ffmpeg::format::output_as(&path, container),
            None => ffmpeg::format::output(&path),
        }
        .with_context(|| format!("create output {}", path.display()))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let frame_rate = ffmpeg::Rational::from(fps);
        let time_base = frame_rate.invert();

        let mut stream = output.add_stream(codec).context("add video stream")?;
        let stream_index = stream.index();

        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("create video encoder")?;
        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(pixel_format);
        encoder.set_time_base(time_base);
        encoder.set_frame_rate(Some(frame_rate));
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder
            .open_as(codec)
            .with_context(|| format!("open encoder '{}'", choice.encoder))?;
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);

        output.write_header().context("write container header")?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|s| s.time_base())
            .unwrap_or(time_base);

        let scaler = ffmpeg::software::scaling::context::Context::get(
            ffmpeg::format::Pixel::RGB24,
            width,
            height,
            pixel_format,
            width,
            height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base: time_base,
            stream_time_base,
            width,
            height,
            next_pts: 0,
            finished: false,
        })
    }

    fn drain_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(write_err)?;
        }
        Ok(())
    }
}

impl FrameSink for FfmpegSink {
    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        if self.finished {
            return Err(PipelineError::Write("writer already finished".to_string()));
        }
        if frame.dimensions() != (self.width, self.height) {
            return Err(PipelineError::Write(format!(
                "frame is {}x{}, writer expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let mut rgb = ffmpeg::frame::Video::new(ffmpeg::format::Pixel::RGB24, self.width, self.height);
        let row_bytes = self.width as usize * 3;
        let stride = rgb.stride(0);
        let plane = rgb.data_mut(0);
        for (row, src) in frame.as_raw().chunks_exact(row_bytes).enumerate() {
            let start = row * stride;
            plane[start..start + row_bytes].copy_from_slice(src);
        }

        let mut converted = ffmpeg::frame::Video::empty();
        self.scaler.run(&rgb, &mut converted).map_err(write_err)?;
        converted.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder.send_frame(&converted).map_err(write_err)?;
        self.drain_packets()
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.encoder.send_eof().map_err(write_err)?;
        self.drain_packets()?;
        self.output.write_trailer().map_err(write_err)?;
        log::info!("writer closed after {} frames", self.next_pts);
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.finish() {
                log::warn!("failed to finalize video output: {}", e);
            }
        }
    }
}

fn write_err(e: ffmpeg::Error) -> PipelineError {
    PipelineError::Write(e.to_string())
}
