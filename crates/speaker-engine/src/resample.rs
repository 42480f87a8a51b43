//! Rate conversion stage.
//!
//! Sits between the decoder and the pacer when a source is not already at
//! the encoder operating point. Interleaved input is downmixed to mono by
//! averaging channels, then converted to 48 kHz with Rubato's streaming sinc
//! resampler. Unlike a device pipeline this runs inline on the tick, so it
//! buffers input until a full chunk is available instead of blocking.

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::decode::StreamSpec;
use crate::error::{EngineError, Result};

/// Streaming downmix + resample to a mono target rate.
pub struct RateConverter {
    resampler: Async<f32>,
    src: StreamSpec,
    dst_rate: u32,
    chunk_frames: usize,
    /// Mono samples at the source rate waiting for a full chunk.
    pending: Vec<f32>,
    out_buf: Vec<f32>,
    indexing: Indexing,
    /// Output frames still to discard to compensate for filter delay.
    delay_left: usize,
    consumed_frames: u64,
    produced_frames: u64,
    flushed: bool,
}

impl RateConverter {
    /// Build a converter from `src` to mono at `dst_rate`.
    pub fn new(src: StreamSpec, dst_rate: u32, chunk_frames: usize) -> Result<Self> {
        if src.rate == 0 || src.channels == 0 {
            return Err(EngineError::Resample(format!(
                "invalid source spec {} Hz / {} ch",
                src.rate, src.channels
            )));
        }
        let f_ratio = dst_rate as f64 / src.rate as f64;

        let sinc_len = 128;
        let oversampling_factor = 256;
        let interpolation = SincInterpolationType::Cubic;
        let window = WindowFunction::BlackmanHarris2;
        let f_cutoff = calculate_cutoff(sinc_len, window);

        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff,
            interpolation,
            oversampling_factor,
            window,
        };

        let chunk_frames = chunk_frames.max(1);
        let resampler =
            Async::<f32>::new_sinc(f_ratio, 1.1, &params, chunk_frames, 1, FixedAsync::Input)
                .map_err(|e| EngineError::Resample(format!("init: {e}")))?;

        let out_buf = vec![0.0f32; resampler.output_frames_max()];
        let delay_left = resampler.output_delay();

        tracing::info!(
            from_hz = src.rate,
            from_channels = src.channels,
            to_hz = dst_rate,
            chunk_frames,
            "rate converter active"
        );

        Ok(Self {
            resampler,
            src,
            dst_rate,
            chunk_frames,
            pending: Vec::with_capacity(chunk_frames * 2),
            out_buf,
            indexing: Indexing {
                input_offset: 0,
                output_offset: 0,
                active_channels_mask: None,
                partial_len: None,
            },
            delay_left,
            consumed_frames: 0,
            produced_frames: 0,
            flushed: false,
        })
    }

    /// Accept interleaved source samples and append converted mono samples to `out`.
    ///
    /// Returns the number of samples appended. Input that does not fill a
    /// whole chunk is kept for the next call or for [`flush`](Self::flush).
    pub fn push(&mut self, interleaved: &[f32], out: &mut Vec<f32>) -> Result<usize> {
        downmix_into(interleaved, self.src.channels, &mut self.pending);

        let mut appended = 0;
        let mut start = 0;
        while self.pending.len() - start >= self.chunk_frames {
            let end = start + self.chunk_frames;
            let chunk: Vec<f32> = self.pending[start..end].to_vec();
            appended += self.process(&chunk, None, out)?;
            start = end;
        }
        self.pending.drain(..start);
        Ok(appended)
    }

    /// Convert whatever input is left and drain the filter tail.
    ///
    /// Only the first call does work; the converter accepts no input afterwards.
    pub fn flush(&mut self, out: &mut Vec<f32>) -> Result<usize> {
        if self.flushed {
            return Ok(0);
        }
        self.flushed = true;

        let mut appended = 0;
        let tail = std::mem::take(&mut self.pending);
        if !tail.is_empty() {
            let mut padded = tail.clone();
            padded.resize(self.chunk_frames, 0.0);
            appended += self.process(&padded, Some(tail.len()), out)?;
        }

        // Push silence until the delayed output has come through.
        let silence = vec![0.0f32; self.chunk_frames];
        let mut guard = 0;
        while self.produced_frames < self.expected_output_frames() && guard < 8 {
            appended += self.process(&silence, Some(0), out)?;
            guard += 1;
        }
        Ok(appended)
    }

    fn expected_output_frames(&self) -> u64 {
        (self.consumed_frames as f64 * self.dst_rate as f64 / self.src.rate as f64).round() as u64
    }

    fn process(&mut self, input: &[f32], partial_len: Option<usize>, out: &mut Vec<f32>) -> Result<usize> {
        let input_adapter = InterleavedSlice::new(input, 1, input.len())
            .map_err(|e| EngineError::Resample(format!("interleaved slice (input): {e}")))?;
        let out_capacity_frames = self.out_buf.len();
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut self.out_buf, 1, out_capacity_frames)
                .map_err(|e| EngineError::Resample(format!("interleaved slice (output): {e}")))?;

        self.indexing.input_offset = 0;
        self.indexing.output_offset = 0;
        self.indexing.partial_len = partial_len;

        let (_nbr_in, nbr_out) = self
            .resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&self.indexing))
            .map_err(|e| EngineError::Resample(format!("process: {e}")))?;

        self.consumed_frames += partial_len.unwrap_or(input.len()) as u64;

        let skip = self.delay_left.min(nbr_out);
        self.delay_left -= skip;
        let mut produced = &self.out_buf[skip..nbr_out];

        if self.flushed {
            let room = self.expected_output_frames().saturating_sub(self.produced_frames) as usize;
            produced = &produced[..produced.len().min(room)];
        }

        out.extend_from_slice(produced);
        self.produced_frames += produced.len() as u64;
        Ok(produced.len())
    }
}

/// Average each interleaved frame down to one sample.
pub fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0 / channels as f32;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_stereo_frames() {
        let mut out = Vec::new();
        downmix_into(&[1.0, 0.0, -0.5, -0.5, 0.25, 0.75], 2, &mut out);
        assert_eq!(out, vec![0.5, -0.5, 0.5]);
    }

    #[test]
    fn downmix_passes_mono_through() {
        let mut out = vec![9.0];
        downmix_into(&[0.1, 0.2], 1, &mut out);
        assert_eq!(out, vec![9.0, 0.1, 0.2]);
    }

    #[test]
    fn rejects_zero_rate_source() {
        let src = StreamSpec {
            rate: 0,
            channels: 1,
        };
        assert!(matches!(
            RateConverter::new(src, 48_000, 256),
            Err(EngineError::Resample(_))
        ));
    }

    #[test]
    fn upsamples_to_roughly_expected_length() {
        let src = StreamSpec {
            rate: 24_000,
            channels: 2,
        };
        let mut conv = RateConverter::new(src, 48_000, 256).unwrap();
        let input: Vec<f32> = (0..24_000 * 2).map(|i| ((i / 2) as f32 * 0.01).sin() * 0.5).collect();

        let mut out = Vec::new();
        for chunk in input.chunks(1000) {
            conv.push(chunk, &mut out).unwrap();
        }
        conv.flush(&mut out).unwrap();

        let expected = 48_000i64;
        let got = out.len() as i64;
        assert!((got - expected).abs() <= 256, "got {got} samples");
        assert!(out.iter().all(|s| s.is_finite()));
        assert_eq!(conv.flush(&mut out).unwrap(), 0);
    }
}
