//! Per-frame color transform and JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::config::FilterSettings;
use crate::convert::clamp_u8;
use crate::traits::{EncodedFrame, RawFrame, Result};

/// Scales each channel of a BGR frame and encodes the result as JPEG.
///
/// The filter holds only its settings, so one instance can be used from any
/// thread without synchronization.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameFilter {
    settings: FilterSettings,
}

impl FrameFilter {
    /// Create a filter with the given gains and quality.
    #[must_use]
    pub const fn new(settings: FilterSettings) -> Self {
        Self { settings }
    }

    /// Settings in use.
    #[must_use]
    pub const fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    /// Transform and encode a frame.
    ///
    /// Returns `Ok(None)` for empty or malformed frames; callers skip the
    /// iteration. Errors come only from the codec.
    pub fn apply(&self, frame: &RawFrame) -> Result<Option<EncodedFrame>> {
        if !frame.is_well_formed() {
            return Ok(None);
        }

        let rgb = self.scale_channels(&frame.data);

        let mut data = Vec::new();
        let quality = self.settings.jpeg_quality.clamp(1, 100);
        JpegEncoder::new_with_quality(&mut data, quality).encode(
            &rgb,
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )?;

        Ok(Some(EncodedFrame {
            data,
            width: frame.width,
            height: frame.height,
            sequence: frame.sequence,
        }))
    }

    /// Scale B, G, R by their gains, returning the pixels in R, G, B order
    /// for the encoder.
    fn scale_channels(&self, bgr: &[u8]) -> Vec<u8> {
        let FilterSettings {
            blue_gain,
            green_gain,
            red_gain,
            ..
        } = self.settings;

        let mut rgb = Vec::with_capacity(bgr.len());
        for pixel in bgr.chunks_exact(RawFrame::CHANNELS) {
            if let [b, g, r] = *pixel {
                rgb.push(clamp_u8(f32::from(r) * red_gain));
                rgb.push(clamp_u8(f32::from(g) * green_gain));
                rgb.push(clamp_u8(f32::from(b) * blue_gain));
            }
        }
        rgb
    }
}
