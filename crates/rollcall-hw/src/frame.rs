//! Frame type and pixel-format conversion — YUYV to RGB, downscaling.

use image::RgbImage;

/// A captured RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Packed RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Downscale by an integer factor with nearest-neighbor sampling.
    /// A factor of 0 or 1 returns a clone.
    pub fn downscale(&self, factor: u32) -> Frame {
        if factor <= 1 {
            return self.clone();
        }
        let (data, width, height) =
            downscale_rgb(&self.data, self.width, self.height, factor);
        Frame {
            data,
            width,
            height,
            timestamp: self.timestamp,
            sequence: self.sequence,
        }
    }

    /// View this frame as an `image::RgbImage`. Returns `None` if the
    /// buffer does not match the stated dimensions.
    pub fn to_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Convert packed YUYV (4:2:2) to packed RGB using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; U and V are shared
/// by the pixel pair.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        push_rgb(&mut rgb, y0, u, v);
        push_rgb(&mut rgb, y1, u, v);
    }
    Ok(rgb)
}

fn push_rgb(out: &mut Vec<u8>, y: u8, u: u8, v: u8) {
    let c = y as f32 - 16.0;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;

    let r = 1.164 * c + 1.596 * e;
    let g = 1.164 * c - 0.392 * d - 0.813 * e;
    let b = 1.164 * c + 2.017 * d;

    out.push(r.round().clamp(0.0, 255.0) as u8);
    out.push(g.round().clamp(0.0, 255.0) as u8);
    out.push(b.round().clamp(0.0, 255.0) as u8);
}

/// Nearest-neighbor downscale of packed RGB by an integer factor.
/// Returns the new buffer and dimensions.
pub fn downscale_rgb(rgb: &[u8], width: u32, height: u32, factor: u32) -> (Vec<u8>, u32, u32) {
    if width == 0 || height == 0 || rgb.len() < (width * height * 3) as usize {
        return (rgb.to_vec(), width, height);
    }
    let new_w = (width / factor).max(1);
    let new_h = (height / factor).max(1);

    let mut out = Vec::with_capacity((new_w * new_h * 3) as usize);
    for y in 0..new_h {
        let src_y = (y * factor).min(height - 1) as usize;
        for x in 0..new_w {
            let src_x = (x * factor).min(width - 1) as usize;
            let idx = (src_y * width as usize + src_x) * 3;
            out.extend_from_slice(&rgb[idx..idx + 3]);
        }
    }
    (out, new_w, new_h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_black_pixels() {
        // Y=16, U=V=128 is black in BT.601.
        let yuyv = vec![16, 128, 16, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_yuyv_white_pixels() {
        // Y=235, U=V=128 is full white.
        let yuyv = vec![235, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb, vec![255, 255, 255, 255, 255, 255]);
    }

    #[test]
    fn test_yuyv_neutral_gray() {
        // With U=V=128 the chroma terms vanish; R=G=B.
        let yuyv = vec![120, 128, 120, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb[0], rgb[1]);
        assert_eq!(rgb[1], rgb[2]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![16, 128]; // too short for 2x1
        assert!(yuyv_to_rgb(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_yuyv_output_size() {
        let yuyv = vec![100u8; 4 * 2 * 2]; // 4x2 image
        let rgb = yuyv_to_rgb(&yuyv, 4, 2).unwrap();
        assert_eq!(rgb.len(), 4 * 2 * 3);
    }

    #[test]
    fn test_downscale_dimensions() {
        let rgb = vec![0u8; 8 * 4 * 3];
        let (out, w, h) = downscale_rgb(&rgb, 8, 4, 2);
        assert_eq!((w, h), (4, 2));
        assert_eq!(out.len(), 4 * 2 * 3);
    }

    #[test]
    fn test_downscale_picks_top_left_sample() {
        // 2x2 image with distinct pixels; factor 2 keeps only (0,0).
        let rgb = vec![
            10, 11, 12, /* (0,0) */ 20, 21, 22, /* (1,0) */
            30, 31, 32, /* (0,1) */ 40, 41, 42, /* (1,1) */
        ];
        let (out, w, h) = downscale_rgb(&rgb, 2, 2, 2);
        assert_eq!((w, h), (1, 1));
        assert_eq!(out, vec![10, 11, 12]);
    }

    #[test]
    fn test_frame_downscale_factor_one_is_identity() {
        let frame = Frame {
            data: vec![5u8; 4 * 4 * 3],
            width: 4,
            height: 4,
            timestamp: std::time::Instant::now(),
            sequence: 7,
        };
        let same = frame.downscale(1);
        assert_eq!(same.width, 4);
        assert_eq!(same.data, frame.data);
        assert_eq!(same.sequence, 7);
    }

    #[test]
    fn test_frame_to_image() {
        let frame = Frame {
            data: vec![9u8; 2 * 3 * 3],
            width: 2,
            height: 3,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        };
        let img = frame.to_image().unwrap();
        assert_eq!(img.dimensions(), (2, 3));
    }
}
