//! Data Augmentation Module
//!
//! Random geometric augmentations applied to training images only:
//!
//! - rotation, uniform in `±rotation_degrees`
//! - horizontal/vertical shift, uniform in `±shift` of the image side
//! - horizontal flip with probability `horizontal_flip_prob`
//!
//! Pixels that fall outside the source frame take the value of the nearest
//! edge pixel. Validation images are only resized and rescaled.

use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Configuration for data augmentation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Maximum rotation angle in degrees (applies ±rotation_degrees)
    pub rotation_degrees: f32,
    /// Maximum horizontal shift as a fraction of the width
    pub width_shift: f32,
    /// Maximum vertical shift as a fraction of the height
    pub height_shift: f32,
    /// Probability of applying horizontal flip (0.0 - 1.0)
    pub horizontal_flip_prob: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rotation_degrees: 20.0,
            width_shift: 0.1,
            height_shift: 0.1,
            horizontal_flip_prob: 0.5,
        }
    }
}

impl AugmentationConfig {
    /// Disable all augmentations (for validation)
    pub fn none() -> Self {
        Self {
            rotation_degrees: 0.0,
            width_shift: 0.0,
            height_shift: 0.0,
            horizontal_flip_prob: 0.0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.rotation_degrees > 0.0
            || self.width_shift > 0.0
            || self.height_shift > 0.0
            || self.horizontal_flip_prob > 0.0
    }
}

/// Image augmenter that resizes and applies random transformations
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
    image_size: u32,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig, image_size: u32) -> Self {
        Self { config, image_size }
    }

    /// Augmenter with the training defaults
    pub fn with_defaults(image_size: u32) -> Self {
        Self::new(AugmentationConfig::default(), image_size)
    }

    /// Resize-and-rescale only
    pub fn no_augmentation(image_size: u32) -> Self {
        Self::new(AugmentationConfig::none(), image_size)
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    /// Apply one random draw of every configured augmentation.
    pub fn augment(&self, img: DynamicImage, rng: &mut ChaCha8Rng) -> DynamicImage {
        let (width, height) = img.dimensions();
        let mut result = img;

        let angle = if self.config.rotation_degrees > 0.0 {
            rng.gen_range(-self.config.rotation_degrees..=self.config.rotation_degrees)
        } else {
            0.0
        };
        let tx = if self.config.width_shift > 0.0 {
            rng.gen_range(-self.config.width_shift..=self.config.width_shift) * width as f32
        } else {
            0.0
        };
        let ty = if self.config.height_shift > 0.0 {
            rng.gen_range(-self.config.height_shift..=self.config.height_shift) * height as f32
        } else {
            0.0
        };

        result = self.affine(&result, angle, tx, ty);

        if rng.gen::<f32>() < self.config.horizontal_flip_prob {
            result = result.fliph();
        }

        result
    }

    /// Rotate by `angle_degrees` around the centre, then shift by `(tx, ty)`
    /// pixels. Output pixels map back into the source, clamped to its edges.
    fn affine(&self, img: &DynamicImage, angle_degrees: f32, tx: f32, ty: f32) -> DynamicImage {
        if angle_degrees.abs() < 0.1 && tx.abs() < 0.5 && ty.abs() < 0.5 {
            return img.clone();
        }

        let angle_rad = angle_degrees.to_radians();
        let (width, height) = img.dimensions();
        let rgb = img.to_rgb8();

        let cx = (width as f32 - 1.0) / 2.0;
        let cy = (height as f32 - 1.0) / 2.0;

        let cos_a = angle_rad.cos();
        let sin_a = angle_rad.sin();

        let mut output = ImageBuffer::new(width, height);

        for y in 0..height {
            for x in 0..width {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;

                let src_x = cx + dx * cos_a + dy * sin_a - tx;
                let src_y = cy - dx * sin_a + dy * cos_a - ty;

                output.put_pixel(x, y, self.bilinear_sample(&rgb, src_x, src_y));
            }
        }

        DynamicImage::ImageRgb8(output)
    }

    /// Bilinear sample with nearest-edge fill outside the frame
    fn bilinear_sample(&self, img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
        let (width, height) = img.dimensions();

        let x = x.clamp(0.0, width as f32 - 1.0);
        let y = y.clamp(0.0, height as f32 - 1.0);

        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);

        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let p00 = img.get_pixel(x0, y0);
        let p10 = img.get_pixel(x1, y0);
        let p01 = img.get_pixel(x0, y1);
        let p11 = img.get_pixel(x1, y1);

        let mut result = [0u8; 3];
        for c in 0..3 {
            let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
                + p10[c] as f32 * fx * (1.0 - fy)
                + p01[c] as f32 * (1.0 - fx) * fy
                + p11[c] as f32 * fx * fy;

            result[c] = v.round().clamp(0.0, 255.0) as u8;
        }

        Rgb(result)
    }

    /// Resize image to target size (always applied, not random)
    pub fn resize(&self, img: DynamicImage) -> DynamicImage {
        if img.dimensions() == (self.image_size, self.image_size) {
            return img;
        }
        img.resize_exact(
            self.image_size,
            self.image_size,
            image::imageops::FilterType::Nearest,
        )
    }

    /// Convert image to CHW float tensor data rescaled to [0, 1]
    pub fn to_tensor_data(&self, img: &DynamicImage) -> Vec<f32> {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut data = Vec::with_capacity(3 * height as usize * width as usize);

        for c in 0..3 {
            for y in 0..height {
                for x in 0..width {
                    data.push(rgb.get_pixel(x, y)[c] as f32 / 255.0);
                }
            }
        }

        data
    }

    /// Resize, augment when an RNG is given, then convert to tensor data
    pub fn preprocess(&self, img: DynamicImage, rng: Option<&mut ChaCha8Rng>) -> Vec<f32> {
        let mut result = self.resize(img);

        if let Some(rng) = rng {
            result = self.augment(result, rng);
        }

        self.to_tensor_data(&result)
    }
}
