//! Perceptual fingerprints for screenshot comparison.
//!
//! A difference hash (dHash): the image is reduced to a 17×16 grayscale
//! thumbnail and each bit records whether a pixel is brighter than its right
//! neighbour. Two renders of the same content differ by a few bits at most
//! (anti-aliasing, cursor blink), while a new page flips a large fraction.
//!
//! Byte-equality is useless here: PNG encoders and sub-pixel rendering make
//! identical-looking screenshots byte-different.

use crate::error::ExtractError;
use image::imageops::FilterType;
use image::DynamicImage;
use std::fmt;

const HASH_WIDTH: u32 = 16;
const HASH_HEIGHT: u32 = 16;

/// Number of bits in a [`Fingerprint`]; the maximum possible distance.
pub const FINGERPRINT_BITS: u32 = HASH_WIDTH * HASH_HEIGHT;

/// 256-bit difference hash of an image.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fingerprint([u64; 4]);

impl Fingerprint {
    /// Fingerprint a decoded image.
    pub fn compute(image: &DynamicImage) -> Self {
        let thumb = image
            .resize_exact(HASH_WIDTH + 1, HASH_HEIGHT, FilterType::Triangle)
            .to_luma8();

        let mut words = [0u64; 4];
        let mut bit = 0usize;
        for y in 0..HASH_HEIGHT {
            for x in 0..HASH_WIDTH {
                let left = thumb.get_pixel(x, y)[0];
                let right = thumb.get_pixel(x + 1, y)[0];
                if left > right {
                    words[bit / 64] |= 1u64 << (bit % 64);
                }
                bit += 1;
            }
        }
        Fingerprint(words)
    }

    /// Decode PNG bytes and fingerprint them. Also returns the pixel size.
    pub fn from_png(png: &[u8]) -> Result<(Self, u32, u32), ExtractError> {
        let image = image::load_from_memory_with_format(png, image::ImageFormat::Png)
            .map_err(|e| ExtractError::capture("decode screenshot", e))?;
        Ok((Self::compute(&image), image.width(), image.height()))
    }

    /// Hamming distance in bits, `0..=FINGERPRINT_BITS`.
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint(")?;
        for w in self.0.iter().rev() {
            write!(f, "{w:016x}")?;
        }
        write!(f, ")")
    }
}
