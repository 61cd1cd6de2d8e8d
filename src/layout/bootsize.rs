//! Sizing the bootloader's own partition from the self-describing image header.
//!
//! A linked-in "bisz" record at a fixed offset names the image's text/data symbol boundaries, so
//! the true size of the running bootloader can be measured without any external metadata. A
//! missing or garbled record is not an error; the partition simply gets the default tier.

use crate::flash::FlashRead;

/// Byte offset of the bisz record from the flash base
pub const BISZ_OFFSET: u64 = 0x3E0;

/// "BISZ"
pub const BISZ_MAGIC: u32 = 0x4249_535A;

const BISZ_WORDS: usize = 5;
const BISZ_TXT_START: usize = 1;
const BISZ_DATA_END: usize = 4;

const KIB: u64 = 1024;

/// The discrete boot-partition sizes
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord)]
pub enum ImageSizeTier {
    K128,
    K256,
    K512,
    M1,
    M2,
}

impl ImageSizeTier {
    /// The tier used when no self-describing header is present
    pub const DEFAULT: Self = ImageSizeTier::K256;

    pub const fn bytes(self) -> u64 {
        match self {
            ImageSizeTier::K128 => 128 * KIB,
            ImageSizeTier::K256 => 256 * KIB,
            ImageSizeTier::K512 => 512 * KIB,
            ImageSizeTier::M1 => 1024 * KIB,
            ImageSizeTier::M2 => 2048 * KIB,
        }
    }

    /// Pick the tier for a measured image size.
    ///
    /// Largest threshold is tested first so a big image can never land in a too-small tier.
    fn for_image_size(isz: u64) -> Self {
        if isz > 1024 * KIB {
            ImageSizeTier::M2
        } else if isz > 512 * KIB {
            ImageSizeTier::M1
        } else if isz > 256 * KIB {
            ImageSizeTier::K512
        } else if isz <= 128 * KIB {
            ImageSizeTier::K128
        } else {
            ImageSizeTier::K256
        }
    }
}

/// Inspect the bisz record and classify the boot-partition size.
///
/// Degrades to [`ImageSizeTier::DEFAULT`] on any of: short device, read failure, wrong magic.
pub fn classify(flash: &impl FlashRead) -> ImageSizeTier {
    let mut buf = [0u8; BISZ_WORDS * 4];
    if flash.read(BISZ_OFFSET, &mut buf).is_err() {
        return ImageSizeTier::DEFAULT;
    }

    let mut words = [0u32; BISZ_WORDS];
    for (word, bytes) in words.iter_mut().zip(buf.chunks_exact(4)) {
        *word = u32::from_le_bytes(bytes.try_into().unwrap());
    }

    if words[0] != BISZ_MAGIC {
        return ImageSizeTier::DEFAULT;
    }

    let isz = u64::from(words[BISZ_DATA_END].wrapping_sub(words[BISZ_TXT_START]));
    ImageSizeTier::for_image_size(isz)
}

#[cfg(test)]
fn flash_with_bisz(magic: u32, isz: u32) -> crate::flash::SimFlash {
    let mut flash = crate::flash::SimFlash::new(4096);
    let text_start: u32 = 0x8000_0400;
    let words = [
        magic,
        text_start,
        text_start + isz / 2,
        text_start + isz / 2,
        text_start + isz,
    ];
    let mut bytes = Vec::new();
    for word in words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    flash.fill(BISZ_OFFSET as usize, &bytes);
    flash
}

#[test]
fn test_classify_thresholds() {
    let k = |n: u32| n * 1024;
    let cases = [
        (k(1), ImageSizeTier::K128),
        (k(128), ImageSizeTier::K128),
        (k(128) + 1, ImageSizeTier::K256),
        (k(256), ImageSizeTier::K256),
        (k(256) + 1, ImageSizeTier::K512),
        (k(512), ImageSizeTier::K512),
        (k(512) + 1, ImageSizeTier::M1),
        (k(1024), ImageSizeTier::M1),
        (k(1024) + 1, ImageSizeTier::M2),
        (k(6 * 1024), ImageSizeTier::M2),
    ];

    for (isz, tier) in cases {
        assert_eq!(
            classify(&flash_with_bisz(BISZ_MAGIC, isz)),
            tier,
            "image size {isz}",
        );
    }
}

#[test]
fn test_classify_missing_header_defaults() {
    // Wrong magic: tier is the default no matter how large the image claims to be
    let flash = flash_with_bisz(0xDEAD_BEEF, 6 * 1024 * 1024);
    assert_eq!(classify(&flash), ImageSizeTier::DEFAULT);

    // Erased flash
    let flash = crate::flash::SimFlash::new(4096);
    assert_eq!(classify(&flash), ImageSizeTier::DEFAULT);

    // Device too small to even hold the record
    let flash = crate::flash::SimFlash::new(16);
    assert_eq!(classify(&flash), ImageSizeTier::DEFAULT);
}
