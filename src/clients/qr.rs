use std::io::Cursor;

use anyhow::{Error, Result, anyhow};
use image::{ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};

pub trait QrEncoder: Send + Sync {
    /// Encodes `content` as a PNG image.
    fn encode(&self, content: &str) -> Result<Vec<u8>, Error>;
}

/// Medium error correction, square PNG of at least `size` pixels.
pub struct PngQrEncoder {
    size: u32,
}

impl PngQrEncoder {
    pub fn new(size: u32) -> Self {
        Self { size }
    }
}

impl Default for PngQrEncoder {
    fn default() -> Self {
        Self::new(170)
    }
}

impl QrEncoder for PngQrEncoder {
    fn encode(&self, content: &str) -> Result<Vec<u8>, Error> {
        if content.is_empty() {
            return Err(anyhow!("no data to encode"));
        }

        let code = QrCode::with_error_correction_level(content.as_bytes(), EcLevel::M)
            .map_err(|e| anyhow!("QR encoding failed: {}", e))?;

        let image = code
            .render::<Luma<u8>>()
            .min_dimensions(self.size, self.size)
            .build();

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| anyhow!("QR image write failed: {}", e))?;

        Ok(png)
    }
}
