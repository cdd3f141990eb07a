//! Source pixel formats and their allocation sizes

use std::fmt;
use std::str::FromStr;

const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | ((code[1] as u32) << 8) | ((code[2] as u32) << 16) | ((code[3] as u32) << 24)
}

/// V4L2 fourcc codes for the formats we know the size of
pub mod v4l2_fourcc {
    use super::fourcc;

    pub const V4L2_PIX_FMT_XRGB32: u32 = fourcc(b"BX24");
    pub const V4L2_PIX_FMT_XBGR32: u32 = fourcc(b"XR24");
    pub const V4L2_PIX_FMT_ARGB32: u32 = fourcc(b"BA24");
    pub const V4L2_PIX_FMT_ABGR32: u32 = fourcc(b"AR24");
    pub const V4L2_PIX_FMT_RGB565: u32 = fourcc(b"RGBP");
    pub const V4L2_PIX_FMT_YUYV: u32 = fourcc(b"YUYV");
}

use v4l2_fourcc::*;

/// Pixel layout of the source image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    #[default]
    Xrgb32,
    Xbgr32,
    Argb32,
    Abgr32,
    Rgb565,
    Yuyv,
    /// A fourcc we do not recognize; allocated as 32 bpp
    Other(u32),
}

impl PixelFormat {
    pub fn from_fourcc(code: u32) -> Self {
        match code {
            V4L2_PIX_FMT_XRGB32 => PixelFormat::Xrgb32,
            V4L2_PIX_FMT_XBGR32 => PixelFormat::Xbgr32,
            V4L2_PIX_FMT_ARGB32 => PixelFormat::Argb32,
            V4L2_PIX_FMT_ABGR32 => PixelFormat::Abgr32,
            V4L2_PIX_FMT_RGB565 => PixelFormat::Rgb565,
            V4L2_PIX_FMT_YUYV => PixelFormat::Yuyv,
            other => PixelFormat::Other(other),
        }
    }

    pub fn fourcc(&self) -> u32 {
        match self {
            PixelFormat::Xrgb32 => V4L2_PIX_FMT_XRGB32,
            PixelFormat::Xbgr32 => V4L2_PIX_FMT_XBGR32,
            PixelFormat::Argb32 => V4L2_PIX_FMT_ARGB32,
            PixelFormat::Abgr32 => V4L2_PIX_FMT_ABGR32,
            PixelFormat::Rgb565 => V4L2_PIX_FMT_RGB565,
            PixelFormat::Yuyv => V4L2_PIX_FMT_YUYV,
            PixelFormat::Other(code) => *code,
        }
    }

    /// Bits per pixel used to size the dumb buffer
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Rgb565 | PixelFormat::Yuyv => 16,
            _ => 32,
        }
    }
}

/// Whether a legacy ADDFB call accepts this bpp/depth pair.
///
/// Mirrors the kernel's legacy format table. Pairs outside it never reach
/// the driver.
pub fn legacy_depth_supported(bpp: u32, depth: u32) -> bool {
    matches!(
        (bpp, depth),
        (8, 8) | (16, 15) | (16, 16) | (24, 24) | (32, 24) | (32, 30) | (32, 32)
    )
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Xrgb32 => f.write_str("xrgb32"),
            PixelFormat::Xbgr32 => f.write_str("xbgr32"),
            PixelFormat::Argb32 => f.write_str("argb32"),
            PixelFormat::Abgr32 => f.write_str("abgr32"),
            PixelFormat::Rgb565 => f.write_str("rgb565"),
            PixelFormat::Yuyv => f.write_str("yuyv"),
            PixelFormat::Other(code) => write!(f, "0x{:08x}", code),
        }
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    /// Accepts a format name, a four character code, or a numeric fourcc.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let named = match s.to_ascii_lowercase().as_str() {
            "xrgb32" => Some(PixelFormat::Xrgb32),
            "xbgr32" => Some(PixelFormat::Xbgr32),
            "argb32" => Some(PixelFormat::Argb32),
            "abgr32" => Some(PixelFormat::Abgr32),
            "rgb565" => Some(PixelFormat::Rgb565),
            "yuyv" => Some(PixelFormat::Yuyv),
            _ => None,
        };
        if let Some(format) = named {
            return Ok(format);
        }

        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u32::from_str_radix(hex, 16)
                .map(PixelFormat::from_fourcc)
                .map_err(|e| format!("invalid fourcc {:?}: {}", s, e));
        }
        if let Ok(code) = s.parse::<u32>() {
            return Ok(PixelFormat::from_fourcc(code));
        }
        if let Ok(code) = <[u8; 4]>::try_from(s.as_bytes()) {
            return Ok(PixelFormat::from_fourcc(fourcc(&code)));
        }

        Err(format!("unknown pixel format {:?}", s))
    }
}

impl<'de> serde::Deserialize<'de> for PixelFormat {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_per_pixel() {
        assert_eq!(PixelFormat::Xrgb32.bits_per_pixel(), 32);
        assert_eq!(PixelFormat::Abgr32.bits_per_pixel(), 32);
        assert_eq!(PixelFormat::Rgb565.bits_per_pixel(), 16);
        assert_eq!(PixelFormat::Yuyv.bits_per_pixel(), 16);
        // Unknown formats fall back to 32 bpp
        assert_eq!(PixelFormat::Other(0xdeadbeef).bits_per_pixel(), 32);
    }

    #[test]
    fn test_fourcc_codes() {
        assert_eq!(V4L2_PIX_FMT_XRGB32, 0x34325842);
        assert_eq!(V4L2_PIX_FMT_YUYV, 0x56595559);
        assert_eq!(PixelFormat::from_fourcc(V4L2_PIX_FMT_RGB565), PixelFormat::Rgb565);
        assert_eq!(PixelFormat::from_fourcc(7), PixelFormat::Other(7));
    }

    #[test]
    fn test_parse() {
        assert_eq!("XRGB32".parse::<PixelFormat>().unwrap(), PixelFormat::Xrgb32);
        assert_eq!("RGBP".parse::<PixelFormat>().unwrap(), PixelFormat::Rgb565);
        assert_eq!("0x56595559".parse::<PixelFormat>().unwrap(), PixelFormat::Yuyv);
        assert_eq!("42".parse::<PixelFormat>().unwrap(), PixelFormat::Other(42));
        assert!("not-a-format".parse::<PixelFormat>().is_err());
    }

    #[test]
    fn test_legacy_depth_table() {
        assert!(legacy_depth_supported(32, 24));
        assert!(legacy_depth_supported(16, 16));
        assert!(!legacy_depth_supported(16, 24));
        assert!(!legacy_depth_supported(32, 16));
    }
}
