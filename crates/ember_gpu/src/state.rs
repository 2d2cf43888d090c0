//! Pipeline state value types

/// Fragment blend mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum BlendMode {
    /// No blending; writes replace the framebuffer
    #[default]
    Opaque,
    /// Standard alpha blending: src * a + dst * (1 - a)
    Alpha,
    /// Additive: src + dst
    Additive,
    /// Multiply: src * dst
    Multiply,
}

impl BlendMode {
    /// Opaque sorts before every translucent mode
    #[inline]
    pub fn is_translucent(&self) -> bool {
        !matches!(self, Self::Opaque)
    }
}

/// Face culling mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum CullFace {
    Off,
    #[default]
    Back,
    Front,
}

/// Depth comparison function
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum DepthFunc {
    #[default]
    Less,
    LessEqual,
    Equal,
    Greater,
    Always,
    Never,
}

/// Viewport rectangle in pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// Scissor rectangle in pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Texel format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TextureFormat {
    #[default]
    Rgba8,
    Rgb8,
    R8,
    RgbaF16,
}

impl TextureFormat {
    /// Bytes per texel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgba8 => 4,
            Self::Rgb8 => 3,
            Self::R8 => 1,
            Self::RgbaF16 => 8,
        }
    }
}

/// Sampling filter
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TextureFilter {
    #[default]
    Linear,
    Nearest,
}

/// Texture coordinate wrap mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TextureWrap {
    #[default]
    Repeat,
    ClampToEdge,
    Mirror,
}

/// Creation parameters for a 2D texture
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub generate_mipmaps: bool,
    pub filter: TextureFilter,
    pub wrap: TextureWrap,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            format: TextureFormat::Rgba8,
            generate_mipmaps: true,
            filter: TextureFilter::Linear,
            wrap: TextureWrap::Repeat,
        }
    }
}

impl TextureDesc {
    /// Size of one full-resolution pixel upload
    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_translucency() {
        assert!(!BlendMode::Opaque.is_translucent());
        assert!(BlendMode::Alpha.is_translucent());
        assert!(BlendMode::Additive.is_translucent());
    }

    #[test]
    fn test_texture_desc_size() {
        let desc = TextureDesc {
            width: 16,
            height: 16,
            ..Default::default()
        };
        assert_eq!(desc.byte_size(), 16 * 16 * 4);
    }
}
