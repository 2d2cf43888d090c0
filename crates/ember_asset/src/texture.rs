//! 2D texture resource
//!
//! Decoded pixel data plus the GPU texture object. Decoding (via the
//! `image` crate) is CPU-safe and runs on loader workers; the upload runs
//! on the device thread with the same two-stage lifecycle as meshes.

use crate::upload::{UploadState, UploadStateCell};
use ember_core::{Error, Result};
use ember_gpu::{RenderDevice, TextureDesc, TextureFormat, TextureHandle};
use parking_lot::Mutex;
use std::path::Path;

struct TextureData {
    pixels: Vec<u8>,
    desc: TextureDesc,
}

/// Shared 2D texture. Pixel data is dropped after a successful upload.
pub struct Texture {
    name: String,
    data: Mutex<TextureData>,
    handle: Mutex<TextureHandle>,
    upload: UploadStateCell,
}

impl Texture {
    pub fn new(name: impl Into<String>, desc: TextureDesc, pixels: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data: Mutex::new(TextureData { pixels, desc }),
            handle: Mutex::new(TextureHandle::NULL),
            upload: UploadStateCell::new(),
        }
    }

    /// Decode an image file into RGBA8 pixels. CPU-safe; runs on workers.
    pub fn from_file(name: impl Into<String>, path: &Path) -> Result<Self> {
        let img = image::open(path)
            .map_err(|e| Error::Io(format!("decode {}: {e}", path.display())))?
            .into_rgba8();
        let (width, height) = img.dimensions();
        let desc = TextureDesc {
            width,
            height,
            format: TextureFormat::Rgba8,
            ..Default::default()
        };
        Ok(Self::new(name, desc, img.into_raw()))
    }

    /// 1x1 solid-color texture, handy as a fallback binding
    pub fn solid(name: impl Into<String>, rgba: [u8; 4]) -> Self {
        let desc = TextureDesc {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8,
            generate_mipmaps: false,
            ..Default::default()
        };
        Self::new(name, desc, rgba.to_vec())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.data.lock().desc.width
    }

    pub fn height(&self) -> u32 {
        self.data.lock().desc.height
    }

    pub fn desc(&self) -> TextureDesc {
        self.data.lock().desc.clone()
    }

    pub fn handle(&self) -> TextureHandle {
        *self.handle.lock()
    }

    pub fn upload_state(&self) -> UploadState {
        self.upload.get()
    }

    pub fn is_uploaded(&self) -> bool {
        self.upload.is_uploaded()
    }

    /// CPU-side memory footprint in bytes
    pub fn memory_usage(&self) -> usize {
        self.data.lock().pixels.len()
    }

    /// Create the GPU texture. Main thread only. Pixel data is released
    /// on success.
    pub fn upload(&self, device: &dyn RenderDevice) -> Result<()> {
        if !self
            .upload
            .transition(UploadState::NotUploaded, UploadState::Uploading)
        {
            return Err(Error::InvalidArgument(format!(
                "texture '{}' upload from state {:?}",
                self.name,
                self.upload.get()
            )));
        }
        let result = {
            let mut data = self.data.lock();
            match device.create_texture(&data.desc, &data.pixels) {
                Ok(handle) => {
                    *self.handle.lock() = handle;
                    data.pixels = Vec::new();
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };
        let target = if result.is_ok() {
            UploadState::Uploaded
        } else {
            UploadState::Failed
        };
        self.upload.transition(UploadState::Uploading, target);
        if let Err(ref e) = result {
            log::warn!("texture '{}' upload failed: {e}", self.name);
        }
        result
    }

    /// Release the GPU texture
    pub fn destroy_gpu(&self, device: &dyn RenderDevice) {
        let mut handle = self.handle.lock();
        if !handle.is_null() {
            device.destroy_texture(*handle);
            *handle = TextureHandle::NULL;
        }
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data.lock();
        f.debug_struct("Texture")
            .field("name", &self.name)
            .field("size", &(data.desc.width, data.desc.height))
            .field("upload", &self.upload.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_gpu::HeadlessDevice;

    #[test]
    fn test_solid_texture_upload() {
        let device = HeadlessDevice::new();
        let tex = Texture::solid("white", [255, 255, 255, 255]);
        assert_eq!(tex.memory_usage(), 4);
        tex.upload(&device).unwrap();
        assert!(tex.is_uploaded());
        assert!(!tex.handle().is_null());
        // Pixels released after upload
        assert_eq!(tex.memory_usage(), 0);
    }

    #[test]
    fn test_upload_failure() {
        let device = HeadlessDevice::new();
        device.fail_next_texture_creation();
        let tex = Texture::solid("fail", [0, 0, 0, 255]);
        assert!(tex.upload(&device).is_err());
        assert_eq!(tex.upload_state(), UploadState::Failed);
        assert!(tex.handle().is_null());
    }

    #[test]
    fn test_missing_file() {
        assert!(Texture::from_file("x", Path::new("/nonexistent/tex.png")).is_err());
    }
}
