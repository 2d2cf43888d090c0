//! Triangle mesh resource
//!
//! CPU-side vertex/index arrays plus the GPU objects created by a
//! two-stage upload. Geometry edits and bounds queries take the data
//! mutex; the upload state is atomic so loader workers can poll it
//! without locking.

use crate::upload::{UploadState, UploadStateCell};
use ember_core::{Error, Result};
use ember_gpu::{BufferHandle, BufferTarget, RenderDevice, VertexArrayHandle};
use ember_math::{Aabb, Color, Vec2, Vec3};
use parking_lot::Mutex;

/// Interleaved vertex layout shared by every mesh in the engine
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[derive(serde::Serialize, serde::Deserialize)]
#[repr(C)]
pub struct Vertex {
    pub position: Vec3,
    pub tex_coord: Vec2,
    pub normal: Vec3,
    pub color: Color,
    pub tangent: Vec3,
    pub bitangent: Vec3,
}

impl Vertex {
    pub fn new(position: Vec3, tex_coord: Vec2, normal: Vec3) -> Self {
        Self {
            position,
            tex_coord,
            normal,
            color: Color::WHITE,
            tangent: Vec3::ZERO,
            bitangent: Vec3::ZERO,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self::new(position, Vec2::ZERO, Vec3::Y)
    }
}

/// GPU objects backing a mesh once uploaded
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MeshGpu {
    pub vertex_array: VertexArrayHandle,
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
}

#[derive(Default)]
struct MeshData {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    bounds: Aabb,
    bounds_dirty: bool,
}

/// Shared triangle mesh. Cheap to clone via `Arc` in the resource manager.
pub struct Mesh {
    name: String,
    data: Mutex<MeshData>,
    gpu: Mutex<MeshGpu>,
    upload: UploadStateCell,
}

impl Mesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Mutex::new(MeshData::default()),
            gpu: Mutex::new(MeshGpu::default()),
            upload: UploadStateCell::new(),
        }
    }

    pub fn with_data(name: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        let mesh = Self::new(name);
        mesh.set_data(vertices, indices);
        mesh
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the geometry. Marks bounds dirty; GPU buffers are not
    /// touched until the next upload.
    pub fn set_data(&self, vertices: Vec<Vertex>, indices: Vec<u32>) {
        let mut data = self.data.lock();
        data.vertices = vertices;
        data.indices = indices;
        data.bounds_dirty = true;
    }

    pub fn vertex_count(&self) -> usize {
        self.data.lock().vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.data.lock().indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.index_count() / 3
    }

    /// Copy of the vertex array
    pub fn vertices(&self) -> Vec<Vertex> {
        self.data.lock().vertices.clone()
    }

    /// Copy of the index array
    pub fn indices(&self) -> Vec<u32> {
        self.data.lock().indices.clone()
    }

    /// Run `f` with the geometry borrowed, without copying
    pub fn access_data<R>(&self, f: impl FnOnce(&[Vertex], &[u32]) -> R) -> R {
        let data = self.data.lock();
        f(&data.vertices, &data.indices)
    }

    /// Object-space bounds, recomputed lazily after geometry edits
    pub fn bounds(&self) -> Aabb {
        let mut data = self.data.lock();
        if data.bounds_dirty {
            data.bounds = Aabb::from_points(data.vertices.iter().map(|v| v.position));
            data.bounds_dirty = false;
        }
        data.bounds
    }

    /// Force a bounds recompute now
    pub fn calculate_bounds(&self) -> Aabb {
        self.data.lock().bounds_dirty = true;
        self.bounds()
    }

    /// Rebuild per-vertex normals from face normals, area weighted
    pub fn recalculate_normals(&self) {
        let mut data = self.data.lock();
        let MeshData {
            vertices, indices, ..
        } = &mut *data;
        for v in vertices.iter_mut() {
            v.normal = Vec3::ZERO;
        }
        for tri in indices.chunks_exact(3) {
            let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
                continue;
            }
            let e1 = vertices[i1].position - vertices[i0].position;
            let e2 = vertices[i2].position - vertices[i0].position;
            // Cross product length carries the area weighting
            let face = e1.cross(e2);
            vertices[i0].normal = vertices[i0].normal + face;
            vertices[i1].normal = vertices[i1].normal + face;
            vertices[i2].normal = vertices[i2].normal + face;
        }
        for v in vertices.iter_mut() {
            v.normal = v.normal.normalize_or(Vec3::Y);
        }
    }

    /// Rebuild tangent frames from UVs. Requires valid normals.
    pub fn recalculate_tangents(&self) {
        let mut data = self.data.lock();
        let MeshData {
            vertices, indices, ..
        } = &mut *data;
        for v in vertices.iter_mut() {
            v.tangent = Vec3::ZERO;
            v.bitangent = Vec3::ZERO;
        }
        for tri in indices.chunks_exact(3) {
            let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
                continue;
            }
            let e1 = vertices[i1].position - vertices[i0].position;
            let e2 = vertices[i2].position - vertices[i0].position;
            let duv1 = vertices[i1].tex_coord - vertices[i0].tex_coord;
            let duv2 = vertices[i2].tex_coord - vertices[i0].tex_coord;
            let det = duv1.x * duv2.y - duv2.x * duv1.y;
            if det.abs() < 1e-8 {
                continue;
            }
            let r = 1.0 / det;
            let tangent = (e1 * duv2.y - e2 * duv1.y) * r;
            let bitangent = (e2 * duv1.x - e1 * duv2.x) * r;
            for &i in &[i0, i1, i2] {
                vertices[i].tangent = vertices[i].tangent + tangent;
                vertices[i].bitangent = vertices[i].bitangent + bitangent;
            }
        }
        for v in vertices.iter_mut() {
            // Gram-Schmidt against the normal
            let t = v.tangent - v.normal * v.normal.dot(v.tangent);
            v.tangent = t.normalize_or(Vec3::X);
            v.bitangent = v.bitangent.normalize_or(v.normal.cross(v.tangent));
        }
    }

    /// CPU-side memory footprint in bytes
    pub fn memory_usage(&self) -> usize {
        let data = self.data.lock();
        data.vertices.len() * std::mem::size_of::<Vertex>()
            + data.indices.len() * std::mem::size_of::<u32>()
    }

    pub fn upload_state(&self) -> UploadState {
        self.upload.get()
    }

    pub fn is_uploaded(&self) -> bool {
        self.upload.is_uploaded()
    }

    /// Snapshot of the GPU handles; null handles before upload
    pub fn gpu(&self) -> MeshGpu {
        *self.gpu.lock()
    }

    /// Create GPU buffers for the current geometry. Main thread only.
    pub fn upload(&self, device: &dyn RenderDevice) -> Result<()> {
        if !self
            .upload
            .transition(UploadState::NotUploaded, UploadState::Uploading)
        {
            return Err(Error::InvalidArgument(format!(
                "mesh '{}' upload from state {:?}",
                self.name,
                self.upload.get()
            )));
        }
        let result = self.upload_inner(device);
        let target = if result.is_ok() {
            UploadState::Uploaded
        } else {
            UploadState::Failed
        };
        self.upload.transition(UploadState::Uploading, target);
        if let Err(ref e) = result {
            log::warn!("mesh '{}' upload failed: {e}", self.name);
        }
        result
    }

    fn upload_inner(&self, device: &dyn RenderDevice) -> Result<()> {
        let data = self.data.lock();
        if data.vertices.is_empty() || data.indices.is_empty() {
            return Err(Error::UploadFailed(format!(
                "mesh '{}' has no geometry",
                self.name
            )));
        }
        let vbo = device.create_buffer(BufferTarget::Array, bytemuck::cast_slice(&data.vertices))?;
        let ibo = device.create_buffer(
            BufferTarget::ElementArray,
            bytemuck::cast_slice(&data.indices),
        )?;
        let vao = device.create_vertex_array()?;
        *self.gpu.lock() = MeshGpu {
            vertex_array: vao,
            vertex_buffer: vbo,
            index_buffer: ibo,
        };
        Ok(())
    }

    /// Release GPU objects. The CPU data stays usable.
    pub fn destroy_gpu(&self, device: &dyn RenderDevice) {
        let mut gpu = self.gpu.lock();
        if !gpu.vertex_buffer.is_null() {
            device.destroy_buffer(gpu.vertex_buffer);
        }
        if !gpu.index_buffer.is_null() {
            device.destroy_buffer(gpu.index_buffer);
        }
        if !gpu.vertex_array.is_null() {
            device.destroy_vertex_array(gpu.vertex_array);
        }
        *gpu = MeshGpu::default();
    }
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mesh")
            .field("name", &self.name)
            .field("vertices", &self.vertex_count())
            .field("indices", &self.index_count())
            .field("upload", &self.upload_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_gpu::HeadlessDevice;

    fn triangle() -> Mesh {
        Mesh::with_data(
            "tri",
            vec![
                Vertex::from_position(Vec3::new(0.0, 0.0, 0.0)),
                Vertex::from_position(Vec3::new(1.0, 0.0, 0.0)),
                Vertex::from_position(Vec3::new(0.0, 1.0, 0.0)),
            ],
            vec![0, 1, 2],
        )
    }

    #[test]
    fn test_bounds_lazy_recompute() {
        let mesh = triangle();
        let b = mesh.bounds();
        assert_eq!(b.min, Vec3::ZERO);
        assert_eq!(b.max, Vec3::new(1.0, 1.0, 0.0));

        mesh.set_data(
            vec![Vertex::from_position(Vec3::new(-2.0, 0.0, 0.0))],
            vec![],
        );
        assert_eq!(mesh.bounds().min.x, -2.0);
    }

    #[test]
    fn test_recalculate_normals() {
        let mesh = triangle();
        mesh.recalculate_normals();
        let normals: Vec<Vec3> = mesh.vertices().iter().map(|v| v.normal).collect();
        for n in normals {
            assert!((n - Vec3::new(0.0, 0.0, 1.0)).length() < 1e-5);
        }
    }

    #[test]
    fn test_upload_lifecycle() {
        let device = HeadlessDevice::new();
        let mesh = triangle();
        assert_eq!(mesh.upload_state(), UploadState::NotUploaded);
        mesh.upload(&device).unwrap();
        assert!(mesh.is_uploaded());
        assert!(!mesh.gpu().vertex_buffer.is_null());
        // Second upload is a state error
        assert!(mesh.upload(&device).is_err());
    }

    #[test]
    fn test_upload_failure_marks_failed() {
        let device = HeadlessDevice::new();
        device.fail_next_buffer_creation();
        let mesh = triangle();
        assert!(mesh.upload(&device).is_err());
        assert_eq!(mesh.upload_state(), UploadState::Failed);
    }

    #[test]
    fn test_empty_mesh_upload_rejected() {
        let device = HeadlessDevice::new();
        let mesh = Mesh::new("empty");
        assert!(mesh.upload(&device).is_err());
        assert_eq!(mesh.upload_state(), UploadState::Failed);
    }

    #[test]
    fn test_memory_usage() {
        let mesh = triangle();
        assert_eq!(
            mesh.memory_usage(),
            3 * std::mem::size_of::<Vertex>() + 3 * 4
        );
    }
}
