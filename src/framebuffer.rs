use std::mem::size_of;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, ResourceKind};
use crate::exact::{ExactEngine, ExactValue};
use crate::slot::{IdSpace, SlotRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgba8888,
    Rgb888,
    Rgba16161616,
    ExactQuantum,
}

impl PixelFormat {
    /// Bytes per pixel; the exact format stores four exact channels.
    pub fn pixel_size(&self) -> usize {
        match self {
            PixelFormat::Rgba8888 => 4,
            PixelFormat::Rgb888 => 3,
            PixelFormat::Rgba16161616 => 8,
            PixelFormat::ExactQuantum => 4 * size_of::<ExactValue>(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Rgba8888 => "rgba8888",
            PixelFormat::Rgb888 => "rgb888",
            PixelFormat::Rgba16161616 => "rgba16161616",
            PixelFormat::ExactQuantum => "exact_quantum",
        }
    }
}

/// Collaborator that backs byte-format frame buffers with physical memory.
pub trait FrameAllocator: Send + Sync {
    fn alloc(&self, size: usize) -> Result<Vec<u8>, CoreError>;
    fn free(&self, storage: Vec<u8>);
}

/// Default collaborator: plain heap storage.
#[derive(Debug, Default)]
pub struct HeapAllocator;

impl FrameAllocator for HeapAllocator {
    fn alloc(&self, size: usize) -> Result<Vec<u8>, CoreError> {
        Ok(vec![0u8; size])
    }

    fn free(&self, storage: Vec<u8>) {
        drop(storage);
    }
}

/// Test double that refuses allocations past a byte budget and counts
/// outstanding storage, for exercising `OutOfMemory` rollback.
#[derive(Debug, Default)]
pub struct BudgetAllocator {
    budget: usize,
    outstanding: Mutex<usize>,
}

impl BudgetAllocator {
    pub fn with_budget(budget: usize) -> Self {
        Self {
            budget,
            outstanding: Mutex::new(0),
        }
    }

    pub fn outstanding_bytes(&self) -> usize {
        *self.outstanding.lock()
    }
}

impl FrameAllocator for BudgetAllocator {
    fn alloc(&self, size: usize) -> Result<Vec<u8>, CoreError> {
        let mut outstanding = self.outstanding.lock();
        if *outstanding + size > self.budget {
            return Err(CoreError::OutOfMemory { requested: size });
        }
        *outstanding += size;
        Ok(vec![0u8; size])
    }

    fn free(&self, storage: Vec<u8>) {
        *self.outstanding.lock() -= storage.len();
    }
}

#[derive(Debug)]
enum PixelStorage {
    Bytes(Vec<u8>),
    Exact(Vec<ExactValue>),
}

#[derive(Debug)]
pub struct FrameBuffer {
    pub buffer_id: u32,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    storage: PixelStorage,
}

impl FrameBuffer {
    pub fn exact_rendering_enabled(&self) -> bool {
        self.format == PixelFormat::ExactQuantum
    }

    pub fn size_bytes(&self) -> usize {
        self.width as usize * self.height as usize * self.format.pixel_size()
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.storage {
            PixelStorage::Bytes(data) => Some(data),
            PixelStorage::Exact(_) => None,
        }
    }

    pub fn exact_channels(&self) -> Option<&[ExactValue]> {
        match &self.storage {
            PixelStorage::Bytes(_) => None,
            PixelStorage::Exact(channels) => Some(channels),
        }
    }
}

/// One exact-precision draw request. Channels stay caller-owned; the
/// renderer copies them through the engine.
#[derive(Debug)]
pub struct ExactPixel {
    pub x: u32,
    pub y: u32,
    pub r: ExactValue,
    pub g: ExactValue,
    pub b: ExactValue,
    pub a: ExactValue,
}

impl ExactPixel {
    pub fn from_strings(
        engine: &dyn ExactEngine,
        x: u32,
        y: u32,
        channels: &[String; 4],
    ) -> Result<Self, CoreError> {
        let mut parsed = Vec::with_capacity(4);
        for text in channels {
            match engine.from_str(text) {
                Ok(value) => parsed.push(value),
                Err(err) => {
                    for value in parsed {
                        engine.cleanup(value);
                    }
                    return Err(err);
                }
            }
        }
        let mut parsed = parsed.into_iter();
        let mut next = || parsed.next().expect("four parsed channels");
        Ok(Self {
            x,
            y,
            r: next(),
            g: next(),
            b: next(),
            a: next(),
        })
    }

    pub fn release(self, engine: &dyn ExactEngine) {
        engine.cleanup(self.r);
        engine.cleanup(self.g);
        engine.cleanup(self.b);
        engine.cleanup(self.a);
    }
}

/// Owns pixel storage for every live frame buffer. Ids are one-based so 0
/// never denotes a real buffer; a destroyed buffer's id may be reassigned.
#[derive(Debug)]
pub struct FrameBufferManager {
    table: SlotRegistry<FrameBuffer>,
}

impl FrameBufferManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            table: SlotRegistry::new(
                capacity,
                IdSpace::OneBased,
                ResourceKind::FrameBuffer,
                "frame buffer",
            ),
        }
    }

    pub fn create(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        allocator: &dyn FrameAllocator,
        engine: &dyn ExactEngine,
    ) -> Result<u32, CoreError> {
        if width == 0 || height == 0 {
            return Err(CoreError::invalid(format!(
                "frame buffer dimensions {width}x{height} must be nonzero"
            )));
        }
        if self.table.is_full() {
            return Err(CoreError::CapacityExceeded {
                registry: "frame buffer",
                capacity: self.table.capacity(),
            });
        }

        let pixels = width as usize * height as usize;
        let storage = match format {
            PixelFormat::ExactQuantum => {
                let mut channels = Vec::with_capacity(pixels * 4);
                for _ in 0..pixels * 4 {
                    channels.push(engine.init());
                }
                PixelStorage::Exact(channels)
            }
            _ => PixelStorage::Bytes(allocator.alloc(pixels * format.pixel_size())?),
        };

        self.table.insert_assigned(|buffer_id| FrameBuffer {
            buffer_id,
            width,
            height,
            format,
            storage,
        })
    }

    pub fn destroy(
        &mut self,
        buffer_id: u32,
        allocator: &dyn FrameAllocator,
        engine: &dyn ExactEngine,
    ) -> Result<(), CoreError> {
        let record = self.table.remove(buffer_id)?;
        match record.storage {
            PixelStorage::Bytes(data) => allocator.free(data),
            PixelStorage::Exact(channels) => {
                for value in channels {
                    engine.cleanup(value);
                }
            }
        }
        Ok(())
    }

    /// Writes exact pixels into an exact-quantum buffer. Out-of-bounds
    /// pixels are skipped without error: draw batches may legitimately
    /// overlap the buffer edge.
    pub fn render_exact_pixels(
        &mut self,
        buffer_id: u32,
        pixels: &[ExactPixel],
        engine: &dyn ExactEngine,
    ) -> Result<usize, CoreError> {
        let buffer = self
            .table
            .get_mut(buffer_id)
            .ok_or(CoreError::not_found(ResourceKind::FrameBuffer, buffer_id))?;
        let width = buffer.width;
        let height = buffer.height;
        let channels = match &mut buffer.storage {
            PixelStorage::Exact(channels) => channels,
            PixelStorage::Bytes(_) => {
                return Err(CoreError::not_found(ResourceKind::FrameBuffer, buffer_id))
            }
        };

        let mut written = 0;
        for pixel in pixels {
            if pixel.x >= width || pixel.y >= height {
                continue;
            }
            let offset = (pixel.y as usize * width as usize + pixel.x as usize) * 4;
            for (slot, incoming) in [
                (offset, &pixel.r),
                (offset + 1, &pixel.g),
                (offset + 2, &pixel.b),
                (offset + 3, &pixel.a),
            ] {
                let previous = std::mem::replace(&mut channels[slot], engine.copy(incoming));
                engine.cleanup(previous);
            }
            written += 1;
        }
        Ok(written)
    }

    pub fn get(&self, buffer_id: u32) -> Option<&FrameBuffer> {
        self.table.get(buffer_id)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn buffer_ids(&self) -> Vec<u32> {
        self.table.ids()
    }

    pub fn clear(&mut self, allocator: &dyn FrameAllocator, engine: &dyn ExactEngine) -> usize {
        let ids = self.table.ids();
        let mut released = 0;
        for id in ids {
            if self.destroy(id, allocator, engine).is_ok() {
                released += 1;
            }
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exact::DecimalExactEngine;

    #[test]
    fn byte_format_sizes_follow_the_format_table() {
        let engine = DecimalExactEngine::new();
        let allocator = HeapAllocator;
        let mut manager = FrameBufferManager::new(16);

        let id = manager
            .create(4, 4, PixelFormat::Rgba8888, &allocator, &engine)
            .unwrap();
        assert_eq!(manager.get(id).unwrap().size_bytes(), 64);

        let id = manager
            .create(4, 4, PixelFormat::Rgb888, &allocator, &engine)
            .unwrap();
        assert_eq!(manager.get(id).unwrap().size_bytes(), 48);

        let id = manager
            .create(4, 4, PixelFormat::ExactQuantum, &allocator, &engine)
            .unwrap();
        assert_eq!(
            manager.get(id).unwrap().size_bytes(),
            4 * 4 * 4 * size_of::<ExactValue>()
        );
    }

    #[test]
    fn ids_are_one_based_and_reused_after_destroy() {
        let engine = DecimalExactEngine::new();
        let allocator = HeapAllocator;
        let mut manager = FrameBufferManager::new(4);

        let first = manager
            .create(2, 2, PixelFormat::Rgba8888, &allocator, &engine)
            .unwrap();
        let second = manager
            .create(2, 2, PixelFormat::Rgba8888, &allocator, &engine)
            .unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);

        manager.destroy(first, &allocator, &engine).unwrap();
        let reused = manager
            .create(2, 2, PixelFormat::Rgb888, &allocator, &engine)
            .unwrap();
        assert_eq!(reused, 1);
    }

    #[test]
    fn failed_allocation_leaves_no_active_record() {
        let engine = DecimalExactEngine::new();
        let allocator = BudgetAllocator::with_budget(32);
        let mut manager = FrameBufferManager::new(4);

        let err = manager
            .create(64, 64, PixelFormat::Rgba8888, &allocator, &engine)
            .unwrap_err();
        assert_eq!(err, CoreError::OutOfMemory { requested: 16384 });
        assert!(manager.is_empty());
        assert_eq!(allocator.outstanding_bytes(), 0);
    }

    #[test]
    fn destroy_returns_storage_to_the_collaborator() {
        let engine = DecimalExactEngine::new();
        let allocator = BudgetAllocator::with_budget(1024);
        let mut manager = FrameBufferManager::new(4);

        let id = manager
            .create(8, 8, PixelFormat::Rgba8888, &allocator, &engine)
            .unwrap();
        assert_eq!(allocator.outstanding_bytes(), 256);
        manager.destroy(id, &allocator, &engine).unwrap();
        assert_eq!(allocator.outstanding_bytes(), 0);
    }

    #[test]
    fn exact_buffers_release_every_channel_on_destroy() {
        let engine = DecimalExactEngine::new();
        let allocator = HeapAllocator;
        let mut manager = FrameBufferManager::new(4);

        let id = manager
            .create(2, 2, PixelFormat::ExactQuantum, &allocator, &engine)
            .unwrap();
        assert_eq!(engine.live_values(), 2 * 2 * 4);

        manager.destroy(id, &allocator, &engine).unwrap();
        assert_eq!(engine.live_values(), 0);
    }

    #[test]
    fn boundary_pixels_are_skipped_without_error() {
        let engine = DecimalExactEngine::new();
        let allocator = HeapAllocator;
        let mut manager = FrameBufferManager::new(4);

        let id = manager
            .create(4, 4, PixelFormat::ExactQuantum, &allocator, &engine)
            .unwrap();

        let channels: [String; 4] = ["0.5", "0.25", "0.125", "1"].map(str::to_string);
        let batch = [ExactPixel::from_strings(&engine, 4, 0, &channels).unwrap()];
        let written = manager.render_exact_pixels(id, &batch, &engine).unwrap();
        assert_eq!(written, 0);
        for pixel in batch {
            pixel.release(&engine);
        }

        let zero = engine.init();
        let buffer = manager.get(id).unwrap();
        assert!(buffer
            .exact_channels()
            .unwrap()
            .iter()
            .all(|channel| *channel == zero));
        engine.cleanup(zero);

        manager.destroy(id, &allocator, &engine).unwrap();
        assert_eq!(engine.live_values(), 0);
    }

    #[test]
    fn in_bounds_pixels_overwrite_four_channels() {
        let engine = DecimalExactEngine::new();
        let allocator = HeapAllocator;
        let mut manager = FrameBufferManager::new(4);

        let id = manager
            .create(4, 4, PixelFormat::ExactQuantum, &allocator, &engine)
            .unwrap();

        let channels: [String; 4] = ["0.5", "0.25", "0.125", "1"].map(str::to_string);
        let batch = [ExactPixel::from_strings(&engine, 1, 2, &channels).unwrap()];
        let written = manager.render_exact_pixels(id, &batch, &engine).unwrap();
        assert_eq!(written, 1);
        for pixel in batch {
            pixel.release(&engine);
        }

        let buffer = manager.get(id).unwrap();
        let stored = buffer.exact_channels().unwrap();
        let offset = (2 * 4 + 1) * 4;
        assert_eq!(stored[offset].to_decimal_string(), "0.5");
        assert_eq!(stored[offset + 3].to_decimal_string(), "1");

        manager.destroy(id, &allocator, &engine).unwrap();
        assert_eq!(engine.live_values(), 0);
    }

    #[test]
    fn rendering_into_byte_buffers_reports_not_found() {
        let engine = DecimalExactEngine::new();
        let allocator = HeapAllocator;
        let mut manager = FrameBufferManager::new(4);

        let id = manager
            .create(4, 4, PixelFormat::Rgba8888, &allocator, &engine)
            .unwrap();
        let err = manager.render_exact_pixels(id, &[], &engine).unwrap_err();
        assert_eq!(err, CoreError::not_found(ResourceKind::FrameBuffer, id));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let engine = DecimalExactEngine::new();
        let allocator = HeapAllocator;
        let mut manager = FrameBufferManager::new(4);
        assert!(matches!(
            manager.create(0, 4, PixelFormat::Rgb888, &allocator, &engine),
            Err(CoreError::InvalidParameter { .. })
        ));
    }
}
