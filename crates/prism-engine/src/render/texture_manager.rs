//! On-demand texture upload keyed by base texture uid.

use std::collections::HashMap;

use crate::device::{ContextGeneration, GpuDevice, GpuHandle, Tagged, TextureDesc};
use crate::error::RenderResult;
use crate::texture::BaseTexture;

#[derive(Debug, Copy, Clone)]
struct TextureRecord {
    handle: Tagged,
    /// GC frame count at last bind.
    touched: u64,
    width: u32,
    height: u32,
}

/// Owns every GPU texture the renderer uploaded.
#[derive(Debug, Default)]
pub struct TextureManager {
    records: HashMap<u64, TextureRecord>,
    uploads: u64,
}

impl TextureManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live handle for `base`, uploading it on a cache miss.
    ///
    /// A record from an earlier generation counts as a miss; its handle died
    /// with the old context and is simply replaced.
    pub fn update_texture(
        &mut self,
        device: &mut dyn GpuDevice,
        generation: ContextGeneration,
        base: &BaseTexture,
        touched: u64,
    ) -> RenderResult<GpuHandle> {
        if let Some(rec) = self.records.get_mut(&base.uid()) {
            if let Some(handle) = rec.handle.live(generation) {
                rec.touched = touched;
                return Ok(handle);
            }
        }

        let handle = device.create_texture(&TextureDesc {
            width: base.width(),
            height: base.height(),
            pixels: base.pixels(),
            scale_mode: base.scale_mode(),
        })?;
        self.uploads += 1;
        log::trace!(
            "TextureManager: uploaded texture {} ({}x{}) -> {}",
            base.uid(),
            base.width(),
            base.height(),
            handle.raw()
        );

        self.records.insert(
            base.uid(),
            TextureRecord {
                handle: Tagged::new(generation, handle),
                touched,
                width: base.width(),
                height: base.height(),
            },
        );
        Ok(handle)
    }

    /// Deletes the GPU copy of texture `uid`. Returns whether a record existed.
    pub fn destroy_texture(
        &mut self,
        device: &mut dyn GpuDevice,
        generation: ContextGeneration,
        uid: u64,
    ) -> RenderResult<bool> {
        let Some(rec) = self.records.remove(&uid) else {
            return Ok(false);
        };
        if let Some(handle) = rec.handle.live(generation) {
            device.delete_texture(handle)?;
        }
        Ok(true)
    }

    /// Deletes every texture. Stale handles are dropped without device calls.
    pub fn destroy_all(&mut self, device: &mut dyn GpuDevice, generation: ContextGeneration) -> RenderResult<()> {
        let mut first_err = None;
        for (_, rec) in self.records.drain() {
            if let Some(handle) = rec.handle.live(generation) {
                if let Err(e) = device.delete_texture(handle) {
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Uids of live textures last touched before `threshold`.
    pub(crate) fn idle_since(&self, threshold: u64) -> Vec<u64> {
        self.records
            .iter()
            .filter(|(_, rec)| rec.touched < threshold)
            .map(|(uid, _)| *uid)
            .collect()
    }

    pub fn is_resident(&self, uid: u64, generation: ContextGeneration) -> bool {
        self.records.get(&uid).is_some_and(|r| r.handle.generation == generation)
    }

    pub fn touched(&self, uid: u64) -> Option<u64> {
        self.records.get(&uid).map(|r| r.touched)
    }

    /// Size of the uploaded copy of texture `uid`.
    pub fn size(&self, uid: u64) -> Option<(u32, u32)> {
        self.records.get(&uid).map(|r| (r.width, r.height))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total uploads since creation.
    #[inline]
    pub fn upload_count(&self) -> u64 {
        self.uploads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareDevice;
    use crate::paint::Color;

    fn red() -> BaseTexture {
        BaseTexture::solid(2, 2, Color::from_premul(1.0, 0.0, 0.0, 1.0)).unwrap()
    }

    #[test]
    fn second_update_is_a_cache_hit() {
        let mut dev = SoftwareDevice::new(4, 4);
        let mut tm = TextureManager::new();
        let g = ContextGeneration::FIRST;
        let tex = red();

        let a = tm.update_texture(&mut dev, g, &tex, 1).unwrap();
        let b = tm.update_texture(&mut dev, g, &tex, 5).unwrap();
        assert_eq!(a, b);
        assert_eq!(tm.upload_count(), 1);
        assert_eq!(tm.touched(tex.uid()), Some(5));
        assert_eq!(tm.size(tex.uid()), Some((2, 2)));
    }

    #[test]
    fn new_generation_reuploads() {
        let mut dev = SoftwareDevice::new(4, 4);
        let mut tm = TextureManager::new();
        let g1 = ContextGeneration::FIRST;
        let tex = red();

        tm.update_texture(&mut dev, g1, &tex, 0).unwrap();
        assert!(!tm.is_resident(tex.uid(), g1.next()));
        tm.update_texture(&mut dev, g1.next(), &tex, 0).unwrap();
        assert_eq!(tm.upload_count(), 2);
        assert_eq!(tm.len(), 1);
    }

    #[test]
    fn destroy_releases_device_texture() {
        let mut dev = SoftwareDevice::new(4, 4);
        let mut tm = TextureManager::new();
        let g = ContextGeneration::FIRST;
        let tex = red();

        let h = tm.update_texture(&mut dev, g, &tex, 0).unwrap();
        assert!(tm.destroy_texture(&mut dev, g, tex.uid()).unwrap());
        assert!(!dev.has_texture(h));
        assert!(!tm.destroy_texture(&mut dev, g, tex.uid()).unwrap());
    }

    #[test]
    fn destroy_all_skips_stale_handles() {
        let mut dev = SoftwareDevice::new(4, 4);
        let mut tm = TextureManager::new();
        let tex = red();

        tm.update_texture(&mut dev, ContextGeneration::FIRST, &tex, 0).unwrap();
        dev.lose_context();
        dev.reacquire().unwrap();
        tm.destroy_all(&mut dev, ContextGeneration::FIRST.next()).unwrap();
        assert!(tm.is_empty());
    }
}
