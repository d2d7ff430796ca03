//! Frame-count based eviction of idle GPU textures.

use crate::device::{ContextGeneration, GpuDevice};
use crate::error::RenderResult;

use super::TextureManager;

/// When sweeps run.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum GcMode {
    /// Sweep every `check_count_max` frames.
    #[default]
    Auto,
    /// Only count frames; sweeps happen on [`TextureGarbageCollector::run`].
    Manual,
}

/// Garbage collector tuning.
///
/// Defaults: `Auto`, `max_idle = 3600` frames (one minute at 60 fps),
/// `check_count_max = 600` frames.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureGcConfig {
    pub mode: GcMode,
    /// Frames a texture may stay unbound before it becomes evictable.
    pub max_idle: u64,
    /// Frames between automatic sweeps.
    pub check_count_max: u64,
}

impl Default for TextureGcConfig {
    fn default() -> Self {
        Self { mode: GcMode::Auto, max_idle: 3600, check_count_max: 600 }
    }
}

#[derive(Debug, Default)]
pub struct TextureGarbageCollector {
    config: TextureGcConfig,
    count: u64,
    check_count: u64,
}

impl TextureGarbageCollector {
    pub fn new(config: TextureGcConfig) -> Self {
        Self { config, count: 0, check_count: 0 }
    }

    #[inline]
    pub fn config(&self) -> TextureGcConfig {
        self.config
    }

    pub fn set_config(&mut self, config: TextureGcConfig) {
        self.config = config;
    }

    /// Frames counted so far; textures record it as their `touched` value.
    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Per-frame tick. Returns the number of evicted textures.
    pub fn update(
        &mut self,
        textures: &mut TextureManager,
        device: &mut dyn GpuDevice,
        generation: ContextGeneration,
        pinned: &[u64],
    ) -> RenderResult<usize> {
        self.count += 1;
        if self.config.mode == GcMode::Manual {
            return Ok(0);
        }
        self.check_count += 1;
        if self.check_count > self.config.check_count_max {
            self.check_count = 0;
            return self.run(textures, device, generation, pinned);
        }
        Ok(0)
    }

    /// Evicts every texture idle for more than `max_idle` frames, except
    /// the `pinned` uids.
    pub fn run(
        &mut self,
        textures: &mut TextureManager,
        device: &mut dyn GpuDevice,
        generation: ContextGeneration,
        pinned: &[u64],
    ) -> RenderResult<usize> {
        let Some(threshold) = self.count.checked_sub(self.config.max_idle) else {
            return Ok(0);
        };
        let mut evicted = 0;
        for uid in textures.idle_since(threshold) {
            if pinned.contains(&uid) {
                continue;
            }
            if textures.destroy_texture(device, generation, uid)? {
                evicted += 1;
            }
        }
        if evicted > 0 {
            log::debug!("TextureGarbageCollector: evicted {evicted} textures at frame {}", self.count);
        }
        Ok(evicted)
    }

    /// Evicts one texture now, regardless of idle time.
    pub fn unload(
        &mut self,
        textures: &mut TextureManager,
        device: &mut dyn GpuDevice,
        generation: ContextGeneration,
        uid: u64,
    ) -> RenderResult<bool> {
        textures.destroy_texture(device, generation, uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareDevice;
    use crate::paint::Color;
    use crate::texture::BaseTexture;

    fn config(mode: GcMode) -> TextureGcConfig {
        TextureGcConfig { mode, max_idle: 10, check_count_max: 5 }
    }

    fn setup() -> (SoftwareDevice, TextureManager, BaseTexture) {
        let dev = SoftwareDevice::new(4, 4);
        let tex = BaseTexture::solid(1, 1, Color::white()).unwrap();
        (dev, TextureManager::new(), tex)
    }

    #[test]
    fn idle_texture_is_evicted_by_auto_sweep() {
        let (mut dev, mut tm, tex) = setup();
        let g = ContextGeneration::FIRST;
        let mut gc = TextureGarbageCollector::new(config(GcMode::Auto));
        tm.update_texture(&mut dev, g, &tex, gc.count()).unwrap();

        let mut evicted = 0;
        for _ in 0..24 {
            evicted += gc.update(&mut tm, &mut dev, g, &[]).unwrap();
        }
        // Sweeps at frames 6, 12, 18, 24; only frame 12 onwards sees idle > 10.
        assert_eq!(evicted, 1);
        assert!(tm.is_empty());
        assert_eq!(dev.live_textures(), 0);
    }

    #[test]
    fn recently_touched_texture_survives() {
        let (mut dev, mut tm, tex) = setup();
        let g = ContextGeneration::FIRST;
        let mut gc = TextureGarbageCollector::new(config(GcMode::Auto));

        for _ in 0..30 {
            tm.update_texture(&mut dev, g, &tex, gc.count()).unwrap();
            gc.update(&mut tm, &mut dev, g, &[]).unwrap();
        }
        assert_eq!(tm.len(), 1);
    }

    #[test]
    fn pinned_texture_is_never_evicted() {
        let (mut dev, mut tm, tex) = setup();
        let g = ContextGeneration::FIRST;
        let mut gc = TextureGarbageCollector::new(config(GcMode::Manual));
        tm.update_texture(&mut dev, g, &tex, 0).unwrap();

        for _ in 0..20 {
            assert_eq!(gc.update(&mut tm, &mut dev, g, &[]).unwrap(), 0);
        }
        assert_eq!(gc.run(&mut tm, &mut dev, g, &[tex.uid()]).unwrap(), 0);
        assert_eq!(gc.run(&mut tm, &mut dev, g, &[]).unwrap(), 1);
    }

    #[test]
    fn unload_evicts_immediately() {
        let (mut dev, mut tm, tex) = setup();
        let g = ContextGeneration::FIRST;
        let mut gc = TextureGarbageCollector::new(TextureGcConfig::default());
        tm.update_texture(&mut dev, g, &tex, 0).unwrap();
        assert!(gc.unload(&mut tm, &mut dev, g, tex.uid()).unwrap());
        assert!(!tm.is_resident(tex.uid(), g));
    }
}
