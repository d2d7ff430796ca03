/// Counters for one `Renderer::render` call.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: u32,
    /// Textures uploaded because no live record existed (cache misses).
    pub texture_uploads: u32,
    /// Particle chunks whose static attributes were re-uploaded.
    pub static_uploads: u32,
    /// Particle chunks whose dynamic attributes were uploaded.
    pub dynamic_uploads: u32,
    pub renderer_switches: u32,
    pub textures_evicted: u32,
}
