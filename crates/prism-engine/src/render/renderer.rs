//! The renderer core: context lifecycle, target binding and plugin dispatch.

use crate::coords::Matrix;
use crate::device::{ContextGeneration, GpuDevice, GpuHandle, SoftwareDevice};
use crate::error::{RenderError, RenderResult};
use crate::paint::Color;
use crate::scene::DisplayObject;
use crate::texture::BaseTexture;

use super::{
    ContextEvent, ContextEventKind, FrameStats, ObjectRenderer, ParticleRenderer, PluginHandle, PluginId,
    RenderContext, RenderObject, RenderState, RenderTarget, RendererOptions, TextureGarbageCollector,
    TextureManager,
};

/// Lifecycle state of a [`Renderer`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RendererState {
    Active,
    /// Waiting for a restore; rendering calls are dropped.
    ContextLost,
    Destroyed,
}

/// Index of a render target owned by a [`Renderer`]. Ids are never reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RenderTargetId(usize);

impl RenderTargetId {
    /// The target drawing into the device's default framebuffer.
    pub const ROOT: RenderTargetId = RenderTargetId(0);
}

struct PluginSlot {
    renderer: Box<dyn ObjectRenderer>,
    /// Generation `on_context_change` last ran for.
    seen_generation: Option<ContextGeneration>,
    running: bool,
}

/// Draws a scene graph through registered object renderers.
///
/// Owns the device, every render target and every uploaded texture. Context
/// loss is delivered by the host through
/// [`handle_context_event`](Self::handle_context_event); a loss reported by
/// the device in the middle of a frame is handled the same way.
pub struct Renderer {
    device: Box<dyn GpuDevice>,
    options: RendererOptions,
    state: RendererState,
    generation: ContextGeneration,

    targets: Vec<Option<RenderTarget>>,
    active_target: Option<RenderTargetId>,
    active_transform: Option<Matrix>,

    textures: TextureManager,
    gc: TextureGarbageCollector,
    render_state: RenderState,

    plugins: Vec<PluginSlot>,
    current: Option<PluginId>,

    frame: FrameStats,
    last_frame: FrameStats,
}

impl Renderer {
    /// Takes ownership of `device` and sets up the root target.
    ///
    /// Fails with [`RenderError::ContextCreation`] when the device has no live
    /// context or rejects the initial framebuffer size.
    pub fn new(mut device: Box<dyn GpuDevice>, options: RendererOptions) -> RenderResult<Self> {
        if device.is_lost() {
            return Err(RenderError::ContextCreation(format!(
                "{} device has no live context",
                device.backend_name()
            )));
        }
        let physical = options.physical_size();
        if device.default_framebuffer_size() != physical {
            device
                .resize_default_framebuffer(physical.0, physical.1)
                .map_err(|e| RenderError::ContextCreation(e.to_string()))?;
        }

        let root = RenderTarget::root(options.width, options.height, options.resolution, options.clear_color());
        let mut renderer = Self {
            device,
            gc: TextureGarbageCollector::new(options.texture_gc),
            options,
            state: RendererState::Active,
            generation: ContextGeneration::FIRST,
            targets: vec![Some(root)],
            active_target: None,
            active_transform: None,
            textures: TextureManager::new(),
            render_state: RenderState::default(),
            plugins: Vec::new(),
            current: None,
            frame: FrameStats::default(),
            last_frame: FrameStats::default(),
        };
        renderer.register_plugin(ParticleRenderer::new())?;
        renderer
            .activate_target(RenderTargetId::ROOT, None)
            .map_err(|e| RenderError::ContextCreation(e.to_string()))?;

        log::info!(
            "Renderer: {} backend, {}x{} @{}x",
            renderer.device.backend_name(),
            renderer.options.width,
            renderer.options.height,
            renderer.options.resolution
        );
        Ok(renderer)
    }

    /// A renderer over a [`SoftwareDevice`] sized from `options`.
    pub fn software(options: RendererOptions) -> RenderResult<Self> {
        let (w, h) = options.physical_size();
        Self::new(Box::new(SoftwareDevice::new(w, h)), options)
    }

    // ── accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn state(&self) -> RendererState {
        self.state
    }

    #[inline]
    pub fn generation(&self) -> ContextGeneration {
        self.generation
    }

    #[inline]
    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    pub fn device(&self) -> &dyn GpuDevice {
        self.device.as_ref()
    }

    /// The device as its concrete backend type.
    pub fn device_as<D: GpuDevice>(&self) -> Option<&D> {
        self.device.as_any().downcast_ref::<D>()
    }

    pub fn device_as_mut<D: GpuDevice>(&mut self) -> Option<&mut D> {
        self.device.as_any_mut().downcast_mut::<D>()
    }

    pub(crate) fn device_and_generation(&mut self) -> RenderResult<(&mut dyn GpuDevice, ContextGeneration)> {
        self.ensure_usable("device_and_generation")?;
        Ok((self.device.as_mut(), self.generation))
    }

    /// Counters of the last completed `render` call.
    #[inline]
    pub fn last_frame_stats(&self) -> FrameStats {
        self.last_frame
    }

    pub fn textures(&self) -> &TextureManager {
        &self.textures
    }

    pub fn texture_gc(&self) -> &TextureGarbageCollector {
        &self.gc
    }

    pub fn texture_gc_mut(&mut self) -> &mut TextureGarbageCollector {
        &mut self.gc
    }

    pub fn render_state(&self) -> &RenderState {
        &self.render_state
    }

    pub fn render_target(&self, id: RenderTargetId) -> Option<&RenderTarget> {
        self.targets.get(id.0).and_then(Option::as_ref)
    }

    pub fn render_target_mut(&mut self, id: RenderTargetId) -> Option<&mut RenderTarget> {
        self.targets.get_mut(id.0).and_then(Option::as_mut)
    }

    #[inline]
    pub fn active_render_target(&self) -> Option<RenderTargetId> {
        self.active_target
    }

    #[inline]
    pub fn current_object_renderer(&self) -> Option<PluginId> {
        self.current
    }

    pub fn set_background_color(&mut self, color: Color) {
        self.options.background_color = color;
        let clear = self.options.clear_color();
        if let Some(root) = self.render_target_mut(RenderTargetId::ROOT) {
            root.clear_color = clear;
        }
    }

    fn ensure_usable(&self, op: &'static str) -> RenderResult<()> {
        if self.state == RendererState::Destroyed {
            return Err(RenderError::DestroyedUse(op));
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.state == RendererState::Active
    }

    // ── plugins ───────────────────────────────────────────────────────────

    /// Registers an object renderer. Names must be unique.
    pub fn register_plugin<P: ObjectRenderer>(&mut self, plugin: P) -> RenderResult<PluginHandle<P>> {
        self.ensure_usable("register_plugin")?;
        let name = plugin.name();
        if self.plugins.iter().any(|s| s.renderer.name() == name) {
            return Err(RenderError::InvalidResource(format!("object renderer `{name}` already registered")));
        }
        self.plugins.push(PluginSlot { renderer: Box::new(plugin), seen_generation: None, running: false });
        log::debug!("Renderer: registered object renderer `{name}`");
        Ok(PluginHandle::new(PluginId(self.plugins.len() - 1)))
    }

    /// Looks up a registered plugin by name and type.
    pub fn plugin<P: ObjectRenderer>(&self, name: &str) -> Option<PluginHandle<P>> {
        self.plugins
            .iter()
            .position(|s| s.renderer.name() == name && s.renderer.as_any().is::<P>())
            .map(|i| PluginHandle::new(PluginId(i)))
    }

    pub fn plugin_ref<P: ObjectRenderer>(&self, handle: PluginHandle<P>) -> Option<&P> {
        self.plugins.get(handle.id().0)?.renderer.as_any().downcast_ref::<P>()
    }

    pub fn plugin_mut<P: ObjectRenderer>(&mut self, handle: PluginHandle<P>) -> Option<&mut P> {
        self.plugins.get_mut(handle.id().0)?.renderer.as_any_mut().downcast_mut::<P>()
    }

    /// Runs `f` with one plugin and a context over everything else.
    fn with_plugin<R>(
        &mut self,
        id: PluginId,
        f: impl FnOnce(&mut PluginSlot, &mut RenderContext<'_>) -> RenderResult<R>,
    ) -> RenderResult<R> {
        let target_id = self.active_target.unwrap_or(RenderTargetId::ROOT);
        let Self { device, generation, targets, textures, gc, render_state, plugins, frame, .. } = self;

        let target = targets
            .get(target_id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| RenderError::InvalidResource("active render target was released".to_owned()))?;
        let slot = plugins
            .get_mut(id.0)
            .ok_or_else(|| RenderError::InvalidResource(format!("no object renderer with id {}", id.0)))?;

        let mut ctx = RenderContext {
            device: device.as_mut(),
            generation: *generation,
            target,
            textures,
            gc_count: gc.count(),
            state: render_state,
            stats: frame,
        };
        f(slot, &mut ctx)
    }

    fn start_plugin(&mut self, id: PluginId) -> RenderResult<()> {
        let generation = self.generation;
        self.with_plugin(id, |slot, ctx| {
            if slot.seen_generation != Some(generation) {
                slot.renderer.on_context_change(ctx)?;
                slot.seen_generation = Some(generation);
            }
            if !slot.running {
                log::trace!("Renderer: start `{}`", slot.renderer.name());
                slot.renderer.start(ctx)?;
                slot.running = true;
            }
            Ok(())
        })
    }

    fn stop_plugin(&mut self, id: PluginId) -> RenderResult<()> {
        self.with_plugin(id, |slot, ctx| {
            if slot.running {
                log::trace!("Renderer: stop `{}`", slot.renderer.name());
                slot.running = false;
                slot.renderer.stop(ctx)?;
            }
            Ok(())
        })
    }

    fn flush_current(&mut self) -> RenderResult<()> {
        match self.current {
            Some(id) => self.with_plugin(id, |slot, ctx| {
                if slot.running { slot.renderer.flush(ctx) } else { Ok(()) }
            }),
            None => Ok(()),
        }
    }

    fn switch_to(&mut self, id: PluginId) -> RenderResult<()> {
        if id.0 >= self.plugins.len() {
            return Err(RenderError::InvalidResource(format!("no object renderer with id {}", id.0)));
        }
        if self.current == Some(id) {
            return self.start_plugin(id);
        }
        if let Some(old) = self.current {
            self.stop_plugin(old)?;
        }
        self.current = Some(id);
        self.frame.renderer_switches += 1;
        self.start_plugin(id)
    }

    /// Makes `id` the current object renderer.
    ///
    /// No-op when it already is; otherwise the current one is stopped before
    /// `id` is started.
    pub fn set_object_renderer(&mut self, id: PluginId) -> RenderResult<()> {
        self.ensure_usable("set_object_renderer")?;
        if !self.is_active() {
            return Ok(());
        }
        let result = self.switch_to(id);
        self.absorb_context_loss(result)
    }

    /// Switches to `plugin` and lets it draw `object`.
    pub fn render_object<P, T>(&mut self, plugin: PluginHandle<P>, object: &mut T) -> RenderResult<()>
    where
        P: RenderObject<T>,
        T: ?Sized,
    {
        self.ensure_usable("render_object")?;
        if !self.is_active() {
            return Ok(());
        }
        let id = plugin.id();
        let result = self.switch_to(id).and_then(|()| {
            self.with_plugin(id, |slot, ctx| {
                let name = slot.renderer.name();
                let renderer = slot
                    .renderer
                    .as_any_mut()
                    .downcast_mut::<P>()
                    .ok_or(RenderError::UnknownPlugin(name))?;
                renderer.render(ctx, object)
            })
        });
        self.absorb_context_loss(result)
    }

    // ── frames ────────────────────────────────────────────────────────────

    /// Renders `root` into the root target. See [`render`](Self::render).
    pub fn render_root(&mut self, root: &mut dyn DisplayObject) -> RenderResult<()> {
        self.render(root, None, None, None, false)
    }

    /// Renders one frame.
    ///
    /// - `target`: destination, the root target when `None`
    /// - `clear`: overrides `clear_before_render`
    /// - `transform`: appended to the target's projection for this frame
    /// - `skip_update_transform`: keep world transforms from an earlier update
    ///
    /// Unless skipped, `root` is updated as if it had an identity parent, so
    /// a detached subtree renders at its local coordinates.
    pub fn render(
        &mut self,
        root: &mut dyn DisplayObject,
        target: Option<RenderTargetId>,
        clear: Option<bool>,
        transform: Option<Matrix>,
        skip_update_transform: bool,
    ) -> RenderResult<()> {
        self.ensure_usable("render")?;
        if self.is_active() && self.device.is_lost() {
            self.mark_lost();
        }
        if !self.is_active() {
            log::trace!("Renderer: frame dropped, context lost");
            return Ok(());
        }

        self.frame = FrameStats::default();
        let result = self.render_frame(root, target, clear, transform, skip_update_transform);
        self.last_frame = self.frame;
        self.absorb_context_loss(result)
    }

    fn render_frame(
        &mut self,
        root: &mut dyn DisplayObject,
        target: Option<RenderTargetId>,
        clear: Option<bool>,
        transform: Option<Matrix>,
        skip_update_transform: bool,
    ) -> RenderResult<()> {
        if !skip_update_transform {
            root.update_transform(&Matrix::IDENTITY, 1.0);
        }

        self.activate_target(target.unwrap_or(RenderTargetId::ROOT), transform)?;
        if let Some(id) = self.current {
            self.start_plugin(id)?;
        }
        if clear.unwrap_or(self.options.clear_before_render) {
            self.clear_active(None)?;
        }

        root.render_using(self)?;
        if !self.is_active() {
            return Ok(());
        }
        self.flush_current()?;

        let pinned = self.render_state.pinned_textures();
        let evicted = self.gc.update(&mut self.textures, self.device.as_mut(), self.generation, &pinned)?;
        self.frame.textures_evicted += evicted as u32;
        Ok(())
    }

    /// Issues pending draws of the current object renderer.
    pub fn flush(&mut self) -> RenderResult<()> {
        self.ensure_usable("flush")?;
        if !self.is_active() {
            return Ok(());
        }
        let result = self.flush_current();
        self.absorb_context_loss(result)
    }

    // ── render targets ────────────────────────────────────────────────────

    /// Creates an offscreen target. Its framebuffer is allocated on first use.
    pub fn create_render_target(&mut self, width: u32, height: u32, stencil: bool) -> RenderResult<RenderTargetId> {
        self.ensure_usable("create_render_target")?;
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidResource(format!("render target size {width}x{height}")));
        }
        self.targets
            .push(Some(RenderTarget::offscreen(width, height, self.options.resolution, stencil)));
        Ok(RenderTargetId(self.targets.len() - 1))
    }

    /// Destroys an offscreen target. The root target cannot be released.
    pub fn release_render_target(&mut self, id: RenderTargetId) -> RenderResult<()> {
        self.ensure_usable("release_render_target")?;
        if id == RenderTargetId::ROOT {
            return Err(RenderError::InvalidResource("the root render target cannot be released".to_owned()));
        }
        if self.active_target == Some(id) {
            let flushed = if self.is_active() { self.flush_current() } else { Ok(()) };
            self.absorb_context_loss(flushed)?;
            self.active_target = None;
        }
        let mut target = self
            .targets
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or_else(|| RenderError::InvalidResource(format!("render target {} does not exist", id.0)))?;
        let result = target.destroy(self.device.as_mut(), self.generation);
        self.absorb_context_loss(result)
    }

    /// Makes `id` the drawing destination, with `transform` appended to its
    /// projection. Pending draws are flushed to the old target first.
    pub fn bind_render_target(&mut self, id: RenderTargetId, transform: Option<Matrix>) -> RenderResult<()> {
        self.ensure_usable("bind_render_target")?;
        if !self.is_active() {
            return Ok(());
        }
        let result = self.flush_current().and_then(|()| self.activate_target(id, transform));
        self.absorb_context_loss(result)
    }

    fn activate_target(&mut self, id: RenderTargetId, transform: Option<Matrix>) -> RenderResult<()> {
        let target = self
            .targets
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| RenderError::InvalidResource(format!("render target {} does not exist", id.0)))?;
        target.set_transform(transform);
        if self.active_target == Some(id) && !target.needs_activation() {
            return Ok(());
        }
        target.activate(self.device.as_mut(), self.generation)?;
        self.active_target = Some(id);
        self.active_transform = transform;
        Ok(())
    }

    /// Clears the active target to `color`, or to its own clear color.
    pub fn clear(&mut self, color: Option<Color>) -> RenderResult<()> {
        self.ensure_usable("clear")?;
        if !self.is_active() {
            return Ok(());
        }
        let result = self.clear_active(color);
        self.absorb_context_loss(result)
    }

    fn clear_active(&mut self, color: Option<Color>) -> RenderResult<()> {
        if self.active_target.is_none() {
            self.activate_target(RenderTargetId::ROOT, None)?;
        }
        let id = self.active_target.unwrap_or(RenderTargetId::ROOT);
        match self.targets.get(id.0).and_then(Option::as_ref) {
            Some(target) => target.clear(self.device.as_mut(), color),
            None => Ok(()),
        }
    }

    /// Resizes the root target (logical pixels).
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.ensure_usable("resize")?;
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidResource(format!("renderer size {width}x{height}")));
        }
        if !self.is_active() {
            log::debug!("Renderer: resize to {width}x{height} dropped, context lost");
            return Ok(());
        }
        let result = self.resize_root(width, height);
        self.absorb_context_loss(result)
    }

    fn resize_root(&mut self, width: u32, height: u32) -> RenderResult<()> {
        let Some(root) = self.targets.first_mut().and_then(Option::as_mut) else {
            return Ok(());
        };
        if !root.resize(self.device.as_mut(), self.generation, width, height)? {
            return Ok(());
        }
        self.options.width = width;
        self.options.height = height;
        if self.active_target == Some(RenderTargetId::ROOT) {
            self.activate_target(RenderTargetId::ROOT, self.active_transform)?;
        }
        Ok(())
    }

    // ── textures ──────────────────────────────────────────────────────────

    /// Uploads `base` unless a live copy exists, and returns its handle.
    pub fn update_texture(&mut self, base: &BaseTexture) -> RenderResult<GpuHandle> {
        self.ensure_usable("update_texture")?;
        if !self.is_active() {
            return Err(RenderError::ContextLost);
        }
        let result = self
            .textures
            .update_texture(self.device.as_mut(), self.generation, base, self.gc.count());
        if matches!(result, Err(RenderError::ContextLost)) {
            self.mark_lost();
        }
        result
    }

    /// Deletes the GPU copy of texture `uid`; it is re-uploaded on next use.
    pub fn destroy_texture(&mut self, uid: u64) -> RenderResult<bool> {
        self.ensure_usable("destroy_texture")?;
        self.unbind_texture(uid);
        self.textures.destroy_texture(self.device.as_mut(), self.generation, uid)
    }

    /// Evicts texture `uid` through the garbage collector.
    pub fn unload_texture(&mut self, uid: u64) -> RenderResult<bool> {
        self.ensure_usable("unload_texture")?;
        self.unbind_texture(uid);
        self.gc.unload(&mut self.textures, self.device.as_mut(), self.generation, uid)
    }

    /// Runs a GC sweep now. Returns the number of evicted textures.
    pub fn run_texture_gc(&mut self) -> RenderResult<usize> {
        self.ensure_usable("run_texture_gc")?;
        let pinned = self.render_state.pinned_textures();
        self.gc.run(&mut self.textures, self.device.as_mut(), self.generation, &pinned)
    }

    fn unbind_texture(&mut self, uid: u64) {
        for slot in &mut self.render_state.bound_textures {
            if *slot == Some(uid) {
                *slot = None;
            }
        }
    }

    // ── context lifecycle ─────────────────────────────────────────────────

    /// Handles a context notification from the host.
    ///
    /// `Lost` is captured (default prevented) and suspends rendering.
    /// `Restored` re-acquires the device and starts a new generation; every
    /// GPU resource is then recreated lazily on first use.
    pub fn handle_context_event(&mut self, event: &mut ContextEvent) -> RenderResult<()> {
        self.ensure_usable("handle_context_event")?;
        match event.kind() {
            ContextEventKind::Lost => {
                event.prevent_default();
                if self.is_active() {
                    self.mark_lost();
                }
                Ok(())
            }
            ContextEventKind::Restored => self.restore_context(),
        }
    }

    fn mark_lost(&mut self) {
        log::warn!("Renderer: context lost (generation {})", self.generation.get());
        self.state = RendererState::ContextLost;
        for slot in &mut self.plugins {
            slot.running = false;
        }
    }

    fn restore_context(&mut self) -> RenderResult<()> {
        if self.is_active() && !self.device.is_lost() {
            log::debug!("Renderer: restore ignored, context is live");
            return Ok(());
        }
        self.device.reacquire()?;
        self.generation = self.generation.next();
        self.state = RendererState::Active;
        self.render_state.reset();
        self.active_target = None;
        self.active_transform = None;
        for slot in &mut self.plugins {
            slot.running = false;
        }

        let result = self.rebind_root();
        self.absorb_context_loss(result)?;

        log::info!("Renderer: context restored (generation {})", self.generation.get());
        Ok(())
    }

    fn rebind_root(&mut self) -> RenderResult<()> {
        let (w, h) = self.options.physical_size();
        if self.device.default_framebuffer_size() != (w, h) {
            self.device.resize_default_framebuffer(w, h)?;
        }
        self.activate_target(RenderTargetId::ROOT, None)
    }

    /// Turns a mid-frame context loss into a state change.
    fn absorb_context_loss(&mut self, result: RenderResult<()>) -> RenderResult<()> {
        match result {
            Err(RenderError::ContextLost) => {
                if self.is_active() {
                    self.mark_lost();
                }
                Ok(())
            }
            other => other,
        }
    }

    /// Releases every GPU resource. The renderer is unusable afterwards.
    ///
    /// Order: current object renderer stopped, plugins destroyed, textures
    /// released, then render targets and their mask stacks.
    pub fn destroy(&mut self) -> RenderResult<()> {
        self.ensure_usable("destroy")?;

        if self.is_active() {
            if let Some(id) = self.current {
                let stopped = self.stop_plugin(id);
                if let Err(e) = self.absorb_context_loss(stopped) {
                    log::warn!("Renderer: stopping the current object renderer failed: {e}");
                }
            }
        }
        self.current = None;

        for slot in &mut self.plugins {
            slot.renderer.destroy(self.device.as_mut(), self.generation);
        }
        self.plugins.clear();

        if let Err(e) = self.textures.destroy_all(self.device.as_mut(), self.generation) {
            log::warn!("Renderer: releasing textures failed: {e}");
        }

        for target in self.targets.iter_mut().filter_map(Option::as_mut) {
            if let Err(e) = target.destroy(self.device.as_mut(), self.generation) {
                log::warn!("Renderer: releasing a render target failed: {e}");
            }
        }
        self.targets.clear();
        log::debug!("Renderer: filter state is owned by the host, nothing to release");
        self.active_target = None;
        self.active_transform = None;
        self.render_state.reset();

        self.state = RendererState::Destroyed;
        log::info!("Renderer: destroyed");
        Ok(())
    }
}
