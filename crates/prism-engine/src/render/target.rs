//! Framebuffer destinations with their own projection and mask stack.

use crate::coords::{Matrix, Rect};
use crate::device::{ContextGeneration, GpuDevice, GpuHandle, Tagged};
use crate::error::{RenderError, RenderResult};
use crate::paint::Color;

/// Opaque id of a mask shape owned by the external mask subsystem.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MaskId(pub u64);

/// Stencil masks in effect on a target, innermost last.
///
/// Push/pop only. The stencil reference value is the stack depth.
#[derive(Debug, Clone, Default)]
pub struct MaskStack {
    entries: Vec<MaskId>,
}

impl MaskStack {
    /// Pushes `mask` and returns the new stencil reference value.
    pub fn push(&mut self, mask: MaskId) -> u32 {
        self.entries.push(mask);
        self.reference()
    }

    pub fn pop(&mut self) -> Option<MaskId> {
        self.entries.pop()
    }

    #[inline]
    pub fn reference(&self) -> u32 {
        self.entries.len() as u32
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A color (and optional stencil) destination.
///
/// The root target draws into the device's default framebuffer. Offscreen
/// targets own a framebuffer tagged with the context generation it was
/// created in; a stale tag makes [`activate`](Self::activate) recreate it.
///
/// Frame, size and transform changes mark the target dirty until its next
/// activation pushes them to the device.
#[derive(Debug)]
pub struct RenderTarget {
    root: bool,
    framebuffer: Option<Tagged>,
    width: u32,
    height: u32,
    resolution: f32,

    destination_frame: Rect,
    source_frame: Rect,
    projection: Matrix,
    transform: Option<Matrix>,
    dirty: bool,

    pub clear_color: Color,
    stencil: bool,
    masks: MaskStack,
}

impl RenderTarget {
    pub(crate) fn root(width: u32, height: u32, resolution: f32, clear_color: Color) -> Self {
        let mut target = Self::new(true, width, height, resolution, true);
        target.clear_color = clear_color;
        target
    }

    /// An offscreen target; its framebuffer is created on first activation.
    pub fn offscreen(width: u32, height: u32, resolution: f32, stencil: bool) -> Self {
        Self::new(false, width, height, resolution, stencil)
    }

    fn new(root: bool, width: u32, height: u32, resolution: f32, stencil: bool) -> Self {
        let frame = Rect::from_size(width as f32, height as f32);
        let mut target = Self {
            root,
            framebuffer: None,
            width,
            height,
            resolution,
            destination_frame: frame,
            source_frame: frame,
            projection: Matrix::IDENTITY,
            transform: None,
            dirty: true,
            clear_color: Color::transparent(),
            stencil,
            masks: MaskStack::default(),
        };
        target.calculate_projection();
        target
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.root
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// Framebuffer size in device pixels.
    pub fn physical_size(&self) -> (u32, u32) {
        (
            (self.width as f32 * self.resolution).round() as u32,
            (self.height as f32 * self.resolution).round() as u32,
        )
    }

    #[inline]
    pub fn has_stencil(&self) -> bool {
        self.stencil
    }

    /// Projection of the current frames with the transform appended.
    #[inline]
    pub fn projection(&self) -> Matrix {
        self.projection
    }

    #[inline]
    pub fn transform(&self) -> Option<Matrix> {
        self.transform
    }

    /// Transform appended to the projection on the next activation.
    pub fn set_transform(&mut self, transform: Option<Matrix>) {
        if self.transform != transform {
            self.transform = transform;
            self.dirty = true;
        }
    }

    /// `true` when frames, size or transform changed since the last activation.
    #[inline]
    pub fn needs_activation(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn frames(&self) -> (Rect, Rect) {
        (self.destination_frame, self.source_frame)
    }

    /// The framebuffer handle if it belongs to `generation`.
    ///
    /// `None` for the root target, which uses the default framebuffer.
    pub fn framebuffer(&self, generation: ContextGeneration) -> Option<GpuHandle> {
        self.framebuffer.and_then(|t| t.live(generation))
    }

    pub fn masks(&self) -> &MaskStack {
        &self.masks
    }

    pub fn masks_mut(&mut self) -> &mut MaskStack {
        &mut self.masks
    }

    /// Enters `mask`. Returns the stencil reference for the mask subsystem.
    pub fn push_mask(&mut self, mask: MaskId) -> u32 {
        log::trace!("RenderTarget: push mask {} (depth {})", mask.0, self.masks.reference() + 1);
        self.masks.push(mask)
    }

    pub fn pop_mask(&mut self) -> Option<MaskId> {
        self.masks.pop()
    }

    /// Constrains rendering to `destination` (viewport, in target pixels)
    /// showing `source` (in world units). `None` keeps the current frame.
    pub fn set_frame(&mut self, destination: Option<Rect>, source: Option<Rect>) {
        if let Some(d) = destination {
            self.destination_frame = d;
        }
        self.source_frame = source.unwrap_or(self.destination_frame);
        self.update_projection();
        self.dirty = true;
    }

    /// Maps the source frame onto clip space, rows top-first.
    pub fn calculate_projection(&mut self) {
        let dest = self.destination_frame;
        let src = self.source_frame;
        let a = 2.0 / dest.width();
        let d = -2.0 / dest.height();
        self.projection = Matrix::new(a, 0.0, 0.0, d, -1.0 - src.x() * a, 1.0 - src.y() * d);
    }

    fn update_projection(&mut self) {
        self.calculate_projection();
        if let Some(t) = self.transform {
            self.projection.append(&t);
        }
    }

    /// Changes the logical size. Returns `false` when the size is unchanged.
    ///
    /// A zero width or height is rejected with `InvalidResource`.
    ///
    /// Frames are reset to the full target. Storage is reallocated only for
    /// a framebuffer that is live in `generation`; a stale one is recreated
    /// at the new size on activation.
    pub fn resize(
        &mut self,
        device: &mut dyn GpuDevice,
        generation: ContextGeneration,
        width: u32,
        height: u32,
    ) -> RenderResult<bool> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidResource(format!("render target size {width}x{height}")));
        }
        if (width, height) == (self.width, self.height) {
            return Ok(false);
        }
        self.width = width;
        self.height = height;
        let frame = Rect::from_size(width as f32, height as f32);
        self.destination_frame = frame;
        self.source_frame = frame;
        self.update_projection();
        self.dirty = true;

        let (pw, ph) = self.physical_size();
        if self.root {
            device.resize_default_framebuffer(pw, ph)?;
        } else if let Some(fb) = self.framebuffer(generation) {
            device.resize_framebuffer(fb, pw, ph)?;
        }
        log::debug!("RenderTarget: resized to {width}x{height} ({pw}x{ph} px)");
        Ok(true)
    }

    /// Makes this target the device's drawing destination.
    pub fn activate(&mut self, device: &mut dyn GpuDevice, generation: ContextGeneration) -> RenderResult<()> {
        let framebuffer = if self.root {
            None
        } else {
            Some(self.ensure_framebuffer(device, generation)?)
        };
        device.bind_framebuffer(framebuffer)?;
        self.update_projection();

        let viewport = self.destination_frame.to_viewport(self.resolution);
        let scissor = (self.destination_frame != self.source_frame).then_some(viewport);
        device.set_scissor(scissor)?;
        device.set_viewport(viewport)?;
        self.dirty = false;
        Ok(())
    }

    fn ensure_framebuffer(
        &mut self,
        device: &mut dyn GpuDevice,
        generation: ContextGeneration,
    ) -> RenderResult<GpuHandle> {
        if let Some(fb) = self.framebuffer(generation) {
            return Ok(fb);
        }
        let (pw, ph) = self.physical_size();
        let handle = device.create_framebuffer(pw, ph, self.stencil)?;
        log::trace!("RenderTarget: framebuffer {} for generation {}", handle.raw(), generation.get());
        self.framebuffer = Some(Tagged::new(generation, handle));
        Ok(handle)
    }

    /// Clears the bound framebuffer to `color` or this target's clear color.
    pub fn clear(&self, device: &mut dyn GpuDevice, color: Option<Color>) -> RenderResult<()> {
        device.clear(color.unwrap_or(self.clear_color), self.stencil)
    }

    /// Releases the framebuffer. The target can be activated again afterwards.
    pub fn destroy(&mut self, device: &mut dyn GpuDevice, generation: ContextGeneration) -> RenderResult<()> {
        self.masks.clear();
        match self.framebuffer.take().and_then(|t| t.live(generation)) {
            Some(fb) => device.delete_framebuffer(fb),
            None => Ok(()),
        }
    }
}
