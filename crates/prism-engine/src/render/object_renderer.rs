use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use crate::device::{ContextGeneration, GpuDevice};
use crate::error::RenderResult;

use super::RenderContext;

/// A pluggable renderer for one family of scene objects.
///
/// Lifecycle: `Stopped -> start -> Running -> flush* -> stop -> Stopped`.
/// The [`Renderer`](super::Renderer) keeps at most one plugin current and
/// always stops the outgoing one before starting the incoming one.
pub trait ObjectRenderer: Any {
    /// Registry name, unique per renderer.
    fn name(&self) -> &'static str;

    /// Called before the first use in each context generation.
    ///
    /// Every GPU resource created in an earlier generation is gone by now.
    fn on_context_change(&mut self, _ctx: &mut RenderContext<'_>) -> RenderResult<()> {
        Ok(())
    }

    fn start(&mut self, _ctx: &mut RenderContext<'_>) -> RenderResult<()> {
        Ok(())
    }

    /// Issues buffered draws. Must be a no-op when nothing is pending.
    fn flush(&mut self, _ctx: &mut RenderContext<'_>) -> RenderResult<()> {
        Ok(())
    }

    fn stop(&mut self, ctx: &mut RenderContext<'_>) -> RenderResult<()> {
        self.flush(ctx)
    }

    /// Releases GPU resources owned by the plugin.
    ///
    /// Only handles created in `generation` are still valid on `device`.
    fn destroy(&mut self, _device: &mut dyn GpuDevice, _generation: ContextGeneration) {}

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// An [`ObjectRenderer`] that knows how to draw `T`.
pub trait RenderObject<T: ?Sized>: ObjectRenderer {
    /// Draws (or enqueues) one object. Safe to call repeatedly without flushing.
    fn render(&mut self, ctx: &mut RenderContext<'_>, object: &mut T) -> RenderResult<()>;
}

/// Untyped index of a registered plugin.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PluginId(pub(crate) usize);

/// Typed index of a registered plugin of type `P`.
pub struct PluginHandle<P> {
    id: PluginId,
    _marker: PhantomData<fn() -> P>,
}

impl<P> PluginHandle<P> {
    pub(crate) fn new(id: PluginId) -> Self {
        Self { id, _marker: PhantomData }
    }

    #[inline]
    pub fn id(self) -> PluginId {
        self.id
    }
}

impl<P> Copy for PluginHandle<P> {}

impl<P> Clone for PluginHandle<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> PartialEq for PluginHandle<P> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<P> Eq for PluginHandle<P> {}

impl<P> fmt::Debug for PluginHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PluginHandle").field(&self.id.0).finish()
    }
}
