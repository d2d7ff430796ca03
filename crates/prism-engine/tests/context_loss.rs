mod common;

use prism_engine::coords::Matrix;
use prism_engine::device::{GpuDevice, SoftwareDevice};
use prism_engine::render::{ContextEvent, Renderer, RendererState};
use prism_engine::scene::{DisplayObject, ParticleContainer};
use prism_engine::{RenderError, RenderResult};

use common::{BLUE, RED, device, device_mut, particle, renderer, solid};

fn lose(r: &mut Renderer) -> ContextEvent {
    device_mut(r).lose_context();
    let mut event = ContextEvent::lost();
    r.handle_context_event(&mut event).unwrap();
    event
}

#[test]
fn lost_event_is_captured_and_frames_are_dropped() {
    let mut r = renderer(100, 100);
    let red = solid(RED);
    let mut pc = ParticleContainer::new(1);
    pc.add_child(particle(&red, 50.0, 50.0, 10.0));
    r.render_root(&mut pc).unwrap();

    let event = lose(&mut r);
    assert!(event.is_default_prevented());
    assert_eq!(r.state(), RendererState::ContextLost);

    device_mut(&mut r).reset_counters();
    r.render_root(&mut pc).unwrap();
    r.clear(None).unwrap();
    let counters = device(&r).counters();
    assert_eq!(counters.draw_calls, 0);
    assert_eq!(counters.clears, 0);

    assert_eq!(r.update_texture(&red), Err(RenderError::ContextLost));
    assert_eq!(r.extract_pixels(None), Err(RenderError::ContextLost));
}

#[test]
fn restore_recreates_resources_lazily() {
    let mut r = renderer(100, 100);
    let red = solid(RED);
    let mut pc = ParticleContainer::new(1);
    pc.add_child(particle(&red, 50.0, 50.0, 10.0));
    r.render_root(&mut pc).unwrap();
    assert_eq!(r.generation().get(), 1);

    lose(&mut r);
    r.handle_context_event(&mut ContextEvent::restored()).unwrap();
    assert_eq!(r.state(), RendererState::Active);
    assert_eq!(r.generation().get(), 2);
    assert!(!r.textures().is_resident(red.uid(), r.generation()));

    r.render_root(&mut pc).unwrap();
    let stats = r.last_frame_stats();
    assert_eq!(stats.texture_uploads, 1);
    assert_eq!(stats.static_uploads, 1);
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(device(&r).pixel(50, 50), Some(RED));
    assert_eq!(device(&r).pixel(0, 0), Some(BLUE));
}

#[test]
fn lost_event_alone_stops_drawing_on_a_live_device() {
    let mut r = renderer(100, 100);
    let red = solid(RED);
    let mut pc = ParticleContainer::new(1);
    pc.add_child(particle(&red, 50.0, 50.0, 10.0));
    r.render_root(&mut pc).unwrap();

    let mut event = ContextEvent::lost();
    r.handle_context_event(&mut event).unwrap();
    assert!(event.is_default_prevented());
    assert!(!device(&r).is_lost());
    assert_eq!(r.state(), RendererState::ContextLost);

    device_mut(&mut r).reset_counters();
    r.render_root(&mut pc).unwrap();
    r.clear(None).unwrap();
    let counters = device(&r).counters();
    assert_eq!(counters.draw_calls, 0);
    assert_eq!(counters.clears, 0);

    r.handle_context_event(&mut ContextEvent::restored()).unwrap();
    assert_eq!(r.generation().get(), 2);
    r.render_root(&mut pc).unwrap();
    assert_eq!(r.last_frame_stats().texture_uploads, 1);
    assert_eq!(device(&r).pixel(50, 50), Some(RED));
}

#[test]
fn restore_while_live_is_ignored() {
    let mut r = renderer(10, 10);
    r.handle_context_event(&mut ContextEvent::restored()).unwrap();
    assert_eq!(r.generation().get(), 1);
}

/// Drops the device context halfway through its own draw.
struct Saboteur {
    inner: ParticleContainer,
}

impl DisplayObject for Saboteur {
    fn update_transform(&mut self, parent: &Matrix, parent_alpha: f32) {
        self.inner.update_transform(parent, parent_alpha);
    }

    fn world_transform(&self) -> Matrix {
        self.inner.world_transform()
    }

    fn world_alpha(&self) -> f32 {
        self.inner.world_alpha()
    }

    fn render_using(&mut self, renderer: &mut Renderer) -> RenderResult<()> {
        if let Some(dev) = renderer.device_as_mut::<SoftwareDevice>() {
            dev.lose_context();
        }
        self.inner.render_using(renderer)
    }
}

#[test]
fn mid_frame_loss_is_absorbed() {
    let mut r = renderer(100, 100);
    let red = solid(RED);
    let mut inner = ParticleContainer::new(1);
    inner.add_child(particle(&red, 50.0, 50.0, 10.0));
    let mut root = Saboteur { inner };

    r.render_root(&mut root).unwrap();
    assert_eq!(r.state(), RendererState::ContextLost);

    // The host's lost event arrives after the fact.
    let mut event = ContextEvent::lost();
    r.handle_context_event(&mut event).unwrap();
    assert!(event.is_default_prevented());

    r.handle_context_event(&mut ContextEvent::restored()).unwrap();
    r.render_root(&mut root.inner).unwrap();
    assert_eq!(device(&r).pixel(50, 50), Some(RED));
}
