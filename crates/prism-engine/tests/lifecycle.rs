mod common;

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use prism_engine::device::{ContextGeneration, GpuDevice};
use prism_engine::render::{
    GcMode, ObjectRenderer, RenderContext, RenderObject, Renderer, RendererOptions, RendererState, TextureGcConfig,
};
use prism_engine::scene::ParticleContainer;
use prism_engine::{RenderError, RenderResult};

use common::{BLUE, RED, particle, renderer, solid};

type Log = Rc<RefCell<Vec<String>>>;

struct Recorder {
    name: &'static str,
    log: Log,
}

impl Recorder {
    fn push(&self, event: &str) {
        self.log.borrow_mut().push(format!("{}:{event}", self.name));
    }
}

impl ObjectRenderer for Recorder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn on_context_change(&mut self, _ctx: &mut RenderContext<'_>) -> RenderResult<()> {
        self.push("context");
        Ok(())
    }

    fn start(&mut self, _ctx: &mut RenderContext<'_>) -> RenderResult<()> {
        self.push("start");
        Ok(())
    }

    fn flush(&mut self, _ctx: &mut RenderContext<'_>) -> RenderResult<()> {
        self.push("flush");
        Ok(())
    }

    fn stop(&mut self, ctx: &mut RenderContext<'_>) -> RenderResult<()> {
        self.flush(ctx)?;
        self.push("stop");
        Ok(())
    }

    fn destroy(&mut self, _device: &mut dyn GpuDevice, _generation: ContextGeneration) {
        self.push("destroy");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl RenderObject<u32> for Recorder {
    fn render(&mut self, _ctx: &mut RenderContext<'_>, object: &mut u32) -> RenderResult<()> {
        self.push(&format!("render {object}"));
        Ok(())
    }
}

fn recorder(r: &mut Renderer, name: &'static str, log: &Log) -> prism_engine::render::PluginHandle<Recorder> {
    r.register_plugin(Recorder { name, log: log.clone() }).unwrap()
}

#[test]
fn setting_the_same_renderer_twice_starts_it_once() {
    let mut r = renderer(10, 10);
    let log = Log::default();
    let a = recorder(&mut r, "a", &log);

    r.set_object_renderer(a.id()).unwrap();
    r.set_object_renderer(a.id()).unwrap();
    assert_eq!(*log.borrow(), ["a:context", "a:start"]);
    assert_eq!(r.current_object_renderer(), Some(a.id()));
}

#[test]
fn switching_stops_the_old_renderer_first() {
    let mut r = renderer(10, 10);
    let log = Log::default();
    let a = recorder(&mut r, "a", &log);
    let b = recorder(&mut r, "b", &log);

    r.render_object(a, &mut 1u32).unwrap();
    r.render_object(b, &mut 2u32).unwrap();
    r.render_object(a, &mut 3u32).unwrap();

    assert_eq!(
        *log.borrow(),
        [
            "a:context", "a:start", "a:render 1", "a:flush", "a:stop", "b:context", "b:start", "b:render 2",
            "b:flush", "b:stop", "a:start", "a:render 3",
        ]
    );
}

#[test]
fn plugin_names_are_unique_and_looked_up_by_type() {
    let mut r = renderer(10, 10);
    let log = Log::default();
    let a = recorder(&mut r, "a", &log);

    assert!(r.register_plugin(Recorder { name: "a", log: log.clone() }).is_err());
    assert_eq!(r.plugin::<Recorder>("a"), Some(a));
    assert_eq!(r.plugin::<Recorder>("missing"), None);
    assert!(r.plugin_ref(a).is_some());
}

#[test]
fn restore_reruns_context_change_before_the_next_start() {
    let mut r = renderer(10, 10);
    let log = Log::default();
    let a = recorder(&mut r, "a", &log);
    r.render_object(a, &mut 1u32).unwrap();

    r.device_as_mut::<prism_engine::device::SoftwareDevice>().unwrap().lose_context();
    r.handle_context_event(&mut prism_engine::render::ContextEvent::lost()).unwrap();
    r.handle_context_event(&mut prism_engine::render::ContextEvent::restored()).unwrap();
    log.borrow_mut().clear();

    r.render_object(a, &mut 2u32).unwrap();
    assert_eq!(*log.borrow(), ["a:context", "a:start", "a:render 2"]);
}

#[test]
fn destroy_tears_down_once() {
    let mut r = renderer(10, 10);
    let log = Log::default();
    let a = recorder(&mut r, "a", &log);
    r.set_object_renderer(a.id()).unwrap();

    r.destroy().unwrap();
    assert_eq!(r.state(), RendererState::Destroyed);
    assert_eq!(*log.borrow(), ["a:context", "a:start", "a:flush", "a:stop", "a:destroy"]);

    assert_eq!(r.destroy(), Err(RenderError::DestroyedUse("destroy")));
    let mut pc = ParticleContainer::new(1);
    assert_eq!(r.render_root(&mut pc), Err(RenderError::DestroyedUse("render")));
    assert!(matches!(r.create_render_target(4, 4, false), Err(RenderError::DestroyedUse(_))));
}

#[test]
fn idle_textures_are_collected() {
    prism_engine::logging::init_test_logging();
    let mut options = RendererOptions::default().with_size(20, 20);
    options.texture_gc = TextureGcConfig { mode: GcMode::Auto, max_idle: 2, check_count_max: 1 };
    let mut r = Renderer::software(options).unwrap();

    let red = solid(RED);
    let blue = solid(BLUE);
    let mut pc = ParticleContainer::new(1);
    pc.add_child(particle(&red, 10.0, 10.0, 4.0));
    r.render_root(&mut pc).unwrap();
    let generation = r.generation();
    assert!(r.textures().is_resident(red.uid(), generation));

    pc.clear_children();
    pc.add_child(particle(&blue, 10.0, 10.0, 4.0));
    let mut evicted = 0;
    for _ in 0..3 {
        r.render_root(&mut pc).unwrap();
        evicted += r.last_frame_stats().textures_evicted;
    }

    assert_eq!(evicted, 1);
    assert!(!r.textures().is_resident(red.uid(), generation));
    assert!(r.textures().is_resident(blue.uid(), generation));
}

#[test]
fn manual_gc_keeps_textures_until_unloaded() {
    prism_engine::logging::init_test_logging();
    let mut options = RendererOptions::default().with_size(20, 20);
    options.texture_gc = TextureGcConfig { mode: GcMode::Manual, max_idle: 0, check_count_max: 0 };
    let mut r = Renderer::software(options).unwrap();

    let red = solid(RED);
    r.update_texture(&red).unwrap();
    for _ in 0..5 {
        r.render_root(&mut ParticleContainer::new(1)).unwrap();
    }
    assert!(r.textures().is_resident(red.uid(), r.generation()));
    assert_eq!(r.unload_texture(red.uid()), Ok(true));
    assert_eq!(r.unload_texture(red.uid()), Ok(false));
}
