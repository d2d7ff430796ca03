mod common;

use prism_engine::RenderError;
use prism_engine::scene::{ParticleContainer, ParticleProperties};

use common::{BLUE, RED, device, device_mut, particle, renderer, solid};

fn filled(count: usize, max_size: usize, batch_size: usize) -> ParticleContainer {
    let red = solid(RED);
    let mut pc = ParticleContainer::new(max_size).with_batch_size(batch_size);
    for i in 0..count {
        let x = 5.0 + (i % 10) as f32 * 10.0;
        let y = 5.0 + (i / 10) as f32 * 10.0;
        pc.add_child(particle(&red, x, y, 2.0));
    }
    pc
}

#[test]
fn children_past_max_size_are_not_drawn() {
    let mut r = renderer(100, 100);
    let mut pc = filled(55, 40, 10);
    assert_eq!(pc.chunk_count(), 4);

    // Only chunk 0 has static geometry on the first frame.
    for _ in 0..4 {
        r.render_root(&mut pc).unwrap();
    }
    device_mut(&mut r).reset_counters();
    r.render_root(&mut pc).unwrap();

    let stats = r.last_frame_stats();
    assert_eq!(stats.draw_calls, 4);
    assert_eq!(stats.dynamic_uploads, 4);
    assert_eq!(device(&r).counters().triangles, 80);

    // Child 39 sits in row 3, child 40 in row 4.
    assert_eq!(device(&r).pixel(95, 35), Some(RED));
    assert_eq!(device(&r).pixel(5, 45), Some(BLUE));
}

#[test]
fn static_uploads_advance_one_chunk_per_render() {
    let mut r = renderer(100, 100);
    let mut pc = filled(40, 40, 10);

    let mut uploads = Vec::new();
    for _ in 0..6 {
        r.render_root(&mut pc).unwrap();
        uploads.push(r.last_frame_stats().static_uploads);
    }
    assert_eq!(uploads, [1, 1, 1, 1, 0, 0]);
    assert_eq!(pc.static_watermark(), 4);

    // Touching a child in chunk 2 re-uploads chunks 2 and 3 only.
    pc.invalidate_static(25);
    assert_eq!(pc.static_watermark(), 2);
    r.render_root(&mut pc).unwrap();
    r.render_root(&mut pc).unwrap();
    r.render_root(&mut pc).unwrap();
    assert_eq!(pc.static_watermark(), 4);
    assert_eq!(r.last_frame_stats().static_uploads, 0);
}

#[test]
fn mixed_base_textures_are_rejected() {
    let mut r = renderer(100, 100);
    let red = solid(RED);
    let blue = solid(BLUE);
    let mut pc = ParticleContainer::new(4);
    pc.add_child(particle(&red, 10.0, 10.0, 4.0));
    pc.add_child(particle(&blue, 20.0, 10.0, 4.0));

    let err = r.render_root(&mut pc).unwrap_err();
    assert!(matches!(err, RenderError::BatchConstraint(_)), "{err:?}");
    assert_eq!(device(&r).counters().draw_calls, 0);
}

#[test]
fn dynamic_positions_follow_children_every_frame() {
    let mut r = renderer(100, 100);
    let mut pc = filled(1, 1, 1);

    r.render_root(&mut pc).unwrap();
    assert_eq!(device(&r).pixel(5, 5), Some(RED));

    pc.children_mut()[0].transform.position.x = 55.0;
    r.render_root(&mut pc).unwrap();
    assert_eq!(device(&r).pixel(5, 5), Some(BLUE));
    assert_eq!(device(&r).pixel(55, 5), Some(RED));
    assert_eq!(r.last_frame_stats().static_uploads, 0);
}

#[test]
fn changing_properties_reallocates_buffers() {
    let mut r = renderer(100, 100);
    let mut pc = filled(20, 20, 10);
    r.render_root(&mut pc).unwrap();
    r.render_root(&mut pc).unwrap();
    assert_eq!(pc.static_watermark(), 2);

    let all_dynamic = ParticleProperties { vertices: true, position: true, rotation: true, uvs: true, alpha: true };
    pc.set_properties(all_dynamic);
    assert_eq!(pc.static_watermark(), 0);

    let before = device(&r).counters().buffer_writes;
    r.render_root(&mut pc).unwrap();
    assert!(device(&r).counters().buffer_writes > before);
    assert_eq!(r.last_frame_stats().draw_calls, 2);
    assert_eq!(device(&r).pixel(95, 15), Some(RED));

    pc.release_buffers(&mut r).unwrap();
    r.render_root(&mut pc).unwrap();
    assert_eq!(r.last_frame_stats().static_uploads, 1);
}

#[test]
fn changing_batch_size_releases_the_old_buffers() {
    let mut r = renderer(100, 100);
    let base = device(&r).live_buffers();
    let mut pc = filled(40, 40, 10);
    r.render_root(&mut pc).unwrap();
    let four_chunks = device(&r).live_buffers() - base;
    assert!(four_chunks > 0);

    pc = pc.with_batch_size(20);
    assert_eq!(pc.chunk_count(), 2);
    assert_eq!(pc.static_watermark(), 0);
    r.render_root(&mut pc).unwrap();
    assert_eq!(device(&r).live_buffers() - base, four_chunks / 2);
    assert_eq!(r.last_frame_stats().draw_calls, 2);
    assert_eq!(device(&r).pixel(95, 35), Some(RED));

    pc.release_buffers(&mut r).unwrap();
    assert_eq!(device(&r).live_buffers(), base);
}
