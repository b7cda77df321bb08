//! Headless clipping mask demo
//!
//! Builds a small synthetic puppet whose parts are clipped by other parts,
//! animates it and renders it offscreen in both masking modes.

use glam::{Mat4, Vec2};
use puppet_clip::{
    BlendMode, ClipSpace, ClippingConfig, Color, Drawable, DrawableSource, FrameStats,
    MaskingMode, Model,
};
use puppet_clip_wgpu::{GpuContext, MaskRenderer, WgpuClippingManager, WgpuSurfaceFactory};

const TARGET_SIZE: u32 = 512;
const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const FRAMES: usize = 120;
const MASK_SURFACES: usize = 2;

// Drawable indices of the synthetic puppet.
const FACE: usize = 0;
const EYE_LEFT: usize = 1;
const EYE_RIGHT: usize = 2;
const HAIR: usize = 3;
const PUPIL_LEFT: usize = 4;
const PUPIL_RIGHT: usize = 5;
const HIGHLIGHT: usize = 7;

/// A face with two eyes, pupils clipped by the eyes, a hair shadow clipped by
/// face and hair, an additive highlight and a backdrop drawn outside the face.
fn build_puppet() -> Model {
    let quad = |x0: f32, y0: f32, x1: f32, y1: f32| Drawable::quad(Vec2::new(x0, y0), Vec2::new(x1, y1));

    let mut model = Model::new();
    model.push(quad(-1.0, -1.0, 1.0, 1.2).with_render_order(0));
    model.push(quad(-0.6, 0.1, -0.2, 0.4).with_render_order(1));
    model.push(quad(0.2, 0.1, 0.6, 0.4).with_render_order(1));
    model.push(quad(-1.1, 0.8, 1.1, 1.5).with_render_order(3));
    model.push(
        quad(-0.5, 0.15, -0.35, 0.35)
            .with_masks(vec![EYE_LEFT])
            .with_render_order(2)
            .with_texture(1),
    );
    model.push(
        quad(0.35, 0.15, 0.5, 0.35)
            .with_masks(vec![EYE_RIGHT])
            .with_render_order(2)
            .with_texture(1),
    );
    model.push(
        quad(-1.0, 0.6, 1.0, 0.9)
            .with_masks(vec![HAIR, FACE])
            .with_render_order(4)
            .with_blend_mode(BlendMode::Multiplicative),
    );
    model.push(
        quad(-0.8, -0.6, 0.8, -0.2)
            .with_masks(vec![FACE])
            .with_render_order(5)
            .with_blend_mode(BlendMode::Additive),
    );
    model.push(
        quad(-2.0, -2.0, 2.0, 2.0)
            .with_masks(vec![FACE])
            .with_inverted_mask(true)
            .with_render_order(-1),
    );
    model
}

/// Look around, blink and fade the highlight out and back in.
fn animate(model: &mut Model, frame: usize) {
    let t = frame as f32 / 30.0;
    let look = Vec2::new((t * 2.0).sin() * 0.002, 0.0);
    model.translate(PUPIL_LEFT, look);
    model.translate(PUPIL_RIGHT, look);

    let blink = (frame / 40) % 2 == 1 && frame % 40 < 6;
    model.set_visible(EYE_LEFT, !blink);
    model.set_visible(EYE_RIGHT, !blink);

    model.set_opacity(HIGHLIGHT, (t.cos() * 0.5 + 0.5).max(0.0));
    if frame % 60 >= 50 {
        model.set_opacity(HIGHLIGHT, 0.0);
    }
}

fn checker_texture() -> Vec<u8> {
    let mut pixels = Vec::with_capacity(4 * 4 * 4);
    for y in 0..4 {
        for x in 0..4 {
            let v = if (x + y) % 2 == 0 { 255 } else { 32 };
            pixels.extend_from_slice(&[v, v, v, 255]);
        }
    }
    pixels
}

fn run(gpu: &GpuContext, mode: MaskingMode) -> Result<FrameStats, Box<dyn std::error::Error>> {
    let mut model = build_puppet();

    let config = ClippingConfig::default()
        .with_mode(mode)
        .with_clip_space(ClipSpace::YDown);
    let mut clipping =
        WgpuClippingManager::new(WgpuSurfaceFactory::new(gpu.clone()), config);
    clipping.initialize(&model, MASK_SURFACES);

    let mut renderer = MaskRenderer::new(gpu.clone(), TARGET_FORMAT, ClipSpace::YDown);
    renderer.set_projection(Mat4::orthographic_rh(-2.0, 2.0, -2.0, 2.0, -1.0, 1.0));
    let _white = renderer.upload_texture(0, 1, 1, &[255, 255, 255, 255])?;
    let _checker = renderer.upload_texture(1, 4, 4, &checker_texture())?;

    let target = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Demo Target"),
        size: wgpu::Extent3d {
            width: TARGET_SIZE,
            height: TARGET_SIZE,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

    let mut totals = FrameStats::default();
    for frame in 0..FRAMES {
        animate(&mut model, frame);

        // Exercise surface recreation halfway through.
        if frame == FRAMES / 2 {
            clipping.set_atlas_size(512, 512);
        }

        renderer.begin_frame(&target_view, Some(Color::new(0.1, 0.1, 0.12, 1.0)));
        clipping.setup_clipping_context(&model, &mut renderer);
        let stats = clipping.draw_model(&model, &mut renderer);
        renderer.end_frame();
        model.reset_dynamic_flags();

        if frame % 30 == 0 {
            log::info!("{:?} frame {}: {:?}", mode, frame, stats);
        }

        totals.contexts_in_use += stats.contexts_in_use;
        totals.rejected_masks += stats.rejected_masks;
        totals.mask_draw_calls += stats.mask_draw_calls;
        totals.model_draw_calls += stats.model_draw_calls;
        totals.skipped_draws += stats.skipped_draws;
    }

    log::info!(
        "{:?}: {} mask contexts, {} mesh uploads over {} frames",
        mode,
        clipping.contexts().len(),
        renderer.mesh_uploads(),
        FRAMES
    );
    Ok(totals)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger (RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::default(),
        compatible_surface: None,
        force_fallback_adapter: false,
    }))?;
    log::info!("✓ Using GPU: {}", adapter.get_info().name);

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("Device"),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::default(),
        memory_hints: wgpu::MemoryHints::default(),
        experimental_features: wgpu::ExperimentalFeatures::default(),
        trace: wgpu::Trace::Off,
    }))?;
    let gpu = GpuContext::new(device, queue);

    let model = build_puppet();
    log::info!(
        "puppet: {} drawables, masking {}",
        model.drawable_count(),
        if model.uses_masking() { "on" } else { "off" }
    );

    for mode in [MaskingMode::Buffered, MaskingMode::HighPrecision] {
        let totals = run(&gpu, mode)?;
        log::info!("{:?} totals: {:?}", mode, totals);
    }

    Ok(())
}
