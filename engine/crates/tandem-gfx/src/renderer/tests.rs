use std::cell::Cell;
use std::rc::Rc;

use glam::{UVec2, UVec3, Vec4};

use crate::backend::{ImageComponent, RecordTargets, RenderWorkSubmitResult};
use crate::commands::command_list::Command;
use crate::commands::command_processor::CommandProcessor;
use crate::config::GfxConfig;
use crate::context::GfxContext;
use crate::error::GfxError;
use crate::headless::HeadlessBackend;
use crate::renderer::edit::RendererEditBuilder;
use crate::renderer::options::RendererOptions;
use crate::renderer::output::{AcquireInfo, AcquireOutcome, ImageOutput, Output};
use crate::renderer::pipeline_manager::PipelineManager;
use crate::renderer::render_state::{ComputeState, RenderState};
use crate::renderer::renderer_info::RendererInfo;
use crate::renderer::shader::{ShaderInfo, ShaderStage};
use crate::renderer::{Renderer, RendererState};
use crate::resources::image_format::ImageFormat;
use crate::resources::reference::ResourceReference;
use crate::resources::resource::{BufferResource, ImageResource, ResourceAccess, ResourceFlags, ResourceHandle};
use crate::resources::resource_storage::ResourceStorage;

const FILL_KERNEL: &[u8] = b"fill-constant";
const ADD_ONE_KERNEL: &[u8] = b"add-one";

fn compute_info() -> RendererInfo {
    let mut info = RendererInfo::new();
    info.shader().set_shader(ShaderStage::Compute, FILL_KERNEL);
    info
}

fn graphics_info() -> RendererInfo {
    let mut info = RendererInfo::new();
    info.shader()
        .set_shader(ShaderStage::Vertex, vec![1u8; 4])
        .set_shader(ShaderStage::Fragment, vec![2u8; 4]);
    info
}

/// 离屏 graphics renderer：一个 6 个 index 的 index buffer，输出到一张 image
fn offscreen_info(dimensions: UVec2, clear_colour: Vec4) -> (RendererInfo, ResourceHandle) {
    let mut info = graphics_info();
    info.add_resource(
        BufferResource::from_many(&[0u32, 1, 2, 2, 3, 0], ResourceAccess::StaticFixed)
            .with_flags(ResourceFlags::INDEX_BUFFER),
    );
    let output = info.add_resource(
        ImageResource::from_uninitialised(ImageFormat::Rgba32, dimensions, ResourceAccess::DynamicVariable)
            .with_flags(ResourceFlags::RENDERER_OUTPUT),
    );
    info.set_output(Output::Image(ImageOutput::new([output])));
    if let Some(graphics) = info.state_mut().graphics_mut() {
        graphics.tri_count = 2;
        graphics.clear_colour = clear_colour;
    }
    (info, output)
}

fn window_info(clear_colour: Vec4) -> RendererInfo {
    let mut info = graphics_info();
    info.set_output(Output::Window);
    if let Some(graphics) = info.state_mut().graphics_mut() {
        graphics.clear_colour = clear_colour;
    }
    info
}

fn output_pixels(device: &HeadlessBackend, renderer: &Renderer<HeadlessBackend>, output: ResourceHandle) -> Vec<u8> {
    let image = renderer.get_component(output).unwrap().image().unwrap();
    device.read_pixels(image)
}

fn assert_all_pixels(pixels: &[u8], pixel: &[u8]) {
    assert!(!pixels.is_empty());
    for texel in pixels.chunks_exact(pixel.len()) {
        assert_eq!(texel, pixel);
    }
}

#[test]
fn test_rejected_edit_leaves_renderer_untouched() {
    let device = Rc::new(HeadlessBackend::new());
    let mut info = compute_info();
    let dynamic = info.add_resource(BufferResource::from_uninitialised(8, ResourceAccess::DynamicFixed));
    let fixed = info.add_resource(BufferResource::from_bytes(ResourceAccess::StaticFixed, vec![1, 2, 3, 4]));
    let mut renderer = Renderer::new(device.clone(), &GfxConfig::headless(), info).unwrap();
    let generation = renderer.record_generation();

    // 第一项合法，第二项不合法：整个请求都不生效
    let request = RendererEditBuilder::new()
        .write(dynamic, 0, vec![9u8, 9])
        .buffer_resize(fixed, 16)
        .build();
    assert!(matches!(renderer.edit(&request), Err(GfxError::EditRejected(_))));

    assert_eq!(renderer.state(), RendererState::Ready);
    assert_eq!(renderer.get_component(fixed).unwrap().size(), 4);
    assert_eq!(renderer.get_resource(fixed).unwrap().data(), &[1, 2, 3, 4]);
    assert_eq!(renderer.get_component(dynamic).unwrap().data().unwrap(), &[0u8; 8]);
    assert_eq!(renderer.record_generation(), generation);

    let request = RendererEditBuilder::new().write(fixed, 0, vec![0u8]).build();
    assert!(matches!(renderer.edit(&request), Err(GfxError::EditRejected(_))));

    let request = RendererEditBuilder::new().write(dynamic, 4, vec![0u8; 8]).build();
    assert!(matches!(renderer.edit(&request), Err(GfxError::EditRejected(_))));

    let request = RendererEditBuilder::new().compute(UVec3::new(0, 1, 1)).build();
    assert!(matches!(renderer.edit(&request), Err(GfxError::EditRejected(_))));

    let request = RendererEditBuilder::new().tri_count(3).build();
    assert!(matches!(renderer.edit(&request), Err(GfxError::EditRejected(_))));

    let request = RendererEditBuilder::new().write(dynamic, 2, vec![5u8, 6]).build();
    renderer.edit(&request).unwrap();
    assert_eq!(renderer.get_component(dynamic).unwrap().data().unwrap(), &[0, 0, 5, 6, 0, 0, 0, 0]);
    assert!(device.validation_errors().is_empty());
}

#[test]
fn test_render_does_not_rerecord() {
    let device = Rc::new(HeadlessBackend::new());
    let (info, _) = offscreen_info(UVec2::new(4, 4), Vec4::ONE);
    let mut renderer = Renderer::new(device.clone(), &GfxConfig::headless(), info).unwrap();

    let recorded = renderer.recorded_commands().to_vec();
    let generation = renderer.record_generation();
    assert_eq!(recorded.len(), 1);
    for _ in 0..5 {
        assert_eq!(renderer.render().unwrap(), RenderWorkSubmitResult::Success);
    }

    assert_eq!(renderer.recorded_commands(), recorded.as_slice());
    assert_eq!(renderer.record_generation(), generation);
    assert_eq!(device.stats().submits, 5);
    assert_eq!(renderer.current_frame(), 1);
}

#[test]
fn test_buffer_resize_round_trip() {
    let device = Rc::new(HeadlessBackend::new());
    let original: Vec<u8> = (0..16).collect();
    let mut info = compute_info();
    let buffer = info.add_resource(BufferResource::from_bytes(ResourceAccess::DynamicVariable, original.clone()));
    let mut renderer = Renderer::new(device.clone(), &GfxConfig::headless(), info).unwrap();

    renderer.edit(&RendererEditBuilder::new().buffer_resize(buffer, 32).build()).unwrap();
    {
        let data = renderer.get_component(buffer).unwrap().data().unwrap();
        assert_eq!(data.len(), 32);
        assert_eq!(&data[..16], original.as_slice());
        assert_eq!(&data[16..], &[0u8; 16]);
    }

    renderer.edit(&RendererEditBuilder::new().buffer_resize(buffer, 16).build()).unwrap();
    let component = renderer.get_component(buffer).unwrap();
    assert_eq!(component.size(), 16);
    assert_eq!(component.data().unwrap(), original.as_slice());

    // 每个 descriptor set 都指向新的 buffer
    let live = component.buffer().unwrap().id();
    let bindings = renderer.bindings().unwrap();
    assert_eq!(bindings.set_count(), GfxConfig::DEFAULT_FRAMES_IN_FLIGHT);
    for set in 0..bindings.set_count() {
        assert_eq!(bindings.bound_buffer(set, 0), Some(live));
    }

    // 旧的 buffer 在下一次 render 时销毁
    assert_eq!(renderer.pending_release_count(), 2);
    renderer.render().unwrap();
    assert_eq!(renderer.pending_release_count(), 0);
    assert!(device.validation_errors().is_empty());
}

#[test]
fn test_destroy_waits_for_deferred_work() {
    let device = Rc::new(HeadlessBackend::new().with_deferred_completion());
    let baseline = device.live_object_count();

    let (info, output) = offscreen_info(UVec2::new(4, 4), Vec4::ONE);
    let mut renderer = Renderer::new(device.clone(), &GfxConfig::headless(), info).unwrap();
    for _ in 0..3 {
        renderer.render().unwrap();
    }
    assert!(device.pending_count() > 0);

    renderer
        .edit(&RendererEditBuilder::new().image_resize(output, UVec2::new(2, 2)).build())
        .unwrap();
    renderer.render().unwrap();
    renderer.destroy();

    assert_eq!(device.validation_errors(), Vec::<String>::new());
    assert_eq!(device.live_object_count(), baseline);
    assert_eq!(device.pending_count(), 0);
}

#[test]
fn test_destroying_storage_in_use_is_flagged() {
    let device = Rc::new(HeadlessBackend::new().with_deferred_completion());
    let mut storage = ResourceStorage::new(device.clone(), 1, "harness");
    storage
        .add_resource(BufferResource::from_uninitialised(16, ResourceAccess::DynamicFixed).into())
        .unwrap();
    storage.create_bindings().unwrap();

    let mut shader = ShaderInfo::default();
    shader.set_shader(ShaderStage::Compute, FILL_KERNEL);
    let pipeline = PipelineManager::new(
        device.clone(),
        shader,
        storage.bindings(),
        None,
        RendererOptions::empty(),
        "harness",
    )
    .unwrap();
    let mut processor =
        CommandProcessor::new(device.clone(), 1, 1, false, true, RendererOptions::empty(), "harness").unwrap();
    processor
        .set_rendering_commands(
            &RenderState::Compute(ComputeState::default()),
            &RecordTargets {
                storage: &storage,
                output: None,
                pipeline: &pipeline,
            },
            None,
        )
        .unwrap();
    processor.do_render_work(0, &mut storage).unwrap();

    // 跳过等待直接销毁
    storage.destroy();
    assert!(device.validation_errors().iter().any(|e| e.contains("destroyed while in use")));

    device.complete_pending();
    pipeline.destroy();
    processor.destroy();
}

#[test]
fn test_render_requires_signalled_acquire() {
    let device = Rc::new(HeadlessBackend::new().with_surface(UVec2::new(4, 4), 3, ImageFormat::Bgra32));
    device.set_acquire_fence_delay(true);
    let mut renderer = Renderer::new(device.clone(), &GfxConfig::headless(), window_info(Vec4::X + Vec4::W)).unwrap();
    assert!(renderer.is_window_output());
    assert_eq!(renderer.recorded_commands().len(), 3);

    assert!(matches!(renderer.render(), Err(GfxError::NoAcquiredImage(_))));

    let acquire = AcquireInfo {
        signal_fence: true,
        ..Default::default()
    };
    let outcome = renderer.acquire_output_image(acquire).unwrap();
    assert_eq!(
        outcome,
        AcquireOutcome::Acquired {
            image_index: 0,
            suboptimal: false
        }
    );
    assert!(matches!(renderer.render(), Err(GfxError::NoAcquiredImage(_))));
    assert_eq!(renderer.state(), RendererState::Ready);

    device.complete_pending();
    assert_eq!(renderer.render().unwrap(), RenderWorkSubmitResult::Success);
    assert_eq!(device.stats().presents, 1);
    // Bgra：红色写在第三个字节
    assert_all_pixels(&device.read_surface_pixels(0).unwrap(), &[0, 0, 255, 255]);

    // 提交之后需要重新 acquire
    assert!(matches!(renderer.render(), Err(GfxError::NoAcquiredImage(_))));
}

#[test]
fn test_surface_resize() {
    let device = Rc::new(HeadlessBackend::new().with_surface(UVec2::new(4, 4), 2, ImageFormat::Bgra32));
    let mut renderer = Renderer::new(device.clone(), &GfxConfig::headless(), window_info(Vec4::ONE)).unwrap();

    renderer.acquire_output_image(AcquireInfo::default()).unwrap();
    renderer.render().unwrap();

    device.resize_surface(UVec2::new(8, 8));
    assert_eq!(renderer.acquire_output_image(AcquireInfo::default()).unwrap(), AcquireOutcome::OutOfDate);

    let generation = renderer.record_generation();
    renderer.handle_surface_resized().unwrap();
    assert_eq!(renderer.output_dimensions(), Some(UVec2::new(8, 8)));
    assert_eq!(renderer.record_generation(), generation + 1);

    renderer.acquire_output_image(AcquireInfo::default()).unwrap();
    device.set_present_result(RenderWorkSubmitResult::FailOutOfDate);
    assert_eq!(renderer.render().unwrap(), RenderWorkSubmitResult::FailOutOfDate);
    assert_eq!(renderer.state(), RendererState::Ready);
    assert_eq!(device.read_surface_pixels(0).unwrap().len(), 8 * 8 * 4);

    renderer.destroy();
    assert!(device.validation_errors().is_empty());
    assert_eq!(device.live_object_count(), 0);
}

#[test]
fn test_compute_fill_constant() {
    let device = Rc::new(HeadlessBackend::new());
    let groups = Rc::new(Cell::new(UVec3::ZERO));
    let seen = groups.clone();
    device.register_kernel(FILL_KERNEL, move |invocation| {
        seen.set(invocation.groups);
        for buffer in invocation.buffers.iter_mut() {
            buffer.fill(7);
        }
    });

    let mut info = compute_info();
    let buffer = info.add_resource(BufferResource::from_uninitialised(256, ResourceAccess::DynamicFixed));
    info.set_compute_kernel(UVec3::new(1, 1, 1))
        .set_options(RendererOptions::RENDER_WAIT);
    let mut renderer = Renderer::new(device.clone(), &GfxConfig::headless(), info).unwrap();
    assert!(renderer.render_state().unwrap().is_compute());
    assert!(renderer.output_dimensions().is_none());

    renderer.render().unwrap();
    assert_eq!(renderer.get_component(buffer).unwrap().data().unwrap(), &[7u8; 256]);
    assert_eq!(groups.get(), UVec3::new(1, 1, 1));
    assert_eq!(device.stats().dispatches, 1);

    renderer.edit(&RendererEditBuilder::new().compute(UVec3::new(2, 2, 1)).build()).unwrap();
    renderer.render().unwrap();
    assert_eq!(groups.get(), UVec3::new(2, 2, 1));
}

#[test]
fn test_indexed_draw_clears_output() {
    let device = Rc::new(HeadlessBackend::new().with_row_alignment(256));
    let colour = Vec4::new(1.0, 0.0, 0.5, 1.0);
    let (info, output) = offscreen_info(UVec2::new(4, 4), colour);
    let mut renderer = Renderer::new(device.clone(), &GfxConfig::headless(), info).unwrap();
    assert_eq!(renderer.output_dimensions(), Some(UVec2::new(4, 4)));

    renderer.render().unwrap();
    let pixels = output_pixels(&device, &renderer, output);
    assert_eq!(pixels.len(), 4 * 4 * 4);
    assert_all_pixels(&pixels, &[255, 0, 128, 255]);

    let stats = device.stats();
    assert_eq!(stats.draws, 1);
    assert_eq!(stats.vertices, 6);
    assert_eq!(stats.clears, 1);
}

#[test]
fn test_clear_colour_edit_rerecords() {
    let device = Rc::new(HeadlessBackend::new());
    let (info, output) = offscreen_info(UVec2::new(4, 4), Vec4::ONE);
    let mut renderer = Renderer::new(device.clone(), &GfxConfig::headless(), info).unwrap();
    let generation = renderer.record_generation();

    let colour = Vec4::new(0.0, 1.0, 0.0, 1.0);
    renderer.edit(&RendererEditBuilder::new().clear_colour(colour).build()).unwrap();
    assert_eq!(renderer.record_generation(), generation + 1);
    assert!(renderer.recorded_commands()[0].iter().any(|command| matches!(
        command,
        Command::BeginRenderPass { clear_colour: Some(c), .. } if *c == colour
    )));

    renderer.render().unwrap();
    assert_all_pixels(&output_pixels(&device, &renderer, output), &[0, 255, 0, 255]);
}

#[test]
fn test_output_resize_rebuilds_targets() {
    let device = Rc::new(HeadlessBackend::new());
    let (info, output) = offscreen_info(UVec2::new(4, 4), Vec4::ONE);
    let mut renderer = Renderer::new(device.clone(), &GfxConfig::headless(), info).unwrap();
    renderer.render().unwrap();

    renderer
        .edit(&RendererEditBuilder::new().image_resize(output, UVec2::new(8, 2)).build())
        .unwrap();
    assert_eq!(renderer.output_dimensions(), Some(UVec2::new(8, 2)));

    renderer.render().unwrap();
    let pixels = output_pixels(&device, &renderer, output);
    assert_eq!(pixels.len(), 8 * 2 * 4);
    assert_all_pixels(&pixels, &[255, 255, 255, 255]);

    let request = RendererEditBuilder::new().image_resize(output, UVec2::new(0, 2)).build();
    assert!(matches!(renderer.edit(&request), Err(GfxError::EditRejected(_))));
    assert_eq!(renderer.output_dimensions(), Some(UVec2::new(8, 2)));
}

#[test]
fn test_context_window_exclusivity() {
    let device = HeadlessBackend::new().with_surface(UVec2::new(4, 4), 2, ImageFormat::Bgra32);
    assert!(GfxContext::new(HeadlessBackend::new(), GfxConfig::default()).is_err());

    let mut context = GfxContext::new(device, GfxConfig::headless()).unwrap();
    let first = context.create_renderer(window_info(Vec4::ONE)).unwrap();
    assert_eq!(context.presenting_renderer(), Some(first));

    let second = context.create_renderer(window_info(Vec4::ONE));
    assert!(matches!(second, Err(GfxError::ConstructionFailure { .. })));

    let (info, _) = offscreen_info(UVec2::new(2, 2), Vec4::ONE);
    let offscreen = context.create_renderer(info).unwrap();
    assert_eq!(context.renderer_count(), 2);
    assert!(!context.get_renderer(offscreen).unwrap().is_window_output());

    context.destroy_renderer(first).unwrap();
    assert_eq!(context.presenting_renderer(), None);
    assert!(matches!(context.get_renderer(first), Err(GfxError::InvalidHandle(_))));

    let replacement = context.create_renderer(window_info(Vec4::ONE)).unwrap();
    assert_eq!(context.presenting_renderer(), Some(replacement));
    context.get_renderer_mut(replacement).unwrap().acquire_output_image(AcquireInfo::default()).unwrap();
    context.get_renderer_mut(replacement).unwrap().render().unwrap();
}

#[test]
fn test_destroyed_renderer_rejects_calls() {
    let device = Rc::new(HeadlessBackend::new());
    let mut info = compute_info();
    let buffer = info.add_resource(BufferResource::from_uninitialised(4, ResourceAccess::DynamicFixed));
    let mut renderer = Renderer::new(device.clone(), &GfxConfig::headless(), info).unwrap();

    renderer.destroy_mut();
    assert_eq!(renderer.state(), RendererState::Destroyed);
    assert!(matches!(renderer.render(), Err(GfxError::RendererDestroyed(_))));
    assert!(matches!(renderer.get_component(buffer), Err(GfxError::InvalidHandle(_))));
    assert!(renderer.recorded_commands().is_empty());
    assert_eq!(device.live_object_count(), 0);
}

#[test]
fn test_buffer_resize_limits() {
    let device = Rc::new(HeadlessBackend::new());
    let mut info = compute_info();
    let fixed = info.add_resource(BufferResource::from_uninitialised(8, ResourceAccess::DynamicFixed));
    let variable = info.add_resource(BufferResource::from_bytes(ResourceAccess::DynamicVariable, vec![1, 2, 3, 4]));
    let mut renderer = Renderer::new(device.clone(), &GfxConfig::headless(), info).unwrap();
    let generation = renderer.record_generation();

    let request = RendererEditBuilder::new().buffer_resize(fixed, 16).build();
    assert!(matches!(renderer.edit(&request), Err(GfxError::EditRejected(_))));
    assert_eq!(renderer.get_component(fixed).unwrap().size(), 8);

    // 零长度的 buffer 没有对应的后端对象
    let request = RendererEditBuilder::new().buffer_resize(variable, 0).build();
    assert!(matches!(renderer.edit(&request), Err(GfxError::EditRejected(_))));
    let component = renderer.get_component(variable).unwrap();
    assert_eq!(component.size(), 4);
    assert_eq!(component.resource().data(), &[1, 2, 3, 4]);

    assert_eq!(renderer.pending_release_count(), 0);
    assert_eq!(renderer.record_generation(), generation);
}

#[test]
fn test_host_visible_image_respects_row_alignment() {
    let device = Rc::new(HeadlessBackend::new().with_row_alignment(256));
    let (mut info, output) = offscreen_info(UVec2::new(4, 4), Vec4::ONE);
    let pixels: Vec<u8> = (0..3 * 2 * 4).collect();
    let texture = info.add_resource(ImageResource::from_memory(
        pixels.clone(),
        ImageFormat::Rgba32,
        UVec2::new(3, 2),
        ResourceAccess::DynamicFixed,
    ));
    let mut renderer = Renderer::new(device.clone(), &GfxConfig::headless(), info).unwrap();

    {
        let component = renderer.get_component(texture).unwrap();
        assert!(!component.is_dirty());
        assert_eq!(component.image().unwrap().row_pitch(), Some(256));
        assert_eq!(device.read_pixels(component.image().unwrap()), pixels);
    }

    // 第二行整体改写，下一次 render 之前按照行对齐写入映射内存
    renderer.edit(&RendererEditBuilder::new().write(texture, 12, vec![0xFF; 12]).build()).unwrap();
    assert!(renderer.get_component(texture).unwrap().is_dirty());
    renderer.render().unwrap();

    let component = renderer.get_component(texture).unwrap();
    assert!(!component.is_dirty());
    let written = device.read_pixels(component.image().unwrap());
    assert_eq!(&written[..12], &pixels[..12]);
    assert_eq!(&written[12..], &[0xFF; 12]);
    assert_eq!(&component.data().unwrap()[12..], &[0xFF; 12]);

    // output 的内容只在 GPU 上
    let output = renderer.get_component(output).unwrap();
    assert!(matches!(output.data(), Err(GfxError::NotHostVisible(_))));
    assert_all_pixels(&device.read_pixels(output.image().unwrap()), &[255, 255, 255, 255]);
    assert!(device.validation_errors().is_empty());
}

#[test]
fn test_sampled_image_resize_rewrites_image_descriptors() {
    let device = Rc::new(HeadlessBackend::new());
    let (mut info, _) = offscreen_info(UVec2::new(4, 4), Vec4::ONE);
    let texture = info.add_resource(ImageResource::from_uninitialised(
        ImageFormat::Rgba32,
        UVec2::new(2, 2),
        ResourceAccess::DynamicVariable,
    ));
    let mut renderer = Renderer::new(device.clone(), &GfxConfig::headless(), info).unwrap();
    let old = renderer.get_component(texture).unwrap().image().unwrap().id();
    assert_eq!(renderer.bindings().unwrap().bound_images(0)[0].0, old);
    let generation = renderer.record_generation();

    renderer
        .edit(&RendererEditBuilder::new().image_resize(texture, UVec2::new(8, 8)).build())
        .unwrap();

    let component = renderer.get_component(texture).unwrap();
    assert_eq!(component.dimensions(), Some(UVec2::new(8, 8)));
    assert!(component.is_dirty());
    let new = component.image().unwrap().id();
    assert_ne!(new, old);
    let bindings = renderer.bindings().unwrap();
    for set in 0..bindings.set_count() {
        assert_eq!(bindings.bound_images(set).len(), 1);
        assert_eq!(bindings.bound_images(set)[0].0, new);
    }

    // 只有 output 的变化需要重新录制
    assert_eq!(renderer.record_generation(), generation);
    assert_eq!(renderer.output_dimensions(), Some(UVec2::new(4, 4)));
    renderer.render().unwrap();
    assert!(!device.is_live(old));
    assert!(device.validation_errors().is_empty());
}

#[test]
fn test_wireframe_edit_recreates_pipeline() {
    let device = Rc::new(HeadlessBackend::new());
    let (mut info, _) = offscreen_info(UVec2::new(4, 4), Vec4::ONE);
    let params = info.add_resource(BufferResource::from_uninitialised(4, ResourceAccess::DynamicFixed));
    let mut renderer = Renderer::new(device.clone(), &GfxConfig::headless(), info).unwrap();
    assert!(!renderer.is_wireframe());
    let generation = renderer.record_generation();

    renderer.edit(&RendererEditBuilder::new().render_state(true).build()).unwrap();
    assert!(renderer.is_wireframe());
    assert_eq!(renderer.record_generation(), generation + 1);
    assert_eq!(renderer.pending_release_count(), 1);

    // 没有变化时不重新录制
    renderer.edit(&RendererEditBuilder::new().render_state(true).build()).unwrap();
    assert_eq!(renderer.record_generation(), generation + 1);

    // 新 pipeline 创建失败：同一个请求中的写入也不生效
    device.set_pipeline_failure(true);
    let live = device.live_object_count();
    let request = RendererEditBuilder::new()
        .write(params, 0, vec![1u8, 2, 3, 4])
        .render_state(false)
        .build();
    assert!(matches!(renderer.edit(&request), Err(GfxError::EditRejected(_))));
    assert_eq!(renderer.state(), RendererState::Ready);
    assert!(renderer.is_wireframe());
    assert_eq!(renderer.record_generation(), generation + 1);
    assert_eq!(renderer.get_component(params).unwrap().data().unwrap(), &[0u8; 4]);
    assert_eq!(device.live_object_count(), live);

    device.set_pipeline_failure(false);
    renderer.edit(&request).unwrap();
    assert!(!renderer.is_wireframe());
    assert_eq!(renderer.get_component(params).unwrap().data().unwrap(), &[1, 2, 3, 4]);
    renderer.render().unwrap();
    assert!(device.validation_errors().is_empty());
}

#[test]
fn test_referenced_buffer_shares_memory() {
    let mut context = GfxContext::new(HeadlessBackend::new(), GfxConfig::headless()).unwrap();
    context.device().register_kernel(FILL_KERNEL, |invocation| {
        for buffer in invocation.buffers.iter_mut() {
            buffer.fill(7);
        }
    });
    context.device().register_kernel(ADD_ONE_KERNEL, |invocation| {
        for byte in invocation.buffers.iter_mut().flat_map(|buffer| buffer.iter_mut()) {
            *byte += 1;
        }
    });

    let mut info = compute_info();
    let shared = info.add_resource(BufferResource::from_uninitialised(16, ResourceAccess::DynamicVariable));
    let owner = context.create_renderer(info).unwrap();

    let mut info = RendererInfo::new();
    info.shader().set_shader(ShaderStage::Compute, ADD_ONE_KERNEL);
    let borrowed = info.ref_resource(ResourceReference::new(owner, shared));
    let borrower = context.create_renderer(info).unwrap();
    assert!(context.get_renderer(owner).unwrap().is_lent(shared));
    assert_eq!(
        context.get_renderer(borrower).unwrap().get_component(borrowed).unwrap().reference(),
        Some(ResourceReference::new(owner, shared))
    );

    context.get_renderer_mut(owner).unwrap().render().unwrap();
    let data = |context: &GfxContext<HeadlessBackend>, renderer, handle| {
        context.get_renderer(renderer).unwrap().get_component(handle).unwrap().data().unwrap().to_vec()
    };
    assert_eq!(data(&context, borrower, borrowed), vec![7u8; 16]);
    context.get_renderer_mut(borrower).unwrap().render().unwrap();
    assert_eq!(data(&context, owner, shared), vec![8u8; 16]);

    // 借用者可以写入，但不能改变大小
    let request = RendererEditBuilder::new().write(borrowed, 0, vec![1u8]).build();
    context.edit_renderer(borrower, &request).unwrap();
    assert_eq!(data(&context, owner, shared)[0], 1);
    let request = RendererEditBuilder::new().buffer_resize(borrowed, 32).build();
    assert!(matches!(context.edit_renderer(borrower, &request), Err(GfxError::EditRejected(_))));

    // 借出期间所有者不能改变大小，也不能销毁
    let request = RendererEditBuilder::new().buffer_resize(shared, 32).build();
    assert!(matches!(context.get_renderer_mut(owner).unwrap().edit(&request), Err(GfxError::EditRejected(_))));
    assert!(matches!(context.destroy_renderer(owner), Err(GfxError::ResourceInUse(_))));
    assert_eq!(context.renderer_count(), 2);

    context.destroy_renderer(borrower).unwrap();
    assert!(!context.get_renderer(owner).unwrap().is_lent(shared));
    assert_eq!(data(&context, owner, shared)[1], 8);

    // 引用不存在的 Renderer
    let mut info = compute_info();
    info.ref_resource(ResourceReference::new(borrower, borrowed));
    assert!(matches!(context.create_renderer(info), Err(GfxError::ConstructionFailure { .. })));

    context.destroy_renderer(owner).unwrap();
    assert!(context.device().validation_errors().is_empty());
    assert_eq!(context.device().live_object_count(), 0);
}

#[test]
fn test_reference_edit_reseats_image() {
    let mut context = GfxContext::new(HeadlessBackend::new(), GfxConfig::headless()).unwrap();
    let (info, output) = offscreen_info(UVec2::new(4, 4), Vec4::new(0.0, 1.0, 0.0, 1.0));
    let producer = context.create_renderer(info).unwrap();
    context.get_renderer_mut(producer).unwrap().render().unwrap();

    let (mut info, _) = offscreen_info(UVec2::new(2, 2), Vec4::ONE);
    let texture = info.add_resource(ImageResource::from_uninitialised(
        ImageFormat::Rgba32,
        UVec2::new(4, 4),
        ResourceAccess::DynamicFixed,
    ));
    let consumer = context.create_renderer(info).unwrap();

    let source = ResourceReference::new(producer, output);
    let request = RendererEditBuilder::new().reference(texture, source).build();
    // 引用只能通过 GfxContext 解析
    let direct = context.get_renderer_mut(consumer).unwrap().edit(&request);
    assert!(matches!(direct, Err(GfxError::EditRejected(_))));
    let own_image = context.get_renderer(consumer).unwrap().get_component(texture).unwrap().image().unwrap().id();

    context.edit_renderer(consumer, &request).unwrap();
    let shared = context.get_renderer(producer).unwrap().get_component(output).unwrap().image().unwrap().id();
    {
        let renderer = context.get_renderer(consumer).unwrap();
        let component = renderer.get_component(texture).unwrap();
        assert_eq!(component.reference(), Some(source));
        assert!(component.image().unwrap().is_alias());
        assert_eq!(component.image().unwrap().id(), shared);
        assert!(matches!(component.data(), Err(GfxError::NotHostVisible(_))));
        assert_all_pixels(&context.device().read_pixels(component.image().unwrap()), &[0, 255, 0, 255]);

        let bindings = renderer.bindings().unwrap();
        for set in 0..bindings.set_count() {
            assert_eq!(bindings.bound_images(set)[0].0, shared);
        }
        // 自己原来的 image 与 sampler 延迟销毁
        assert_eq!(renderer.pending_release_count(), 2);
    }
    assert!(context.get_renderer(producer).unwrap().is_lent(output));

    let resize = RendererEditBuilder::new().image_resize(output, UVec2::new(8, 8)).build();
    assert!(matches!(context.edit_renderer(producer, &resize), Err(GfxError::EditRejected(_))));
    let write = RendererEditBuilder::new().write(texture, 0, vec![0u8; 4]).build();
    assert!(matches!(context.edit_renderer(consumer, &write), Err(GfxError::EditRejected(_))));
    // index buffer 不能放进 image 的位置
    let mismatched = RendererEditBuilder::new()
        .reference(texture, ResourceReference::new(producer, ResourceHandle::from_index(0)))
        .build();
    assert!(matches!(context.edit_renderer(consumer, &mismatched), Err(GfxError::EditRejected(_))));
    let own = RendererEditBuilder::new().reference(texture, ResourceReference::new(consumer, output)).build();
    assert!(matches!(context.edit_renderer(consumer, &own), Err(GfxError::EditRejected(_))));

    context.get_renderer_mut(consumer).unwrap().render().unwrap();
    assert!(!context.device().is_live(own_image));

    context.destroy_renderer(consumer).unwrap();
    assert!(context.device().is_live(shared));
    context.destroy_renderer(producer).unwrap();
    assert!(context.device().validation_errors().is_empty());
    assert_eq!(context.device().live_object_count(), 0);
}
