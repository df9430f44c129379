//! Renderer integration tests.
//!
//! These tests load renderpacks into a [`Renderer`] running on the recording
//! dummy device and check the objects, descriptor writes and command streams
//! it produces.
//!
//! # Test Categories
//!
//! - **Loading Tests**: renderpack loading, recovery from bad objects, reloads
//! - **Frame Tests**: the per-frame device protocol and recorded commands
//! - **Mesh Tests**: static uploads, procedural uploads, batching
//! - **Lifetime Tests**: shutdown releases every device object
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test renderer_tests
//! ```

mod common;

use rstest::{fixture, rstest};

use common::{
    absolute_texture, color_output, count_commands, create_renderer, create_renderer_with,
    depth_prepass_pack, globals_material, globals_pipeline, is_uniform_buffer,
    last_graphics_submission, post_process_pack, single_pass_pack, triangle,
    CONFLICTING_VERTEX_WGSL, GLOBALS_FRAGMENT_WGSL, SCREEN,
};
use lumen_graphics::backend::{DescriptorResource, DeviceCall, RecordedCommand};
use lumen_graphics::resources::{PerFrameUniforms, IDENTITY_MATRIX};
use lumen_graphics::types::{BarrierResource, QueueType, ResourceState};
use lumen_graphics::{
    DummyDevice, FullMaterialPassName, FullVertex, GraphicsError, InMemoryRenderpackLoader,
    MeshData, NullUiRenderpass, PipelineCreateInfo, RenderDevice, RenderPassCreateInfo, Renderer,
    RendererSettings, RenderpackData, ShaderSource, StaticMeshRenderableCreateInfo,
    StaticMeshRenderableUpdateData,
};

#[fixture]
fn renderer() -> Renderer<DummyDevice> {
    create_renderer()
}

#[fixture]
fn loaded_renderer() -> Renderer<DummyDevice> {
    let mut renderer = create_renderer();
    renderer
        .load_renderpack_data(single_pass_pack())
        .expect("single pass pack loads");
    renderer
}

fn execution_order_names(renderer: &Renderer<DummyDevice>) -> Vec<String> {
    let graph = renderer.rendergraph();
    let order = graph.execution_order().expect("execution order is cached");
    graph
        .names_in(order)
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn stone() -> FullMaterialPassName {
    FullMaterialPassName::new("stone", "main")
}

// ============================================================================
// Loading Tests
// ============================================================================

/// A single pass with one `Globals` pipeline binds the per-frame buffer and
/// runs alone.
#[rstest]
fn test_single_pass_binds_per_frame_data(loaded_renderer: Renderer<DummyDevice>) {
    let renderer = loaded_renderer;

    let key = renderer
        .material_pass_key(&stone())
        .expect("material pass key resolves");
    let material_pass = renderer.material_pass(key).expect("key addresses a material pass");
    assert_eq!(material_pass.descriptor_sets().len(), 1);

    let set = renderer
        .device()
        .descriptor_set(material_pass.descriptor_sets()[0])
        .expect("descriptor set exists on the device");
    let per_frame = renderer
        .builtin_buffers()
        .handle("PerFrameData")
        .expect("builtin per-frame buffer");
    assert_eq!(
        set.bindings.get(&0),
        Some(&DescriptorResource::UniformBuffer(per_frame))
    );
    assert!(set.bindings.values().all(is_uniform_buffer));

    assert_eq!(execution_order_names(&renderer), vec!["P".to_string()]);
    assert_eq!(renderer.loaded_renderpack(), Some("single"));
}

#[rstest]
fn test_writer_runs_before_reader(mut renderer: Renderer<DummyDevice>) {
    renderer.load_renderpack_data(depth_prepass_pack()).unwrap();

    assert_eq!(
        execution_order_names(&renderer),
        vec!["A".to_string(), "B".to_string()]
    );
    let b = renderer.get_renderpass_metadata("B").unwrap();
    assert_eq!(b.data.texture_inputs, vec!["depthBuffer".to_string()]);
}

/// A pass with attachments of different sizes is dropped; the rest of the pack
/// still loads.
#[rstest]
fn test_size_mismatch_drops_only_that_pass(mut renderer: Renderer<DummyDevice>) {
    let pack = RenderpackData::new("mismatch")
        .with_texture(absolute_texture("small", 256, 256))
        .with_texture(absolute_texture("large", 512, 512))
        .with_pass(
            RenderPassCreateInfo::new("broken")
                .with_output(color_output("small"))
                .with_output(color_output("large")),
        )
        .with_pass(RenderPassCreateInfo::new("fine").with_output(color_output("small")))
        .with_pipeline(globals_pipeline("on_broken", "broken"))
        .with_pipeline(globals_pipeline("on_fine", "fine"));

    renderer.load_renderpack_data(pack).unwrap();

    assert!(renderer.get_renderpass_metadata("broken").is_none());
    assert!(renderer.get_renderpass_metadata("fine").is_some());
    assert!(renderer.find_pipeline("on_broken").is_none());
    assert_eq!(renderer.pipeline_names(), vec!["on_fine"]);
    assert_eq!(renderer.device().live_renderpass_count(), 1);
}

#[rstest]
fn test_cycle_unloads_the_pack(mut renderer: Renderer<DummyDevice>) {
    let pack = RenderpackData::new("cyclic")
        .with_texture(absolute_texture("a", 64, 64))
        .with_texture(absolute_texture("b", 64, 64))
        .with_pass(
            RenderPassCreateInfo::new("X")
                .with_input("b")
                .with_output(color_output("a")),
        )
        .with_pass(
            RenderPassCreateInfo::new("Y")
                .with_input("a")
                .with_output(color_output("b")),
        );

    assert_eq!(
        renderer.load_renderpack_data(pack),
        Err(GraphicsError::CyclicDependency {
            renderpasses: vec!["X".to_string(), "Y".to_string()],
        })
    );
    assert!(renderer.rendergraph().is_empty());
    assert!(renderer.dynamic_texture_infos().is_empty());
    assert_eq!(renderer.loaded_renderpack(), None);
    assert_eq!(renderer.device().live_renderpass_count(), 0);
}

/// Backend failures are not configuration errors and abort the whole load.
#[rstest]
fn test_backend_failure_aborts_load() {
    let mut renderer = create_renderer_with(
        DummyDevice::new(SCREEN).with_failing_renderpass("A"),
        RendererSettings::small(),
    );

    let result = renderer.load_renderpack_data(depth_prepass_pack());
    assert!(matches!(result, Err(GraphicsError::ResourceCreationFailed(_))));
    assert!(renderer.rendergraph().is_empty());
    assert_eq!(renderer.device().live_framebuffer_count(), 0);
    assert_eq!(renderer.device().live_descriptor_pool_count(), 0);
    assert_eq!(renderer.loaded_renderpack(), None);
}

#[rstest]
fn test_descriptor_pool_exhaustion_aborts_load() {
    let mut renderer = create_renderer_with(
        DummyDevice::new(SCREEN).with_descriptor_set_limit(0),
        RendererSettings::small(),
    );

    assert_eq!(
        renderer.load_renderpack_data(single_pass_pack()),
        Err(GraphicsError::DescriptorPoolExhausted)
    );
    assert!(renderer.material_pass_key(&stone()).is_none());
    assert!(renderer.pipeline_names().is_empty());
}

/// A pipeline whose stages disagree about a binding is dropped together with
/// the material passes targeting it.
#[rstest]
fn test_conflicting_binding_drops_pipeline(mut renderer: Renderer<DummyDevice>) {
    let conflicting = PipelineCreateInfo::new(
        "conflicting",
        "P",
        ShaderSource::wgsl("conflicting.vert.wgsl", CONFLICTING_VERTEX_WGSL),
    )
    .with_fragment_shader(ShaderSource::wgsl(
        "conflicting.frag.wgsl",
        GLOBALS_FRAGMENT_WGSL,
    ));
    let pack = single_pass_pack()
        .with_pipeline(conflicting)
        .with_material(globals_material("broken", "main", "conflicting"));

    renderer.load_renderpack_data(pack).unwrap();

    assert!(renderer.find_pipeline("conflicting").is_none());
    assert!(renderer
        .material_pass_key(&FullMaterialPassName::new("broken", "main"))
        .is_none());
    assert!(renderer.material_pass_key(&stone()).is_some());
    assert!(renderer
        .get_material_passes_for_pipeline("conflicting")
        .is_empty());
}

/// Loading A, then B, then A again restores the textures and pipelines of the
/// first load of A.
#[rstest]
fn test_reload_round_trip(mut renderer: Renderer<DummyDevice>) {
    renderer.load_renderpack_data(post_process_pack()).unwrap();
    let textures_a: Vec<_> = renderer
        .dynamic_texture_infos()
        .into_iter()
        .cloned()
        .collect();
    let pipelines_a: Vec<String> = renderer
        .pipeline_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let kinds_a: Vec<_> = pipelines_a
        .iter()
        .map(|name| renderer.find_pipeline(name).unwrap().data().clone())
        .collect();
    let images_a = renderer.device().live_image_count();

    renderer.load_renderpack_data(single_pass_pack()).unwrap();
    assert_eq!(renderer.pipeline_names(), vec!["forward"]);

    renderer.load_renderpack_data(post_process_pack()).unwrap();
    let textures: Vec<_> = renderer
        .dynamic_texture_infos()
        .into_iter()
        .cloned()
        .collect();
    assert_eq!(textures, textures_a);
    assert_eq!(renderer.pipeline_names(), pipelines_a);
    let kinds: Vec<_> = pipelines_a
        .iter()
        .map(|name| renderer.find_pipeline(name).unwrap().data().clone())
        .collect();
    assert_eq!(kinds, kinds_a);
    assert_eq!(renderer.device().live_image_count(), images_a);
    assert_eq!(renderer.device().live_descriptor_pool_count(), 1);
}

#[rstest]
fn test_material_pass_key_expires_on_reload(mut renderer: Renderer<DummyDevice>) {
    renderer
        .create_ui_renderpass(Box::new(NullUiRenderpass))
        .unwrap();
    let hud = || {
        RenderpackData::new("hud")
            .with_pipeline(globals_pipeline("overlay", "UI"))
            .with_material(globals_material("hud", "main", "overlay"))
    };
    let name = FullMaterialPassName::new("hud", "main");

    renderer.load_renderpack_data(hud()).unwrap();
    let stale = renderer.material_pass_key(&name).unwrap();
    assert!(renderer.material_pass(stale).is_some());

    // same renderpass, pipeline and material pass positions as before
    renderer.load_renderpack_data(hud()).unwrap();
    let fresh = renderer.material_pass_key(&name).unwrap();
    assert_eq!(fresh.renderpass, stale.renderpass);
    assert_eq!(fresh.pipeline_index, stale.pipeline_index);
    assert_eq!(fresh.material_pass_index, stale.material_pass_index);

    assert!(renderer.material_pass(stale).is_none());
    assert_eq!(renderer.material_pass(fresh).unwrap().name(), &name);
}

#[rstest]
fn test_loader_loads_configured_pack() {
    let mut renderer = create_renderer_with(
        DummyDevice::new(SCREEN),
        RendererSettings::small().with_renderpack("single"),
    );
    assert!(matches!(
        renderer.load_renderpack("single"),
        Err(GraphicsError::InvalidParameter(_))
    ));

    renderer
        .set_renderpack_loader(Box::new(
            InMemoryRenderpackLoader::new()
                .with_pack(single_pass_pack())
                .with_pack(depth_prepass_pack()),
        ))
        .unwrap();
    assert_eq!(renderer.loaded_renderpack(), Some("single"));

    renderer.load_renderpack("depth").unwrap();
    assert_eq!(renderer.loaded_renderpack(), Some("depth"));
    assert!(renderer.load_renderpack("missing").is_err());
}

#[rstest]
fn test_unload_keeps_builtin_passes(mut renderer: Renderer<DummyDevice>) {
    renderer
        .create_ui_renderpass(Box::new(NullUiRenderpass))
        .unwrap();
    renderer.load_renderpack_data(single_pass_pack()).unwrap();
    assert_eq!(renderer.rendergraph().len(), 2);

    renderer.unload_renderpack().unwrap();
    assert_eq!(renderer.rendergraph().len(), 1);
    assert!(renderer.get_renderpass_metadata("UI").is_some());
    assert!(renderer.pipeline_names().is_empty());
    assert_eq!(renderer.loaded_renderpack(), None);
}

// ============================================================================
// Frame Tests
// ============================================================================

#[rstest]
fn test_frame_device_protocol(mut loaded_renderer: Renderer<DummyDevice>) {
    loaded_renderer.device_mut().clear_recording();
    loaded_renderer.execute_frame().unwrap();

    let calls = loaded_renderer.device().calls();
    assert_eq!(calls.len(), 6, "{calls:?}");
    assert_eq!(calls[0], DeviceCall::AcquireImage(0));
    let DeviceCall::ResetFences(fences) = &calls[1] else {
        panic!("expected a fence reset, got {:?}", calls[1]);
    };
    assert_eq!(
        calls[2],
        DeviceCall::Submit {
            queue: QueueType::Graphics,
            fence: Some(fences[0]),
        }
    );
    assert_eq!(calls[3], DeviceCall::WaitForFences(fences.clone()));
    assert_eq!(calls[4], DeviceCall::Present(0));
    assert_eq!(calls[5], DeviceCall::EndFrame(0));
    assert_eq!(loaded_renderer.frame_count(), 1);
}

#[rstest]
fn test_frame_writes_per_frame_uniforms(mut loaded_renderer: Renderer<DummyDevice>) {
    loaded_renderer.execute_frame().unwrap();
    loaded_renderer.execute_frame().unwrap();

    let buffer = loaded_renderer
        .builtin_buffers()
        .handle("PerFrameData")
        .unwrap();
    let contents = loaded_renderer.device().buffer_contents(buffer).unwrap();
    let expected = PerFrameUniforms {
        frame_count: 2,
        frame_index: 1,
        viewport_width: SCREEN.width,
        viewport_height: SCREEN.height,
    };
    assert_eq!(&contents[..16], bytemuck::bytes_of(&expected));
}

#[rstest]
fn test_frame_records_pass_and_present_barrier(mut loaded_renderer: Renderer<DummyDevice>) {
    loaded_renderer.execute_frame().unwrap();

    let device = loaded_renderer.device();
    let commands = &last_graphics_submission(device).commands;
    let pass = loaded_renderer.rendergraph().get_by_name("P").unwrap();

    let begin = commands
        .iter()
        .position(|command| {
            matches!(command, RecordedCommand::BeginRenderpass { renderpass, .. } if *renderpass == pass.handle())
        })
        .expect("P is recorded");
    let RecordedCommand::ResourceBarriers { barriers, .. } = &commands[begin - 1] else {
        panic!("expected barriers before P, got {:?}", commands[begin - 1]);
    };
    assert_eq!(barriers.len(), 1);
    assert_eq!(
        barriers[0].resource,
        BarrierResource::Image(pass.color_images()[0])
    );
    assert_eq!(barriers[0].new_state, ResourceState::RenderTarget);

    let RecordedCommand::ResourceBarriers { barriers, .. } = commands.last().unwrap() else {
        panic!("the frame ends with the present barrier");
    };
    assert_eq!(
        barriers[0].resource,
        BarrierResource::Image(device.swapchain_image(0))
    );
    assert_eq!(barriers[0].new_state, ResourceState::Present);
}

#[rstest]
fn test_ui_pass_renders_into_swapchain(mut renderer: Renderer<DummyDevice>) {
    renderer
        .create_ui_renderpass(Box::new(NullUiRenderpass))
        .unwrap();
    renderer.execute_frame().unwrap();

    let device = renderer.device();
    let ui = renderer.rendergraph().get_by_name("UI").unwrap();
    assert!(ui.writes_to_backbuffer());
    assert!(ui.framebuffer().is_none());

    let commands = &last_graphics_submission(device).commands;
    assert!(commands.contains(&RecordedCommand::BeginRenderpass {
        renderpass: ui.handle(),
        framebuffer: device.swapchain_framebuffer(0),
    }));
    assert_eq!(
        count_commands(commands, |command| matches!(
            command,
            RecordedCommand::DrawIndexedMesh { .. } | RecordedCommand::Draw { .. }
        )),
        0
    );
}

#[rstest]
fn test_second_backbuffer_pass_is_dropped(mut renderer: Renderer<DummyDevice>) {
    let backbuffer = || {
        lumen_graphics::TextureAttachmentInfo::new(
            "Backbuffer",
            lumen_graphics::types::TextureFormat::Bgra8Unorm,
        )
    };
    let pack = RenderpackData::new("two_finals")
        .with_pass(RenderPassCreateInfo::new("first").with_output(backbuffer()))
        .with_pass(RenderPassCreateInfo::new("second").with_output(backbuffer()));

    renderer.load_renderpack_data(pack).unwrap();
    assert!(renderer.get_renderpass_metadata("first").is_some());
    assert!(renderer.get_renderpass_metadata("second").is_none());
}

#[rstest]
fn test_ui_pass_draws_over_the_renderpack_final_pass(mut renderer: Renderer<DummyDevice>) {
    renderer
        .create_ui_renderpass(Box::new(NullUiRenderpass))
        .unwrap();
    let pack = RenderpackData::new("final").with_pass(RenderPassCreateInfo::new("Final").with_output(
        lumen_graphics::TextureAttachmentInfo::new(
            "Backbuffer",
            lumen_graphics::types::TextureFormat::Bgra8Unorm,
        ),
    ));
    renderer.load_renderpack_data(pack).unwrap();
    assert_eq!(execution_order_names(&renderer), ["Final", "UI"]);

    renderer.execute_frame().unwrap();
    let graph = renderer.rendergraph();
    let began: Vec<_> = last_graphics_submission(renderer.device())
        .commands
        .iter()
        .filter_map(|command| match command {
            RecordedCommand::BeginRenderpass { renderpass, .. } => Some(*renderpass),
            _ => None,
        })
        .collect();
    assert_eq!(
        began,
        [
            graph.get_by_name("Final").unwrap().handle(),
            graph.get_by_name("UI").unwrap().handle(),
        ]
    );
}

#[rstest]
fn test_failed_frame_leaves_fences_waitable(mut loaded_renderer: Renderer<DummyDevice>) {
    let renderer = &mut loaded_renderer;
    let per_frame = renderer
        .builtin_buffers()
        .handle("PerFrameData")
        .unwrap();
    renderer.device_mut().destroy_buffer(per_frame);

    assert!(matches!(
        renderer.execute_frame(),
        Err(GraphicsError::InvalidParameter(_))
    ));
    renderer.load_renderpack_data(single_pass_pack()).unwrap();
    assert_eq!(renderer.loaded_renderpack(), Some("single"));
}

#[rstest]
#[case::device_lost(GraphicsError::DeviceLost)]
#[case::acquire_failed(GraphicsError::SwapchainAcquireFailed("out of date".to_string()))]
fn test_fatal_errors_propagate(
    mut loaded_renderer: Renderer<DummyDevice>,
    #[case] error: GraphicsError,
) {
    loaded_renderer.device_mut().fail_next_acquire(error.clone());
    assert_eq!(loaded_renderer.execute_frame(), Err(error));
    assert!(loaded_renderer.execute_frame().unwrap_err().is_fatal());
}

#[rstest]
fn test_global_pipeline_draws_fullscreen_triangle(mut renderer: Renderer<DummyDevice>) {
    renderer.load_renderpack_data(post_process_pack()).unwrap();
    renderer.execute_frame().unwrap();

    let commands = &last_graphics_submission(renderer.device()).commands;
    assert!(commands.contains(&RecordedCommand::Draw {
        num_vertices: 3,
        num_instances: 1,
    }));

    let material = renderer.get_material_passes_for_pipeline("blur");
    assert_eq!(material.len(), 1);
    let set = renderer
        .device()
        .descriptor_set(material[0].descriptor_sets()[0])
        .unwrap();
    assert!(matches!(
        set.bindings.get(&0),
        Some(DescriptorResource::SampledImage {
            sampler: Some(_),
            ..
        })
    ));
}

// ============================================================================
// Mesh Tests
// ============================================================================

#[rstest]
fn test_static_mesh_upload(mut renderer: Renderer<DummyDevice>) {
    let buffers_before = renderer.device().live_buffer_count();
    let mesh = renderer.create_mesh(&triangle()).unwrap();

    let upload = renderer.device().submissions().last().unwrap();
    assert_eq!(upload.queue, QueueType::Transfer);
    assert_eq!(
        count_commands(&upload.commands, |command| matches!(
            command,
            RecordedCommand::CopyBuffer { .. }
        )),
        2
    );

    let uploaded = renderer.get_mesh(mesh).unwrap();
    assert_eq!(uploaded.num_indices, 3);
    let vertex_bytes = renderer
        .device()
        .buffer(uploaded.vertex_buffer_handle())
        .unwrap()
        .descriptor
        .size;
    assert_eq!(vertex_bytes, 3 * std::mem::size_of::<FullVertex>() as u64);
    // staging buffers are gone, the device pair stays
    assert_eq!(renderer.device().live_buffer_count(), buffers_before + 2);

    assert!(renderer.destroy_mesh(mesh));
    assert!(!renderer.destroy_mesh(mesh));
    assert_eq!(renderer.device().live_buffer_count(), buffers_before);
}

#[rstest]
fn test_empty_mesh_is_rejected(mut renderer: Renderer<DummyDevice>) {
    let empty = MeshData::new(Vec::new(), vec![0, 1, 2]);
    assert!(matches!(
        renderer.create_mesh(&empty),
        Err(GraphicsError::InvalidParameter(_))
    ));
}

#[rstest]
fn test_batches_share_vertex_buffers(mut loaded_renderer: Renderer<DummyDevice>) {
    let renderer = &mut loaded_renderer;
    let first_mesh = renderer.create_mesh(&triangle()).unwrap();
    let second_mesh = renderer.create_mesh(&triangle()).unwrap();

    let a = renderer
        .add_renderable_for_material(&stone(), &StaticMeshRenderableCreateInfo::new(first_mesh))
        .unwrap();
    renderer
        .add_renderable_for_material(&stone(), &StaticMeshRenderableCreateInfo::new(first_mesh))
        .unwrap();
    renderer
        .add_renderable_for_material(&stone(), &StaticMeshRenderableCreateInfo::new(second_mesh))
        .unwrap();

    let passes = renderer.get_material_passes_for_pipeline("forward");
    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].static_mesh_draws().len(), 2);
    assert_eq!(passes[0].draw_count(), 3);

    renderer.execute_frame().unwrap();
    // (num_instances, first_instance) per draw
    let draws = |renderer: &Renderer<DummyDevice>| -> Vec<(u32, u32)> {
        last_graphics_submission(renderer.device())
            .commands
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::DrawIndexedMesh {
                    num_instances,
                    first_instance,
                    ..
                } => Some((*num_instances, *first_instance)),
                _ => None,
            })
            .collect()
    };
    assert_eq!(draws(renderer), [(2, 0), (1, 2)]);

    renderer
        .update_renderable(
            a,
            &StaticMeshRenderableUpdateData {
                transform: None,
                is_visible: Some(false),
            },
        )
        .unwrap();
    renderer.execute_frame().unwrap();
    assert_eq!(draws(renderer), [(1, 1), (1, 2)]);

    assert!(renderer.remove_renderable(a));
    assert!(!renderer.remove_renderable(a));
    assert_eq!(
        renderer.get_material_passes_for_pipeline("forward")[0].draw_count(),
        2
    );
}

#[rstest]
fn test_draws_carry_model_matrix_slots(mut loaded_renderer: Renderer<DummyDevice>) {
    let renderer = &mut loaded_renderer;
    let rock = renderer.create_mesh(&triangle()).unwrap();
    let tree = renderer.create_mesh(&triangle()).unwrap();

    let mut shifted = IDENTITY_MATRIX;
    shifted[3] = [4.0, 0.0, -2.0, 1.0];
    renderer
        .add_renderable_for_material(
            &stone(),
            &StaticMeshRenderableCreateInfo::new(tree).with_transform(IDENTITY_MATRIX),
        )
        .unwrap();
    let moved = renderer
        .add_renderable_for_material(
            &stone(),
            &StaticMeshRenderableCreateInfo::new(rock).with_transform(shifted),
        )
        .unwrap();

    renderer.execute_frame().unwrap();
    let commands = &last_graphics_submission(renderer.device()).commands;
    for first_instance in [0, 1] {
        assert!(commands.contains(&RecordedCommand::DrawIndexedMesh {
            num_indices: 3,
            num_instances: 1,
            first_instance,
        }));
    }

    let matrix_size = std::mem::size_of::<[[f32; 4]; 4]>();
    let matrix_buffer = renderer
        .builtin_buffers()
        .get("ModelMatrixBuffer")
        .unwrap()
        .handle;
    let slot = |renderer: &Renderer<DummyDevice>, index: usize| -> Vec<u8> {
        renderer.device().buffer_contents(matrix_buffer).unwrap()
            [index * matrix_size..(index + 1) * matrix_size]
            .to_vec()
    };
    assert_eq!(slot(renderer, 1), bytemuck::bytes_of(&shifted));

    renderer
        .update_renderable(
            moved,
            &StaticMeshRenderableUpdateData {
                transform: Some(IDENTITY_MATRIX),
                is_visible: None,
            },
        )
        .unwrap();
    renderer.execute_frame().unwrap();
    assert_eq!(slot(renderer, 1), bytemuck::bytes_of(&IDENTITY_MATRIX));
}

#[rstest]
fn test_renderable_errors(mut loaded_renderer: Renderer<DummyDevice>) {
    let renderer = &mut loaded_renderer;
    let mesh = renderer.create_mesh(&triangle()).unwrap();

    let unknown = FullMaterialPassName::new("stone", "shadow");
    assert_eq!(
        renderer.add_renderable_for_material(&unknown, &StaticMeshRenderableCreateInfo::new(mesh)),
        Err(GraphicsError::UnknownMaterialPass("stone.shadow".to_string()))
    );

    let id = renderer
        .add_renderable_for_material(&stone(), &StaticMeshRenderableCreateInfo::new(mesh))
        .unwrap();
    assert!(renderer.remove_renderable(id));
    assert!(matches!(
        renderer.update_renderable(id, &StaticMeshRenderableUpdateData::default()),
        Err(GraphicsError::InvalidParameter(_))
    ));
}

#[rstest]
fn test_model_matrix_capacity() {
    let mut renderer = create_renderer_with(
        DummyDevice::new(SCREEN),
        RendererSettings::small().with_model_matrix_capacity(1),
    );
    renderer.load_renderpack_data(single_pass_pack()).unwrap();
    let mesh = renderer.create_mesh(&triangle()).unwrap();
    let info = StaticMeshRenderableCreateInfo::new(mesh).with_transform(IDENTITY_MATRIX);

    let first = renderer.add_renderable_for_material(&stone(), &info).unwrap();
    assert_eq!(
        renderer.add_renderable_for_material(&stone(), &info),
        Err(GraphicsError::OutOfMemory)
    );
    renderer.remove_renderable(first);
    assert!(renderer.add_renderable_for_material(&stone(), &info).is_ok());
}

#[rstest]
fn test_procedural_mesh_uploads_once_per_slot(mut loaded_renderer: Renderer<DummyDevice>) {
    let renderer = &mut loaded_renderer;
    let (mesh, procedural) = renderer.create_procedural_mesh(1024, 256).unwrap();
    procedural
        .set_vertex_data(&[
            FullVertex::at([0.0, 0.0, 0.0]),
            FullVertex::at([1.0, 0.0, 0.0]),
            FullVertex::at([0.0, 1.0, 0.0]),
        ])
        .unwrap();
    procedural.set_index_data(&[0, 1, 2]).unwrap();
    renderer
        .add_renderable_for_material(&stone(), &StaticMeshRenderableCreateInfo::new(mesh))
        .unwrap();

    let copies = |renderer: &Renderer<DummyDevice>| {
        count_commands(
            &last_graphics_submission(renderer.device()).commands,
            |command| matches!(command, RecordedCommand::CopyBuffer { .. }),
        )
    };

    // one upload per swapchain slot, then the data is current everywhere
    for _ in 0..DummyDevice::DEFAULT_SWAPCHAIN_IMAGES {
        renderer.execute_frame().unwrap();
        assert_eq!(copies(renderer), 2);
    }
    renderer.execute_frame().unwrap();
    assert_eq!(copies(renderer), 0);

    let commands = &last_graphics_submission(renderer.device()).commands;
    assert!(commands.contains(&RecordedCommand::DrawIndexedMesh {
        num_indices: 3,
        num_instances: 1,
        first_instance: 0,
    }));

    let too_big = vec![0u32; 65];
    assert!(renderer
        .procedural_mesh_mut(mesh)
        .unwrap()
        .set_index_data(&too_big)
        .is_err());
    assert!(renderer.destroy_mesh(mesh));
}

// ============================================================================
// Lifetime Tests
// ============================================================================

#[rstest]
fn test_destroy_releases_every_object(mut loaded_renderer: Renderer<DummyDevice>) {
    loaded_renderer
        .create_ui_renderpass(Box::new(NullUiRenderpass))
        .unwrap();
    let mesh = loaded_renderer.create_mesh(&triangle()).unwrap();
    loaded_renderer.create_procedural_mesh(256, 64).unwrap();
    loaded_renderer
        .add_renderable_for_material(&stone(), &StaticMeshRenderableCreateInfo::new(mesh))
        .unwrap();
    loaded_renderer.execute_frame().unwrap();

    let device = loaded_renderer.destroy();
    assert_eq!(device.live_buffer_count(), 0);
    assert_eq!(device.live_image_count(), 0);
    assert_eq!(device.live_renderpass_count(), 0);
    assert_eq!(device.live_framebuffer_count(), 0);
    assert_eq!(device.live_pipeline_count(), 0);
    assert_eq!(device.live_descriptor_pool_count(), 0);
    assert_eq!(device.live_device_memory_count(), 0);
    assert_eq!(device.live_fence_count(), 0);
}
