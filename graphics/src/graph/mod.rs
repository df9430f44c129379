//! Rendergraph: the set of live renderpasses and their execution order.
//!
//! Passes are declared from [`RenderPassCreateInfo`] descriptions. Adding a
//! pass resolves its attachments against the texture table, checks that all
//! attachments agree on one framebuffer size and creates the backend
//! renderpass and framebuffer. Nothing is registered when any of this fails.
//!
//! The execution order is derived from the texture names passes read and
//! write:
//!
//! ```ignore
//! graph.add_renderpass(&mut device, gbuffer, &textures, false, Box::new(MaterialDrawExecutor))?;
//! graph.add_renderpass(&mut device, lighting, &textures, false, Box::new(MaterialDrawExecutor))?;
//!
//! // lighting reads what gbuffer writes
//! let order = graph.calculate_renderpass_execution_order()?;
//! assert_eq!(graph.names_in(&order), ["gbuffer", "lighting"]);
//! ```
//!
//! A pass reading texture `T` depends on the passes declared before it that
//! write `T`. When no earlier pass writes `T`, it depends on every writer of
//! `T` instead. Independent passes keep their declaration order, and a cycle
//! is reported as [`GraphicsError::CyclicDependency`].
//!
//! Builtin passes rank after every renderpack pass, whatever order they were
//! added in. A builtin UI pass writing the backbuffer therefore draws on top
//! of the renderpack's own final pass.

mod renderpass;
mod state;

pub use renderpass::{MaterialDrawExecutor, Renderpass, RenderpassExecutor, RenderpassMetadata};
pub use state::{ResourceStateTracker, RENDERPASS_STAGES};

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use slotmap::SlotMap;

use crate::backend::RenderDevice;
use crate::error::GraphicsError;
use crate::renderpack::{RenderPassCreateInfo, TextureAttachmentInfo};
use crate::resources::{TextureTable, BACKBUFFER_NAME};
use crate::types::{Extent2d, ImageHandle};
use lumen_core::profiling::profile_scope;

/// Name of the builtin UI renderpass.
pub const UI_RENDERPASS_NAME: &str = "UI";

slotmap::new_key_type! {
    /// Generation-checked handle of a renderpass in a [`Rendergraph`].
    pub struct RenderpassKey;
}

/// Owner of every live renderpass.
#[derive(Default)]
pub struct Rendergraph {
    passes: SlotMap<RenderpassKey, Renderpass>,
    by_name: HashMap<String, RenderpassKey>,
    declaration_order: Vec<RenderpassKey>,
    execution_order: Option<Vec<RenderpassKey>>,
}

static_assertions::assert_impl_all!(Rendergraph: Send, Sync);

impl Rendergraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve, validate and create a renderpass.
    ///
    /// Inputs and outputs must name textures of `textures`, except the
    /// backbuffer which must be the only output of its pass. All attachments
    /// must have the same size. On any failure nothing is registered and no
    /// backend object is left alive.
    pub fn add_renderpass<D: RenderDevice>(
        &mut self,
        device: &mut D,
        data: RenderPassCreateInfo,
        textures: &TextureTable,
        is_builtin: bool,
        executor: Box<dyn RenderpassExecutor>,
    ) -> Result<RenderpassKey, GraphicsError> {
        if self.by_name.contains_key(&data.name) {
            return Err(GraphicsError::DuplicateName(data.name.clone()));
        }

        let invalid = |reason: &str| GraphicsError::InvalidRenderpass {
            renderpass: data.name.clone(),
            reason: reason.to_string(),
        };

        let writes_to_backbuffer = data.writes_to_backbuffer();
        if writes_to_backbuffer {
            if data.texture_outputs.len() > 1 || data.depth_texture.is_some() {
                return Err(invalid(
                    "the backbuffer cannot be combined with other attachments",
                ));
            }
            if !is_builtin {
                if let Some(other) = self
                    .passes
                    .values()
                    .find(|pass| !pass.is_builtin && pass.writes_to_backbuffer)
                {
                    return Err(invalid(&format!(
                        "renderpass '{}' already writes to the backbuffer",
                        other.name()
                    )));
                }
            }
        }
        if data
            .depth_texture
            .as_ref()
            .is_some_and(|depth| depth.name == BACKBUFFER_NAME)
        {
            return Err(invalid("the backbuffer cannot be a depth attachment"));
        }

        let mut input_images = Vec::with_capacity(data.texture_inputs.len());
        for input in &data.texture_inputs {
            let texture = textures
                .get_by_name(input)
                .ok_or_else(|| GraphicsError::UnknownTexture {
                    renderpass: data.name.clone(),
                    texture: input.clone(),
                })?;
            input_images.push(texture.image);
        }

        let mut framebuffer_size: Option<Extent2d> = None;
        let mut resolve_attachment =
            |attachment: &TextureAttachmentInfo| -> Result<ImageHandle, GraphicsError> {
                let texture = textures.get_by_name(&attachment.name).ok_or_else(|| {
                    GraphicsError::UnknownTexture {
                        renderpass: data.name.clone(),
                        texture: attachment.name.clone(),
                    }
                })?;
                if texture.info.format.pixel_format != attachment.pixel_format {
                    log::warn!(
                        "Renderpass '{}' declares '{}' as {:?}, but the texture is {:?}",
                        data.name,
                        attachment.name,
                        attachment.pixel_format,
                        texture.info.format.pixel_format
                    );
                }
                match framebuffer_size {
                    None => framebuffer_size = Some(texture.size),
                    Some(expected) if expected != texture.size => {
                        return Err(GraphicsError::AttachmentSizeMismatch {
                            renderpass: data.name.clone(),
                            attachment: attachment.name.clone(),
                            expected,
                            actual: texture.size,
                        });
                    }
                    Some(_) => {}
                }
                Ok(texture.image)
            };

        let mut color_images = Vec::new();
        let mut depth_image = None;
        if !writes_to_backbuffer {
            for output in &data.texture_outputs {
                color_images.push(resolve_attachment(output)?);
            }
            if let Some(depth) = &data.depth_texture {
                depth_image = Some(resolve_attachment(depth)?);
            }
        }

        let size = framebuffer_size.unwrap_or_else(|| device.swapchain_size());

        let handle = device.create_renderpass(&data, size)?;
        let framebuffer = if writes_to_backbuffer {
            None
        } else {
            match device.create_framebuffer(handle, &color_images, depth_image, size) {
                Ok(framebuffer) => Some(framebuffer),
                Err(err) => {
                    device.destroy_renderpass(handle);
                    return Err(err);
                }
            }
        };

        log::debug!(
            "Added renderpass '{}' ({size}{})",
            data.name,
            if writes_to_backbuffer {
                ", backbuffer"
            } else {
                ""
            }
        );

        let name = data.name.clone();
        let key = self.passes.insert(Renderpass {
            id: self.declaration_order.len() as u32,
            metadata: RenderpassMetadata { data },
            handle,
            framebuffer,
            framebuffer_size: size,
            input_images,
            color_images,
            depth_image,
            writes_to_backbuffer,
            is_builtin,
            pipelines: Vec::new(),
            executor,
        });
        self.by_name.insert(name, key);
        self.declaration_order.push(key);
        self.execution_order = None;
        Ok(key)
    }

    /// Compute and cache the order passes run in.
    pub fn calculate_renderpass_execution_order(
        &mut self,
    ) -> Result<Vec<RenderpassKey>, GraphicsError> {
        profile_scope!("calculate_renderpass_execution_order");

        if let Some(order) = &self.execution_order {
            return Ok(order.clone());
        }

        // builtin passes rank after every renderpack pass
        let (mut ranked, builtins): (Vec<RenderpassKey>, Vec<RenderpassKey>) = self
            .declaration_order
            .iter()
            .copied()
            .filter(|key| self.passes.contains_key(*key))
            .partition(|key| !self.passes[*key].is_builtin);
        ranked.extend(builtins);

        let passes: Vec<&Renderpass> = ranked.iter().map(|key| &self.passes[*key]).collect();
        let order = execution_order(&passes)?
            .into_iter()
            .map(|index| ranked[index])
            .collect::<Vec<_>>();

        log::debug!(
            "Renderpass execution order: [{}]",
            self.names_in(&order).join(", ")
        );
        self.execution_order = Some(order.clone());
        Ok(order)
    }

    /// The cached execution order, if it is up to date.
    pub fn execution_order(&self) -> Option<&[RenderpassKey]> {
        self.execution_order.as_deref()
    }

    /// Destroy one renderpass with its pipelines. Builtin passes are kept.
    ///
    /// Returns true if the pass was destroyed.
    pub fn destroy_renderpass<D: RenderDevice>(&mut self, device: &mut D, name: &str) -> bool {
        let Some(&key) = self.by_name.get(name) else {
            return false;
        };
        if self.passes.get(key).is_some_and(|pass| pass.is_builtin) {
            log::warn!("Refusing to destroy builtin renderpass '{name}'");
            return false;
        }
        self.remove(device, key);
        self.redensify();
        true
    }

    /// Destroy every pass loaded from a renderpack.
    ///
    /// Builtin passes stay, but lose the pipelines a renderpack attached to them.
    pub fn destroy_non_builtin<D: RenderDevice>(&mut self, device: &mut D) {
        let doomed: Vec<RenderpassKey> = self
            .declaration_order
            .iter()
            .copied()
            .filter(|key| self.passes.get(*key).is_some_and(|pass| !pass.is_builtin))
            .collect();
        for key in doomed {
            self.remove(device, key);
        }
        for pass in self.passes.values_mut() {
            for pipeline in pass.pipelines.drain(..) {
                device.destroy_pipeline(pipeline.handle());
            }
        }
        self.redensify();
    }

    /// Destroy every pass, builtins included.
    pub fn destroy_all<D: RenderDevice>(&mut self, device: &mut D) {
        for key in std::mem::take(&mut self.declaration_order) {
            self.remove(device, key);
        }
        self.execution_order = None;
    }

    fn remove<D: RenderDevice>(&mut self, device: &mut D, key: RenderpassKey) {
        let Some(mut pass) = self.passes.remove(key) else {
            return;
        };
        for pipeline in pass.pipelines.drain(..) {
            device.destroy_pipeline(pipeline.handle());
        }
        if let Some(framebuffer) = pass.framebuffer {
            device.destroy_framebuffer(framebuffer);
        }
        device.destroy_renderpass(pass.handle);
        self.by_name.remove(pass.name());
        self.declaration_order.retain(|other| *other != key);
        self.execution_order = None;
        log::debug!("Destroyed renderpass '{}'", pass.name());
    }

    fn redensify(&mut self) {
        for (id, key) in self.declaration_order.iter().enumerate() {
            if let Some(pass) = self.passes.get_mut(*key) {
                pass.id = id as u32;
            }
        }
    }

    pub fn get(&self, key: RenderpassKey) -> Option<&Renderpass> {
        self.passes.get(key)
    }

    pub fn get_mut(&mut self, key: RenderpassKey) -> Option<&mut Renderpass> {
        self.passes.get_mut(key)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Renderpass> {
        self.by_name.get(name).and_then(|key| self.passes.get(*key))
    }

    pub fn key_of(&self, name: &str) -> Option<RenderpassKey> {
        self.by_name.get(name).copied()
    }

    /// Passes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (RenderpassKey, &Renderpass)> {
        self.declaration_order
            .iter()
            .filter_map(|key| self.passes.get(*key).map(|pass| (*key, pass)))
    }

    /// Names of the given passes, skipping stale keys.
    pub fn names_in(&self, keys: &[RenderpassKey]) -> Vec<&str> {
        keys.iter()
            .filter_map(|key| self.passes.get(*key))
            .map(Renderpass::name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

impl std::fmt::Debug for Rendergraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rendergraph")
            .field("passes", &self.names_in(&self.declaration_order))
            .field(
                "execution_order",
                &self.execution_order.as_ref().map(|order| self.names_in(order)),
            )
            .finish()
    }
}

/// Topologically sort passes given in declaration order.
///
/// Returns indices into `passes`. Kahn's algorithm with a min-heap on the
/// declaration index, so independent passes keep their declaration order.
fn execution_order(passes: &[&Renderpass]) -> Result<Vec<usize>, GraphicsError> {
    let n = passes.len();

    let mut writers: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, pass) in passes.iter().enumerate() {
        for output in pass.metadata.data.output_names() {
            writers.entry(output).or_default().push(index);
        }
    }

    // dependents[a] lists the passes that must run after a
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree = vec![0u32; n];
    for (index, pass) in passes.iter().enumerate() {
        let mut dependencies: Vec<usize> = Vec::new();
        for input in &pass.metadata.data.texture_inputs {
            let Some(texture_writers) = writers.get(input.as_str()) else {
                continue;
            };
            let earlier: Vec<usize> = texture_writers
                .iter()
                .copied()
                .filter(|&writer| writer < index)
                .collect();
            let chosen = if earlier.is_empty() {
                texture_writers.clone()
            } else {
                earlier
            };
            dependencies.extend(chosen.into_iter().filter(|&writer| writer != index));
        }
        dependencies.sort_unstable();
        dependencies.dedup();
        for dependency in dependencies {
            dependents[dependency].push(index);
            in_degree[index] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&index| in_degree[index] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(index)) = ready.pop() {
        order.push(index);
        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() != n {
        let renderpasses = (0..n)
            .filter(|&index| in_degree[index] > 0)
            .map(|index| passes[index].name().to_string())
            .collect();
        return Err(GraphicsError::CyclicDependency { renderpasses });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyDevice;
    use crate::renderpack::{TextureCreateInfo, TextureSize};
    use crate::types::TextureFormat;

    const FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

    fn setup(textures: &[(&str, u32)]) -> (DummyDevice, TextureTable) {
        let mut device = DummyDevice::new(Extent2d::new(640, 480));
        let mut table = TextureTable::new();
        for &(name, size) in textures {
            let info = TextureCreateInfo::render_target(
                name,
                FORMAT,
                TextureSize::Absolute {
                    width: size,
                    height: size,
                },
            );
            table
                .create_texture(&mut device, &info, Extent2d::new(640, 480), false)
                .unwrap();
        }
        (device, table)
    }

    fn pass(name: &str, inputs: &[&str], outputs: &[&str]) -> RenderPassCreateInfo {
        let mut info = RenderPassCreateInfo::new(name);
        for input in inputs {
            info = info.with_input(*input);
        }
        for output in outputs {
            info = info.with_output(TextureAttachmentInfo::new(*output, FORMAT));
        }
        info
    }

    fn add(
        graph: &mut Rendergraph,
        device: &mut DummyDevice,
        table: &TextureTable,
        info: RenderPassCreateInfo,
    ) -> Result<RenderpassKey, GraphicsError> {
        graph.add_renderpass(device, info, table, false, Box::new(MaterialDrawExecutor))
    }

    fn order_names(graph: &mut Rendergraph) -> Vec<String> {
        let order = graph.calculate_renderpass_execution_order().unwrap();
        graph
            .names_in(&order)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_reader_runs_after_writer() {
        let (mut device, table) = setup(&[("depthBuffer", 256), ("color", 256)]);
        let mut graph = Rendergraph::new();
        add(&mut graph, &mut device, &table, pass("B", &["depthBuffer"], &["color"])).unwrap();
        add(&mut graph, &mut device, &table, pass("A", &[], &["depthBuffer"])).unwrap();

        assert_eq!(order_names(&mut graph), ["A", "B"]);
    }

    #[test]
    fn test_independent_passes_keep_declaration_order() {
        let (mut device, table) = setup(&[("a", 64), ("b", 64), ("c", 64)]);
        let mut graph = Rendergraph::new();
        for (name, output) in [("Z", "a"), ("Y", "b"), ("X", "c")] {
            add(&mut graph, &mut device, &table, pass(name, &[], &[output])).unwrap();
        }
        assert_eq!(order_names(&mut graph), ["Z", "Y", "X"]);
    }

    #[test]
    fn test_read_modify_write_chain() {
        let (mut device, table) = setup(&[("color", 64)]);
        let mut graph = Rendergraph::new();
        add(&mut graph, &mut device, &table, pass("Opaque", &[], &["color"])).unwrap();
        add(&mut graph, &mut device, &table, pass("Decals", &["color"], &["color"])).unwrap();
        add(&mut graph, &mut device, &table, pass("Fog", &["color"], &["color"])).unwrap();

        assert_eq!(order_names(&mut graph), ["Opaque", "Decals", "Fog"]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let (mut device, table) = setup(&[("a", 64), ("b", 64)]);
        let mut graph = Rendergraph::new();
        add(&mut graph, &mut device, &table, pass("A", &["b"], &["a"])).unwrap();
        add(&mut graph, &mut device, &table, pass("B", &["a"], &["b"])).unwrap();

        let err = graph.calculate_renderpass_execution_order().unwrap_err();
        assert_eq!(
            err,
            GraphicsError::CyclicDependency {
                renderpasses: vec!["A".to_string(), "B".to_string()]
            }
        );
        assert!(graph.execution_order().is_none());
    }

    #[test]
    fn test_size_mismatch_registers_nothing() {
        let (mut device, table) = setup(&[("small", 256), ("large", 512)]);
        let mut graph = Rendergraph::new();
        let err = add(
            &mut graph,
            &mut device,
            &table,
            pass("Mismatch", &[], &["small", "large"]),
        )
        .unwrap_err();

        assert_eq!(
            err,
            GraphicsError::AttachmentSizeMismatch {
                renderpass: "Mismatch".to_string(),
                attachment: "large".to_string(),
                expected: Extent2d::new(256, 256),
                actual: Extent2d::new(512, 512),
            }
        );
        assert!(graph.is_empty());
        assert_eq!(device.live_renderpass_count(), 0);
    }

    #[test]
    fn test_unknown_texture() {
        let (mut device, table) = setup(&[]);
        let mut graph = Rendergraph::new();
        let err = add(&mut graph, &mut device, &table, pass("P", &["missing"], &[])).unwrap_err();
        assert!(matches!(err, GraphicsError::UnknownTexture { .. }));
    }

    #[test]
    fn test_backbuffer_pass_has_no_framebuffer() {
        let (mut device, table) = setup(&[("color", 64)]);
        let mut graph = Rendergraph::new();
        let key = add(&mut graph, &mut device, &table, pass("Final", &[], &[BACKBUFFER_NAME]))
            .unwrap();
        let pass_ref = graph.get(key).unwrap();
        assert!(pass_ref.writes_to_backbuffer());
        assert!(pass_ref.framebuffer().is_none());
        assert_eq!(pass_ref.framebuffer_size(), Extent2d::new(640, 480));

        let err = add(&mut graph, &mut device, &table, pass("Second", &[], &[BACKBUFFER_NAME]))
            .unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidRenderpass { .. }));

        let err = add(
            &mut graph,
            &mut device,
            &table,
            pass("Mixed", &[], &[BACKBUFFER_NAME, "color"]),
        )
        .unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidRenderpass { .. }));
    }

    #[test]
    fn test_backend_failure_registers_nothing() {
        let (device, table) = setup(&[("color", 64)]);
        let mut device = device.with_failing_renderpass("Broken");
        let mut graph = Rendergraph::new();
        let err = add(&mut graph, &mut device, &table, pass("Broken", &[], &["color"])).unwrap_err();
        assert!(matches!(err, GraphicsError::ResourceCreationFailed(_)));
        assert!(graph.get_by_name("Broken").is_none());
    }

    #[test]
    fn test_ids_stay_dense_after_destroy() {
        let (mut device, table) = setup(&[("a", 64), ("b", 64), ("c", 64)]);
        let mut graph = Rendergraph::new();
        for (name, output) in [("A", "a"), ("B", "b"), ("C", "c")] {
            add(&mut graph, &mut device, &table, pass(name, &[], &[output])).unwrap();
        }
        assert!(graph.destroy_renderpass(&mut device, "B"));
        assert!(!graph.destroy_renderpass(&mut device, "B"));

        let ids: Vec<(String, u32)> = graph
            .iter()
            .map(|(_, pass)| (pass.name().to_string(), pass.id()))
            .collect();
        assert_eq!(ids, [("A".to_string(), 0), ("C".to_string(), 1)]);
        assert_eq!(device.live_renderpass_count(), 2);
        assert_eq!(device.live_framebuffer_count(), 2);
    }

    #[test]
    fn test_builtin_passes_survive() {
        let (mut device, table) = setup(&[("a", 64)]);
        let mut graph = Rendergraph::new();
        graph
            .add_renderpass(
                &mut device,
                pass("Builtin", &[], &[BACKBUFFER_NAME]),
                &table,
                true,
                Box::new(MaterialDrawExecutor),
            )
            .unwrap();
        add(&mut graph, &mut device, &table, pass("Loaded", &[], &["a"])).unwrap();

        assert!(!graph.destroy_renderpass(&mut device, "Builtin"));
        graph.destroy_non_builtin(&mut device);
        assert_eq!(graph.len(), 1);
        assert!(graph.get_by_name("Builtin").is_some());
    }

    #[test]
    fn test_builtin_backbuffer_writer_runs_last() {
        let (mut device, table) = setup(&[("scene", 64)]);
        let mut graph = Rendergraph::new();
        graph
            .add_renderpass(
                &mut device,
                pass(UI_RENDERPASS_NAME, &[], &[BACKBUFFER_NAME]),
                &table,
                true,
                Box::new(MaterialDrawExecutor),
            )
            .unwrap();
        add(&mut graph, &mut device, &table, pass("Scene", &[], &["scene"])).unwrap();
        add(&mut graph, &mut device, &table, pass("Final", &["scene"], &[BACKBUFFER_NAME]))
            .unwrap();

        assert_eq!(order_names(&mut graph), ["Scene", "Final", UI_RENDERPASS_NAME]);
    }
}
