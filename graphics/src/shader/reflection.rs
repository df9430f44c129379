//! Resource binding reflection.

use std::collections::BTreeMap;
use std::fmt;

use lumen_core::profiling::profile_scope;

use crate::backend::DescriptorPoolSizes;
use crate::error::GraphicsError;
use crate::renderpack::{PipelineCreateInfo, ShaderBinary, ShaderSource};

use super::{ShaderStage, ShaderStageFlags};

/// Kind of shader-visible resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    SampledImage,
    Sampler,
    UniformBuffer,
    StorageBuffer,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SampledImage => "sampled image",
            Self::Sampler => "sampler",
            Self::UniformBuffer => "uniform buffer",
            Self::StorageBuffer => "storage buffer",
        };
        f.write_str(name)
    }
}

/// How declared array dimensions are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArrayBoundPolicy {
    /// Every arrayed binding is reported as unbounded.
    ///
    /// `count` still carries the declared length (1 for runtime-sized
    /// arrays), but callers should not rely on bounded-array semantics.
    #[default]
    AssumeUnbounded,
    /// Only runtime-sized arrays are reported as unbounded.
    Precise,
}

/// Where and how one named resource is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceBindingDescription {
    /// Descriptor set index.
    pub set: u32,
    /// Binding slot within the set.
    pub binding: u32,
    pub kind: ResourceKind,
    /// Stages that access the resource.
    pub stages: ShaderStageFlags,
    /// Number of descriptors, 1 for non-arrayed bindings.
    pub count: u32,
    pub unbounded: bool,
}

impl ResourceBindingDescription {
    /// Returns true if both describe the same slot, ignoring stages.
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.set == other.set
            && self.binding == other.binding
            && self.kind == other.kind
            && self.count == other.count
    }
}

impl fmt::Display for ResourceBindingDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at set {} binding {}",
            self.kind, self.set, self.binding
        )?;
        if self.count != 1 || self.unbounded {
            write!(f, " (count {}", self.count)?;
            if self.unbounded {
                write!(f, ", unbounded")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// All resources a pipeline accesses, keyed by binding name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineResourceInterface {
    bindings: BTreeMap<String, ResourceBindingDescription>,
}

impl PipelineResourceInterface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one resource into the interface.
    ///
    /// A name already present with a different set, binding, kind or count is
    /// a [`GraphicsError::ConflictingBinding`]. An identical entry only gains
    /// the new stages.
    pub fn add_resource(
        &mut self,
        name: &str,
        description: ResourceBindingDescription,
    ) -> Result<(), GraphicsError> {
        match self.bindings.get_mut(name) {
            Some(existing) if existing.is_compatible_with(&description) => {
                existing.stages |= description.stages;
                Ok(())
            }
            Some(existing) => Err(GraphicsError::ConflictingBinding {
                name: name.to_string(),
                existing: existing.to_string(),
                incoming: description.to_string(),
            }),
            None => {
                self.bindings.insert(name.to_string(), description);
                Ok(())
            }
        }
    }

    /// Merge every binding reflected from one stage.
    pub fn merge_stage<'a>(
        &mut self,
        stage_bindings: impl IntoIterator<Item = &'a (String, ResourceBindingDescription)>,
    ) -> Result<(), GraphicsError> {
        for (name, description) in stage_bindings {
            self.add_resource(name, *description)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ResourceBindingDescription> {
        self.bindings.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResourceBindingDescription)> {
        self.bindings
            .iter()
            .map(|(name, description)| (name.as_str(), description))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Number of descriptor sets needed, the highest set index plus one.
    pub fn set_count(&self) -> u32 {
        self.bindings
            .values()
            .map(|description| description.set + 1)
            .max()
            .unwrap_or(0)
    }

    /// Bindings of one set, in name order.
    pub fn bindings_in_set(
        &self,
        set: u32,
    ) -> impl Iterator<Item = (&str, &ResourceBindingDescription)> {
        self.iter()
            .filter(move |(_, description)| description.set == set)
    }

    /// Descriptors needed for one set of descriptor sets of this interface.
    pub fn descriptor_counts(&self) -> DescriptorPoolSizes {
        let mut sizes = DescriptorPoolSizes {
            max_sets: self.set_count(),
            ..Default::default()
        };
        for description in self.bindings.values() {
            let slot = match description.kind {
                ResourceKind::SampledImage => &mut sizes.sampled_images,
                ResourceKind::Sampler => &mut sizes.samplers,
                ResourceKind::UniformBuffer => &mut sizes.uniform_buffers,
                ResourceKind::StorageBuffer => &mut sizes.storage_buffers,
            };
            *slot += description.count.max(1);
        }
        sizes
    }
}

static_assertions::assert_impl_all!(PipelineResourceInterface: Send, Sync);

/// Reflect the resource bindings declared by one shader stage.
///
/// Resources without a name or without a group/binding decoration are
/// skipped. Storage images and push constants are ignored.
pub fn reflect_shader(
    source: &ShaderSource,
    stage: ShaderStage,
    policy: ArrayBoundPolicy,
) -> Result<Vec<(String, ResourceBindingDescription)>, GraphicsError> {
    profile_scope!("reflect_shader");

    let module = parse_module(source, stage)?;
    let stages = stage.flag();
    let mut bindings = Vec::new();

    for (_, variable) in module.global_variables.iter() {
        let Some(resource_binding) = &variable.binding else {
            continue;
        };

        let ty = &module.types[variable.ty];
        let Some(name) = variable
            .name
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| ty.name.clone())
        else {
            log::warn!(
                "{}: skipping unnamed resource at group {} binding {}",
                source.filename,
                resource_binding.group,
                resource_binding.binding
            );
            continue;
        };

        let (element_ty, array) = match ty.inner {
            naga::TypeInner::BindingArray { base, size } => (base, Some(size)),
            // Plain arrays only describe descriptor arrays for opaque handles;
            // inside a buffer they are part of the buffer layout.
            naga::TypeInner::Array { base, size, .. }
                if variable.space == naga::AddressSpace::Handle =>
            {
                (base, Some(size))
            }
            _ => (variable.ty, None),
        };

        let kind = match (variable.space, &module.types[element_ty].inner) {
            (naga::AddressSpace::Uniform, _) => ResourceKind::UniformBuffer,
            (naga::AddressSpace::Storage { .. }, _) => ResourceKind::StorageBuffer,
            (
                naga::AddressSpace::Handle,
                naga::TypeInner::Image {
                    class: naga::ImageClass::Sampled { .. } | naga::ImageClass::Depth { .. },
                    ..
                },
            ) => ResourceKind::SampledImage,
            (naga::AddressSpace::Handle, naga::TypeInner::Sampler { .. }) => ResourceKind::Sampler,
            (space, _) => {
                log::debug!(
                    "{}: ignoring '{name}' in address space {space:?}",
                    source.filename
                );
                continue;
            }
        };

        let (count, unbounded) = match (array, policy) {
            (None, _) => (1, false),
            (Some(naga::ArraySize::Constant(length)), ArrayBoundPolicy::AssumeUnbounded) => {
                (length.get(), true)
            }
            (Some(naga::ArraySize::Constant(length)), ArrayBoundPolicy::Precise) => {
                (length.get(), false)
            }
            (Some(naga::ArraySize::Dynamic), _) => (1, true),
        };

        log::trace!(
            "{}: found {kind} '{name}' at group {} binding {}",
            source.filename,
            resource_binding.group,
            resource_binding.binding
        );
        bindings.push((
            name,
            ResourceBindingDescription {
                set: resource_binding.group,
                binding: resource_binding.binding,
                kind,
                stages,
                count,
                unbounded,
            },
        ));
    }

    Ok(bindings)
}

/// Reflect every stage of a pipeline and merge the results.
pub fn build_pipeline_interface(
    pipeline: &PipelineCreateInfo,
    policy: ArrayBoundPolicy,
) -> Result<PipelineResourceInterface, GraphicsError> {
    let mut interface = PipelineResourceInterface::new();
    for (stage, source) in pipeline.stages() {
        let bindings = reflect_shader(source, stage, policy)?;
        interface.merge_stage(&bindings)?;
    }
    Ok(interface)
}

fn parse_module(source: &ShaderSource, stage: ShaderStage) -> Result<naga::Module, GraphicsError> {
    let reflection_error = |reason: String| GraphicsError::ShaderReflectionFailed {
        shader: source.filename.clone(),
        reason,
    };

    match &source.binary {
        ShaderBinary::SpirV(words) => {
            let options = naga::front::spv::Options::default();
            naga::front::spv::parse_u8_slice(bytemuck::cast_slice(words), &options)
                .map_err(|err| reflection_error(err.to_string()))
        }
        ShaderBinary::Wgsl(text) => naga::front::wgsl::parse_str(text)
            .map_err(|err| reflection_error(err.emit_to_string(text))),
        ShaderBinary::Glsl(text) => {
            let naga_stage = match stage {
                ShaderStage::Vertex => naga::ShaderStage::Vertex,
                ShaderStage::Fragment => naga::ShaderStage::Fragment,
                ShaderStage::Compute => naga::ShaderStage::Compute,
                other => {
                    return Err(GraphicsError::FeatureNotSupported(format!(
                        "GLSL reflection of {other:?} shader '{}'",
                        source.filename
                    )))
                }
            };
            let options = naga::front::glsl::Options {
                stage: naga_stage,
                defines: Default::default(),
            };
            let mut frontend = naga::front::glsl::Frontend::default();
            frontend
                .parse(&options, text)
                .map_err(|errors| reflection_error(errors.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAGMENT: &str = r#"
struct GlobalsData {
    view: mat4x4<f32>,
}

struct Lights {
    colors: array<vec4<f32>>,
}

@group(0) @binding(0) var<uniform> Globals: GlobalsData;
@group(0) @binding(1) var<storage, read> LightBuffer: Lights;
@group(1) @binding(0) var Albedo: texture_2d<f32>;
@group(1) @binding(1) var PointSampler: sampler;

@fragment
fn main() -> @location(0) vec4<f32> {
    return Globals.view[0] + LightBuffer.colors[0] + textureSample(Albedo, PointSampler, vec2<f32>(0.0));
}
"#;

    const VERTEX: &str = r#"
struct GlobalsData {
    view: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> Globals: GlobalsData;

@vertex
fn main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return Globals.view * vec4<f32>(position, 1.0);
}
"#;

    const TEXTURE_ARRAY: &str = r#"
@group(2) @binding(0) var Textures: binding_array<texture_2d<f32>, 4>;

@fragment
fn main() -> @location(0) vec4<f32> {
    return vec4<f32>(0.0);
}
"#;

    fn wgsl(name: &str, text: &str) -> ShaderSource {
        ShaderSource::wgsl(name, text)
    }

    #[test]
    fn test_reflect_resource_kinds() {
        let bindings =
            reflect_shader(&wgsl("frag.wgsl", FRAGMENT), ShaderStage::Fragment, ArrayBoundPolicy::default())
                .unwrap();
        let find = |name: &str| {
            bindings
                .iter()
                .find(|(binding_name, _)| binding_name == name)
                .map(|(_, description)| *description)
                .unwrap()
        };

        let globals = find("Globals");
        assert_eq!((globals.set, globals.binding), (0, 0));
        assert_eq!(globals.kind, ResourceKind::UniformBuffer);
        assert_eq!(globals.stages, ShaderStageFlags::FRAGMENT);
        assert_eq!(globals.count, 1);
        assert!(!globals.unbounded);

        // A runtime array inside a buffer does not make the binding an array.
        let lights = find("LightBuffer");
        assert_eq!(lights.kind, ResourceKind::StorageBuffer);
        assert_eq!(lights.count, 1);
        assert!(!lights.unbounded);

        assert_eq!(find("Albedo").kind, ResourceKind::SampledImage);
        assert_eq!(find("PointSampler").kind, ResourceKind::Sampler);
        assert_eq!(bindings.len(), 4);
    }

    #[test]
    fn test_array_bound_policy() {
        let source = wgsl("array.wgsl", TEXTURE_ARRAY);

        let assumed =
            reflect_shader(&source, ShaderStage::Fragment, ArrayBoundPolicy::AssumeUnbounded).unwrap();
        assert_eq!(assumed[0].1.count, 4);
        assert!(assumed[0].1.unbounded);

        let precise = reflect_shader(&source, ShaderStage::Fragment, ArrayBoundPolicy::Precise).unwrap();
        assert_eq!(precise[0].1.count, 4);
        assert!(!precise[0].1.unbounded);
    }

    #[test]
    fn test_merge_ors_stage_masks() {
        let vertex =
            reflect_shader(&wgsl("vert.wgsl", VERTEX), ShaderStage::Vertex, ArrayBoundPolicy::default())
                .unwrap();
        let fragment =
            reflect_shader(&wgsl("frag.wgsl", FRAGMENT), ShaderStage::Fragment, ArrayBoundPolicy::default())
                .unwrap();

        let mut interface = PipelineResourceInterface::new();
        interface.merge_stage(&vertex).unwrap();
        interface.merge_stage(&fragment).unwrap();

        let globals = interface.get("Globals").unwrap();
        assert_eq!(
            globals.stages,
            ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT
        );
        assert_eq!(interface.len(), 4);
        assert_eq!(interface.set_count(), 2);
        assert_eq!(interface.bindings_in_set(1).count(), 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let fragment =
            reflect_shader(&wgsl("frag.wgsl", FRAGMENT), ShaderStage::Fragment, ArrayBoundPolicy::default())
                .unwrap();

        let mut once = PipelineResourceInterface::new();
        once.merge_stage(&fragment).unwrap();

        let mut twice = PipelineResourceInterface::new();
        twice.merge_stage(&fragment).unwrap();
        twice.merge_stage(&fragment).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_conflicting_binding_is_error() {
        let description = ResourceBindingDescription {
            set: 0,
            binding: 0,
            kind: ResourceKind::UniformBuffer,
            stages: ShaderStageFlags::VERTEX,
            count: 1,
            unbounded: false,
        };
        let mut interface = PipelineResourceInterface::new();
        interface.add_resource("Globals", description).unwrap();

        let moved = ResourceBindingDescription {
            binding: 3,
            stages: ShaderStageFlags::FRAGMENT,
            ..description
        };
        let err = interface.add_resource("Globals", moved).unwrap_err();
        assert!(err.is_configuration_error());
        assert_eq!(
            err.to_string(),
            "resource 'Globals' is declared as uniform buffer at set 0 binding 0 \
             and as uniform buffer at set 0 binding 3"
        );

        let retyped = ResourceBindingDescription {
            kind: ResourceKind::StorageBuffer,
            ..description
        };
        assert!(interface.add_resource("Globals", retyped).is_err());
        // The first entry is untouched.
        assert_eq!(interface.get("Globals"), Some(&description));
    }

    #[test]
    fn test_descriptor_counts() {
        let fragment =
            reflect_shader(&wgsl("frag.wgsl", FRAGMENT), ShaderStage::Fragment, ArrayBoundPolicy::default())
                .unwrap();
        let mut interface = PipelineResourceInterface::new();
        interface.merge_stage(&fragment).unwrap();

        let counts = interface.descriptor_counts();
        assert_eq!(counts.max_sets, 2);
        assert_eq!(counts.uniform_buffers, 1);
        assert_eq!(counts.storage_buffers, 1);
        assert_eq!(counts.sampled_images, 1);
        assert_eq!(counts.samplers, 1);
    }

    #[test]
    fn test_invalid_source_is_reflection_error() {
        let err = reflect_shader(
            &wgsl("broken.wgsl", "fn main( {"),
            ShaderStage::Fragment,
            ArrayBoundPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GraphicsError::ShaderReflectionFailed { ref shader, .. } if shader == "broken.wgsl"
        ));
    }
}
