//! Resolving material binding names to concrete resources.

use crate::backend::DescriptorResource;
use crate::error::GraphicsError;
use crate::resources::{BuiltinBuffers, TextureTable, POINT_SAMPLER_NAME};
use crate::shader::{ResourceBindingDescription, ResourceKind};
use crate::types::SamplerHandle;

/// Everything a material binding may refer to by name.
///
/// Names are looked up in dynamic textures (builtin images included) first,
/// then builtin buffers, then the point sampler.
#[derive(Debug, Clone, Copy)]
pub struct BindingResources<'a> {
    pub textures: &'a TextureTable,
    pub buffers: &'a BuiltinBuffers,
    /// Bound as [`POINT_SAMPLER_NAME`] and combined with every sampled texture.
    pub point_sampler: SamplerHandle,
}

impl BindingResources<'_> {
    /// Resolve `resource` for the shader binding `binding` described by `description`.
    pub fn resolve(
        &self,
        binding: &str,
        description: &ResourceBindingDescription,
        resource: &str,
    ) -> Result<DescriptorResource, GraphicsError> {
        let mismatch = |found: &str| {
            GraphicsError::InvalidParameter(format!(
                "binding '{binding}' expects a {}, but '{resource}' is a {found}",
                description.kind
            ))
        };

        if let Some(texture) = self.textures.get_by_name(resource) {
            return match description.kind {
                ResourceKind::SampledImage => Ok(DescriptorResource::SampledImage {
                    image: texture.image,
                    sampler: Some(self.point_sampler),
                }),
                _ => Err(mismatch("texture")),
            };
        }

        if let Some(buffer) = self.buffers.handle(resource) {
            return match description.kind {
                ResourceKind::UniformBuffer => Ok(DescriptorResource::UniformBuffer(buffer)),
                ResourceKind::StorageBuffer => Ok(DescriptorResource::StorageBuffer(buffer)),
                _ => Err(mismatch("buffer")),
            };
        }

        if resource == POINT_SAMPLER_NAME {
            return match description.kind {
                ResourceKind::Sampler => Ok(DescriptorResource::Sampler(self.point_sampler)),
                _ => Err(mismatch("sampler")),
            };
        }

        Err(GraphicsError::UnresolvedResource {
            binding: binding.to_string(),
            resource: resource.to_string(),
        })
    }
}
