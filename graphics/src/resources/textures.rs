//! Dynamic textures and builtin images.

use std::collections::HashMap;

use slotmap::SlotMap;

use crate::backend::RenderDevice;
use crate::error::GraphicsError;
use crate::renderpack::{ImageUsage, TextureCreateInfo};
use crate::types::{Extent2d, ImageDescriptor, ImageHandle, TextureUsage};

slotmap::new_key_type! {
    /// Id of a texture in a [`TextureTable`].
    pub struct TextureId;
}

/// A texture created from a [`TextureCreateInfo`].
#[derive(Debug, Clone)]
pub struct DynamicTexture {
    pub info: TextureCreateInfo,
    pub image: ImageHandle,
    /// Size resolved against the swapchain at creation time.
    pub size: Extent2d,
    /// Builtin images survive renderpack unloads.
    pub is_builtin: bool,
}

impl DynamicTexture {
    pub fn name(&self) -> &str {
        &self.info.name
    }
}

/// Name-addressable table of textures.
#[derive(Debug, Default)]
pub struct TextureTable {
    textures: SlotMap<TextureId, DynamicTexture>,
    by_name: HashMap<String, TextureId>,
}

impl TextureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the image for a texture description.
    ///
    /// Names are unique across the table, builtins included.
    pub fn create_texture<D: RenderDevice>(
        &mut self,
        device: &mut D,
        info: &TextureCreateInfo,
        screen_size: Extent2d,
        is_builtin: bool,
    ) -> Result<TextureId, GraphicsError> {
        if self.by_name.contains_key(&info.name) {
            return Err(GraphicsError::DuplicateName(info.name.clone()));
        }

        let size = info.format.size.get_size_in_pixels(screen_size);
        let usage = match info.usage {
            ImageUsage::RenderTarget => {
                TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING
            }
            ImageUsage::SampledImage => TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        };
        let descriptor =
            ImageDescriptor::new(size, info.format.pixel_format, usage).with_label(&info.name);
        let image = device.create_image(&descriptor)?;

        log::debug!("Created texture '{}' ({size})", info.name);
        let id = self.textures.insert(DynamicTexture {
            info: info.clone(),
            image,
            size,
            is_builtin,
        });
        self.by_name.insert(info.name.clone(), id);
        Ok(id)
    }

    pub fn get(&self, id: TextureId) -> Option<&DynamicTexture> {
        self.textures.get(id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&DynamicTexture> {
        self.by_name.get(name).and_then(|id| self.textures.get(*id))
    }

    pub fn id_of(&self, name: &str) -> Option<TextureId> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TextureId, &DynamicTexture)> {
        self.textures.iter()
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Descriptions of the non-builtin textures, sorted by name.
    pub fn dynamic_texture_infos(&self) -> Vec<&TextureCreateInfo> {
        let mut infos: Vec<_> = self
            .textures
            .values()
            .filter(|texture| !texture.is_builtin)
            .map(|texture| &texture.info)
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Destroy every non-builtin texture and drop it from the name table.
    pub fn destroy_dynamic_textures<D: RenderDevice>(&mut self, device: &mut D) {
        self.destroy_where(device, |texture| !texture.is_builtin);
    }

    /// Destroy every texture, builtins included.
    pub fn destroy_all<D: RenderDevice>(&mut self, device: &mut D) {
        self.destroy_where(device, |_| true);
    }

    fn destroy_where<D: RenderDevice>(
        &mut self,
        device: &mut D,
        mut predicate: impl FnMut(&DynamicTexture) -> bool,
    ) {
        let doomed: Vec<TextureId> = self
            .textures
            .iter()
            .filter(|(_, texture)| predicate(texture))
            .map(|(id, _)| id)
            .collect();
        for id in doomed {
            if let Some(texture) = self.textures.remove(id) {
                device.destroy_texture(texture.image);
                self.by_name.remove(&texture.info.name);
            }
        }
    }
}
