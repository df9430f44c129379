//! Graphics error types.

use std::fmt;

use crate::types::Extent2d;

/// Errors that can occur in the graphics system.
///
/// Variants fall into three groups:
///
/// | Group | Examples | Handling |
/// |-------|----------|----------|
/// | Configuration | conflicting bindings, size mismatch, cycles | the offending object is dropped, loading continues |
/// | Resource exhaustion | out of memory, descriptor pool exhausted | the creation fails, the caller decides |
/// | Device | device lost, swapchain acquire failed | fatal for the session |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Two shader stages declare the same resource name with different binding metadata.
    ConflictingBinding {
        name: String,
        existing: String,
        incoming: String,
    },
    /// Attachments of one renderpass have different sizes.
    AttachmentSizeMismatch {
        renderpass: String,
        attachment: String,
        expected: Extent2d,
        actual: Extent2d,
    },
    /// The renderpass input/output relation contains a cycle.
    CyclicDependency { renderpasses: Vec<String> },
    /// A material binding names a resource that does not exist.
    UnresolvedResource { binding: String, resource: String },
    /// A renderpass references a texture that does not exist.
    UnknownTexture { renderpass: String, texture: String },
    /// A renderpass description is malformed.
    InvalidRenderpass { renderpass: String, reason: String },
    /// An object with this name already exists.
    DuplicateName(String),
    /// A shader binary could not be reflected.
    ShaderReflectionFailed { shader: String, reason: String },
    /// No material pass is registered under this name.
    UnknownMaterialPass(String),
    /// Out of GPU memory.
    OutOfMemory,
    /// The descriptor pool has no room for more sets.
    DescriptorPoolExhausted,
    /// The GPU device was lost.
    DeviceLost,
    /// The next swapchain image could not be acquired.
    SwapchainAcquireFailed(String),
    /// Failed to create a resource.
    ResourceCreationFailed(String),
    /// A requested feature is not supported.
    FeatureNotSupported(String),
    /// Command list submission failed.
    SubmissionFailed(String),
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// An internal error occurred.
    Internal(String),
}

impl GraphicsError {
    /// Returns true for errors caused by a bad renderpack description.
    ///
    /// These are the only errors the loader recovers from locally.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::ConflictingBinding { .. }
                | Self::AttachmentSizeMismatch { .. }
                | Self::CyclicDependency { .. }
                | Self::UnresolvedResource { .. }
                | Self::UnknownTexture { .. }
                | Self::InvalidRenderpass { .. }
                | Self::DuplicateName(_)
                | Self::ShaderReflectionFailed { .. }
                | Self::UnknownMaterialPass(_)
        )
    }

    /// Returns true for errors that end the rendering session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DeviceLost | Self::SwapchainAcquireFailed(_) | Self::SubmissionFailed(_)
        )
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConflictingBinding {
                name,
                existing,
                incoming,
            } => write!(
                f,
                "resource '{name}' is declared as {existing} and as {incoming}"
            ),
            Self::AttachmentSizeMismatch {
                renderpass,
                attachment,
                expected,
                actual,
            } => write!(
                f,
                "attachment '{attachment}' of renderpass '{renderpass}' is {actual}, expected {expected}"
            ),
            Self::CyclicDependency { renderpasses } => write!(
                f,
                "cyclic dependency between renderpasses: {}",
                renderpasses.join(", ")
            ),
            Self::UnresolvedResource { binding, resource } => write!(
                f,
                "binding '{binding}' refers to unknown resource '{resource}'"
            ),
            Self::UnknownTexture {
                renderpass,
                texture,
            } => write!(
                f,
                "renderpass '{renderpass}' uses unknown texture '{texture}'"
            ),
            Self::InvalidRenderpass { renderpass, reason } => {
                write!(f, "invalid renderpass '{renderpass}': {reason}")
            }
            Self::DuplicateName(name) => write!(f, "duplicate name '{name}'"),
            Self::ShaderReflectionFailed { shader, reason } => {
                write!(f, "failed to reflect shader '{shader}': {reason}")
            }
            Self::UnknownMaterialPass(name) => write!(f, "unknown material pass {name}"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::DescriptorPoolExhausted => write!(f, "descriptor pool exhausted"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::SwapchainAcquireFailed(msg) => {
                write!(f, "failed to acquire swapchain image: {msg}")
            }
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::FeatureNotSupported(msg) => write!(f, "feature not supported: {msg}"),
            Self::SubmissionFailed(msg) => write!(f, "command list submission failed: {msg}"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {}

static_assertions::assert_impl_all!(GraphicsError: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::AttachmentSizeMismatch {
            renderpass: "Forward".to_string(),
            attachment: "sceneColor".to_string(),
            expected: Extent2d::new(256, 256),
            actual: Extent2d::new(512, 512),
        };
        assert_eq!(
            err.to_string(),
            "attachment 'sceneColor' of renderpass 'Forward' is 512x512, expected 256x256"
        );
    }

    #[test]
    fn test_error_classification() {
        let cycle = GraphicsError::CyclicDependency {
            renderpasses: vec!["A".to_string(), "B".to_string()],
        };
        assert!(cycle.is_configuration_error());
        assert!(!cycle.is_fatal());
        assert_eq!(
            cycle.to_string(),
            "cyclic dependency between renderpasses: A, B"
        );

        assert!(GraphicsError::DeviceLost.is_fatal());
        assert!(!GraphicsError::OutOfMemory.is_configuration_error());
        assert!(!GraphicsError::DescriptorPoolExhausted.is_fatal());
    }
}
