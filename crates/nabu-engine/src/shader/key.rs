use std::sync::Arc;

use crate::gpu::ProgramSource;

use super::snippets::{SnippetName, PRELUDE};

/// User supplied WGSL that defines
/// `fn custom_src_pixel(tex_coord: vec2<f32>) -> vec4<f32>`.
///
/// It may sample `brush_texture` / `brush_sampler` and read the uniform
/// block `u`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomStage {
    pub label: String,
    pub wgsl: String,
}

impl CustomStage {
    pub fn new(label: impl Into<String>, wgsl: impl Into<String>) -> Self {
        Self { label: label.into(), wgsl: wgsl.into() }
    }
}

/// Identity of one shader variant.
///
/// Equality is structural over every snippet slot and the custom stage
/// source, so independently built keys for the same state are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderVariantKey {
    pub main_vertex: SnippetName,
    pub position_vertex: SnippetName,
    pub main_fragment: SnippetName,
    pub src_pixel: SnippetName,
    pub mask: Option<SnippetName>,
    pub composition: Option<SnippetName>,
    pub custom_stage: Option<Arc<CustomStage>>,
}

impl ShaderVariantKey {
    /// Stencil-only writes: position transform plus a constant color.
    pub fn simple() -> Self {
        Self {
            main_vertex: SnippetName::MainVertex,
            position_vertex: SnippetName::PositionOnlyVertex,
            main_fragment: SnippetName::MainFragment,
            src_pixel: SnippetName::StencilWriteSrcFragment,
            mask: None,
            composition: None,
            custom_stage: None,
        }
    }

    pub fn label(&self) -> String {
        let mut label = format!("nabu {:?}+{:?}", self.position_vertex, self.src_pixel);
        if let Some(mask) = self.mask {
            label.push_str(&format!("+{mask:?}"));
        }
        if let Some(comp) = self.composition {
            label.push_str(&format!("+{comp:?}"));
        }
        if let Some(custom) = &self.custom_stage {
            label.push_str(&format!("+custom({})", custom.label));
        }
        label
    }

    /// Complete module source.
    ///
    /// A custom stage precedes the source-pixel snippet that calls it.
    pub fn assemble(&self) -> ProgramSource {
        let mut wgsl = String::with_capacity(8 * 1024);
        wgsl.push_str(PRELUDE);
        wgsl.push_str(self.main_vertex.source());
        wgsl.push_str(self.position_vertex.source());
        if let Some(custom) = &self.custom_stage {
            wgsl.push_str(&custom.wgsl);
            wgsl.push('\n');
        }
        wgsl.push_str(self.main_fragment.source());
        wgsl.push_str(self.src_pixel.source());
        if let Some(comp) = self.composition {
            wgsl.push_str(comp.source());
        }
        if let Some(mask) = self.mask {
            wgsl.push_str(mask.source());
        }
        ProgramSource { label: self.label(), wgsl }
    }
}
