//! Shader variant selection and program caching.
//!
//! Programs are assembled from WGSL snippets ([`snippets`]). The
//! [`ShaderManager`] maps the paint state onto a [`ShaderVariantKey`]; the
//! share group's [`ShaderRepository`] turns keys into linked programs.

mod key;
mod manager;
mod program;
mod repository;
pub mod snippets;

pub use key::{CustomStage, ShaderVariantKey};
pub use manager::{MaskType, OpacityMode, SelectError, ShaderManager, SrcPixelType};
pub use program::{CompiledProgram, Uniform};
pub use repository::ShaderRepository;
pub use snippets::SnippetName;
