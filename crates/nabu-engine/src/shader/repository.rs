use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use crate::gpu::{OwnedProgram, RenderContext};

use super::key::ShaderVariantKey;
use super::program::CompiledProgram;

/// Bounded cache of linked programs for one share group.
///
/// Keys whose build failed are remembered and answered with `None` without
/// another build attempt.
pub struct ShaderRepository {
    programs: LruCache<ShaderVariantKey, Arc<CompiledProgram>>,
    failed: HashSet<ShaderVariantKey>,
}

impl ShaderRepository {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { programs: LruCache::new(capacity), failed: HashSet::new() }
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn contains(&self, key: &ShaderVariantKey) -> bool {
        self.programs.contains(key)
    }

    pub fn has_failed(&self, key: &ShaderVariantKey) -> bool {
        self.failed.contains(key)
    }

    /// Cached program for `key`, built on a miss.
    ///
    /// A build failure logs the assembled source with the compiler log and
    /// returns `None`; the draw that asked for it must be skipped.
    pub fn get_program(
        &mut self,
        ctx: &mut dyn RenderContext,
        key: &ShaderVariantKey,
    ) -> Option<Arc<CompiledProgram>> {
        if let Some(program) = self.programs.get(key) {
            return Some(program.clone());
        }
        if self.failed.contains(key) {
            return None;
        }

        let source = key.assemble();
        let program = match OwnedProgram::create(ctx, &source) {
            Ok(program) => program,
            Err(err) => {
                log::error!("{err}\n--- source ---\n{}", source.wgsl);
                self.failed.insert(key.clone());
                return None;
            }
        };
        log::debug!("linked shader program `{}`", source.label);

        let compiled = Arc::new(CompiledProgram::new(key.clone(), program));
        if let Some((evicted_key, evicted)) = self.programs.push(key.clone(), compiled.clone())
            && evicted_key != *key
        {
            log::debug!("evicting shader program `{}`", evicted_key.label());
            evicted.release(ctx);
        }
        Some(compiled)
    }

    /// Releases every program; used when the share group goes away.
    pub fn clear(&mut self, ctx: &mut dyn RenderContext) {
        for (_, program) in self.programs.iter() {
            program.release(ctx);
        }
        self.programs.clear();
        self.failed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::testing::RecordingContext;
    use crate::shader::SnippetName;

    fn solid_key() -> ShaderVariantKey {
        ShaderVariantKey {
            main_vertex: SnippetName::MainVertex,
            position_vertex: SnippetName::PositionOnlyVertex,
            main_fragment: SnippetName::MainFragment,
            src_pixel: SnippetName::SolidBrushSrcFragment,
            mask: None,
            composition: None,
            custom_stage: None,
        }
    }

    // ── caching ───────────────────────────────────────────────────────────

    #[test]
    fn equal_keys_share_one_program() {
        let mut ctx = RecordingContext::new(1, 1);
        let mut repo = ShaderRepository::new(4);
        let a = repo.get_program(&mut ctx, &solid_key()).unwrap();
        let b = repo.get_program(&mut ctx, &solid_key()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(ctx.programs_created(), 1);
    }

    #[test]
    fn eviction_frees_the_program() {
        let mut ctx = RecordingContext::new(1, 1);
        let mut repo = ShaderRepository::new(1);
        let first = repo.get_program(&mut ctx, &ShaderVariantKey::simple()).unwrap();
        repo.get_program(&mut ctx, &solid_key()).unwrap();
        assert_eq!(repo.len(), 1);
        assert!(!first.is_live());
        assert_eq!(ctx.live_programs(), 1);
    }

    // ── failures ──────────────────────────────────────────────────────────

    #[test]
    fn failed_keys_are_not_rebuilt() {
        let mut ctx = RecordingContext::new(1, 1);
        ctx.fail_programs_containing("u.fragment_color");
        let mut repo = ShaderRepository::new(4);
        assert!(repo.get_program(&mut ctx, &solid_key()).is_none());
        assert!(repo.get_program(&mut ctx, &solid_key()).is_none());
        assert!(repo.has_failed(&solid_key()));
        assert_eq!(ctx.programs_created(), 0);
        assert!(repo.get_program(&mut ctx, &ShaderVariantKey::simple()).is_some());
    }

    #[test]
    fn clear_releases_everything() {
        let mut ctx = RecordingContext::new(1, 1);
        let mut repo = ShaderRepository::new(4);
        repo.get_program(&mut ctx, &solid_key());
        repo.get_program(&mut ctx, &ShaderVariantKey::simple());
        repo.clear(&mut ctx);
        assert!(repo.is_empty());
        assert_eq!(ctx.live_programs(), 0);
    }
}
