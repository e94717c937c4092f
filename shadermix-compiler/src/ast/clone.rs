use crate::ast::{InstanceId, Module};
use shadermix_common::map::FastHashMap;
use std::sync::Arc;

/// A scope-bound identity map from modules to their clones.
///
/// Within one context, including its parents, cloning the same module twice yields the same
/// clone. Contexts that do not share a parent never share clones. Bases are cloned within the
/// same context as the module that inherits them, so a diamond stays a diamond.
#[derive(Debug, Clone, Default)]
pub struct CloneContext<'a> {
    parent: Option<&'a CloneContext<'a>>,
    memo: FastHashMap<InstanceId, Arc<Module>>,
}

impl CloneContext<'static> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'a> CloneContext<'a> {
    /// Create a context layered on this one.
    ///
    /// Clones recorded in the parent are visible to the child; clones made in the child are not
    /// visible to the parent or to sibling contexts.
    pub fn child(&'a self) -> CloneContext<'a> {
        CloneContext {
            parent: Some(self),
            memo: FastHashMap::default(),
        }
    }

    /// Find the clone recorded for a module in this context or any parent.
    pub fn lookup(&self, instance: InstanceId) -> Option<Arc<Module>> {
        self.memo
            .get(&instance)
            .cloned()
            .or_else(|| self.parent.and_then(|p| p.lookup(instance)))
    }

    /// Record that `module` resolves to itself in this context.
    ///
    /// Used for builtin modules that should never be re-materialized.
    pub fn insert_identity(&mut self, module: &Arc<Module>) {
        self.memo.insert(module.instance, Arc::clone(module));
    }

    /// Clone a module into a fresh identity, or return the clone already made in this context.
    pub fn deep_clone(&mut self, module: &Arc<Module>) -> Arc<Module> {
        if let Some(clone) = self.lookup(module.instance) {
            return clone;
        }

        let bases = module.bases.iter().map(|b| self.deep_clone(b)).collect();
        let clone = Arc::new(module.with_new_identity(bases));
        self.memo.insert(module.instance, Arc::clone(&clone));
        self.memo.insert(clone.instance, Arc::clone(&clone));
        clone
    }

    /// The number of clones recorded directly in this context.
    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }
}

#[cfg(test)]
mod test {
    use crate::ast::clone::CloneContext;
    use crate::ast::{Module, ModuleKey, ShaderClass, SourceSpan};
    use shadermix_common::SourceHash;
    use std::sync::Arc;

    fn module(name: &str, bases: Vec<Arc<Module>>) -> Arc<Module> {
        Arc::new(Module::new(
            ModuleKey::new(name, vec![], &[]),
            Arc::new(ShaderClass::new(name, SourceSpan::synthesized())),
            bases,
            SourceHash::EMPTY,
        ))
    }

    #[test]
    fn same_context_memoizes() {
        let base = module("Base", vec![]);
        let derived = module("Derived", vec![base.clone()]);

        let mut context = CloneContext::new();
        let first = context.deep_clone(&derived);
        let second = context.deep_clone(&derived);
        assert!(Arc::ptr_eq(&first, &second));
        assert_ne!(first.instance, derived.instance);
        assert_ne!(first.bases[0].instance, base.instance);
        assert!(Arc::ptr_eq(&first.bases[0], &context.deep_clone(&base)));
    }

    #[test]
    fn sibling_contexts_are_isolated() {
        let light = module("PointLight", vec![]);
        let parent = CloneContext::new();

        let mut left = parent.child();
        let mut right = parent.child();
        let a = left.deep_clone(&light);
        let b = right.deep_clone(&light);
        assert_ne!(a.instance, b.instance);
        assert!(parent.lookup(light.instance).is_none());
    }

    #[test]
    fn children_see_parent_clones() {
        let shared = module("ShaderBase", vec![]);
        let user = module("User", vec![shared.clone()]);

        let mut parent = CloneContext::new();
        let shared_clone = parent.deep_clone(&shared);

        let mut child = parent.child();
        let user_clone = child.deep_clone(&user);
        assert!(Arc::ptr_eq(&shared_clone, &user_clone.bases[0]));
    }

    #[test]
    fn identity_entries_are_not_cloned() {
        let builtin = module("Builtins", vec![]);
        let mut base = CloneContext::new();
        base.insert_identity(&builtin);

        let snapshot = base.clone();
        let mut child = snapshot.child();
        assert!(Arc::ptr_eq(&builtin, &child.deep_clone(&builtin)));
    }
}
