use crate::ast::ShaderClass;
use shadermix_common::map::FastHashSet;
use shadermix_common::{ShaderMacro, SourceHash};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies a loaded class: its name, generic arguments and the macros it was preprocessed
/// with.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleKey {
    pub name: String,
    pub generic_arguments: Vec<String>,
    pub macros: Vec<ShaderMacro>,
}

impl ModuleKey {
    pub fn new(name: impl Into<String>, generic_arguments: Vec<String>, macros: &[ShaderMacro]) -> Self {
        ModuleKey {
            name: name.into(),
            generic_arguments,
            macros: macros.to_vec(),
        }
    }
}

impl Display for ModuleKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        if !self.generic_arguments.is_empty() {
            write!(f, "<{}>", self.generic_arguments.join(","))?;
        }
        Ok(())
    }
}

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// The identity of one [`Module`] instance.
///
/// Instance ids are process unique. Clones of a module never share an id with the original.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        InstanceId(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed))
    }
}

/// A usable instance of a loaded class.
#[derive(Debug)]
pub struct Module {
    pub instance: InstanceId,
    pub key: ModuleKey,
    pub class: Arc<ShaderClass>,
    pub bases: Vec<Arc<Module>>,
    /// The hash of the preprocessed source the class was parsed from.
    pub hash: SourceHash,
    stage_only: bool,
}

impl Module {
    pub fn new(
        key: ModuleKey,
        class: Arc<ShaderClass>,
        bases: Vec<Arc<Module>>,
        hash: SourceHash,
    ) -> Self {
        let stage_only = class.is_stage_only();
        Module {
            instance: InstanceId::next(),
            key,
            class,
            bases,
            hash,
            stage_only,
        }
    }

    /// A copy of this module under a fresh identity, with the given (cloned) bases.
    pub(crate) fn with_new_identity(&self, bases: Vec<Arc<Module>>) -> Self {
        Module {
            instance: InstanceId::next(),
            key: self.key.clone(),
            class: Arc::clone(&self.class),
            bases,
            hash: self.hash,
            stage_only: self.stage_only,
        }
    }

    /// The (instantiated) class name.
    pub fn name(&self) -> &str {
        &self.class.name
    }

    /// Whether every member of the class is stage qualified.
    ///
    /// Stage only modules are cloned once per mix and shared by every composition using them.
    pub fn is_stage_only(&self) -> bool {
        self.stage_only
    }

    /// The modules of the inheritance hierarchy, bases first and this module last.
    pub fn linearize(self: &Arc<Self>) -> Vec<Arc<Module>> {
        linearize(
            Arc::clone(self),
            |m| m.name().to_string(),
            |m| m.bases.clone(),
        )
    }

    /// Whether this module is, or inherits from, the class with the given name.
    pub fn inherits(self: &Arc<Self>, class_name: &str) -> bool {
        self.linearize().iter().any(|m| m.name() == class_name)
    }
}

/// Order an inheritance hierarchy depth first with bases before derived classes.
///
/// A class reachable through several paths appears once, at its first position. Both modules and
/// loaded infos are linearized with this function so that class indices agree between them.
pub(crate) fn linearize<T>(
    root: T,
    name: impl Fn(&T) -> String,
    bases: impl Fn(&T) -> Vec<T>,
) -> Vec<T> {
    fn visit<T>(
        node: T,
        name: &impl Fn(&T) -> String,
        bases: &impl Fn(&T) -> Vec<T>,
        seen: &mut FastHashSet<String>,
        out: &mut Vec<T>,
    ) {
        if !seen.insert(name(&node)) {
            return;
        }
        for base in bases(&node) {
            visit(base, name, bases, seen, out);
        }
        out.push(node);
    }

    let mut seen = FastHashSet::default();
    let mut out = Vec::new();
    visit(root, &name, &bases, &mut seen, &mut out);
    out
}

#[cfg(test)]
mod test {
    use crate::ast::{linearize, Module, ModuleKey, ShaderClass, SourceSpan};
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
    fn diamond_is_linearized_once() {
        let d = module("D", vec![]);
        let b = module("B", vec![d.clone()]);
        let c = module("C", vec![d.clone()]);
        let a = module("A", vec![b, c]);

        let names: Vec<_> = a.linearize().iter().map(|m| m.name().to_string()).collect();
        assert_eq!(vec!["D", "B", "C", "A"], names);
        assert!(a.inherits("D"));
        assert!(!d.inherits("A"));
    }

    #[test]
    fn linearize_plain_tree() {
        let tree = linearize(
            3u32,
            |n| n.to_string(),
            |n| if *n == 0 { vec![] } else { vec![n - 1] },
        );
        assert_eq!(vec![0, 1, 2, 3], tree);
    }
}
