use crate::ast::{Decl, DeclId, DeclKind, Module, Qualifiers, ShaderClass};
use crate::result::{Log, MessageKind};
use shadermix_common::map::{FastHashMap, FastHashSet};
use std::sync::Arc;

/// A declaration of one class of a hierarchy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// The index of the declaring class in [`VirtualTable::classes`].
    pub class_index: usize,
    pub decl: DeclId,
}

/// The implementations of one method name, base classes first.
#[derive(Debug, Clone)]
pub struct MethodSlot {
    pub name: String,
    pub implementations: Vec<MemberRef>,
}

impl MethodSlot {
    /// The most derived implementation.
    pub fn final_implementation(&self) -> Option<MemberRef> {
        self.implementations.last().copied()
    }

    /// The most derived implementation declared before the class at `class_index`.
    pub fn implementation_before(&self, class_index: usize) -> Option<MemberRef> {
        self.implementations
            .iter()
            .rev()
            .find(|m| m.class_index < class_index)
            .copied()
    }
}

/// Method dispatch and member visibility for one class hierarchy.
///
/// Built from the linearized hierarchy of a module, so the class order matches
/// [`Module::linearize`] for every instance of the class.
#[derive(Debug)]
pub struct VirtualTable {
    classes: Vec<Arc<ShaderClass>>,
    methods: Vec<MethodSlot>,
    variables: FastHashMap<String, MemberRef>,
    structs: FastHashMap<String, MemberRef>,
    diagnostics: Log,
}

impl VirtualTable {
    pub fn build(module: &Arc<Module>) -> Self {
        let chain = module.linearize();
        let own = chain.len() - 1;

        // Conflicts between two base classes are reported by the first base that sees both.
        let base_hierarchies: Vec<FastHashSet<String>> = chain[..own]
            .iter()
            .map(|m| m.linearize().iter().map(|b| b.name().to_string()).collect())
            .collect();
        let names: Vec<&str> = chain.iter().map(|m| m.name()).collect();
        let reported_by_base = |a: usize, b: usize| {
            base_hierarchies
                .iter()
                .any(|h| h.contains(names[a]) && h.contains(names[b]))
        };

        let mut table = VirtualTable {
            classes: chain.iter().map(|m| Arc::clone(&m.class)).collect(),
            methods: Vec::new(),
            variables: FastHashMap::default(),
            structs: FastHashMap::default(),
            diagnostics: Log::new(),
        };

        for (class_index, class) in chain.iter().map(|m| &m.class).enumerate() {
            let is_own = class_index == own;

            for (decl_id, decl) in class.methods() {
                let member = MemberRef {
                    class_index,
                    decl: decl_id,
                };
                let is_override = decl.qualifiers.contains(Qualifiers::OVERRIDE);

                match table.methods.iter_mut().find(|s| s.name == decl.name) {
                    Some(slot) => {
                        if is_own {
                            let kind = if slot
                                .implementations
                                .iter()
                                .any(|m| m.class_index == class_index)
                            {
                                Some(MessageKind::DuplicateMember {
                                    class: class.name.clone(),
                                    member: decl.name.clone(),
                                })
                            } else if !is_override {
                                Some(MessageKind::MissingOverride {
                                    class: class.name.clone(),
                                    method: decl.name.clone(),
                                })
                            } else {
                                None
                            };
                            if let Some(kind) = kind {
                                table.diagnostics.error(kind, decl.span.clone());
                            }
                        }
                        slot.implementations.push(member);
                    }
                    None => {
                        if is_own && is_override {
                            table.diagnostics.error(
                                MessageKind::OverrideWithoutBase {
                                    class: class.name.clone(),
                                    method: decl.name.clone(),
                                },
                                decl.span.clone(),
                            );
                        }
                        table.methods.push(MethodSlot {
                            name: decl.name.clone(),
                            implementations: vec![member],
                        });
                    }
                }
            }

            let members = class
                .variables()
                .map(|(id, d)| (id, d, false))
                .chain(
                    class
                        .arena
                        .iter()
                        .filter(|(_, d)| matches!(d.kind, DeclKind::Struct { .. }))
                        .map(|(id, d)| (id, d, true)),
                );
            for (decl_id, decl, is_struct) in members {
                let member = MemberRef {
                    class_index,
                    decl: decl_id,
                };
                let table_members = if is_struct {
                    &mut table.structs
                } else {
                    &mut table.variables
                };
                match table_members.get(&decl.name) {
                    Some(existing) => {
                        if !reported_by_base(existing.class_index, class_index) {
                            table.diagnostics.error(
                                MessageKind::DuplicateMember {
                                    class: chain[own].name().to_string(),
                                    member: decl.name.clone(),
                                },
                                decl.span.clone(),
                            );
                        }
                    }
                    None => {
                        table_members.insert(decl.name.clone(), member);
                    }
                }
            }
        }

        table
    }

    /// The classes of the hierarchy, bases first. The last class is the one the table was
    /// built for.
    pub fn classes(&self) -> &[Arc<ShaderClass>] {
        &self.classes
    }

    /// The index of the class the table was built for.
    pub fn own_index(&self) -> usize {
        self.classes.len() - 1
    }

    pub fn decl(&self, member: MemberRef) -> &Decl {
        &self.classes[member.class_index].arena[member.decl]
    }

    pub fn methods(&self) -> &[MethodSlot] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&MethodSlot> {
        self.methods.iter().find(|s| s.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<MemberRef> {
        self.variables.get(name).copied()
    }

    pub fn struct_type(&self, name: &str) -> Option<MemberRef> {
        self.structs.get(name).copied()
    }

    /// Errors found in the declarations of the class the table was built for.
    pub fn diagnostics(&self) -> &Log {
        &self.diagnostics
    }
}
