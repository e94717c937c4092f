use crate::analysis::CompilationContext;
use crate::ast::clone::CloneContext;
use crate::ast::{DeclId, InstanceId, Module};
use crate::library::source_key;
use crate::options::EngineOptions;
use crate::result::{Log, MessageKind};
use crate::source::ShaderSource;
use shadermix_common::map::FastHashMap;
use std::sync::Arc;

/// A composition variable of one module instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableKey {
    pub instance: InstanceId,
    pub decl: DeclId,
}

/// The module instances composed into each composition variable, in source order.
pub type CompositionDictionary = FastHashMap<VariableKey, Vec<Arc<Module>>>;

/// Turns a [`ShaderSource`] tree into module instances and records what is composed where.
pub struct CompositionResolver<'a> {
    context: &'a CompilationContext,
    options: &'a EngineOptions,
    dictionary: CompositionDictionary,
    log: Log,
}

impl<'a> CompositionResolver<'a> {
    pub fn new(context: &'a CompilationContext, options: &'a EngineOptions) -> Self {
        CompositionResolver {
            context,
            options,
            dictionary: CompositionDictionary::default(),
            log: Log::new(),
        }
    }

    /// Clone every stage only module into the mix context, so that all compositions of the
    /// request share one instance of it.
    pub fn share_stage_modules(&self, mix_context: &mut CloneContext<'_>) {
        let mut infos: Vec<_> = self
            .context
            .modules()
            .values()
            .filter(|info| info.module.is_stage_only())
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        for info in infos {
            mix_context.deep_clone(&info.module);
        }
    }

    /// Resolve a source into instances. Every composition site gets its own clone context
    /// layered on `mix_context`, so two sites never share an instance unless it is stage only.
    ///
    /// Returns `None` when a class of the source failed to load.
    pub fn build(
        &mut self,
        source: &ShaderSource,
        mix_context: &CloneContext<'_>,
    ) -> Option<Vec<Arc<Module>>> {
        match source {
            ShaderSource::Array(array) => {
                let mut modules = Vec::with_capacity(array.values.len());
                for value in &array.values {
                    modules.extend(self.build(value, mix_context)?);
                }
                Some(modules)
            }
            ShaderSource::Class(_) => Some(vec![self.instantiate(source, mix_context)?]),
            ShaderSource::Mixin(mixin) => {
                let module = self.instantiate(source, mix_context)?;
                for (slot, value) in &mixin.compositions {
                    let Some(variable) = find_composition(&module, slot) else {
                        log::warn!("{} has no composition variable {slot}", module.name());
                        if self.options.warn_on_unknown_composition {
                            self.log.warning(
                                MessageKind::UnknownCompositionSlot {
                                    class: module.name().to_string(),
                                    slot: slot.clone(),
                                },
                                None,
                            );
                        }
                        continue;
                    };

                    let composed = self.build(value, mix_context)?;
                    if self.dictionary.contains_key(&variable) {
                        self.log
                            .error(MessageKind::DuplicateComposition(slot.clone()), None);
                        continue;
                    }
                    self.dictionary.insert(variable, composed);
                }
                Some(vec![module])
            }
        }
    }

    fn instantiate(
        &mut self,
        source: &ShaderSource,
        mix_context: &CloneContext<'_>,
    ) -> Option<Arc<Module>> {
        let key = match source_key(source, self.context.macros()) {
            Some(key) => key,
            None => {
                self.log.error(MessageKind::EmptyMixin, None);
                return None;
            }
        };
        // Load failures were reported by the library.
        let info = self.context.module_info(&key)?;
        let mut site = mix_context.child();
        Some(site.deep_clone(&info.module))
    }

    pub fn dictionary(&self) -> &CompositionDictionary {
        &self.dictionary
    }

    pub fn into_parts(self) -> (CompositionDictionary, Log) {
        (self.dictionary, self.log)
    }
}

/// The composition variable named `slot` in the hierarchy of `module`, most derived first.
fn find_composition(module: &Arc<Module>, slot: &str) -> Option<VariableKey> {
    module.linearize().iter().rev().find_map(|m| {
        m.class
            .find_variable(slot)
            .filter(|id| m.class.arena[*id].is_composition())
            .map(|decl| VariableKey {
                instance: m.instance,
                decl,
            })
    })
}
