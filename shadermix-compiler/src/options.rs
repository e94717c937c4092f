use shadermix_common::ShaderStage;

/// Options that change how a [`MixinEngine`](crate::engine::MixinEngine) compiles requests.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Log a warning when a mixin source fills a composition slot the class does not declare.
    ///
    /// Unknown slots are skipped either way.
    pub warn_on_unknown_composition: bool,
    /// Fill missing generic arguments with default values instead of failing the load.
    pub allow_non_instantiated_generics: bool,
    /// Stages that must have an entry point after mixing.
    pub required_stages: Vec<ShaderStage>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            warn_on_unknown_composition: true,
            allow_non_instantiated_generics: false,
            required_stages: Vec::new(),
        }
    }
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn_on_unknown_composition(mut self, warn: bool) -> Self {
        self.warn_on_unknown_composition = warn;
        self
    }

    pub fn allow_non_instantiated_generics(mut self, allow: bool) -> Self {
        self.allow_non_instantiated_generics = allow;
        self
    }

    pub fn require_stage(mut self, stage: ShaderStage) -> Self {
        if !self.required_stages.contains(&stage) {
            self.required_stages.push(stage);
        }
        self
    }
}
