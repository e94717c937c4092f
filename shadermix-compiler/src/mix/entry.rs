use crate::ast::Shader;
use crate::result::{Log, MessageKind};
use shadermix_common::ShaderStage;
use std::collections::BTreeMap;

/// Find the entry point of each stage among the methods of a mixed shader.
///
/// Stages are searched in [`ShaderStage::SCAN_ORDER`] and the first tagged method wins. A compute
/// entry point ends the search, so a shader with a compute entry point reports no other stage.
pub fn discover_entry_points(shader: &Shader) -> BTreeMap<ShaderStage, String> {
    let mut entry_points = BTreeMap::new();
    for stage in ShaderStage::SCAN_ORDER {
        let Some(method) = shader.methods().find(|m| m.entry_point == Some(stage)) else {
            continue;
        };
        entry_points.insert(stage, method.name.clone());
        if stage == ShaderStage::Compute {
            break;
        }
    }
    entry_points
}

/// Report every required stage without an entry point.
pub fn check_required_stages(
    entry_points: &BTreeMap<ShaderStage, String>,
    required: &[ShaderStage],
    log: &mut Log,
) {
    for stage in required {
        if !entry_points.contains_key(stage) {
            log.error(MessageKind::MissingEntryPoint(*stage), None);
        }
    }
}
