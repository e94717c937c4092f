use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// A pipeline stage an entry point can be bound to.
#[repr(u32)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Compute = 0,
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel,
}

impl ShaderStage {
    /// Every stage, in the order entry points are searched for after mixing.
    pub const SCAN_ORDER: [ShaderStage; 6] = [
        ShaderStage::Compute,
        ShaderStage::Vertex,
        ShaderStage::Hull,
        ShaderStage::Domain,
        ShaderStage::Geometry,
        ShaderStage::Pixel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShaderStage::Compute => "Compute",
            ShaderStage::Vertex => "Vertex",
            ShaderStage::Hull => "Hull",
            ShaderStage::Domain => "Domain",
            ShaderStage::Geometry => "Geometry",
            ShaderStage::Pixel => "Pixel",
        }
    }
}

/// The stage name did not name a known pipeline stage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown shader stage `{0}`")]
pub struct UnknownShaderStage(pub String);

impl FromStr for ShaderStage {
    type Err = UnknownShaderStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Compute" => ShaderStage::Compute,
            "Vertex" => ShaderStage::Vertex,
            "Hull" => ShaderStage::Hull,
            "Domain" => ShaderStage::Domain,
            "Geometry" => ShaderStage::Geometry,
            "Pixel" => ShaderStage::Pixel,
            _ => return Err(UnknownShaderStage(s.to_string())),
        })
    }
}

impl Display for ShaderStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod test {
    use crate::ShaderStage;
    use std::str::FromStr;

    #[test]
    fn parses_stage_names() {
        for stage in ShaderStage::SCAN_ORDER {
            assert_eq!(stage, ShaderStage::from_str(stage.as_str()).unwrap());
        }
        assert!(ShaderStage::from_str("Fragment").is_err());
    }

    #[test]
    fn compute_is_scanned_first() {
        assert_eq!(ShaderStage::Compute, ShaderStage::SCAN_ORDER[0]);
    }
}
