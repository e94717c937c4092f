/// Marker trait for shader text targets.
pub trait OutputTarget {
    /// The output format for the target.
    type Output;
}

/// Shader compiler target for HLSL.
#[derive(Debug, Copy, Clone)]
pub struct HLSL;

impl OutputTarget for HLSL {
    type Output = String;
}
