//! Parameter reflection of linked shaders.
//!
//! The [`ShaderLinker`] orders the declarations of a mixed shader and describes what an effect
//! runtime has to bind: resources by register slot, constant buffers with their packed member
//! layout, and the sampler states declared in the source.

mod linker;
mod sampler;

pub use linker::ShaderLinker;
pub use sampler::*;

/// The register class a resource is bound to.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingKind {
    /// `t` registers.
    ShaderResource,
    /// `u` registers.
    UnorderedAccess,
    /// `s` registers.
    Sampler,
    /// `b` registers.
    ConstantBuffer,
}

impl BindingKind {
    /// The HLSL register prefix.
    pub fn register(&self) -> char {
        match self {
            BindingKind::ShaderResource => 't',
            BindingKind::UnorderedAccess => 'u',
            BindingKind::Sampler => 's',
            BindingKind::ConstantBuffer => 'b',
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ParameterClass {
    Scalar,
    Vector,
    Matrix,
    Struct,
    Object,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ParameterType {
    Void,
    Bool,
    Int,
    UInt,
    Float,
    Double,
    Texture1D,
    Texture1DArray,
    Texture2D,
    Texture2DArray,
    Texture2DMS,
    Texture3D,
    TextureCube,
    TextureCubeArray,
    RWTexture1D,
    RWTexture2D,
    RWTexture2DArray,
    RWTexture3D,
    Buffer,
    RWBuffer,
    StructuredBuffer,
    RWStructuredBuffer,
    AppendStructuredBuffer,
    ConsumeStructuredBuffer,
    ByteAddressBuffer,
    RWByteAddressBuffer,
    Sampler,
    ConstantBuffer,
}

impl ParameterType {
    /// The resource type and binding kind of an object type name.
    pub fn resource(type_name: &str) -> Option<(ParameterType, BindingKind)> {
        use BindingKind::*;
        Some(match type_name {
            "Texture1D" => (ParameterType::Texture1D, ShaderResource),
            "Texture1DArray" => (ParameterType::Texture1DArray, ShaderResource),
            "Texture2D" => (ParameterType::Texture2D, ShaderResource),
            "Texture2DArray" => (ParameterType::Texture2DArray, ShaderResource),
            "Texture2DMS" => (ParameterType::Texture2DMS, ShaderResource),
            "Texture3D" => (ParameterType::Texture3D, ShaderResource),
            "TextureCube" => (ParameterType::TextureCube, ShaderResource),
            "TextureCubeArray" => (ParameterType::TextureCubeArray, ShaderResource),
            "Buffer" => (ParameterType::Buffer, ShaderResource),
            "StructuredBuffer" => (ParameterType::StructuredBuffer, ShaderResource),
            "ByteAddressBuffer" => (ParameterType::ByteAddressBuffer, ShaderResource),
            "RWTexture1D" => (ParameterType::RWTexture1D, UnorderedAccess),
            "RWTexture2D" => (ParameterType::RWTexture2D, UnorderedAccess),
            "RWTexture2DArray" => (ParameterType::RWTexture2DArray, UnorderedAccess),
            "RWTexture3D" => (ParameterType::RWTexture3D, UnorderedAccess),
            "RWBuffer" => (ParameterType::RWBuffer, UnorderedAccess),
            "RWStructuredBuffer" => (ParameterType::RWStructuredBuffer, UnorderedAccess),
            "AppendStructuredBuffer" => (ParameterType::AppendStructuredBuffer, UnorderedAccess),
            "ConsumeStructuredBuffer" => (ParameterType::ConsumeStructuredBuffer, UnorderedAccess),
            "RWByteAddressBuffer" => (ParameterType::RWByteAddressBuffer, UnorderedAccess),
            "SamplerState" | "SamplerComparisonState" | "sampler" => {
                (ParameterType::Sampler, Sampler)
            }
            _ => return None,
        })
    }

    /// The value type of a scalar component name, and its size in a constant buffer.
    pub fn scalar(scalar: &str) -> Option<(ParameterType, u32)> {
        Some(match scalar {
            "bool" => (ParameterType::Bool, 4),
            "int" | "dword" | "min16int" => (ParameterType::Int, 4),
            "uint" | "min16uint" => (ParameterType::UInt, 4),
            "float" | "half" | "min16float" => (ParameterType::Float, 4),
            "double" => (ParameterType::Double, 8),
            _ => return None,
        })
    }
}

/// A resource bound to a register slot.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct EffectResourceBinding {
    /// The parameter key from the `Link` attribute.
    pub key: String,
    /// The name of the variable in the linked shader.
    pub raw_name: String,
    pub class: ParameterClass,
    pub ty: ParameterType,
    pub kind: BindingKind,
    pub slot: u32,
    /// The number of consecutive slots, more than one for resource arrays.
    pub slot_count: u32,
}

/// A value member of a constant buffer.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct EffectValueDescription {
    pub key: String,
    pub raw_name: String,
    /// The declared type name.
    pub type_name: String,
    pub class: ParameterClass,
    pub ty: ParameterType,
    pub rows: u32,
    pub columns: u32,
    /// The array length, or `0` for non arrays.
    pub elements: u32,
    /// The byte offset within the buffer.
    pub offset: u32,
    /// The byte size, including array padding between elements.
    pub size: u32,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct EffectConstantBuffer {
    pub name: String,
    /// The buffer size, a multiple of 16 bytes.
    pub size: u32,
    pub members: Vec<EffectValueDescription>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct EffectSamplerState {
    pub key: String,
    pub description: SamplerStateDescription,
}

/// Everything an effect runtime needs to bind the parameters of a linked shader.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectReflection {
    pub resource_bindings: Vec<EffectResourceBinding>,
    /// Constant buffers in slot order. Loose values are collected in `$Globals`, bound first.
    pub constant_buffers: Vec<EffectConstantBuffer>,
    pub sampler_states: Vec<EffectSamplerState>,
}

impl EffectReflection {
    pub fn constant_buffer(&self, name: &str) -> Option<&EffectConstantBuffer> {
        self.constant_buffers.iter().find(|b| b.name == name)
    }

    pub fn binding(&self, key: &str) -> Option<&EffectResourceBinding> {
        self.resource_bindings.iter().find(|b| b.key == key)
    }
}

/// The name of the constant buffer collecting values declared outside any `cbuffer`.
pub const GLOBALS_BUFFER: &str = "$Globals";

#[inline(always)]
/// Give a size aligned to 16 byte boundary, or `None` if it does not fit.
const fn align_uniform_size(size: u32) -> Option<u32> {
    match size.checked_add(0xf) {
        Some(size) => Some(size & !0xf),
        None => None,
    }
}
