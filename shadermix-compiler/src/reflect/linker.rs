use crate::analysis::intrinsics::numeric_type;
use crate::ast::{ArrayDim, Decl, DeclKind, Initializer, Param, Qualifiers, Shader, TypeRef};
use crate::reflect::{
    align_uniform_size, BindingKind, EffectConstantBuffer, EffectReflection,
    EffectResourceBinding, EffectSamplerState, EffectValueDescription, ParameterClass,
    ParameterType, SamplerStateDescription, GLOBALS_BUFFER,
};
use crate::result::{Log, MessageKind};
use shadermix_common::map::FastHashMap;

/// The size of one constant buffer register.
const REGISTER_SIZE: u32 = 16;

/// Orders the declarations of a mixed shader and reflects its parameters.
#[derive(Debug, Default, Copy, Clone)]
pub struct ShaderLinker;

/// The placement rules of a value in constant buffer registers.
#[derive(Debug, Copy, Clone)]
struct ValueLayout {
    /// The size without trailing padding.
    size: u32,
    /// The distance between array elements.
    stride: u32,
    /// Whether the value starts on a register boundary.
    register_aligned: bool,
}

impl ValueLayout {
    /// Place the value at or after `offset`, returning its offset.
    fn place(&self, offset: u32) -> Option<u32> {
        let straddles = (offset % REGISTER_SIZE).checked_add(self.size)? > REGISTER_SIZE;
        if self.register_aligned || straddles {
            align_uniform_size(offset)
        } else {
            Some(offset)
        }
    }

    /// The offset just past the value placed at or after `offset`.
    fn end(&self, offset: u32) -> Option<(u32, u32)> {
        let offset = self.place(offset)?;
        Some((offset, offset.checked_add(self.size)?))
    }
}

/// Why a value could not be given a register layout.
enum LayoutError {
    UnknownType,
    /// The struct with this name contains itself.
    Recursive(String),
    ArraySize,
    TooLarge,
}

impl LayoutError {
    fn message(self, variable: &str) -> MessageKind {
        match self {
            LayoutError::UnknownType => MessageKind::LinkError(variable.to_string()),
            LayoutError::Recursive(name) => MessageKind::RecursiveStruct(name),
            LayoutError::ArraySize => MessageKind::ArraySizeNotConstant(variable.to_string()),
            LayoutError::TooLarge => MessageKind::ParameterTooLarge(variable.to_string()),
        }
    }
}

/// The element count of an array type, `None` for a scalar type.
fn array_length(ty: &TypeRef) -> Result<Option<u32>, LayoutError> {
    match &ty.array {
        None => Ok(None),
        Some(ArrayDim::Sized(_)) => ty.array_len().map(Some).ok_or(LayoutError::ArraySize),
        Some(ArrayDim::Unsized) => Err(LayoutError::ArraySize),
    }
}

fn category(decl: &Decl) -> u8 {
    match decl.kind {
        DeclKind::Struct { .. } => 0,
        DeclKind::Variable { .. } => 1,
        DeclKind::ConstantBuffer { .. } => 2,
        DeclKind::Method { .. } => 3,
    }
}

struct Linker<'a> {
    structs: FastHashMap<&'a str, &'a [Param]>,
    reflection: EffectReflection,
    slots: FastHashMap<BindingKind, u32>,
    log: Log,
}

type Members = Vec<(EffectValueDescription, ValueLayout)>;

impl ShaderLinker {
    /// Sort the declarations of `shader` into structs, variables, other declarations and
    /// methods, keeping source order within each group, then build its reflection.
    ///
    /// Values declared outside any constant buffer are collected into `$Globals`, which is
    /// bound before the named buffers.
    pub fn link(&self, shader: &mut Shader) -> (EffectReflection, Log) {
        let arena = &shader.arena;
        shader.declarations.sort_by_key(|id| category(&arena[*id]));
        let shader: &Shader = shader;

        let mut linker = Linker {
            structs: FastHashMap::default(),
            reflection: EffectReflection::default(),
            slots: FastHashMap::default(),
            log: Log::new(),
        };

        let mut globals = Members::new();
        let mut buffers = Vec::new();
        for (_, decl) in shader.iter() {
            match &decl.kind {
                DeclKind::Struct { fields } => {
                    linker.refuse_link(decl);
                    linker.structs.insert(decl.name.as_str(), fields.as_slice());
                }
                DeclKind::Variable { .. } => globals.extend(linker.variable(decl)),
                DeclKind::ConstantBuffer { members, .. } => {
                    let values: Members = members
                        .iter()
                        .filter_map(|id| linker.variable(&shader.arena[*id]))
                        .collect();
                    buffers.push((decl, values));
                }
                DeclKind::Method { .. } => linker.refuse_link(decl),
            }
        }

        if !globals.is_empty() {
            linker.constant_buffer(GLOBALS_BUFFER, None, globals);
        }
        for (decl, members) in buffers {
            linker.constant_buffer(&decl.name, Some(decl), members);
        }

        log::debug!(
            "linked {} resource bindings and {} constant buffers",
            linker.reflection.resource_bindings.len(),
            linker.reflection.constant_buffers.len()
        );
        (linker.reflection, linker.log)
    }
}

impl<'a> Linker<'a> {
    /// Reserve `count` consecutive slots of a register class.
    fn next_slot(&mut self, kind: BindingKind, count: u32) -> Option<u32> {
        let next = self.slots.entry(kind).or_insert(0);
        let slot = *next;
        *next = slot.checked_add(count)?;
        Some(slot)
    }

    /// Only parameters can carry a `Link` attribute.
    fn refuse_link(&mut self, decl: &Decl) {
        if decl.attribute("Link").is_some() {
            self.log
                .error(MessageKind::LinkError(decl.name.clone()), decl.span.clone());
        }
    }

    /// The parameter key of a variable, its `Link` string if it has one.
    fn key(&mut self, decl: &Decl) -> Option<String> {
        let Some(link) = decl.attribute("Link") else {
            return Some(decl.name.clone());
        };
        match link.string_arg(0) {
            Some(key) if link.args.len() == 1 => Some(key.to_string()),
            _ => {
                self.log.error(
                    MessageKind::LinkArgumentsError(decl.name.clone()),
                    decl.span.clone(),
                );
                None
            }
        }
    }

    /// Bind a resource variable, or describe a value variable for its constant buffer.
    fn variable(&mut self, decl: &Decl) -> Option<(EffectValueDescription, ValueLayout)> {
        let DeclKind::Variable {
            ty, initializer, ..
        } = &decl.kind
        else {
            return None;
        };
        if decl.qualifiers.intersects(Qualifiers::UNLINKED) {
            self.refuse_link(decl);
            return None;
        }
        let key = self.key(decl)?;

        if let Some((resource, kind)) = ParameterType::resource(&ty.name) {
            let slot = array_length(ty).and_then(|count| {
                let count = count.unwrap_or(1);
                let slot = self.next_slot(kind, count).ok_or(LayoutError::TooLarge)?;
                Ok((slot, count))
            });
            let (slot, count) = match slot {
                Ok(slot) => slot,
                Err(error) => {
                    self.log.error(error.message(&decl.name), decl.span.clone());
                    return None;
                }
            };
            if let Some(Initializer::State(fields)) = initializer {
                let description = SamplerStateDescription::parse(&decl.name, fields, &mut self.log);
                self.reflection.sampler_states.push(EffectSamplerState {
                    key: key.clone(),
                    description,
                });
            }
            self.reflection.resource_bindings.push(EffectResourceBinding {
                key,
                raw_name: decl.name.clone(),
                class: ParameterClass::Object,
                ty: resource,
                kind,
                slot,
                slot_count: count,
            });
            return None;
        }

        let described = self
            .value_type(ty)
            .ok_or(LayoutError::UnknownType)
            .and_then(|value| Ok((value, self.layout(ty, &mut Vec::new())?)));
        let ((class, value_type, rows, columns), layout) = match described {
            Ok(described) => described,
            Err(error) => {
                self.log.error(error.message(&decl.name), decl.span.clone());
                return None;
            }
        };
        let description = EffectValueDescription {
            key,
            raw_name: decl.name.clone(),
            type_name: ty.name.clone(),
            class,
            ty: value_type,
            rows,
            columns,
            elements: ty.array_len().unwrap_or(0),
            offset: 0,
            size: layout.size,
        };
        Some((description, layout))
    }

    fn value_type(&self, ty: &TypeRef) -> Option<(ParameterClass, ParameterType, u32, u32)> {
        if self.structs.contains_key(ty.name.as_str()) {
            return Some((ParameterClass::Struct, ParameterType::Void, 1, 1));
        }
        let numeric = numeric_type(&ty.name)?;
        let (value_type, _) = ParameterType::scalar(numeric.scalar)?;
        let class = if numeric.is_matrix {
            ParameterClass::Matrix
        } else if numeric.columns > 1 {
            ParameterClass::Vector
        } else {
            ParameterClass::Scalar
        };
        Some((class, value_type, numeric.rows, numeric.columns))
    }

    /// The register layout of a type. Matrices are column major, one register per column.
    ///
    /// `visiting` holds the structs being laid out, outermost first.
    fn layout(&self, ty: &TypeRef, visiting: &mut Vec<&'a str>) -> Result<ValueLayout, LayoutError> {
        let element = match self.structs.get_key_value(ty.name.as_str()) {
            Some((&name, fields)) => {
                if visiting.contains(&name) {
                    return Err(LayoutError::Recursive(name.to_string()));
                }
                visiting.push(name);
                let mut end = 0;
                for field in fields.iter() {
                    let layout = self.layout(&field.ty, visiting)?;
                    end = layout.end(end).ok_or(LayoutError::TooLarge)?.1;
                }
                visiting.pop();
                ValueLayout {
                    size: end,
                    stride: align_uniform_size(end).ok_or(LayoutError::TooLarge)?,
                    register_aligned: true,
                }
            }
            None => {
                let numeric = numeric_type(&ty.name).ok_or(LayoutError::UnknownType)?;
                let (_, component) =
                    ParameterType::scalar(numeric.scalar).ok_or(LayoutError::UnknownType)?;
                let (registers, last) = if numeric.is_matrix {
                    (numeric.columns, numeric.rows * component)
                } else {
                    (1, numeric.columns * component)
                };
                ValueLayout {
                    size: (registers - 1) * REGISTER_SIZE + last,
                    stride: registers * REGISTER_SIZE,
                    register_aligned: registers > 1,
                }
            }
        };

        Ok(match array_length(ty)? {
            Some(len) if len > 0 => ValueLayout {
                size: (len - 1)
                    .checked_mul(element.stride)
                    .and_then(|size| size.checked_add(element.size))
                    .ok_or(LayoutError::TooLarge)?,
                stride: element.stride,
                register_aligned: true,
            },
            _ => element,
        })
    }

    /// Pack the members of a constant buffer and bind it. `decl` is the buffer's declaration,
    /// absent for `$Globals`.
    fn constant_buffer(&mut self, name: &str, decl: Option<&Decl>, members: Members) {
        let mut end = 0;
        let mut packed = Vec::with_capacity(members.len());
        for (mut member, layout) in members {
            let Some((offset, next)) = layout.end(end) else {
                self.log.error(
                    MessageKind::ParameterTooLarge(member.raw_name.clone()),
                    decl.map(|d| d.span.clone()),
                );
                return;
            };
            member.offset = offset;
            end = next;
            packed.push(member);
        }
        let (Some(size), Some(slot)) = (
            align_uniform_size(end),
            self.next_slot(BindingKind::ConstantBuffer, 1),
        ) else {
            self.log.error(
                MessageKind::ParameterTooLarge(name.to_string()),
                decl.map(|d| d.span.clone()),
            );
            return;
        };

        self.reflection.resource_bindings.push(EffectResourceBinding {
            key: name.to_string(),
            raw_name: name.to_string(),
            class: ParameterClass::Object,
            ty: ParameterType::ConstantBuffer,
            kind: BindingKind::ConstantBuffer,
            slot,
            slot_count: 1,
        });
        self.reflection.constant_buffers.push(EffectConstantBuffer {
            name: name.to_string(),
            size,
            members: packed,
        });
    }
}
