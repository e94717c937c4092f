use crate::ast::{Expr, ExprKind, Literal, StateField, UnaryOp};
use crate::result::{Log, MessageKind};
use std::str::FromStr;

/// The filtering of a sampler state.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum TextureFilter {
    Point,
    #[default]
    Linear,
    MinMagLinearMipPoint,
    Anisotropic,
    ComparisonPoint,
    ComparisonMinMagLinearMipPoint,
}

/// A state block value that is not supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedStateValue;

impl FromStr for TextureFilter {
    type Err = UnsupportedStateValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "MIN_MAG_MIP_POINT" => TextureFilter::Point,
            "MIN_MAG_MIP_LINEAR" => TextureFilter::Linear,
            "MIN_MAG_LINEAR_MIP_POINT" => TextureFilter::MinMagLinearMipPoint,
            "ANISOTROPIC" => TextureFilter::Anisotropic,
            "COMPARISON_MIN_MAG_MIP_POINT" => TextureFilter::ComparisonPoint,
            "COMPARISON_MIN_MAG_LINEAR_MIP_POINT" => TextureFilter::ComparisonMinMagLinearMipPoint,
            _ => return Err(UnsupportedStateValue),
        })
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum TextureAddressMode {
    Wrap,
    Mirror,
    #[default]
    Clamp,
    Border,
    MirrorOnce,
}

impl FromStr for TextureAddressMode {
    type Err = UnsupportedStateValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "wrap" => TextureAddressMode::Wrap,
            "mirror" => TextureAddressMode::Mirror,
            "clamp" => TextureAddressMode::Clamp,
            "border" => TextureAddressMode::Border,
            "mirroronce" | "mirror_once" => TextureAddressMode::MirrorOnce,
            _ => return Err(UnsupportedStateValue),
        })
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum ComparisonFunction {
    #[default]
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

impl FromStr for ComparisonFunction {
    type Err = UnsupportedStateValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "never" => ComparisonFunction::Never,
            "less" => ComparisonFunction::Less,
            "equal" => ComparisonFunction::Equal,
            "lessequal" | "less_equal" => ComparisonFunction::LessEqual,
            "greater" => ComparisonFunction::Greater,
            "notequal" | "not_equal" => ComparisonFunction::NotEqual,
            "greaterequal" | "greater_equal" => ComparisonFunction::GreaterEqual,
            "always" => ComparisonFunction::Always,
            _ => return Err(UnsupportedStateValue),
        })
    }
}

/// A sampler state declared with a state block.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SamplerStateDescription {
    pub filter: TextureFilter,
    pub address_u: TextureAddressMode,
    pub address_v: TextureAddressMode,
    pub address_w: TextureAddressMode,
    pub comparison_function: ComparisonFunction,
    pub border_color: [f32; 4],
    pub min_mip_level: f32,
    pub max_mip_level: f32,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
}

impl Default for SamplerStateDescription {
    fn default() -> Self {
        SamplerStateDescription {
            filter: TextureFilter::Linear,
            address_u: TextureAddressMode::Clamp,
            address_v: TextureAddressMode::Clamp,
            address_w: TextureAddressMode::Clamp,
            comparison_function: ComparisonFunction::Never,
            border_color: [0.0; 4],
            min_mip_level: 0.0,
            max_mip_level: f32::MAX,
            mip_lod_bias: 0.0,
            max_anisotropy: 16,
        }
    }
}

fn number(expr: &Expr) -> Option<f64> {
    match &expr.kind {
        ExprKind::Literal(Literal::Int(n)) => Some(*n as f64),
        ExprKind::Literal(Literal::Float(f)) => Some(*f),
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand,
        } => number(operand).map(|n| -n),
        _ => None,
    }
}

fn border_color(expr: &Expr) -> Option<[f32; 4]> {
    let ExprKind::Call { callee, args } = &expr.kind else {
        return None;
    };
    if callee.as_ident() != Some("float4") || args.len() != 4 {
        return None;
    }
    let mut color = [0.0; 4];
    for (channel, arg) in color.iter_mut().zip(args) {
        *channel = number(arg)? as f32;
    }
    Some(color)
}

fn state_value<T: FromStr>(field: &StateField) -> Option<T> {
    field.value.as_ident().and_then(|v| v.parse().ok())
}

impl SamplerStateDescription {
    /// Build a description from the fields of a state block. Unsupported fields are reported and
    /// leave the default in place.
    pub fn parse(sampler: &str, fields: &[StateField], log: &mut Log) -> Self {
        let mut description = SamplerStateDescription::default();
        for field in fields {
            let span = field.span.clone();
            let unsupported = || MessageKind::SamplerFieldNotSupported(field.key.clone());
            match field.key.as_str() {
                "Filter" => match state_value(field) {
                    Some(filter) => description.filter = filter,
                    None => log.error(
                        MessageKind::SamplerFilterNotSupported(
                            field.value.as_ident().unwrap_or("expression").to_string(),
                        ),
                        span,
                    ),
                },
                "AddressU" | "AddressV" | "AddressW" => match state_value(field) {
                    Some(mode) => match field.key.as_str() {
                        "AddressU" => description.address_u = mode,
                        "AddressV" => description.address_v = mode,
                        _ => description.address_w = mode,
                    },
                    None => log.error(unsupported(), span),
                },
                "ComparisonFunc" => match state_value(field) {
                    Some(function) => description.comparison_function = function,
                    None => log.error(unsupported(), span),
                },
                "BorderColor" => match border_color(&field.value) {
                    Some(color) => description.border_color = color,
                    None => log.error(
                        MessageKind::SamplerBorderColorNotSupported(sampler.to_string()),
                        span,
                    ),
                },
                "MinLOD" | "MaxLOD" | "MipLODBias" => match number(&field.value) {
                    Some(value) => match field.key.as_str() {
                        "MinLOD" => description.min_mip_level = value as f32,
                        "MaxLOD" => description.max_mip_level = value as f32,
                        _ => description.mip_lod_bias = value as f32,
                    },
                    None => log.error(unsupported(), span),
                },
                "MaxAnisotropy" => match number(&field.value) {
                    Some(value) if value >= 0.0 => description.max_anisotropy = value as u32,
                    _ => log.error(unsupported(), span),
                },
                _ => log.error(unsupported(), span),
            }
        }
        description
    }
}

#[cfg(test)]
mod test {
    use crate::ast::{DeclKind, Initializer, StateField};
    use crate::front::{MixinParser, ShaderParser};
    use crate::reflect::{
        ComparisonFunction, SamplerStateDescription, TextureAddressMode, TextureFilter,
    };
    use crate::result::{Log, MessageKind};

    fn fields(block: &str) -> Vec<StateField> {
        let source = format!("shader S {{ SamplerState Sampler {block}; }};");
        let mut output = MixinParser.parse(&source, "S.mxsl");
        assert!(output.log.is_empty(), "{}", output.log);
        let class = output.classes.remove(0);
        let decl = &class.arena[class.members[0]];
        match &decl.kind {
            DeclKind::Variable {
                initializer: Some(Initializer::State(fields)),
                ..
            } => fields.clone(),
            _ => panic!("no state block"),
        }
    }

    #[test]
    fn parses_state_blocks() {
        let mut log = Log::new();
        let description = SamplerStateDescription::parse(
            "Sampler",
            &fields(
                "{ Filter = COMPARISON_MIN_MAG_LINEAR_MIP_POINT; AddressU = Wrap; \
                 AddressV = Mirror; ComparisonFunc = LessEqual; MaxAnisotropy = 4; \
                 BorderColor = float4(1, 0.5, 0, -1); MaxLOD = 8; }",
            ),
            &mut log,
        );
        assert!(log.is_empty(), "{log}");
        assert_eq!(
            TextureFilter::ComparisonMinMagLinearMipPoint,
            description.filter
        );
        assert_eq!(TextureAddressMode::Wrap, description.address_u);
        assert_eq!(TextureAddressMode::Mirror, description.address_v);
        assert_eq!(TextureAddressMode::Clamp, description.address_w);
        assert_eq!(ComparisonFunction::LessEqual, description.comparison_function);
        assert_eq!(4, description.max_anisotropy);
        assert_eq!([1.0, 0.5, 0.0, -1.0], description.border_color);
        assert_eq!(8.0, description.max_mip_level);
    }

    #[test]
    fn defaults() {
        let description = SamplerStateDescription::default();
        assert_eq!(TextureFilter::Linear, description.filter);
        assert_eq!(16, description.max_anisotropy);
    }

    #[test]
    fn reports_unsupported_fields() {
        let mut log = Log::new();
        SamplerStateDescription::parse(
            "Sampler",
            &fields("{ Filter = MIN_POINT_MAG_LINEAR; Speed = 2; BorderColor = 1; }"),
            &mut log,
        );
        let kinds: Vec<_> = log.errors().map(|e| e.kind.clone()).collect();
        assert_eq!(
            vec![
                MessageKind::SamplerFilterNotSupported("MIN_POINT_MAG_LINEAR".into()),
                MessageKind::SamplerFieldNotSupported("Speed".into()),
                MessageKind::SamplerBorderColorNotSupported("Sampler".into()),
            ],
            kinds
        );
    }
}
