use crate::error::ShaderMixinError;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, multispace0};
use nom::combinator::{all_consuming, map, opt};
use nom::multi::separated_list1;
use nom::sequence::{delimited, pair, preceded, separated_pair, terminated};
use nom::IResult;
use shadermix_common::ShaderMacro;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A reference to one named class, with optional generic arguments.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderClassSource {
    pub class_name: String,
    pub generic_arguments: Vec<String>,
}

impl ShaderClassSource {
    pub fn new(class_name: impl Into<String>) -> Self {
        ShaderClassSource {
            class_name: class_name.into(),
            generic_arguments: Vec::new(),
        }
    }

    pub fn with_generics(
        class_name: impl Into<String>,
        generic_arguments: impl IntoIterator<Item = impl ToString>,
    ) -> Self {
        ShaderClassSource {
            class_name: class_name.into(),
            generic_arguments: generic_arguments.into_iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// A class made of one or more base classes whose composition variables are filled.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ShaderMixinSource {
    pub base_classes: Vec<ShaderClassSource>,
    /// Composition slot names and what to compose into them, in order.
    pub compositions: Vec<(String, ShaderSource)>,
    pub macros: Vec<ShaderMacro>,
}

impl ShaderMixinSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mixin(mut self, class: ShaderClassSource) -> Self {
        self.base_classes.push(class);
        self
    }

    pub fn compose(mut self, slot: impl Into<String>, source: impl Into<ShaderSource>) -> Self {
        self.compositions.push((slot.into(), source.into()));
        self
    }

    pub fn define(mut self, shader_macro: ShaderMacro) -> Self {
        self.macros.push(shader_macro);
        self
    }
}

/// An ordered list of sources composed into one array slot.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ShaderArraySource {
    pub values: Vec<ShaderSource>,
}

/// A tree describing the effect to compile.
///
/// The compact text form parsed by [`FromStr`] is
/// `Root<1,2>+Extra(light=PointLight, lights=[SpotLight,PointLight])`: classes joined by `+`
/// are mixed together, generic arguments go in angle brackets, compositions in parentheses and
/// arrays in square brackets.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShaderSource {
    Class(ShaderClassSource),
    Mixin(ShaderMixinSource),
    Array(ShaderArraySource),
}

impl ShaderSource {
    pub fn class(name: impl Into<String>) -> Self {
        ShaderSource::Class(ShaderClassSource::new(name))
    }

    pub fn array(values: impl IntoIterator<Item = ShaderSource>) -> Self {
        ShaderSource::Array(ShaderArraySource {
            values: values.into_iter().collect(),
        })
    }

    /// Every macro declared by mixin sources in the tree, depth first.
    pub fn collect_macros(&self) -> Vec<ShaderMacro> {
        fn visit(source: &ShaderSource, out: &mut Vec<ShaderMacro>) {
            match source {
                ShaderSource::Class(_) => {}
                ShaderSource::Mixin(mixin) => {
                    out.extend(mixin.macros.iter().cloned());
                    for (_, composition) in &mixin.compositions {
                        visit(composition, out);
                    }
                }
                ShaderSource::Array(array) => array.values.iter().for_each(|v| visit(v, out)),
            }
        }

        let mut macros = Vec::new();
        visit(self, &mut macros);
        macros
    }
}

impl From<ShaderClassSource> for ShaderSource {
    fn from(value: ShaderClassSource) -> Self {
        ShaderSource::Class(value)
    }
}

impl From<ShaderMixinSource> for ShaderSource {
    fn from(value: ShaderMixinSource) -> Self {
        ShaderSource::Mixin(value)
    }
}

impl From<ShaderArraySource> for ShaderSource {
    fn from(value: ShaderArraySource) -> Self {
        ShaderSource::Array(value)
    }
}

impl Display for ShaderClassSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.class_name)?;
        if !self.generic_arguments.is_empty() {
            write!(f, "<{}>", self.generic_arguments.join(","))?;
        }
        Ok(())
    }
}

impl Display for ShaderSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderSource::Class(class) => write!(f, "{class}"),
            ShaderSource::Mixin(mixin) => {
                for (i, class) in mixin.base_classes.iter().enumerate() {
                    if i > 0 {
                        f.write_str("+")?;
                    }
                    write!(f, "{class}")?;
                }
                if !mixin.compositions.is_empty() {
                    f.write_str("(")?;
                    for (i, (slot, source)) in mixin.compositions.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{slot}={source}")?;
                    }
                    f.write_str(")")?;
                }
                Ok(())
            }
            ShaderSource::Array(array) => {
                f.write_str("[")?;
                for (i, value) in array.values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

fn ws<'a, O>(
    parser: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(multispace0, parser, multispace0)
}

fn name(input: &str) -> IResult<&str, &str> {
    ws(take_while1(|c: char| c.is_alphanumeric() || c == '_'))(input)
}

fn generic_argument(input: &str) -> IResult<&str, String> {
    map(ws(take_while1(|c: char| c != ',' && c != '>')), |s: &str| {
        s.trim().to_string()
    })(input)
}

fn class_source(input: &str) -> IResult<&str, ShaderClassSource> {
    map(
        pair(
            name,
            opt(delimited(
                char('<'),
                separated_list1(char(','), generic_argument),
                char('>'),
            )),
        ),
        |(name, generics)| ShaderClassSource {
            class_name: name.to_string(),
            generic_arguments: generics.unwrap_or_default(),
        },
    )(input)
}

fn composition(input: &str) -> IResult<&str, (String, ShaderSource)> {
    map(
        separated_pair(name, char('='), source_tree),
        |(slot, source)| (slot.to_string(), source),
    )(input)
}

fn mixin_source(input: &str) -> IResult<&str, ShaderSource> {
    map(
        pair(
            separated_list1(char('+'), class_source),
            opt(delimited(
                ws(char('(')),
                separated_list1(char(','), composition),
                ws(char(')')),
            )),
        ),
        |(mut base_classes, compositions)| match compositions {
            None if base_classes.len() == 1 => ShaderSource::Class(base_classes.remove(0)),
            compositions => ShaderSource::Mixin(ShaderMixinSource {
                base_classes,
                compositions: compositions.unwrap_or_default(),
                macros: Vec::new(),
            }),
        },
    )(input)
}

fn array_source(input: &str) -> IResult<&str, ShaderSource> {
    map(
        preceded(
            ws(char('[')),
            terminated(separated_list1(char(','), source_tree), ws(tag("]"))),
        ),
        ShaderSource::array,
    )(input)
}

fn source_tree(input: &str) -> IResult<&str, ShaderSource> {
    alt((array_source, mixin_source))(input)
}

impl FromStr for ShaderSource {
    type Err = ShaderMixinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match all_consuming(source_tree)(s) {
            Ok((_, source)) => Ok(source),
            Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(ShaderMixinError::MalformedSource {
                source_text: s.to_string(),
                offset: s.len() - e.input.len(),
            }),
            Err(nom::Err::Incomplete(_)) => Err(ShaderMixinError::MalformedSource {
                source_text: s.to_string(),
                offset: s.len(),
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::source::{ShaderClassSource, ShaderSource};
    use std::str::FromStr;

    #[test]
    fn parses_single_class() {
        assert_eq!(
            ShaderSource::class("Material"),
            ShaderSource::from_str("Material").unwrap()
        );
    }

    #[test]
    fn parses_tree() {
        let source =
            ShaderSource::from_str("Root<1, 2.0>+Extra(light=PointLight, lights=[A, B<3>, C])")
                .unwrap();
        let ShaderSource::Mixin(mixin) = &source else {
            panic!("expected a mixin, got {source:?}");
        };
        assert_eq!(
            vec![
                ShaderClassSource::with_generics("Root", ["1", "2.0"]),
                ShaderClassSource::new("Extra")
            ],
            mixin.base_classes
        );
        assert_eq!("light", mixin.compositions[0].0);
        assert_eq!(ShaderSource::class("PointLight"), mixin.compositions[0].1);
        let ShaderSource::Array(lights) = &mixin.compositions[1].1 else {
            panic!("expected an array");
        };
        assert_eq!(3, lights.values.len());
        assert_eq!(
            ShaderSource::Class(ShaderClassSource::with_generics("B", [3])),
            lights.values[1]
        );
        assert_eq!(
            "Root<1,2.0>+Extra(light=PointLight, lights=[A,B<3>,C])",
            source.to_string()
        );
    }

    #[test]
    fn nested_compositions() {
        let source = ShaderSource::from_str("Material(albedo=Texture(uv=TexCoord))").unwrap();
        let ShaderSource::Mixin(mixin) = source else {
            panic!("expected a mixin");
        };
        assert!(matches!(mixin.compositions[0].1, ShaderSource::Mixin(_)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(ShaderSource::from_str("Material(albedo=").is_err());
        assert!(ShaderSource::from_str("").is_err());
    }
}
