use crate::ast::visit::{walk_decl, walk_expr, walk_type, VisitMut};
use crate::ast::{Expr, ExprKind, ShaderClass, TypeRef};
use crate::front::ShaderParser;
use crate::result::{Log, MessageKind};
use shadermix_common::map::{FastHashMap, FastHashSet};
use shadermix_common::SourceHash;

/// The class name of a generic class instantiated with the given arguments.
pub fn generic_instance_name(name: &str, arguments: &[String]) -> String {
    format!("{name}_{}", SourceHash::of(arguments.join(",")).short(8))
}

fn default_argument(ty: &TypeRef) -> &'static str {
    if ty.name == "bool" {
        "false"
    } else {
        "0"
    }
}

struct Substitution {
    values: FastHashMap<String, (String, Expr)>,
}

impl Substitution {
    fn text(&self, name: &str) -> Option<&String> {
        self.values.get(name).map(|(text, _)| text)
    }
}

impl VisitMut for Substitution {
    fn visit_expr(&mut self, expr: &mut Expr) {
        let replacement = match &expr.kind {
            ExprKind::Ident(name) => self.values.get(name).map(|(_, value)| value.kind.clone()),
            _ => None,
        };
        match replacement {
            Some(kind) => expr.kind = kind,
            None => walk_expr(self, expr),
        }
    }

    fn visit_type(&mut self, ty: &mut TypeRef) {
        if let Some(text) = self.text(&ty.name) {
            ty.name = text.clone();
        }
        for argument in &mut ty.template {
            if let Some(text) = self.text(argument) {
                *argument = text.clone();
            }
        }
        walk_type(self, ty)
    }

    fn visit_semantic(&mut self, semantic: &mut String) {
        if let Some(text) = self.text(semantic) {
            *semantic = text.clone();
        }
    }
}

/// Substitute generic arguments into a parsed class and give it its instance name.
///
/// Classes without generic parameters are returned unchanged when no arguments are given.
pub(crate) fn instantiate(
    mut class: ShaderClass,
    arguments: &[String],
    allow_defaults: bool,
    parser: &dyn ShaderParser,
    log: &mut Log,
) -> Option<ShaderClass> {
    let mut seen = FastHashSet::default();
    for generic in &class.generics {
        if !seen.insert(generic.name.as_str()) {
            log.error(
                MessageKind::SameNameGenerics {
                    class: class.name.clone(),
                    name: generic.name.clone(),
                },
                class.span.clone(),
            );
            return None;
        }
    }

    if class.generics.is_empty() && arguments.is_empty() {
        return Some(class);
    }

    let mut arguments = arguments.to_vec();
    if arguments.len() != class.generics.len() {
        if !allow_defaults || arguments.len() > class.generics.len() {
            log.error(
                MessageKind::WrongGenericNumber {
                    class: class.name.clone(),
                    expected: class.generics.len(),
                    actual: arguments.len(),
                },
                class.span.clone(),
            );
            return None;
        }

        log::debug!(
            "filling {} missing generic arguments of {} with defaults",
            class.generics.len() - arguments.len(),
            class.name
        );
        let missing = &class.generics[arguments.len()..];
        arguments.extend(missing.iter().map(|g| default_argument(&g.ty).to_string()));
    }

    let mut values = FastHashMap::default();
    for (generic, argument) in class.generics.iter().zip(&arguments) {
        let Some(value) = parser.parse_expression(argument) else {
            log.error(
                MessageKind::ParseError(format!(
                    "invalid argument `{argument}` for generic parameter `{}` of `{}`",
                    generic.name, class.name
                )),
                class.span.clone(),
            );
            return None;
        };
        values.insert(generic.name.clone(), (argument.clone(), value));
    }

    let mut substitution = Substitution { values };
    for decl in class.arena.iter_mut() {
        walk_decl(&mut substitution, decl);
    }
    for base in &mut class.bases {
        for argument in &mut base.generic_arguments {
            if let Some(text) = substitution.text(argument) {
                *argument = text.clone();
            }
        }
    }

    class.name = generic_instance_name(&class.name, &arguments);
    class.generics.clear();
    Some(class)
}

#[cfg(test)]
mod test {
    use crate::ast::{ArrayDim, DeclKind, ExprKind, Literal, StmtKind};
    use crate::front::{MixinParser, ShaderParser};
    use crate::library::generics::{generic_instance_name, instantiate};
    use crate::result::{Log, MessageKind};

    const BLUR: &str = r#"
shader Blur<int Radius, float Scale, bool Vertical> : Kernel<Radius>
{
    float weights[Radius];
    float Sum()
    {
        if (Vertical) return Scale * Radius;
        return 0;
    }
};
"#;

    fn blur() -> crate::ast::ShaderClass {
        MixinParser.parse(BLUR, "Blur.mxsl").classes.remove(0)
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn substitutes_arguments() {
        let mut log = Log::new();
        let class = instantiate(blur(), &args(&["3", "0.5", "true"]), false, &MixinParser, &mut log)
            .unwrap();
        assert!(log.is_empty());
        assert_eq!(generic_instance_name("Blur", &args(&["3", "0.5", "true"])), class.name);
        assert!(class.generics.is_empty());
        assert_eq!(vec!["3"], class.bases[0].generic_arguments);

        let weights = &class.arena[class.members[0]];
        let ty = weights.variable_type().unwrap();
        assert_eq!(Some(3), ty.array_len());
        assert!(matches!(ty.array, Some(ArrayDim::Sized(_))));

        let DeclKind::Method { body: Some(body), .. } = &class.arena[class.members[1]].kind else {
            panic!("expected a method body");
        };
        let StmtKind::If { condition, .. } = &body[0].kind else {
            panic!("expected an if statement");
        };
        assert_eq!(ExprKind::Literal(Literal::Bool(true)), condition.kind);
    }

    #[test]
    fn instance_names_depend_on_arguments() {
        let a = generic_instance_name("Blur", &args(&["3"]));
        let b = generic_instance_name("Blur", &args(&["4"]));
        assert_ne!(a, b);
        assert!(a.starts_with("Blur_"));
        assert_eq!("Blur_".len() + 8, a.len());
    }

    #[test]
    fn wrong_generic_number() {
        let mut log = Log::new();
        assert!(instantiate(blur(), &args(&["3"]), false, &MixinParser, &mut log).is_none());
        assert!(matches!(
            log.errors().next().unwrap().kind,
            MessageKind::WrongGenericNumber {
                expected: 3,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn missing_arguments_default() {
        let mut log = Log::new();
        let class = instantiate(blur(), &args(&["3"]), true, &MixinParser, &mut log).unwrap();
        assert!(!log.has_errors());
        assert_eq!(generic_instance_name("Blur", &args(&["3", "0", "false"])), class.name);
    }

    #[test]
    fn same_name_generics() {
        let class = MixinParser
            .parse("shader Twice<int A, float A> {};", "Twice.mxsl")
            .classes
            .remove(0);
        let mut log = Log::new();
        assert!(instantiate(class, &args(&["1", "2"]), false, &MixinParser, &mut log).is_none());
        assert!(matches!(
            log.errors().next().unwrap().kind,
            MessageKind::SameNameGenerics { .. }
        ));
    }
}
