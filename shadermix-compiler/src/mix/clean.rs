use crate::ast::{DeclKind, Qualifiers, Shader};

/// Attributes that only carry meaning for mixing and reflection.
const MIXIN_ATTRIBUTES: [&str; 4] = ["Link", "Color", "Map", "Summary"];

/// Removes what a shader compiler would not understand from a linked shader.
#[derive(Debug, Default, Copy, Clone)]
pub struct ShaderCleaner;

impl ShaderCleaner {
    pub fn clean(&self, shader: &mut Shader) {
        for decl in shader.arena.iter_mut() {
            decl.qualifiers.remove(Qualifiers::MIXIN);
            decl.attributes
                .retain(|a| !MIXIN_ATTRIBUTES.contains(&a.name.as_str()));
        }

        let arena = &shader.arena;
        shader.declarations.retain(|id| {
            !matches!(arena[*id].kind, DeclKind::Method { body: None, .. })
        });
    }
}

#[cfg(test)]
mod test {
    use crate::ast::{Attribute, Decl, DeclKind, Expr, Qualifiers, Shader, SourceSpan, TypeRef};
    use crate::mix::ShaderCleaner;

    #[test]
    fn strips_mixin_syntax() {
        let mut shader = Shader::default();
        let mut variable = Decl::new(
            "Color",
            DeclKind::Variable {
                ty: TypeRef::named("float4"),
                semantic: None,
                initializer: None,
            },
            SourceSpan::synthesized(),
        );
        variable.qualifiers = Qualifiers::STAGE | Qualifiers::STATIC;
        variable.attributes = vec![
            Attribute::new(
                "Link",
                vec![Expr::string("Material.Color", SourceSpan::synthesized())],
            ),
            Attribute::new("Color", Vec::new()),
            Attribute::new("numthreads", Vec::new()),
        ];
        let method = |body| {
            Decl::new(
                "Shade",
                DeclKind::Method {
                    return_type: TypeRef::named("void"),
                    params: Vec::new(),
                    semantic: None,
                    body,
                },
                SourceSpan::synthesized(),
            )
        };

        for decl in [variable, method(None), method(Some(Vec::new()))] {
            let id = shader.arena.alloc(decl);
            shader.declarations.push(id);
        }

        ShaderCleaner.clean(&mut shader);
        assert_eq!(2, shader.declarations.len());
        let color = shader.find("Color").unwrap();
        assert_eq!(Qualifiers::STATIC, color.qualifiers);
        assert_eq!(1, color.attributes.len());
        assert_eq!("numthreads", color.attributes[0].name);
        assert!(matches!(
            shader.find("Shade").unwrap().kind,
            DeclKind::Method { body: Some(_), .. }
        ));
    }
}
