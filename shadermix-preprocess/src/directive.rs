use crate::PreprocessError;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, alphanumeric1, char, digit1, multispace0};
use nom::combinator::{map, map_res, opt, recognize};
use nom::multi::many0_count;
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;
use shadermix_common::map::FastHashMap;
use shadermix_common::ShaderMacro;
use std::borrow::Cow;

const MAX_EXPANSION_PASSES: usize = 8;

struct Conditional {
    parent_active: bool,
    active: bool,
    taken: bool,
    seen_else: bool,
    line: usize,
}

type Defines = FastHashMap<String, String>;

/// Evaluate conditional directives and substitute object-like macros.
///
/// Lines that are inactive or consumed by a directive are replaced with empty lines so that
/// line numbers of the output match the input.
pub(crate) fn run_directives(source: &str, macros: &[ShaderMacro]) -> Result<String, PreprocessError> {
    let mut defines: Defines = macros
        .iter()
        .map(|m| (m.name.clone(), m.definition.clone()))
        .collect();
    let mut stack: Vec<Conditional> = Vec::new();
    let mut output = String::with_capacity(source.len());

    for (index, line) in source.lines().enumerate() {
        let line_no = index + 1;
        let active = stack.last().map_or(true, |c| c.active);
        let trimmed = line.trim_start();

        let Some(directive) = trimmed.strip_prefix('#') else {
            if active {
                output.push_str(&substitute(line, &defines));
            }
            output.push('\n');
            continue;
        };

        let directive = directive.trim_start();
        let (name, rest) = directive
            .split_once(|c: char| c.is_whitespace())
            .map_or((directive, ""), |(name, rest)| (name, rest.trim()));

        match name {
            "if" | "ifdef" | "ifndef" => {
                let condition = active
                    && match name {
                        "ifdef" => defines.contains_key(rest),
                        "ifndef" => !defines.contains_key(rest),
                        _ => evaluate(rest, &defines, line_no)? != 0,
                    };
                stack.push(Conditional {
                    parent_active: active,
                    active: condition,
                    taken: condition,
                    seen_else: false,
                    line: line_no,
                });
            }
            "elif" => {
                let top = stack
                    .last_mut()
                    .filter(|c| !c.seen_else)
                    .ok_or_else(|| unexpected(line_no, name))?;
                if top.parent_active && !top.taken {
                    top.active = evaluate(rest, &defines, line_no)? != 0;
                    top.taken = top.active;
                } else {
                    top.active = false;
                }
            }
            "else" => {
                let top = stack
                    .last_mut()
                    .filter(|c| !c.seen_else)
                    .ok_or_else(|| unexpected(line_no, name))?;
                top.active = top.parent_active && !top.taken;
                top.taken = true;
                top.seen_else = true;
            }
            "endif" => {
                stack.pop().ok_or_else(|| unexpected(line_no, name))?;
            }
            "define" if active => {
                let (macro_name, definition) = rest
                    .split_once(|c: char| c.is_whitespace())
                    .map_or((rest, ""), |(n, d)| (n, d.trim()));
                if macro_name.is_empty() || macro_name.contains('(') {
                    return Err(PreprocessError::MalformedDirective {
                        line: line_no,
                        text: line.to_string(),
                    });
                }
                defines.insert(macro_name.to_string(), definition.to_string());
            }
            "undef" if active => {
                defines.remove(rest);
            }
            "error" if active => {
                return Err(PreprocessError::ErrorDirective {
                    line: line_no,
                    message: rest.to_string(),
                });
            }
            // #line, #pragma and unknown directives belong to the parser.
            _ if active => {
                output.push_str(line);
            }
            _ => {}
        }
        output.push('\n');
    }

    if let Some(unclosed) = stack.last() {
        return Err(PreprocessError::UnterminatedConditional(unclosed.line));
    }

    Ok(output)
}

fn unexpected(line: usize, directive: &str) -> PreprocessError {
    PreprocessError::UnexpectedDirective {
        line,
        directive: directive.to_string(),
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replace identifiers that name a macro with its definition, outside string literals.
pub(crate) fn substitute<'a>(line: &'a str, defines: &Defines) -> Cow<'a, str> {
    if defines.is_empty() {
        return Cow::Borrowed(line);
    }

    let mut current = Cow::Borrowed(line);
    for _ in 0..MAX_EXPANSION_PASSES {
        let mut changed = false;
        let mut output = String::with_capacity(current.len());
        let mut chars = current.char_indices().peekable();
        let mut in_string = false;

        while let Some((start, c)) = chars.next() {
            if c == '"' {
                in_string = !in_string;
                output.push(c);
                continue;
            }
            if in_string || !(c.is_ascii_alphabetic() || c == '_') {
                output.push(c);
                // Skip the rest of a number so suffixes like `1.0f` are not identifiers.
                if !in_string && c.is_ascii_digit() {
                    while let Some(&(_, next)) = chars.peek() {
                        if !is_identifier_char(next) && next != '.' {
                            break;
                        }
                        output.push(next);
                        chars.next();
                    }
                }
                continue;
            }

            let mut end = start + c.len_utf8();
            while let Some(&(index, next)) = chars.peek() {
                if !is_identifier_char(next) {
                    break;
                }
                end = index + next.len_utf8();
                chars.next();
            }

            let identifier = &current[start..end];
            match defines.get(identifier) {
                Some(definition) => {
                    output.push_str(definition);
                    changed = true;
                }
                None => output.push_str(identifier),
            }
        }

        if !changed {
            break;
        }
        current = Cow::Owned(output);
    }
    current
}

fn evaluate(expression: &str, defines: &Defines, line: usize) -> Result<i64, PreprocessError> {
    match delimited(multispace0, |i| or_expr(i, defines), multispace0)(expression) {
        Ok(("", value)) => Ok(value),
        _ => Err(PreprocessError::MalformedDirective {
            line,
            text: expression.to_string(),
        }),
    }
}

fn ws<'a, O>(
    parser: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    preceded(multispace0, parser)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn macro_value(name: &str, defines: &Defines) -> i64 {
    defines
        .get(name)
        .and_then(|definition| definition.trim().parse::<i64>().ok())
        .unwrap_or(0)
}

fn atom<'a>(input: &'a str, defines: &Defines) -> IResult<&'a str, i64> {
    ws(alt((
        map(
            preceded(
                pair(tag("defined"), multispace0),
                alt((
                    delimited(char('('), ws(identifier), ws(char(')'))),
                    identifier,
                )),
            ),
            |name| defines.contains_key(name) as i64,
        ),
        map_res(digit1, str::parse::<i64>),
        delimited(char('('), |i| or_expr(i, defines), ws(char(')'))),
        map(preceded(char('!'), |i| atom(i, defines)), |v| (v == 0) as i64),
        map(preceded(char('-'), |i| atom(i, defines)), |v| -v),
        map(identifier, |name| macro_value(name, defines)),
    )))(input)
}

fn comparison<'a>(input: &'a str, defines: &Defines) -> IResult<&'a str, i64> {
    let (input, lhs) = atom(input, defines)?;
    let (input, rest) = opt(pair(
        ws(alt((
            tag("=="),
            tag("!="),
            tag("<="),
            tag(">="),
            tag("<"),
            tag(">"),
        ))),
        |i| atom(i, defines),
    ))(input)?;

    let value = match rest {
        None => lhs,
        Some((op, rhs)) => (match op {
            "==" => lhs == rhs,
            "!=" => lhs != rhs,
            "<=" => lhs <= rhs,
            ">=" => lhs >= rhs,
            "<" => lhs < rhs,
            _ => lhs > rhs,
        }) as i64,
    };
    Ok((input, value))
}

fn and_expr<'a>(input: &'a str, defines: &Defines) -> IResult<&'a str, i64> {
    let (mut input, mut value) = comparison(input, defines)?;
    while let Ok((rest, rhs)) = preceded(ws(tag("&&")), |i| comparison(i, defines))(input) {
        value = (value != 0 && rhs != 0) as i64;
        input = rest;
    }
    Ok((input, value))
}

fn or_expr<'a>(input: &'a str, defines: &Defines) -> IResult<&'a str, i64> {
    let (mut input, mut value) = and_expr(input, defines)?;
    while let Ok((rest, rhs)) = preceded(ws(tag("||")), |i| and_expr(i, defines))(input) {
        value = (value != 0 || rhs != 0) as i64;
        input = rest;
    }
    Ok((input, value))
}

#[cfg(test)]
mod test {
    use crate::directive::{run_directives, substitute};
    use crate::PreprocessError;
    use shadermix_common::map::FastHashMap;
    use shadermix_common::ShaderMacro;

    #[test]
    fn keeps_line_count() {
        let source = "#ifdef A\nfloat a;\n#else\nfloat b;\n#endif\nfloat c;\n";
        let output = run_directives(source, &[]).unwrap();
        assert_eq!(source.lines().count(), output.lines().count());
        assert_eq!("\n\n\nfloat b;\n\nfloat c;\n", output);
    }

    #[test]
    fn evaluates_if_expressions() {
        let macros = [ShaderMacro::new("LIGHTS", 4), ShaderMacro::new("SHADOWS", "")];
        let source = "#if LIGHTS > 2 && defined(SHADOWS)\nyes\n#elif LIGHTS\nno\n#endif\n";
        let output = run_directives(source, &macros).unwrap();
        assert!(output.contains("yes"));
        assert!(!output.contains("no"));

        let source = "#if !defined SHADOWS || LIGHTS == 1\nyes\n#elif LIGHTS\nelif\n#endif\n";
        let output = run_directives(source, &macros).unwrap();
        assert!(output.contains("elif"));
        assert!(!output.contains("yes"));
    }

    #[test]
    fn nested_inactive_branches_stay_inactive() {
        let source = "#ifdef A\n#ifndef B\ninner\n#else\nelse\n#endif\n#endif\n";
        let output = run_directives(source, &[]).unwrap();
        assert_eq!(source.lines().count(), output.lines().count());
        assert!(!output.contains("inner"));
        assert!(!output.contains("else"));
    }

    #[test]
    fn substitutes_defines() {
        let source = "#define SCALE 2.0\n#define DOUBLE_SCALE (SCALE * SCALE)\nfloat x = DOUBLE_SCALE;\n";
        let output = run_directives(source, &[]).unwrap();
        assert!(output.contains("float x = (2.0 * 2.0);"));
    }

    #[test]
    fn does_not_substitute_inside_strings_or_numbers() {
        let mut defines = FastHashMap::default();
        defines.insert("f".to_string(), "g".to_string());
        defines.insert("Name".to_string(), "Other".to_string());
        assert_eq!(
            "[Link(\"Name\")] float v = 1.0f * g;",
            substitute("[Link(\"Name\")] float v = 1.0f * f;", &defines)
        );
    }

    #[test]
    fn reports_unterminated() {
        assert!(matches!(
            run_directives("#ifdef A\n", &[]),
            Err(PreprocessError::UnterminatedConditional(1))
        ));
        assert!(matches!(
            run_directives("#endif\n", &[]),
            Err(PreprocessError::UnexpectedDirective { line: 1, .. })
        ));
    }

    #[test]
    fn reports_error_directive() {
        let err = run_directives("#ifndef X\n#error X is required\n#endif\n", &[]);
        assert!(matches!(err, Err(PreprocessError::ErrorDirective { line: 2, .. })));
    }
}
