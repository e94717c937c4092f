use crate::ast::{
    ArrayDim, Attribute, BaseClass, BinaryOp, ConstantBufferKind, Decl, DeclKind, Expr, ExprKind,
    GenericParam, Initializer, Literal, Param, Qualifiers, ShaderClass, SourceSpan, StateField,
    Stmt, StmtKind, TypeRef, UnaryOp,
};
use crate::front::{ParseOutput, ShaderParser};
use crate::result::{Log, MessageKind};
use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take, take_till, take_while};
use nom::character::complete::{char, hex_digit1, multispace0, one_of, satisfy};
use nom::combinator::{all_consuming, cut, eof, map, map_opt, not, opt, recognize, rest, value, verify};
use nom::multi::{many0, separated_list0, separated_list1};
use nom::number::complete::recognize_float;
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::IResult;
use nom_locate::{position, LocatedSpan};
use shadermix_common::ShaderStage;
use std::str::FromStr;
use std::sync::Arc;

/// Maps lines of preprocessed text back to the files and lines named by `#line` markers.
struct LineMap {
    file: Arc<str>,
    lines: Vec<(Arc<str>, u32)>,
}

impl LineMap {
    fn new(source: &str, file_name: &str) -> Self {
        let file: Arc<str> = Arc::from(file_name);
        let mut current = Arc::clone(&file);
        let mut next_line = 1;
        let mut lines = Vec::new();

        for line in source.split('\n') {
            lines.push((Arc::clone(&current), next_line));
            match parse_line_marker(line) {
                Some((number, name)) => {
                    next_line = number;
                    if let Some(name) = name {
                        current = Arc::from(name);
                    }
                }
                None => next_line += 1,
            }
        }

        LineMap { file, lines }
    }

    fn span(&self, line: u32, column: u32) -> SourceSpan {
        match self.lines.get((line as usize).saturating_sub(1)) {
            Some((file, original)) => SourceSpan::new(Arc::clone(file), *original, column),
            None => SourceSpan::new(Arc::clone(&self.file), line, column),
        }
    }
}

fn parse_line_marker(line: &str) -> Option<(u32, Option<&str>)> {
    let rest = line.trim_start().strip_prefix('#')?.trim_start();
    let rest = rest.strip_prefix("line")?;
    let mut parts = rest.split_whitespace();
    let number = parts.next()?.parse().ok()?;
    let name = parts.next().map(|n| n.trim_matches('"'));
    Some((number, name))
}

type Input<'a> = LocatedSpan<&'a str, &'a LineMap>;
type PResult<'a, O> = IResult<Input<'a>, O>;

const KEYWORDS: &[&str] = &[
    "shader", "cbuffer", "rgroup", "struct", "return", "if", "else", "for", "foreach", "while",
    "break", "continue", "discard", "true", "false", "stage", "stream", "compose", "static",
    "const", "groupshared", "override", "abstract", "clone", "in", "out", "inout",
];

fn span_of(input: &Input) -> SourceSpan {
    input
        .extra
        .span(input.location_line(), input.get_utf8_column() as u32)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Skip whitespace, comments and directive lines left by the preprocessor.
fn skip(mut input: Input) -> PResult<()> {
    loop {
        let spaced: PResult<Input> = multispace0(input);
        input = spaced?.0;
        let fragment = *input.fragment();
        let skipped: PResult<Input> = if fragment.starts_with("//") || fragment.starts_with('#') {
            take_till(|c| c == '\n')(input)
        } else if fragment.starts_with("/*") {
            match fragment.find("*/") {
                Some(end) => take(end + 2)(input),
                None => rest(input),
            }
        } else {
            return Ok((input, ()));
        };
        input = skipped?.0;
    }
}

fn located(input: Input) -> PResult<SourceSpan> {
    map(preceded(skip, position), |p: Input| span_of(&p))(input)
}

fn tok<'a, O>(
    parser: impl FnMut(Input<'a>) -> PResult<'a, O>,
) -> impl FnMut(Input<'a>) -> PResult<'a, O> {
    preceded(skip, parser)
}

fn symbol<'a>(text: &'static str) -> impl FnMut(Input<'a>) -> PResult<'a, Input<'a>> {
    tok(tag(text))
}

fn word(input: Input) -> PResult<Input> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_ident_char),
    ))(input)
}

fn keyword<'a>(text: &'static str) -> impl FnMut(Input<'a>) -> PResult<'a, Input<'a>> {
    tok(terminated(tag(text), not(satisfy(is_ident_char))))
}

fn identifier(input: Input) -> PResult<String> {
    map(
        tok(verify(word, |w: &Input| !KEYWORDS.contains(w.fragment()))),
        |w| w.fragment().to_string(),
    )(input)
}

/// `=` that is not the start of `==`.
fn assign_eq(input: Input) -> PResult<Input> {
    tok(terminated(tag("="), not(char('='))))(input)
}

fn string_literal(input: Input) -> PResult<String> {
    map(
        delimited(char('"'), take_till(|c| c == '"'), char('"')),
        |s: Input| s.fragment().to_string(),
    )(input)
}

fn number(input: Input) -> PResult<Literal> {
    let hex = map_opt(
        terminated(
            preceded(tag_no_case("0x"), hex_digit1),
            opt(one_of("uUlL")),
        ),
        |digits: Input| i64::from_str_radix(digits.fragment(), 16).ok().map(Literal::Int),
    );

    let decimal = map_opt(
        terminated(
            pair(recognize_float, opt(one_of("fFhHuUlL"))),
            not(satisfy(is_ident_char)),
        ),
        |(text, suffix): (Input, Option<char>)| {
            let text = *text.fragment();
            let is_float = text.contains(['.', 'e', 'E']) || matches!(suffix, Some('f' | 'F' | 'h' | 'H'));
            if is_float {
                text.parse::<f64>().ok().map(Literal::Float)
            } else {
                text.parse::<i64>().ok().map(Literal::Int)
            }
        },
    );

    alt((hex, decimal))(input)
}

fn literal(input: Input) -> PResult<Literal> {
    tok(alt((
        value(Literal::Bool(true), terminated(tag("true"), not(satisfy(is_ident_char)))),
        value(Literal::Bool(false), terminated(tag("false"), not(satisfy(is_ident_char)))),
        map(string_literal, Literal::String),
        number,
    )))(input)
}

fn attribute(input: Input) -> PResult<Attribute> {
    map(
        delimited(
            symbol("["),
            pair(
                identifier,
                opt(delimited(
                    symbol("("),
                    separated_list0(symbol(","), expr),
                    symbol(")"),
                )),
            ),
            symbol("]"),
        ),
        |(name, args)| Attribute::new(name, args.unwrap_or_default()),
    )(input)
}

fn attributes(input: Input) -> PResult<Vec<Attribute>> {
    many0(attribute)(input)
}

fn qualifiers(input: Input) -> PResult<Qualifiers> {
    let qualifier = map_opt(tok(word), |w: Input| Qualifiers::from_keyword(w.fragment()));
    map(many0(qualifier), |qs| {
        qs.into_iter().fold(Qualifiers::empty(), |acc, q| acc | q)
    })(input)
}

fn template_argument(input: Input) -> PResult<String> {
    map(
        preceded(
            skip,
            recognize(alt((recognize(number), recognize(type_ref)))),
        ),
        |text: Input| text.fragment().trim().to_string(),
    )(input)
}

fn template_arguments(input: Input) -> PResult<Vec<String>> {
    delimited(
        symbol("<"),
        separated_list1(symbol(","), template_argument),
        symbol(">"),
    )(input)
}

fn type_ref(input: Input) -> PResult<TypeRef> {
    map(
        pair(identifier, opt(template_arguments)),
        |(name, template)| TypeRef {
            name,
            template: template.unwrap_or_default(),
            array: None,
        },
    )(input)
}

fn array_suffix(input: Input) -> PResult<Option<ArrayDim>> {
    opt(map(
        delimited(symbol("["), opt(expr), symbol("]")),
        |size| match size {
            Some(size) => ArrayDim::Sized(size),
            None => ArrayDim::Unsized,
        },
    ))(input)
}

fn semantic(input: Input) -> PResult<Option<String>> {
    opt(preceded(symbol(":"), identifier))(input)
}

// Expressions

const BINARY_LEVELS: [&[(&str, BinaryOp)]; 10] = [
    &[("||", BinaryOp::Or)],
    &[("&&", BinaryOp::And)],
    &[("|", BinaryOp::BitOr)],
    &[("^", BinaryOp::BitXor)],
    &[("&", BinaryOp::BitAnd)],
    &[("==", BinaryOp::Eq), ("!=", BinaryOp::Ne)],
    &[
        ("<=", BinaryOp::Le),
        (">=", BinaryOp::Ge),
        ("<", BinaryOp::Lt),
        (">", BinaryOp::Gt),
    ],
    &[("<<", BinaryOp::Shl), (">>", BinaryOp::Shr)],
    &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
    &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Rem)],
];

fn binary_op(input: Input, level: usize) -> PResult<BinaryOp> {
    let (input, _) = skip(input)?;
    let fragment = *input.fragment();
    for (text, op) in BINARY_LEVELS[level] {
        let Some(after) = fragment.strip_prefix(text) else {
            continue;
        };
        let next = after.chars().next();
        let is_comparison = matches!(*text, "==" | "!=" | "<=" | ">=");
        // `+=` and friends are assignments; `||` is not two `|`.
        if (next == Some('=') && !is_comparison)
            || (text.len() == 1 && next == text.chars().next())
        {
            continue;
        }
        let taken: PResult<Input> = take(text.len())(input);
        return Ok((taken?.0, *op));
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Tag,
    )))
}

fn binary(input: Input, level: usize) -> PResult<Expr> {
    if level == BINARY_LEVELS.len() {
        return unary(input);
    }

    let (mut input, mut lhs) = binary(input, level + 1)?;
    while let Ok((after_op, op)) = binary_op(input, level) {
        match binary(after_op, level + 1) {
            Ok((rest, rhs)) => {
                let span = lhs.span.clone();
                lhs = Expr::new(
                    ExprKind::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    span,
                );
                input = rest;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((input, lhs))
}

fn prefix_op(input: Input) -> PResult<UnaryOp> {
    tok(alt((
        value(UnaryOp::PreInc, tag("++")),
        value(UnaryOp::PreDec, tag("--")),
        value(UnaryOp::Neg, tag("-")),
        value(UnaryOp::Plus, tag("+")),
        value(UnaryOp::Not, terminated(tag("!"), not(char('=')))),
        value(UnaryOp::BitNot, tag("~")),
    )))(input)
}

fn unary(input: Input) -> PResult<Expr> {
    let (input, span) = located(input)?;
    if let Ok((rest, op)) = prefix_op(input) {
        let (rest, operand) = unary(rest)?;
        return Ok((
            rest,
            Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ),
        ));
    }
    postfix(input)
}

#[derive(Clone)]
enum Postfix {
    Member(String),
    Call(Vec<Expr>),
    Index(Expr),
    Op(UnaryOp),
}

fn postfix_op(input: Input) -> PResult<Postfix> {
    alt((
        map(preceded(symbol("."), identifier), Postfix::Member),
        map(
            delimited(symbol("("), separated_list0(symbol(","), expr), symbol(")")),
            Postfix::Call,
        ),
        map(delimited(symbol("["), expr, symbol("]")), Postfix::Index),
        value(Postfix::Op(UnaryOp::PostInc), symbol("++")),
        value(Postfix::Op(UnaryOp::PostDec), symbol("--")),
    ))(input)
}

fn postfix(input: Input) -> PResult<Expr> {
    let (mut input, mut expr) = primary(input)?;
    while let Ok((rest, op)) = postfix_op(input) {
        let span = expr.span.clone();
        let target = Box::new(expr);
        let kind = match op {
            Postfix::Member(member) => ExprKind::Member { target, member },
            Postfix::Call(args) => ExprKind::Call {
                callee: target,
                args,
            },
            Postfix::Index(index) => ExprKind::Index {
                target,
                index: Box::new(index),
            },
            Postfix::Op(op) => ExprKind::Unary {
                op,
                operand: target,
            },
        };
        expr = Expr::new(kind, span);
        input = rest;
    }
    Ok((input, expr))
}

fn primary(input: Input) -> PResult<Expr> {
    let (input, span) = located(input)?;
    let (input, kind) = alt((
        map(literal, ExprKind::Literal),
        map(identifier, ExprKind::Ident),
        map(delimited(symbol("("), expr, symbol(")")), |e| e.kind),
        map(
            delimited(
                symbol("{"),
                terminated(separated_list0(symbol(","), expr), opt(symbol(","))),
                symbol("}"),
            ),
            ExprKind::List,
        ),
    ))(input)?;
    Ok((input, Expr::new(kind, span)))
}

fn assign_op(input: Input) -> PResult<Option<BinaryOp>> {
    tok(alt((
        value(Some(BinaryOp::Shl), tag("<<=")),
        value(Some(BinaryOp::Shr), tag(">>=")),
        value(Some(BinaryOp::Add), tag("+=")),
        value(Some(BinaryOp::Sub), tag("-=")),
        value(Some(BinaryOp::Mul), tag("*=")),
        value(Some(BinaryOp::Div), tag("/=")),
        value(Some(BinaryOp::Rem), tag("%=")),
        value(Some(BinaryOp::BitAnd), tag("&=")),
        value(Some(BinaryOp::BitOr), tag("|=")),
        value(Some(BinaryOp::BitXor), tag("^=")),
        value(None, terminated(tag("="), not(char('=')))),
    )))(input)
}

fn ternary(input: Input) -> PResult<Expr> {
    let (input, condition) = binary(input, 0)?;
    match preceded(symbol("?"), pair(expr, preceded(symbol(":"), assignment)))(input) {
        Ok((rest, (then, otherwise))) => {
            let span = condition.span.clone();
            Ok((
                rest,
                Expr::new(
                    ExprKind::Ternary {
                        condition: Box::new(condition),
                        then: Box::new(then),
                        otherwise: Box::new(otherwise),
                    },
                    span,
                ),
            ))
        }
        Err(nom::Err::Error(_)) => Ok((input, condition)),
        Err(e) => Err(e),
    }
}

fn assignment(input: Input) -> PResult<Expr> {
    let (input, target) = ternary(input)?;
    let Ok((after_op, op)) = assign_op(input) else {
        return Ok((input, target));
    };
    let (rest, value) = assignment(after_op)?;
    let span = target.span.clone();
    Ok((
        rest,
        Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        ),
    ))
}

fn expr(input: Input) -> PResult<Expr> {
    assignment(input)
}

// Statements

fn block(input: Input) -> PResult<Vec<Stmt>> {
    preceded(symbol("{"), cut(terminated(many0(statement), symbol("}"))))(input)
}

fn declaration(input: Input) -> PResult<StmtKind> {
    map(
        tuple((
            qualifiers,
            type_ref,
            identifier,
            array_suffix,
            opt(preceded(assign_eq, expr)),
            symbol(";"),
        )),
        |(qualifiers, mut ty, name, array, initializer, _)| {
            ty.array = array;
            StmtKind::Declare {
                qualifiers,
                ty,
                name,
                initializer,
            }
        },
    )(input)
}

fn expression_statement(input: Input) -> PResult<StmtKind> {
    map(terminated(expr, symbol(";")), StmtKind::Expr)(input)
}

fn if_statement(input: Input) -> PResult<StmtKind> {
    map(
        tuple((
            keyword("if"),
            delimited(symbol("("), expr, symbol(")")),
            statement,
            opt(preceded(keyword("else"), statement)),
        )),
        |(_, condition, then, otherwise)| StmtKind::If {
            condition,
            then: Box::new(then),
            otherwise: otherwise.map(Box::new),
        },
    )(input)
}

fn for_statement(input: Input) -> PResult<StmtKind> {
    let init = alt((
        map(pair(located, alt((declaration, expression_statement))), |(span, kind)| {
            Some(Box::new(Stmt::new(kind, span)))
        }),
        value(None, symbol(";")),
    ));

    map(
        tuple((
            keyword("for"),
            symbol("("),
            init,
            opt(expr),
            symbol(";"),
            opt(expr),
            symbol(")"),
            statement,
        )),
        |(_, _, init, condition, _, step, _, body)| StmtKind::For {
            init,
            condition,
            step,
            body: Box::new(body),
        },
    )(input)
}

fn while_statement(input: Input) -> PResult<StmtKind> {
    map(
        tuple((
            keyword("while"),
            delimited(symbol("("), expr, symbol(")")),
            statement,
        )),
        |(_, condition, body)| StmtKind::While {
            condition,
            body: Box::new(body),
        },
    )(input)
}

fn foreach_statement(input: Input) -> PResult<StmtKind> {
    map(
        tuple((
            keyword("foreach"),
            symbol("("),
            alt((value((), keyword("var")), value((), type_ref))),
            identifier,
            keyword("in"),
            expr,
            symbol(")"),
            statement,
        )),
        |(_, _, _, variable, _, collection, _, body)| StmtKind::ForEach {
            variable,
            collection,
            body: Box::new(body),
        },
    )(input)
}

fn return_statement(input: Input) -> PResult<StmtKind> {
    map(
        delimited(keyword("return"), opt(expr), symbol(";")),
        StmtKind::Return,
    )(input)
}

fn statement(input: Input) -> PResult<Stmt> {
    let (input, span) = located(input)?;
    let (input, attributes) = attributes(input)?;
    let (input, kind) = alt((
        map(block, StmtKind::Block),
        if_statement,
        for_statement,
        while_statement,
        foreach_statement,
        return_statement,
        value(StmtKind::Break, pair(keyword("break"), symbol(";"))),
        value(StmtKind::Continue, pair(keyword("continue"), symbol(";"))),
        value(StmtKind::Discard, pair(keyword("discard"), symbol(";"))),
        value(StmtKind::Empty, symbol(";")),
        declaration,
        expression_statement,
    ))(input)?;
    Ok((
        input,
        Stmt {
            kind,
            attributes,
            span,
        },
    ))
}

// Declarations

fn param(input: Input) -> PResult<Param> {
    map(
        tuple((
            located,
            attributes,
            qualifiers,
            type_ref,
            identifier,
            array_suffix,
            semantic,
            opt(preceded(assign_eq, expr)),
        )),
        |(span, _, qualifiers, mut ty, name, array, semantic, default)| {
            ty.array = array;
            Param {
                name,
                ty,
                qualifiers,
                semantic,
                default,
                span,
            }
        },
    )(input)
}

fn struct_field(input: Input) -> PResult<Param> {
    terminated(param, symbol(";"))(input)
}

fn state_block(input: Input) -> PResult<Vec<StateField>> {
    delimited(
        symbol("{"),
        many0(map(
            tuple((located, identifier, assign_eq, expr, symbol(";"))),
            |(span, key, _, value, _)| StateField { key, value, span },
        )),
        symbol("}"),
    )(input)
}

fn variable_rest(input: Input) -> PResult<(Option<ArrayDim>, Option<String>, Option<Initializer>)> {
    terminated(
        tuple((
            array_suffix,
            semantic,
            opt(alt((
                map(preceded(assign_eq, expr), Initializer::Expr),
                map(state_block, Initializer::State),
            ))),
        )),
        symbol(";"),
    )(input)
}

/// A member before allocation, with the members of a constant buffer.
struct ParsedMember {
    decl: Decl,
    children: Vec<Decl>,
}

fn constant_buffer_member(input: Input) -> PResult<Decl> {
    map(
        tuple((located, attributes, qualifiers, type_ref, identifier, variable_rest)),
        |(span, attributes, qualifiers, mut ty, name, (array, semantic, initializer))| {
            ty.array = array;
            let mut decl = Decl::new(
                name,
                DeclKind::Variable {
                    ty,
                    semantic,
                    initializer,
                },
                span,
            );
            decl.attributes = attributes;
            decl.qualifiers = qualifiers;
            decl
        },
    )(input)
}

fn constant_buffer(input: Input) -> PResult<(ConstantBufferKind, String, Vec<Decl>)> {
    map(
        tuple((
            alt((
                value(ConstantBufferKind::Constant, keyword("cbuffer")),
                value(ConstantBufferKind::ResourceGroup, keyword("rgroup")),
            )),
            identifier,
            symbol("{"),
            many0(constant_buffer_member),
            cut(symbol("}")),
            opt(symbol(";")),
        )),
        |(kind, name, _, members, _, _)| (kind, name, members),
    )(input)
}

fn struct_decl(input: Input) -> PResult<(String, Vec<Param>)> {
    map(
        tuple((
            keyword("struct"),
            identifier,
            symbol("{"),
            many0(struct_field),
            cut(symbol("}")),
            symbol(";"),
        )),
        |(_, name, _, fields, _, _)| (name, fields),
    )(input)
}

enum MemberBody {
    Method {
        params: Vec<Param>,
        semantic: Option<String>,
        body: Option<Vec<Stmt>>,
    },
    Variable {
        array: Option<ArrayDim>,
        semantic: Option<String>,
        initializer: Option<Initializer>,
    },
}

fn method_rest(input: Input) -> PResult<MemberBody> {
    map(
        tuple((
            delimited(symbol("("), separated_list0(symbol(","), param), symbol(")")),
            semantic,
            alt((map(block, Some), value(None, symbol(";")))),
        )),
        |(params, semantic, body)| MemberBody::Method {
            params,
            semantic,
            body,
        },
    )(input)
}

fn member(input: Input) -> PResult<ParsedMember> {
    let (input, span) = located(input)?;
    let (input, attributes) = attributes(input)?;
    let (input, qualifiers) = qualifiers(input)?;

    let with_header = |mut decl: Decl| {
        decl.attributes = attributes.clone();
        decl.qualifiers = qualifiers;
        decl
    };

    match constant_buffer(input) {
        Ok((input, (kind, name, children))) => {
            let decl = Decl::new(
                name,
                DeclKind::ConstantBuffer {
                    kind,
                    members: Vec::new(),
                },
                span,
            );
            return Ok((
                input,
                ParsedMember {
                    decl: with_header(decl),
                    children,
                },
            ));
        }
        Err(nom::Err::Error(_)) => {}
        Err(e) => return Err(e),
    }

    match struct_decl(input) {
        Ok((input, (name, fields))) => {
            let decl = Decl::new(name, DeclKind::Struct { fields }, span);
            return Ok((
                input,
                ParsedMember {
                    decl: with_header(decl),
                    children: Vec::new(),
                },
            ));
        }
        Err(nom::Err::Error(_)) => {}
        Err(e) => return Err(e),
    }

    let (input, (mut ty, name, body)) = tuple((
        type_ref,
        identifier,
        alt((
            method_rest,
            map(variable_rest, |(array, semantic, initializer)| {
                MemberBody::Variable {
                    array,
                    semantic,
                    initializer,
                }
            }),
        )),
    ))(input)?;

    let kind = match body {
        MemberBody::Method {
            params,
            semantic,
            body,
        } => DeclKind::Method {
            return_type: ty,
            params,
            semantic,
            body,
        },
        MemberBody::Variable {
            array,
            semantic,
            initializer,
        } => {
            ty.array = array;
            DeclKind::Variable {
                ty,
                semantic,
                initializer,
            }
        }
    };

    Ok((
        input,
        ParsedMember {
            decl: with_header(Decl::new(name, kind, span)),
            children: Vec::new(),
        },
    ))
}

struct ParsedClass {
    name: String,
    span: SourceSpan,
    generics: Vec<GenericParam>,
    bases: Vec<BaseClass>,
    members: Vec<ParsedMember>,
}

fn base_class(input: Input) -> PResult<BaseClass> {
    map(
        tuple((located, identifier, opt(template_arguments))),
        |(span, name, generic_arguments)| BaseClass {
            name,
            generic_arguments: generic_arguments.unwrap_or_default(),
            span,
        },
    )(input)
}

fn class(input: Input) -> PResult<ParsedClass> {
    let generic_param = map(pair(type_ref, identifier), |(ty, name)| GenericParam { ty, name });

    map(
        tuple((
            located,
            keyword("shader"),
            cut(identifier),
            opt(delimited(
                symbol("<"),
                separated_list1(symbol(","), generic_param),
                symbol(">"),
            )),
            opt(preceded(symbol(":"), separated_list1(symbol(","), base_class))),
            cut(symbol("{")),
            many0(member),
            cut(symbol("}")),
            opt(symbol(";")),
        )),
        |(span, _, name, generics, bases, _, members, _, _)| ParsedClass {
            name,
            span,
            generics: generics.unwrap_or_default(),
            bases: bases.unwrap_or_default(),
            members,
        },
    )(input)
}

impl ParsedClass {
    fn build(self, log: &mut Log) -> ShaderClass {
        let mut class = ShaderClass::new(self.name, self.span);
        class.generics = self.generics;
        class.bases = self.bases;

        for ParsedMember {
            mut decl,
            children,
        } in self.members
        {
            if let Some(index) = decl.attributes.iter().position(|a| a.name == "EntryPoint") {
                let attribute = decl.attributes.remove(index);
                match attribute.string_arg(0).map(ShaderStage::from_str) {
                    Some(Ok(stage)) => decl.entry_point = Some(stage),
                    Some(Err(e)) => log.error(MessageKind::ParseError(e.to_string()), decl.span.clone()),
                    None => log.error(
                        MessageKind::ParseError(format!(
                            "the EntryPoint attribute of `{}` must name a stage",
                            decl.name
                        )),
                        decl.span.clone(),
                    ),
                }
            }

            let ids: Vec<_> = children.into_iter().map(|c| class.arena.alloc(c)).collect();
            if let DeclKind::ConstantBuffer { members, .. } = &mut decl.kind {
                *members = ids;
            }
            let id = class.arena.alloc(decl);
            class.members.push(id);
        }
        class
    }
}

fn snippet(input: &Input) -> String {
    let text: String = input
        .fragment()
        .chars()
        .take_while(|c| *c != '\n')
        .take(24)
        .collect();
    if text.is_empty() {
        "end of file".to_string()
    } else {
        format!("`{}`", text.trim())
    }
}

/// The parser for the `.mxsl` mixin shader language.
#[derive(Debug, Default, Clone, Copy)]
pub struct MixinParser;

impl MixinParser {
    pub fn new() -> Self {
        MixinParser
    }
}

impl ShaderParser for MixinParser {
    fn parse(&self, source: &str, file_name: &str) -> ParseOutput {
        let lines = LineMap::new(source, file_name);
        let input = Input::new_extra(source, &lines);
        let mut log = Log::new();

        let parsed = terminated(many0(class), pair(skip, eof))(input);
        let classes = match parsed {
            Ok((_, classes)) => classes.into_iter().map(|c| c.build(&mut log)).collect(),
            Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
                log.error(
                    MessageKind::ParseError(format!("unexpected {}", snippet(&e.input))),
                    span_of(&e.input),
                );
                Vec::new()
            }
            Err(nom::Err::Incomplete(_)) => {
                log.error(
                    MessageKind::ParseError("unexpected end of file".to_string()),
                    SourceSpan::new(file_name, 0, 0),
                );
                Vec::new()
            }
        };

        ParseOutput { classes, log }
    }

    fn parse_expression(&self, text: &str) -> Option<Expr> {
        let lines = LineMap::new(text, "<expression>");
        let parsed = all_consuming(terminated(expr, skip))(Input::new_extra(text, &lines))
            .ok()
            .map(|(_, e)| e);
        parsed
    }
}

#[cfg(test)]
mod test {
    use crate::ast::{
        BinaryOp, ConstantBufferKind, DeclKind, ExprKind, Initializer, Literal, Qualifiers,
        StmtKind,
    };
    use crate::front::{MixinParser, ShaderParser};
    use shadermix_common::ShaderStage;

    const LIGHTING: &str = r#"
// A test class
shader Lighting<float Scale> : ShaderBase, Transform<4>
{
    [Link("Lighting.Color")]
    [Color] stage float4 Color = float4(1.0, 1.0, 1.0, 1.0);
    compose LightBase lights[];
    stream float3 normalWS : NORMAL;
    SamplerState LinearSampler
    {
        Filter = MIN_MAG_MIP_LINEAR;
        AddressU = Wrap;
    };

    cbuffer PerMaterial
    {
        float Roughness;
        float4x4 World;
    };

    struct Surface { float3 albedo; float alpha : ALPHA; };

    /* entry */
    [EntryPoint("Pixel")]
    override stage void PSMain(inout float4 color : SV_Target, int count = 2)
    {
        float3 total = 0;
        foreach (var light in lights)
        {
            total += light.Compute(streams.normalWS) * Scale;
        }
        for (int i = 0; i < count; i++) { total.x -= i << 1; }
        if (total.x >= 0.5f && !(total.y == 1)) discard; else total = -total;
        color = base.PSMain() + float4(total, 1) * (Color.a > 0 ? 1 : 0);
    }

    abstract float4 Shade();
};
"#;

    #[test]
    fn parses_full_class() {
        let output = MixinParser.parse(LIGHTING, "Lighting.mxsl");
        assert!(output.log.is_empty(), "{}", output.log);
        assert_eq!(1, output.classes.len());

        let class = &output.classes[0];
        assert_eq!("Lighting", class.name);
        assert_eq!("Scale", class.generics[0].name);
        assert_eq!(vec!["4"], class.bases[1].generic_arguments);
        assert_eq!(8, class.members.len());

        let color = &class.arena[class.members[0]];
        assert_eq!(2, color.attributes.len());
        assert!(color.is_stage());
        assert_eq!("Lighting.Color", color.attribute("Link").unwrap().string_arg(0).unwrap());

        let lights = &class.arena[class.members[1]];
        assert!(lights.is_composition());
        assert!(lights.variable_type().unwrap().is_array());

        let sampler = &class.arena[class.members[3]];
        let DeclKind::Variable {
            initializer: Some(Initializer::State(fields)),
            ..
        } = &sampler.kind
        else {
            panic!("expected a sampler state block");
        };
        assert_eq!("Filter", fields[0].key);

        let cbuffer = &class.arena[class.members[4]];
        let DeclKind::ConstantBuffer { kind, members } = &cbuffer.kind else {
            panic!("expected a cbuffer");
        };
        assert_eq!(ConstantBufferKind::Constant, *kind);
        assert_eq!("World", class.arena[members[1]].name);

        let ps = &class.arena[class.members[6]];
        assert_eq!(Some(ShaderStage::Pixel), ps.entry_point);
        assert!(ps.attribute("EntryPoint").is_none());
        assert!(ps.qualifiers.contains(Qualifiers::OVERRIDE | Qualifiers::STAGE));
        let DeclKind::Method { params, body, .. } = &ps.kind else {
            panic!("expected a method");
        };
        assert_eq!(Qualifiers::INOUT, params[0].qualifiers);
        assert_eq!(Some((1, 2)), ps.arity());
        let body = body.as_ref().unwrap();
        assert_eq!(5, body.len());
        assert!(matches!(body[1].kind, StmtKind::ForEach { .. }));
        assert!(matches!(body[2].kind, StmtKind::For { .. }));
        assert!(matches!(body[3].kind, StmtKind::If { .. }));

        let shade = &class.arena[class.members[7]];
        assert!(matches!(&shade.kind, DeclKind::Method { body: None, .. }));
    }

    #[test]
    fn spans_follow_line_markers() {
        let source = "#line 1 \"Main.mxsl\"\nshader A\n{\n#line 7 \"Common.mxslh\"\n  float x;\n#line 4 \"Main.mxsl\"\n  float y;\n};\n";
        let output = MixinParser.parse(source, "ignored.mxsl");
        assert!(output.log.is_empty(), "{}", output.log);
        let class = &output.classes[0];
        assert_eq!(1, class.span.line);
        assert_eq!("Main.mxsl", &*class.span.file);

        let x = &class.arena[class.members[0]];
        assert_eq!("Common.mxslh", &*x.span.file);
        assert_eq!(7, x.span.line);
        assert_eq!(3, x.span.column);

        let y = &class.arena[class.members[1]];
        assert_eq!("Main.mxsl", &*y.span.file);
        assert_eq!(4, y.span.line);
    }

    #[test]
    fn operator_precedence() {
        let e = MixinParser.parse_expression("a + b * c << 1 == d || e").unwrap();
        let ExprKind::Binary { op, lhs, .. } = e.kind else {
            panic!("expected a binary expression");
        };
        assert_eq!(BinaryOp::Or, op);
        let ExprKind::Binary { op, lhs, .. } = lhs.kind else {
            panic!("expected equality");
        };
        assert_eq!(BinaryOp::Eq, op);
        let ExprKind::Binary { op, lhs, .. } = lhs.kind else {
            panic!("expected shift");
        };
        assert_eq!(BinaryOp::Shl, op);
        let ExprKind::Binary { op, rhs, .. } = lhs.kind else {
            panic!("expected addition");
        };
        assert_eq!(BinaryOp::Add, op);
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn compound_assignment() {
        let e = MixinParser.parse_expression("x <<= y += 2").unwrap();
        let ExprKind::Assign { op, value, .. } = e.kind else {
            panic!("expected an assignment");
        };
        assert_eq!(Some(BinaryOp::Shl), op);
        assert!(matches!(
            value.kind,
            ExprKind::Assign {
                op: Some(BinaryOp::Add),
                ..
            }
        ));
    }

    #[test]
    fn literals() {
        let parse = |s| MixinParser.parse_expression(s).unwrap().kind;
        assert_eq!(ExprKind::Literal(Literal::Float(0.5)), parse("0.5f"));
        assert_eq!(ExprKind::Literal(Literal::Float(2.0)), parse("2.f"));
        assert_eq!(ExprKind::Literal(Literal::Int(255)), parse("0xFF"));
        assert_eq!(ExprKind::Literal(Literal::Int(3)), parse("3u"));
        assert_eq!(ExprKind::Literal(Literal::Bool(true)), parse("true"));
        assert_eq!(
            ExprKind::Literal(Literal::String("Vertex".into())),
            parse("\"Vertex\"")
        );
        assert!(MixinParser.parse_expression("1 +").is_none());
    }

    #[test]
    fn reports_error_position() {
        let output = MixinParser.parse("shader Broken\n{\n    void f() { return 1 }\n};\n", "Broken.mxsl");
        assert!(output.log.has_errors());
        let error = output.log.errors().next().unwrap();
        assert_eq!(3, error.span.as_ref().unwrap().line);
    }

    #[test]
    fn unknown_entry_point_stage() {
        let output = MixinParser.parse(
            "shader A { [EntryPoint(\"Fragment\")] void main() {} };",
            "A.mxsl",
        );
        assert!(output.log.has_errors());
        assert_eq!(1, output.classes.len());
    }

    #[test]
    fn multiple_classes() {
        let output = MixinParser.parse("shader A {};\nshader B : A {};", "AB.mxsl");
        assert_eq!(2, output.classes.len());
        assert_eq!("A", output.classes[1].bases[0].name);
    }
}
