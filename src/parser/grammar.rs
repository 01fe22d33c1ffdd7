//! Parser implementation using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::expr::{BinaryOp, Expr, UnaryOp};
use crate::parser::ast::*;
use crate::parser::lexer::Token;
use crate::template::GeomValue;
use crate::ParseError;

/// Parse template source into an AST
pub fn parse(input: &str) -> Result<Document, Vec<ParseError>> {
    let tokens = tokenize(input)?;
    let len = input.len();

    // Turn the token list into a stream that chumsky can use
    let token_stream = Stream::from_iter(tokens)
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    document_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Parse a single expression, e.g. an instance binding or a design parameter
pub fn parse_expr(input: &str) -> Result<Expr, Vec<ParseError>> {
    let tokens = tokenize(input)?;
    let len = input.len();

    let token_stream = Stream::from_iter(tokens).map((len..len).into(), |(t, s): (_, _)| (t, s));

    expr_parser()
        .then_ignore(end())
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Run the lexer, turning unrecognized input into syntax errors
fn tokenize(input: &str) -> Result<Vec<(Token, SimpleSpan)>, Vec<ParseError>> {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    for result in crate::parser::lexer::lex(input) {
        match result {
            Ok((tok, span)) => tokens.push((tok, span.into())),
            Err(span) => errors.push(ParseError::Syntax {
                message: format!("Unrecognized input '{}'", &input[span.clone()]),
                span,
                expected: Vec::new(),
            }),
        }
    }
    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

/// Left-associative fold of `first (op operand)*`
fn fold_left(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter()
        .fold(first, |lhs, (op, rhs)| Expr::binary(op, lhs, rhs))
}

fn expr_parser<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let ident = select! {
            Token::Ident(s) => s,
        };

        let unit = ident
            .clone()
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose));

        let number = select! {
            Token::Number(n) => n,
        }
        .then(unit.or_not())
        .map(|(value, unit)| Expr::Number { value, unit });

        let call = ident
            .clone()
            .then(
                expr.clone()
                    .separated_by(just(Token::Comma))
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
            )
            .map(|(function, args)| Expr::Call { function, args });

        let atom = choice((
            number,
            call,
            ident.clone().map(Expr::Ident),
            expr.clone()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        ));

        // Right-associative: a^b^c == a^(b^c)
        let power = atom
            .clone()
            .then(
                just(Token::Caret)
                    .ignore_then(atom)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(base, mut exponents): (Expr, Vec<Expr>)| match exponents.pop() {
                None => base,
                Some(last) => {
                    let exponent = exponents
                        .into_iter()
                        .rev()
                        .fold(last, |acc, e| Expr::binary(BinaryOp::Pow, e, acc));
                    Expr::binary(BinaryOp::Pow, base, exponent)
                }
            });

        let unary = choice((
            just(Token::Minus).to(UnaryOp::Neg),
            just(Token::Bang).to(UnaryOp::Not),
        ))
        .repeated()
        .collect::<Vec<_>>()
        .then(power)
        .map(|(ops, operand)| {
            ops.into_iter()
                .rev()
                .fold(operand, |acc, op| Expr::unary(op, acc))
        });

        let product = unary
            .clone()
            .then(
                choice((
                    just(Token::Star).to(BinaryOp::Mul),
                    just(Token::Slash).to(BinaryOp::Div),
                ))
                .then(unary)
                .repeated()
                .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_left(first, rest));

        let sum = product
            .clone()
            .then(
                choice((
                    just(Token::Plus).to(BinaryOp::Add),
                    just(Token::Minus).to(BinaryOp::Sub),
                ))
                .then(product)
                .repeated()
                .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_left(first, rest));

        // Comparisons do not chain
        let comparison = sum
            .clone()
            .then(
                choice((
                    just(Token::EqEq).to(BinaryOp::Eq),
                    just(Token::NotEq).to(BinaryOp::Ne),
                    just(Token::LessEq).to(BinaryOp::Le),
                    just(Token::GreaterEq).to(BinaryOp::Ge),
                    just(Token::Less).to(BinaryOp::Lt),
                    just(Token::Greater).to(BinaryOp::Gt),
                ))
                .then(sum)
                .or_not(),
            )
            .map(|(lhs, rest)| match rest {
                Some((op, rhs)) => Expr::binary(op, lhs, rhs),
                None => lhs,
            });

        let conjunction = comparison
            .clone()
            .then(
                just(Token::AndAnd)
                    .to(BinaryOp::And)
                    .then(comparison)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_left(first, rest));

        conjunction
            .clone()
            .then(
                just(Token::OrOr)
                    .to(BinaryOp::Or)
                    .then(conjunction)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| fold_left(first, rest))
            .boxed()
    })
}

fn document_parser<'a, I>() -> impl Parser<'a, I, Document, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    // Basic token parsers
    let identifier = select! {
        Token::Ident(s) => Identifier::new(s),
    }
    .map_with(|id, e| Spanned::new(id, span_range(&e.span())));

    let string_literal = select! {
        Token::String(s) => s,
    }
    .map_with(|s, e| Spanned::new(s, span_range(&e.span())));

    let expr = expr_parser().map_with(|x, e| Spanned::new(x, span_range(&e.span())));

    // Template names may be quoted to allow spaces
    let template_name = choice((
        identifier.clone(),
        string_literal.clone().map(|s| Spanned::new(Identifier::new(s.node), s.span)),
    ));

    // Parameter list: (Name: default, ...)
    let parameter = identifier
        .clone()
        .then_ignore(just(Token::Colon))
        .then(expr.clone())
        .map(|(name, default_value)| ParameterDef {
            name,
            default_value,
        });

    let parameter_list = parameter
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::ParenOpen), just(Token::ParenClose))
        .or_not()
        .map(Option::unwrap_or_default);

    // selection NAME "display" [flag, ...]
    let flags = identifier
        .clone()
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::BracketOpen), just(Token::BracketClose));

    let selection_decl = just(Token::Selection)
        .ignore_then(identifier.clone())
        .then(string_literal.clone().or_not())
        .then(flags.or_not())
        .map_with(|((name, display), flags), e| {
            Spanned::new(
                SelectionDecl {
                    name,
                    display,
                    flags: flags.unwrap_or_default(),
                },
                span_range(&e.span()),
            )
        });

    // Geometry values: {a, b, c} | "text" | expr
    let geom_value = choice((
        expr_parser()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BraceOpen), just(Token::BraceClose))
            .map(GeomValue::Vector),
        string_literal.clone().map(|s| GeomValue::Text(s.node)),
        expr_parser().map(GeomValue::Scalar),
    ))
    .map_with(|v, e| Spanned::new(v, span_range(&e.span())));

    let geometry = identifier
        .clone()
        .then_ignore(just(Token::Colon))
        .then(geom_value)
        .map(|(key, value)| GeomArg { key, value })
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::BracketOpen), just(Token::BracketClose));

    let label = string_literal.or_not();
    let target = just(Token::Arrow).ignore_then(identifier.clone());
    let selection_list = identifier
        .clone()
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>();

    // Recursive step parser (conditionals nest)
    let step = recursive(|step| {
        let block = step
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BraceOpen), just(Token::BraceClose));

        let union = just(Token::Union)
            .ignore_then(label.clone())
            .then(selection_list.clone())
            .then(target.clone())
            .map(|((label, inputs), target)| StepDecl::Union {
                label,
                inputs,
                target,
            });

        let difference = just(Token::Difference)
            .ignore_then(label.clone())
            .then(identifier.clone())
            .then_ignore(just(Token::Minus))
            .then(identifier.clone())
            .then(target.clone())
            .map(|(((label, primary), subtract), target)| StepDecl::Difference {
                label,
                primary,
                subtract,
                target,
            });

        let partition = just(Token::Partition)
            .ignore_then(label.clone())
            .then(identifier.clone())
            .then_ignore(just(Token::By))
            .then(identifier.clone())
            .then(target.clone())
            .map(|(((label, domain), tool), target)| StepDecl::Partition {
                label,
                domain,
                tool,
                target,
            });

        let delete = just(Token::Delete)
            .ignore_then(label.clone())
            .then(identifier.clone())
            .then_ignore(just(Token::From))
            .then(identifier.clone())
            .map(|((label, remove), target)| StepDecl::Delete {
                label,
                remove,
                target,
            });

        let conditional = just(Token::If)
            .ignore_then(expr.clone())
            .then(block.clone())
            .then(
                just(Token::Elif)
                    .ignore_then(expr.clone())
                    .then(block.clone())
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .then(just(Token::Else).ignore_then(block).or_not())
            .map(|(((predicate, body), elifs), otherwise)| {
                let mut branches = vec![BranchDecl { predicate, body }];
                branches.extend(
                    elifs
                        .into_iter()
                        .map(|(predicate, body)| BranchDecl { predicate, body }),
                );
                StepDecl::Conditional {
                    branches,
                    otherwise,
                }
            });

        let primitive = identifier
            .clone()
            .then(label.clone())
            .then(selection_list.clone().or_not())
            .then(target.clone().or_not())
            .then(geometry.clone().or_not())
            .map(
                |((((shape, label), inputs), target), geometry)| StepDecl::Primitive {
                    shape,
                    label,
                    inputs: inputs.unwrap_or_default(),
                    target,
                    geometry: geometry.unwrap_or_default(),
                },
            );

        choice((conditional, union, difference, partition, delete, primitive))
            .map_with(|s, e| Spanned::new(s, span_range(&e.span())))
            .boxed()
    });

    let item = choice((
        selection_decl.map(TemplateItem::Selection),
        step.map(TemplateItem::Step),
    ));

    let template = just(Token::Template)
        .ignore_then(template_name)
        .then(parameter_list)
        .then(
            item.repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::BraceOpen), just(Token::BraceClose)),
        )
        .map_with(|((name, parameters), body), e| {
            Spanned::new(
                TemplateDecl {
                    name,
                    parameters,
                    body,
                },
                span_range(&e.span()),
            )
        });

    template
        .repeated()
        .collect::<Vec<_>>()
        .then_ignore(end())
        .map(|templates| Document { templates })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_template(src: &str) -> TemplateDecl {
        let doc = parse(src).expect("Should parse");
        assert_eq!(doc.templates.len(), 1);
        doc.templates.into_iter().next().unwrap().node
    }

    fn steps(decl: &TemplateDecl) -> Vec<&StepDecl> {
        decl.body
            .iter()
            .filter_map(|item| match item {
                TemplateItem::Step(s) => Some(&s.node),
                TemplateItem::Selection(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_parse_expression_precedence() {
        let expr = parse_expr("a + b * c ^ 2").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Add,
                Expr::ident("a"),
                Expr::binary(
                    BinaryOp::Mul,
                    Expr::ident("b"),
                    Expr::binary(BinaryOp::Pow, Expr::ident("c"), Expr::number(2.0)),
                ),
            )
        );
    }

    #[test]
    fn test_parse_predicate() {
        let expr = parse_expr("(Theta < 360) && (N_holes > 0) || !flag").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Or, .. }));
        assert_eq!(expr.identifiers(), vec!["Theta", "N_holes", "flag"]);
    }

    #[test]
    fn test_parse_unit_literal() {
        assert_eq!(
            parse_expr("-0.3 [mm]").unwrap(),
            Expr::unary(UnaryOp::Neg, Expr::with_unit(0.3, "mm"))
        );
    }

    #[test]
    fn test_parse_expr_rejects_trailing_tokens() {
        assert!(parse_expr("a b").is_err());
        assert!(parse_expr("a @ b").is_err());
    }

    #[test]
    fn test_parse_template_header() {
        let decl = single_template(
            "template TubeCuff (N_holes: 1, Theta: 340 [deg], R_in: 1 [mm],) { }",
        );
        assert_eq!(decl.name.node.as_str(), "TubeCuff");
        assert_eq!(decl.parameters.len(), 3);
        assert_eq!(decl.parameters[1].name.node.as_str(), "Theta");
        assert_eq!(
            decl.parameters[1].default_value.node,
            Expr::with_unit(340.0, "deg")
        );
    }

    #[test]
    fn test_parse_selections_and_primitives() {
        let decl = single_template(
            r#"template T (R_in: 1 [mm], L: 5 [mm]) {
                selection INNER
                selection CUFF_FINAL "CUFF FINAL" [keep, source]
                cylinder "Make Inner Cuff Surface" -> INNER [pos: {0, 0, -L/2}, r: R_in, h: L]
                workplane -> INNER [quickplane: "xz"]
                rotate "Rotate" INNER [rot: 10 [deg]]
            }"#,
        );
        match &decl.body[1] {
            TemplateItem::Selection(s) => {
                assert_eq!(s.node.name.node.as_str(), "CUFF_FINAL");
                assert_eq!(s.node.display.as_ref().unwrap().node, "CUFF FINAL");
                assert_eq!(s.node.flags.len(), 2);
            }
            _ => panic!("Expected selection"),
        }
        let steps = steps(&decl);
        assert_eq!(steps.len(), 3);
        match steps[0] {
            StepDecl::Primitive {
                shape,
                label,
                target,
                geometry,
                ..
            } => {
                assert_eq!(shape.node.as_str(), "cylinder");
                assert_eq!(label.as_ref().unwrap().node, "Make Inner Cuff Surface");
                assert_eq!(target.as_ref().unwrap().node.as_str(), "INNER");
                assert_eq!(geometry.len(), 3);
                assert!(matches!(&geometry[0].value.node, GeomValue::Vector(v) if v.len() == 3));
            }
            _ => panic!("Expected primitive"),
        }
        match steps[1] {
            StepDecl::Primitive { geometry, .. } => {
                assert_eq!(geometry[0].value.node, GeomValue::Text("xz".into()));
            }
            _ => panic!("Expected primitive"),
        }
        match steps[2] {
            StepDecl::Primitive { inputs, target, .. } => {
                assert_eq!(inputs[0].node.as_str(), "INNER");
                assert!(target.is_none());
            }
            _ => panic!("Expected primitive"),
        }
    }

    #[test]
    fn test_parse_boolean_steps() {
        let decl = single_template(
            r#"template T {
                union "Union" A, B -> C
                difference OUTER - INNER -> FINAL
                partition "Split" PRE by CUTTER -> FINAL
                delete "Trim" OVERSHOOT from FINAL
            }"#,
        );
        let steps = steps(&decl);
        assert!(matches!(steps[0], StepDecl::Union { inputs, .. } if inputs.len() == 2));
        assert!(
            matches!(steps[1], StepDecl::Difference { primary, subtract, .. }
                if primary.node.as_str() == "OUTER" && subtract.node.as_str() == "INNER")
        );
        assert!(matches!(steps[2], StepDecl::Partition { tool, .. } if tool.node.as_str() == "CUTTER"));
        assert!(matches!(steps[3], StepDecl::Delete { remove, .. } if remove.node.as_str() == "OVERSHOOT"));
    }

    #[test]
    fn test_parse_nested_conditionals() {
        let decl = single_template(
            r#"template T (N_holes: 1, Theta: 340 [deg]) {
                if Theta == 360 && N_holes == 0 {
                    cylinder -> A
                } elif Theta < 360 {
                    if N_holes == 2 {
                        econe -> B
                    } else {}
                } else {
                    cylinder -> C
                }
            }"#,
        );
        match steps(&decl)[0] {
            StepDecl::Conditional {
                branches,
                otherwise,
            } => {
                assert_eq!(branches.len(), 2);
                assert!(matches!(
                    &branches[1].body[0].node,
                    StepDecl::Conditional { otherwise: Some(body), .. } if body.is_empty()
                ));
                assert_eq!(otherwise.as_ref().unwrap().len(), 1);
            }
            _ => panic!("Expected conditional"),
        }
    }

    #[test]
    fn test_parse_error_has_span() {
        let errs = parse("template T { difference A B -> C }").unwrap_err();
        assert!(!errs.is_empty());
        match &errs[0] {
            ParseError::Syntax { span, .. } => assert!(span.start > 0),
        }
    }
}
