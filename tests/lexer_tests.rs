use rime::lexer::{tokenize, Span, TokenKind};

#[test]
fn tokenizes_keywords_and_identifiers() {
    let tokens = tokenize("var fun while defer assert import nil answer").expect("lexing should pass");
    let kinds = tokens.into_iter().map(|t| t.kind).collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Var,
            TokenKind::Fun,
            TokenKind::While,
            TokenKind::Defer,
            TokenKind::Assert,
            TokenKind::Import,
            TokenKind::Nil,
            TokenKind::Ident("answer".to_string()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn tokenizes_two_character_operators() {
    let tokens = tokenize("== != <= >= && ||").expect("lexing should pass");
    let kinds = tokens.into_iter().map(|t| t.kind).collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Eq,
            TokenKind::NotEq,
            TokenKind::LtEq,
            TokenKind::GtEq,
            TokenKind::AndAnd,
            TokenKind::OrOr,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn spans_are_byte_accurate() {
    let tokens = tokenize("var x = 10;").expect("lexing should pass");
    assert_eq!(tokens[0].span, Span::new(0, 3));
    assert_eq!(tokens[1].span, Span::new(4, 5));
    assert_eq!(tokens[2].span, Span::new(6, 7));
    assert_eq!(tokens[3].span, Span::new(8, 10));
    assert_eq!(tokens[4].span, Span::new(10, 11));
}

#[test]
fn number_literals_parse_with_fractions() {
    let tokens = tokenize("3.25").expect("lexing should pass");
    assert_eq!(tokens[0].kind, TokenKind::Number(3.25));
}

#[test]
fn string_escapes_decode() {
    let tokens = tokenize("\"a\\tb\\n\\\"c\\\"\"").expect("lexing should pass");
    assert_eq!(tokens[0].kind, TokenKind::Str("a\tb\n\"c\"".to_string()));
}

#[test]
fn line_comments_become_comment_tokens() {
    let tokens = tokenize("1; // trailing note\n2;").expect("lexing should pass");
    let kinds = tokens.into_iter().map(|t| t.kind).collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Number(1.0),
            TokenKind::Semicolon,
            TokenKind::Comment,
            TokenKind::Number(2.0),
            TokenKind::Semicolon,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn unterminated_string_is_an_error() {
    let errors = tokenize("\"never closed").expect_err("should fail");
    assert!(errors[0].message.contains("unterminated string"));
}

#[test]
fn lone_ampersand_is_an_error_with_hint() {
    let errors = tokenize("1 & 2").expect_err("should fail");
    assert!(errors[0].message.contains("did you mean '&&'?"));
}

#[test]
fn all_errors_for_one_input_are_collected() {
    let errors = tokenize("1 & 2 | 3").expect_err("should fail");
    assert_eq!(errors.len(), 2);
}
