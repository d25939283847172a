use super::*;

fn tokens(source: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(source);
    let mut out = Vec::new();
    loop {
        let data = lexer.next_token();
        let done = data.token == Token::Eof;
        out.push(data.token);
        if done {
            break;
        }
    }
    out
}

fn token_lines(source: &str) -> Vec<(Token, u32)> {
    let mut lexer = Lexer::new(source);
    let mut out = Vec::new();
    loop {
        let data = lexer.next_token();
        let done = data.token == Token::Eof;
        out.push((data.token, data.line));
        if done {
            break;
        }
    }
    out
}

#[test]
fn single_char_tokens() {
    assert_eq!(
        tokens("( ) { } + - * / | ;"),
        vec![
            Token::LParen, Token::RParen, Token::LBrace, Token::RBrace,
            Token::Plus, Token::Minus, Token::Star, Token::Slash,
            Token::Pipe, Token::Semicolon, Token::Eof,
        ],
    );
}

#[test]
fn two_char_operators() {
    assert_eq!(
        tokens("== != <= >= => = ! < >"),
        vec![
            Token::Eq, Token::NotEq, Token::LtEq, Token::GtEq, Token::EqArrow,
            Token::Assign, Token::Not, Token::Lt, Token::Gt, Token::Eof,
        ],
    );
}

#[test]
fn keywords_and_identifiers() {
    assert_eq!(
        tokens("let fn debug if else match true false lettuce fnord _tmp x1"),
        vec![
            Token::Let, Token::Fn, Token::Debug, Token::If, Token::Else,
            Token::Match, Token::True, Token::False,
            Token::Ident("lettuce"), Token::Ident("fnord"),
            Token::Ident("_tmp"), Token::Ident("x1"),
            Token::Eof,
        ],
    );
}

#[test]
fn numbers() {
    assert_eq!(
        tokens("0 42 3.25"),
        vec![
            Token::Number(0.0), Token::Number(42.0), Token::Number(3.25),
            Token::Eof,
        ],
    );
}

#[test]
fn dot_without_fraction_is_not_consumed() {
    // "1." lexes as the number 1 followed by an invalid '.'
    assert_eq!(
        tokens("1."),
        vec![Token::Number(1.0), Token::Error(LexError::InvalidChar), Token::Eof],
    );
}

#[test]
fn string_literal_excludes_quotes() {
    assert_eq!(
        tokens("\"hello world\""),
        vec![Token::StringLit("hello world"), Token::Eof],
    );
}

#[test]
fn empty_string_literal() {
    assert_eq!(tokens("\"\""), vec![Token::StringLit(""), Token::Eof]);
}

#[test]
fn unterminated_string() {
    assert_eq!(
        tokens("\"oops"),
        vec![Token::Error(LexError::UnterminatedString), Token::Eof],
    );
}

#[test]
fn invalid_character() {
    assert_eq!(
        tokens("let @ = 1"),
        vec![
            Token::Let, Token::Error(LexError::InvalidChar),
            Token::Assign, Token::Number(1.0), Token::Eof,
        ],
    );
}

#[test]
fn line_comments_run_to_end_of_line() {
    assert_eq!(
        tokens("1 // the rest is ignored ( ) {\n2"),
        vec![Token::Number(1.0), Token::Newline, Token::Number(2.0), Token::Eof],
    );
}

#[test]
fn comment_only_line_still_yields_newline() {
    assert_eq!(
        tokens("// nothing here\n"),
        vec![Token::Newline, Token::Eof],
    );
}

#[test]
fn newline_token_carries_the_line_it_terminates() {
    assert_eq!(
        token_lines("1\n2\n"),
        vec![
            (Token::Number(1.0), 1),
            (Token::Newline, 1),
            (Token::Number(2.0), 2),
            (Token::Newline, 2),
            (Token::Eof, 3),
        ],
    );
}

#[test]
fn division_is_not_a_comment() {
    assert_eq!(
        tokens("6 / 2"),
        vec![Token::Number(6.0), Token::Slash, Token::Number(2.0), Token::Eof],
    );
}

#[test]
fn bom_is_skipped() {
    assert_eq!(tokens("\u{feff}42"), vec![Token::Number(42.0), Token::Eof]);
}

#[test]
fn eof_is_sticky() {
    let mut lexer = Lexer::new("x");
    assert!(matches!(lexer.next_token().token, Token::Ident("x")));
    assert_eq!(lexer.next_token().token, Token::Eof);
    assert_eq!(lexer.next_token().token, Token::Eof);
}
