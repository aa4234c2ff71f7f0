use core::fmt;
use std::collections::HashMap;

use logos::Logos;

use crate::{error::MalletError, value::{HashKey, Value}};


#[derive(Debug, Clone, PartialEq, Logos)]
#[logos(skip r"(?:[ \t\r\n\f,]|;[^\n]*)+")]
enum Token<'a> {
    #[token("(")]
    LeftParen,

    #[token(")")]
    RightParen,

    #[token("[")]
    LeftBracket,

    #[token("]")]
    RightBracket,

    #[token("{")]
    LeftBrace,

    #[token("}")]
    RightBrace,

    #[token("'")]
    Quote,

    #[token("`")]
    Quasiquote,

    #[token("~")]
    Unquote,

    #[token("~@")]
    SpliceUnquote,

    #[token("@")]
    Deref,

    // The closing quote is optional here so that an unterminated string
    // reaches the reader, which reports it.
    #[regex(r#""(?:\\.|[^\\"])*"?"#, |lex| lex.slice())]
    Str(&'a str),

    #[regex(r#"[^ \t\r\n\f,\[\]{}()'"`;~@^][^ \t\r\n\f,\[\]{}()'"`;]*"#, |lex| lex.slice())]
    Literal(&'a str),
}

impl<'a> fmt::Display for Token<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeftParen => write!(f, "'('"),
            Self::RightParen => write!(f, "')'"),
            Self::LeftBracket => write!(f, "'['"),
            Self::RightBracket => write!(f, "']'"),
            Self::LeftBrace => write!(f, "'{{'"),
            Self::RightBrace => write!(f, "'}}'"),
            Self::Quote => write!(f, "'''"),
            Self::Quasiquote => write!(f, "'`'"),
            Self::Unquote => write!(f, "'~'"),
            Self::SpliceUnquote => write!(f, "'~@'"),
            Self::Deref => write!(f, "'@'"),
            Self::Str(literal) | Self::Literal(literal) => write!(f, "'{}'", literal),
        }
    }
}

type ParseResult<O> = Result<O, MalletError>;

/// How many lists, vectors, hashmaps and reader macros may enclose a form.
pub(crate) const MAX_DEPTH: usize = 256;


fn lexer<'a>(input: &'a str) -> ParseResult<Vec<Token<'a>>> {
    let mut tokens = vec![];
    let mut tokenizer = Token::lexer(input);

    while let Some(result) = tokenizer.next() {
        match result {
            Ok(token) => tokens.push(token),
            Err(_) => return Err(MalletError::syntax(format!("unexpected character '{}'", tokenizer.slice())))
        }
    }

    Ok(tokens)
}

fn parse_token<'a, 'b: 'a>(
    token_recognizer: impl Fn(&'a Token<'b>) -> bool,
    expected: &'static str,
) -> impl Fn(&'a [Token<'b>]) -> ParseResult<(&'a [Token<'b>], &'a Token<'b>)> {
    move |tokens| match tokens.split_first() {
        Some((token, rest)) if token_recognizer(token) => Ok((rest, token)),
        Some((token, _)) => Err(MalletError::syntax(format!("expected {}, got {}", expected, token))),
        None => Err(MalletError::syntax(format!("expected {}, got EOF", expected))),
    }
}

fn parse_surrounds<'a, 'b: 'a, O>(
    start_recognizer: impl Fn(&'a Token<'b>) -> bool,
    internal_parser: impl Fn(&'a [Token<'b>]) -> ParseResult<(&'a [Token<'b>], O)>,
    end_recognizer: impl Fn(&'a Token<'b>) -> bool,
    expected_end: &'static str,
) -> impl Fn(&'a [Token<'b>]) -> ParseResult<(&'a [Token<'b>], O)> {
    let start_parser = parse_token(start_recognizer, "an opening delimiter");
    let end_parser = parse_token(end_recognizer, expected_end);

    move |tokens| {
        let (tokens, _) = start_parser(tokens)?;
        let (tokens, internal) = internal_parser(tokens)?;
        let (tokens, _) = end_parser(tokens)?;

        Ok((tokens, internal))
    }
}

// Repeats `parser` until the next token is recognized as the end. Running
// out of tokens stops the loop too, and the caller then fails looking for
// the closing delimiter.
fn parse_until<'a, 'b: 'a, O>(
    end_recognizer: impl Fn(&'a Token<'b>) -> bool,
    parser: impl Fn(&'a [Token<'b>]) -> ParseResult<(&'a [Token<'b>], O)>,
) -> impl Fn(&'a [Token<'b>]) -> ParseResult<(&'a [Token<'b>], Vec<O>)> {
    move |mut tokens| {
        let mut result = vec![];

        while let Some(token) = tokens.first() {
            if end_recognizer(token) { break; }

            let (new_tokens, value) = parser(tokens)?;
            result.push(value);
            tokens = new_tokens;
        }

        Ok((tokens, result))
    }
}

fn parser_map<'a, 'b: 'a, I, O>(
    parser: impl Fn(&'a [Token<'b>]) -> ParseResult<(&'a [Token<'b>], I)>,
    f: impl Fn(I) -> ParseResult<O>,
) -> impl Fn(&'a [Token<'b>]) -> ParseResult<(&'a [Token<'b>], O)> {
    move |tokens| {
        let (tokens, value) = parser(tokens)?;
        Ok((tokens, f(value)?))
    }
}

fn parse_delimited<'a, 'b: 'a>(
    open: Token<'b>,
    close: Token<'b>,
    expected_end: &'static str,
    depth: usize,
) -> impl Fn(&'a [Token<'b>]) -> ParseResult<(&'a [Token<'b>], Vec<Value>)> {
    let end = close.clone();

    parse_surrounds(
        move |token| *token == open,
        parse_until(move |token| *token == close, move |tokens| parse_form(tokens, depth + 1)),
        move |token| *token == end,
        expected_end,
    )
}

fn parse_reader_macro<'a, 'b: 'a>(name: &'static str, depth: usize) -> impl Fn(&'a [Token<'b>]) -> ParseResult<(&'a [Token<'b>], Value)> {
    // `'x` reads as `(quote x)`, `@x` as `(deref x)` and so on
    move |tokens| {
        let (tokens, _) = parse_token(|_| true, "a reader macro")(tokens)?;
        let (tokens, form) = parse_form(tokens, depth + 1)?;
        Ok((tokens, Value::list(vec![Value::symbol(name), form])))
    }
}

fn build_hash_map(values: Vec<Value>) -> ParseResult<Value> {
    if values.len() % 2 != 0 {
        return Err(MalletError::syntax("hash-map literal needs an even number of forms"));
    }

    let mut entries = HashMap::with_capacity(values.len() / 2);
    let mut values = values.into_iter();
    while let (Some(key), Some(value)) = (values.next(), values.next()) {
        let hash_key = HashKey::from_value(&key)
            .ok_or_else(|| MalletError::syntax(format!("invalid hash-map key {}", key)))?;
        if entries.insert(hash_key, value).is_some() {
            return Err(MalletError::syntax(format!("duplicate hash-map key {}", key)));
        }
    }

    Ok(Value::hash_map(entries))
}

fn is_number(literal: &str) -> bool {
    let digits = literal.strip_prefix(|c| c == '+' || c == '-').unwrap_or(literal);
    !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit())
}

fn parse_literal(literal: &str) -> ParseResult<Value> {
    Ok(match literal {
        "nil" => Value::Nil,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ if is_number(literal) => literal.parse()
            .map(Value::Number)
            .map_err(|_| MalletError::syntax(format!("invalid number {}", literal)))?,
        _ => match literal.strip_prefix(':') {
            Some(name) => Value::keyword(name),
            None => Value::symbol(literal),
        },
    })
}

fn parse_hex_escape(chars: &mut std::str::Chars<'_>) -> ParseResult<char> {
    let mut digits = String::new();
    loop {
        match chars.next() {
            Some(';') => break,
            Some(c) if c.is_ascii_hexdigit() => digits.push(c),
            _ => return Err(MalletError::syntax("invalid \\x escape, expected hex digits followed by ';'")),
        }
    }

    u32::from_str_radix(&digits, 16).ok()
        .and_then(char::from_u32)
        .ok_or_else(|| MalletError::syntax(format!("invalid code point \\x{};", digits)))
}

fn unescape(token: &str) -> ParseResult<String> {
    let mut result = String::with_capacity(token.len());
    let mut chars = token[1..].chars();

    loop {
        match chars.next() {
            Some('"') => break,
            Some('\\') => match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some('x') => result.push(parse_hex_escape(&mut chars)?),
                Some(other) => return Err(MalletError::syntax(format!("invalid escape \\{}", other))),
                None => return Err(MalletError::syntax("expected '\"', got EOF")),
            },
            Some(c) => result.push(c),
            None => return Err(MalletError::syntax("expected '\"', got EOF")),
        }
    }

    Ok(result)
}

fn parse_atom<'a, 'b: 'a>(tokens: &'a [Token<'b>]) -> ParseResult<(&'a [Token<'b>], Value)> {
    match tokens.split_first() {
        Some((Token::Str(literal), tokens)) => Ok((tokens, Value::string(&unescape(literal)?))),
        Some((Token::Literal(literal), tokens)) => Ok((tokens, parse_literal(literal)?)),
        Some((token, _)) => Err(MalletError::syntax(format!("unexpected {}", token))),
        None => Err(MalletError::syntax("unexpected EOF")),
    }
}

fn parse_form<'a, 'b: 'a>(tokens: &'a [Token<'b>], depth: usize) -> ParseResult<(&'a [Token<'b>], Value)> {
    if depth > MAX_DEPTH {
        return Err(MalletError::syntax("nesting too deep"));
    }

    match tokens.first() {
        Some(Token::LeftParen) => parser_map(
            parse_delimited(Token::LeftParen, Token::RightParen, "')'", depth),
            |values| Ok(Value::list(values))
        )(tokens),
        Some(Token::LeftBracket) => parser_map(
            parse_delimited(Token::LeftBracket, Token::RightBracket, "']'", depth),
            |values| Ok(Value::vector(values))
        )(tokens),
        Some(Token::LeftBrace) => parser_map(
            parse_delimited(Token::LeftBrace, Token::RightBrace, "'}'", depth),
            build_hash_map
        )(tokens),
        Some(Token::Quote) => parse_reader_macro("quote", depth)(tokens),
        Some(Token::Quasiquote) => parse_reader_macro("quasiquote", depth)(tokens),
        Some(Token::Unquote) => parse_reader_macro("unquote", depth)(tokens),
        Some(Token::SpliceUnquote) => parse_reader_macro("splice-unquote", depth)(tokens),
        Some(Token::Deref) => parse_reader_macro("deref", depth)(tokens),
        _ => parse_atom(tokens),
    }
}

/// Reads exactly one form from `input`.
///
/// Blank or comment-only input yields [`MalletError::NoTokens`], anything
/// left over after the first form is a syntax error.
pub fn parse(input: &str) -> ParseResult<Value> {
    let tokens = lexer(input)?;
    if tokens.is_empty() { return Err(MalletError::NoTokens); }

    let (tokens, value) = parse_form(&tokens, 0)?;
    if let Some(token) = tokens.first() {
        return Err(MalletError::syntax(format!("unexpected {} after the end of the form", token)));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use anyhow::bail;

    use crate::test_utils::{all_testcases, load_test_pair, TestOutput};

    use super::*;

    fn assert_can_parse(testcase: (usize, usize), input: String, expected_result: Result<TestOutput, MalletError>) -> anyhow::Result<()> {
        let parse_result = parse(&input);
        match (parse_result, expected_result) {
            (Ok(result), Err(expected @ MalletError::SyntaxError(_))) => bail!("Testcase {}:{} - Expected {:?} but got {:?}", testcase.0, testcase.1, expected, result),
            (Err(result @ MalletError::SyntaxError(_)), Ok(expected)) => bail!("Testcase {}:{} - Expected {:?} but got {:?}", testcase.0, testcase.1, expected, result),
            (Err(result), Err(expected @ (MalletError::SyntaxError(_) | MalletError::NoTokens))) if result.kind() != expected.kind()
                => bail!("Testcase {}:{} - Expected {:?} but got {:?}", testcase.0, testcase.1, expected, result),
            _ => Ok(())
        }
    }

    #[test]
    fn parse_testcases() -> anyhow::Result<()> {
        for testcase in all_testcases() {
            println!("Running testcase {}", testcase);
            let entries = load_test_pair(testcase)?;

            for (lineno, (input, expected)) in entries.into_iter().enumerate() {
                assert_can_parse((testcase, lineno), input, expected.into())?;
            }
        }

        Ok(())
    }

    #[test]
    fn reads_scalars() -> anyhow::Result<()> {
        assert_eq!(parse("42")?, Value::Number(42));
        assert_eq!(parse("-7")?, Value::Number(-7));
        assert_eq!(parse("+3")?, Value::Number(3));
        assert_eq!(parse("-")?, Value::symbol("-"));
        assert_eq!(parse("nil")?, Value::Nil);
        assert_eq!(parse("true")?, Value::Bool(true));
        assert_eq!(parse(":kw")?, Value::keyword("kw"));
        assert_eq!(parse("swap!")?, Value::symbol("swap!"));
        assert_eq!(parse("1abc")?, Value::symbol("1abc"));
        Ok(())
    }

    #[test]
    fn reads_nested_collections() -> anyhow::Result<()> {
        let value = parse("(1 [2 3] {:a (4)})")?;
        let Value::List(items) = &value else { bail!("expected a list, got {:?}", value) };

        assert_eq!(items.len(), 3);
        assert!(matches!(items[1], Value::Vector(_)));
        assert!(matches!(items[2], Value::HashMap(_)));
        assert_eq!(value.to_string(), "(1 [2 3] {:a (4)})");
        Ok(())
    }

    #[test]
    fn commas_and_comments_are_whitespace() -> anyhow::Result<()> {
        assert_eq!(parse("(1, 2 ; trailing comment\n 3)")?, parse("(1 2 3)")?);
        Ok(())
    }

    #[test]
    fn expands_reader_macros() -> anyhow::Result<()> {
        assert_eq!(parse("'a")?.to_string(), "(quote a)");
        assert_eq!(parse("`(a ~b ~@c)")?.to_string(), "(quasiquote (a (unquote b) (splice-unquote c)))");
        assert_eq!(parse("@a")?.to_string(), "(deref a)");
        Ok(())
    }

    #[test]
    fn decodes_string_escapes() -> anyhow::Result<()> {
        assert_eq!(parse(r#""a\nb\t\"c\\""#)?, Value::string("a\nb\t\"c\\"));
        assert_eq!(parse(r#""caf\xe9;""#)?, Value::string("café"));
        assert_eq!(parse(r#""semi;colon""#)?, Value::string("semi;colon"));
        Ok(())
    }

    #[test]
    fn blank_input_has_no_tokens() {
        assert_eq!(parse(""), Err(MalletError::NoTokens));
        assert_eq!(parse("   ; only a comment"), Err(MalletError::NoTokens));
    }

    #[test]
    fn malformed_input_is_a_syntax_error() {
        for input in ["(1 2", "[1 2)", ")", "\"abc", r#""bad \q escape""#, "{:a}", "{1 2}", "99999999999999999999", "(1) 2", "^meta"] {
            assert!(matches!(parse(input), Err(MalletError::SyntaxError(_))), "{} should not parse", input);
        }
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let input = "(".repeat(100_000);
        assert_eq!(parse(&input), Err(MalletError::syntax("nesting too deep")));

        let input = format!("{}{}", "[".repeat(5_000), "]".repeat(5_000));
        assert!(matches!(parse(&input), Err(MalletError::SyntaxError(_))));

        let input = "'".repeat(MAX_DEPTH + 1) + "x";
        assert!(matches!(parse(&input), Err(MalletError::SyntaxError(_))));
    }

    #[test]
    fn nesting_up_to_the_limit_is_read() -> anyhow::Result<()> {
        let input = format!("{}1{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        let mut value = parse(&input)?;
        for _ in 0..MAX_DEPTH {
            value = match value.as_sequence() {
                Some([inner]) => inner.clone(),
                _ => bail!("expected a single element list, got {}", value),
            };
        }
        assert_eq!(value, Value::Number(1));
        Ok(())
    }

    #[test]
    fn duplicate_literal_keys_are_rejected() {
        assert!(matches!(parse("{:a 1 :a 2}"), Err(MalletError::SyntaxError(_))));
        assert!(parse(r#"{:a 1 "a" 2}"#).is_ok());
    }
}
