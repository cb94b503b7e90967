//! Tokenizer for query expressions

use super::QueryError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Pipe,
    Dot,
    DotDot,
    ColonColon,
    /// `*` as a name test
    Star,
    /// `*` as the multiplication operator
    Multiply,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    And,
    Or,
    Div,
    Mod,
    Literal(String),
    Number(f64),
    Name(String),
}

impl Token {
    /// Whether a `*` or operator name after this token must be read as an operator
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            Token::RBracket
                | Token::RParen
                | Token::Dot
                | Token::DotDot
                | Token::Star
                | Token::Literal(_)
                | Token::Number(_)
                | Token::Name(_)
        )
    }
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, QueryError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let operator_context = tokens.last().is_some_and(Token::ends_operand);

        let token = match c {
            ' ' | '\t' | '\r' | '\n' => {
                i += 1;
                continue;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                i += 2;
                Token::DoubleSlash
            }
            '/' => {
                i += 1;
                Token::Slash
            }
            '[' => {
                i += 1;
                Token::LBracket
            }
            ']' => {
                i += 1;
                Token::RBracket
            }
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '@' => {
                i += 1;
                Token::At
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            '|' => {
                i += 1;
                Token::Pipe
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                i += 2;
                Token::ColonColon
            }
            '*' => {
                i += 1;
                if operator_context {
                    Token::Multiply
                } else {
                    Token::Star
                }
            }
            '=' => {
                i += 1;
                Token::Eq
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                i += 2;
                Token::NotEq
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                i += 2;
                Token::Le
            }
            '<' => {
                i += 1;
                Token::Lt
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                i += 2;
                Token::Ge
            }
            '>' => {
                i += 1;
                Token::Gt
            }
            '+' => {
                i += 1;
                Token::Plus
            }
            '-' => {
                i += 1;
                Token::Minus
            }
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == quote)
                    .map(|p| start + p)
                    .ok_or_else(|| QueryError::Syntax {
                        query: source.to_string(),
                        message: format!("unterminated string literal at offset {}", i),
                    })?;
                i = end + 1;
                Token::Literal(chars[start..end].iter().collect())
            }
            '.' if chars.get(i + 1) == Some(&'.') => {
                i += 2;
                Token::DotDot
            }
            '.' if !chars.get(i + 1).is_some_and(|ch| ch.is_ascii_digit()) => {
                i += 1;
                Token::Dot
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text.parse::<f64>().map_err(|_| QueryError::Syntax {
                    query: source.to_string(),
                    message: format!("invalid number '{}'", text),
                })?;
                Token::Number(value)
            }
            c if is_name_start(c) => {
                let start = i;
                while i < chars.len() && is_name_char(&chars, i) {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                match name.as_str() {
                    "and" if operator_context => Token::And,
                    "or" if operator_context => Token::Or,
                    "div" if operator_context => Token::Div,
                    "mod" if operator_context => Token::Mod,
                    _ => Token::Name(name),
                }
            }
            other => {
                return Err(QueryError::UnexpectedChar {
                    query: source.to_string(),
                    ch: other,
                    offset: i,
                })
            }
        };

        tokens.push(token);
    }

    Ok(tokens)
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(chars: &[char], i: usize) -> bool {
    let c = chars[i];
    if c == ':' {
        // `a:b` is a prefixed name, `a::b` an axis
        return chars.get(i + 1).is_some_and(|&n| n != ':' && is_name_start(n))
            && chars.get(i.wrapping_sub(1)) != Some(&':');
    }
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_path() {
        let tokens = tokenize("/APIProxy/ProxyEndpoints/@name").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Slash,
                Token::Name("APIProxy".into()),
                Token::Slash,
                Token::Name("ProxyEndpoints".into()),
                Token::Slash,
                Token::At,
                Token::Name("name".into()),
            ]
        );
    }

    #[test]
    fn test_star_disambiguation() {
        let tokens = tokenize("*[1] * 2").unwrap();
        assert_eq!(tokens[0], Token::Star);
        assert_eq!(tokens[4], Token::Multiply);
    }

    #[test]
    fn test_operator_names() {
        let tokens = tokenize("and and or").unwrap();
        assert_eq!(
            tokens,
            vec![Token::Name("and".into()), Token::And, Token::Name("or".into())]
        );
    }

    #[test]
    fn test_axis_and_hyphenated_names() {
        let tokens = tokenize("ancestor::Flow[starts-with(name(), 'Pre')]").unwrap();
        assert_eq!(tokens[0], Token::Name("ancestor".into()));
        assert_eq!(tokens[1], Token::ColonColon);
        assert_eq!(tokens[2], Token::Name("Flow".into()));
        assert_eq!(tokens[4], Token::Name("starts-with".into()));
    }

    #[test]
    fn test_literals_and_numbers() {
        let tokens = tokenize("'a b' = \"c\" and 2.5 > .5").unwrap();
        assert_eq!(tokens[0], Token::Literal("a b".into()));
        assert_eq!(tokens[2], Token::Literal("c".into()));
        assert_eq!(tokens[4], Token::Number(2.5));
        assert_eq!(tokens[6], Token::Number(0.5));
    }

    #[test]
    fn test_unterminated_literal() {
        assert!(matches!(
            tokenize("Name[text() = 'oops]"),
            Err(QueryError::Syntax { .. })
        ));
    }

    #[test]
    fn test_unexpected_char() {
        assert!(matches!(
            tokenize("Step#Name"),
            Err(QueryError::UnexpectedChar { ch: '#', .. })
        ));
    }
}
