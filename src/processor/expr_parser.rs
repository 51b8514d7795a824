//! Tokenizer and parser for SQL-like expression strings
//!
//! Handles the subset used by ad-hoc queries: column references (plain,
//! qualified `a.b`, or back-quoted), numeric/string/boolean/null literals,
//! arithmetic, comparisons, `AND`/`OR`/`NOT`, `IS [NOT] NULL`, `CAST(e AS t)`,
//! scalar function calls, and a trailing `AS alias`.
//!
//! Precedence, loosest first: `OR`, `AND`, `NOT`, comparison, `+ -`, `* / %`,
//! unary minus.

use std::iter::Peekable;
use std::str::Chars;

use crate::processor::column::ColumnType;
use crate::processor::expr::{BinaryOp, Expr, ScalarFunction};
use crate::processor::{ProcessorError, Result, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Identifier(String),
    /// Back-quoted identifier, never treated as a keyword
    QuotedIdentifier(String),
    Integer(i64),
    Float(f64),
    String(String),

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Bang,

    LeftParen,
    RightParen,
    Comma,
    Dot,
}

fn parse_error(msg: impl Into<String>) -> ProcessorError {
    ProcessorError::Parse(msg.into())
}

/// Parse operator tokens, looking ahead for the two-character forms
fn parse_operator(ch: char, chars: &mut Peekable<Chars>) -> Option<Token> {
    let token = match ch {
        '+' => Token::Plus,
        '-' => Token::Minus,
        '*' => Token::Star,
        '/' => Token::Slash,
        '%' => Token::Percent,
        '(' => Token::LeftParen,
        ')' => Token::RightParen,
        ',' => Token::Comma,
        '.' => Token::Dot,
        '=' => {
            chars.next();
            if chars.peek() == Some(&'=') {
                chars.next();
            }
            return Some(Token::Equal);
        }
        '!' => {
            chars.next();
            if chars.peek() == Some(&'=') {
                chars.next();
                return Some(Token::NotEqual);
            }
            return Some(Token::Bang);
        }
        '<' => {
            chars.next();
            return Some(match chars.peek() {
                Some('=') => {
                    chars.next();
                    Token::LessEqual
                }
                Some('>') => {
                    chars.next();
                    Token::NotEqual
                }
                _ => Token::Less,
            });
        }
        '>' => {
            chars.next();
            if chars.peek() == Some(&'=') {
                chars.next();
                return Some(Token::GreaterEqual);
            }
            return Some(Token::Greater);
        }
        _ => return None,
    };
    chars.next();
    Some(token)
}

/// Quoted literal or back-quoted identifier; a doubled quote escapes itself
fn parse_quoted(quote: char, chars: &mut Peekable<Chars>) -> Result<String> {
    chars.next();
    let mut out = String::new();
    loop {
        match chars.next() {
            Some(c) if c == quote => {
                if chars.peek() == Some(&quote) {
                    chars.next();
                    out.push(quote);
                } else {
                    return Ok(out);
                }
            }
            Some('\\') if quote != '`' => match chars.next() {
                Some(c) => out.push(c),
                None => return Err(parse_error("unterminated escape in string literal")),
            },
            Some(c) => out.push(c),
            None => return Err(parse_error(format!("unterminated {} quote", quote))),
        }
    }
}

fn parse_number(chars: &mut Peekable<Chars>) -> Result<Token> {
    let mut text = String::new();
    let mut is_float = false;
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            text.push(c);
        } else if c == '.' && !is_float {
            is_float = true;
            text.push(c);
        } else if (c == 'e' || c == 'E') && !text.is_empty() {
            is_float = true;
            text.push(c);
            chars.next();
            if let Some(&sign) = chars.peek() {
                if sign == '+' || sign == '-' {
                    text.push(sign);
                    chars.next();
                }
            }
            continue;
        } else {
            break;
        }
        chars.next();
    }

    if is_float {
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|e| parse_error(format!("invalid number '{}': {}", text, e)))
    } else {
        text.parse::<i64>()
            .map(Token::Integer)
            .map_err(|e| parse_error(format!("invalid integer '{}': {}", text, e)))
    }
}

fn parse_identifier(chars: &mut Peekable<Chars>) -> String {
    let mut ident = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_alphanumeric() || c == '_' || c == '$' {
            ident.push(c);
            chars.next();
        } else {
            break;
        }
    }
    ident
}

pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch == '\'' || ch == '"' {
            tokens.push(Token::String(parse_quoted(ch, &mut chars)?));
        } else if ch == '`' {
            tokens.push(Token::QuotedIdentifier(parse_quoted(ch, &mut chars)?));
        } else if ch.is_ascii_digit() {
            tokens.push(parse_number(&mut chars)?);
        } else if ch.is_alphabetic() || ch == '_' {
            tokens.push(Token::Identifier(parse_identifier(&mut chars)));
        } else if let Some(op) = parse_operator(ch, &mut chars) {
            tokens.push(op);
        } else {
            return Err(parse_error(format!("unexpected character '{}'", ch)));
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Identifier(s)) if s.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            Some(t) => Err(parse_error(format!("expected {:?}, found {:?}", token, t))),
            None => Err(parse_error(format!("expected {:?}, found end of input", token))),
        }
    }

    fn expression(&mut self) -> Result<Expr> {
        let e = self.or()?;
        if self.eat_keyword("AS") {
            let name = self.name()?;
            return Ok(e.alias(&name));
        }
        Ok(e)
    }

    fn or(&mut self) -> Result<Expr> {
        let mut left = self.and()?;
        while self.eat_keyword("OR") {
            left = left.or(self.and()?);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut left = self.not()?;
        while self.eat_keyword("AND") {
            left = left.and(self.not()?);
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr> {
        if self.eat_keyword("NOT") {
            return Ok(!self.not()?);
        }
        if self.peek() == Some(&Token::Bang) {
            self.pos += 1;
            return Ok(!self.not()?);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.additive()?;

        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            if !self.eat_keyword("NULL") {
                return Err(parse_error("expected NULL after IS"));
            }
            return Ok(if negated {
                left.is_not_null()
            } else {
                left.is_null()
            });
        }

        let op = match self.peek() {
            Some(Token::Equal) => BinaryOp::Eq,
            Some(Token::NotEqual) => BinaryOp::NotEq,
            Some(Token::Less) => BinaryOp::Lt,
            Some(Token::LessEqual) => BinaryOp::LtEq,
            Some(Token::Greater) => BinaryOp::Gt,
            Some(Token::GreaterEqual) => BinaryOp::GtEq,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.additive()?;
        Ok(Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            left = match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    left + self.multiplicative()?
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    left - self.multiplicative()?
                }
                _ => return Ok(left),
            };
        }
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        loop {
            left = match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    left * self.unary()?
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    left / self.unary()?
                }
                Some(Token::Percent) => {
                    self.pos += 1;
                    left % self.unary()?
                }
                _ => return Ok(left),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(match self.unary()? {
                    Expr::Literal(Value::Int(v)) => Expr::Literal(Value::Int(-v)),
                    Expr::Literal(Value::Float(v)) => Expr::Literal(Value::Float(-v)),
                    other => -other,
                })
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn name(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Identifier(s)) | Some(Token::QuotedIdentifier(s)) => Ok(s),
            Some(t) => Err(parse_error(format!("expected identifier, found {:?}", t))),
            None => Err(parse_error("expected identifier, found end of input")),
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Integer(v)) => Ok(Expr::Literal(Value::Int(v))),
            Some(Token::Float(v)) => Ok(Expr::Literal(Value::Float(v))),
            Some(Token::String(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::LeftParen) => {
                let inner = self.or()?;
                self.expect(Token::RightParen)?;
                Ok(inner)
            }
            Some(Token::QuotedIdentifier(name)) => self.column_path(name),
            Some(Token::Identifier(name)) => {
                match name.to_ascii_uppercase().as_str() {
                    "TRUE" => return Ok(Expr::Literal(Value::Bool(true))),
                    "FALSE" => return Ok(Expr::Literal(Value::Bool(false))),
                    "NULL" => return Ok(Expr::Literal(Value::Null)),
                    _ => {}
                }
                if self.peek() == Some(&Token::LeftParen) {
                    self.pos += 1;
                    return self.call(&name);
                }
                self.column_path(name)
            }
            Some(t) => Err(parse_error(format!("unexpected token {:?}", t))),
            None => Err(parse_error("unexpected end of input")),
        }
    }

    fn column_path(&mut self, first: String) -> Result<Expr> {
        let mut path = first;
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            path.push('.');
            path.push_str(&self.name()?);
        }
        Ok(Expr::Column(path))
    }

    fn call(&mut self, name: &str) -> Result<Expr> {
        if name.eq_ignore_ascii_case("CAST") {
            let inner = self.or()?;
            if !self.eat_keyword("AS") {
                return Err(parse_error("expected AS in CAST"));
            }
            let type_name = self.name()?;
            self.expect(Token::RightParen)?;
            return Ok(inner.cast(ColumnType::parse(&type_name)?));
        }

        let func = ScalarFunction::from_name(name)
            .ok_or_else(|| parse_error(format!("unknown function '{}'", name)))?;
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RightParen) {
            loop {
                args.push(self.or()?);
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RightParen)?;
        Ok(Expr::Function { func, args })
    }
}

/// Parse a complete expression; trailing tokens are an error
pub fn parse_expression(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(parse_error("empty expression"));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let e = parser.expression()?;
    if let Some(t) = parser.peek() {
        return Err(parse_error(format!(
            "unexpected trailing token {:?} in '{}'",
            t, input
        )));
    }
    Ok(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::expr::{col, lit, sqrt};

    #[test]
    fn test_tokenize_comparison_forms() {
        let tokens = tokenize("a <> 1 and b == 'x''y'").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("a".into()),
                Token::NotEqual,
                Token::Integer(1),
                Token::Identifier("and".into()),
                Token::Identifier("b".into()),
                Token::Equal,
                Token::String("x'y".into()),
            ]
        );
    }

    #[test]
    fn test_exercise_expressions() {
        assert_eq!(parse_expression("sqrt(x)").unwrap(), sqrt(col("x")));
        assert_eq!(parse_expression("x*x").unwrap(), col("x") * col("x"));
        assert_eq!(
            parse_expression("z % 2 = 0").unwrap(),
            (col("z") % lit(2)).eq(lit(0))
        );
        assert_eq!(
            parse_expression("birthCountry = 'USA'").unwrap(),
            col("birthCountry").eq(lit("USA"))
        );
        assert_eq!(parse_expression("playerID").unwrap(), col("playerID"));
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            parse_expression("a + b * c").unwrap(),
            col("a") + col("b") * col("c")
        );
        assert_eq!(
            parse_expression("NOT a = 1 OR b = 2 AND c = 3").unwrap(),
            (!col("a").eq(lit(1))).or(col("b").eq(lit(2)).and(col("c").eq(lit(3))))
        );
    }

    #[test]
    fn test_qualified_and_quoted_names() {
        assert_eq!(
            parse_expression("m.`max(R)` AS maxruns").unwrap(),
            col("m.max(R)").alias("maxruns")
        );
    }

    #[test]
    fn test_is_null_cast_and_negative_literal() {
        assert_eq!(
            parse_expression("birthState IS NOT NULL").unwrap(),
            col("birthState").is_not_null()
        );
        assert_eq!(
            parse_expression("CAST(R AS double) > -1.5").unwrap(),
            col("R").cast(ColumnType::Float64).gt(lit(-1.5))
        );
    }

    #[test]
    fn test_errors() {
        assert!(parse_expression("").is_err());
        assert!(parse_expression("x +").is_err());
        assert!(parse_expression("nosuch(x)").is_err());
        assert!(parse_expression("'open").is_err());
        assert!(parse_expression("a b").is_err());
    }
}
