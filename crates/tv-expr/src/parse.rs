use tv_tree::Tree;
use tv_types::{FieldType, Value, cast_value};

use crate::{ExprError, Operand, Operator};

/// Compile a textual predicate into an [`Operator`] bound to `tree`'s
/// columns.
///
/// Grammar (lowest to highest precedence):
///   or_expr    → and_expr ( "or" and_expr )*
///   and_expr   → not_expr ( "and" not_expr )*
///   not_expr   → "not" not_expr | primary
///   primary    → "true" | "false" | "(" or_expr ")"
///              | "if" "(" or_expr "," or_expr "," or_expr ")"
///              | operand ( CMP operand | ("+" | "-") operand )
///   operand    → IDENT | `quoted ident` | NUMBER | STRING | "true" | "false" | "null"
///
/// Each comparison maps to its own operator, so hidden rows fail all of them.
/// `!= null` is the is-not-null check. Literals on the right are cast to the
/// left column's declared type.
pub fn parse_expr(input: &str, tree: &Tree) -> Result<Operator, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        tree,
    };
    let result = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(ExprError::Parse(format!(
            "unexpected token at position {}: {token:?}",
            parser.pos
        )));
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,
    // Comparison
    EqEq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
    // Arithmetic
    Plus,
    Minus,
    // Grouping
    LParen,
    RParen,
    Comma,
    // Logical (keywords)
    And,
    Or,
    Not,
    If,
}

impl Token {
    fn starts_operand(&self) -> bool {
        matches!(
            self,
            Self::Ident(_) | Self::Int(_) | Self::Float(_) | Self::Str(_) | Self::Null
        )
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                // negative literal unless it follows an operand
                let follows_operand = matches!(
                    tokens.last(),
                    Some(Token::Ident(_) | Token::Int(_) | Token::Float(_) | Token::Str(_) | Token::RParen)
                );
                if i + 1 < chars.len() && chars[i + 1].is_ascii_digit() && !follows_operand {
                    let start = i;
                    i += 1;
                    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                        i += 1;
                    }
                    tokens.push(number(&chars[start..i])?);
                } else {
                    tokens.push(Token::Minus);
                    i += 1;
                }
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                if i + 1 < chars.len() && chars[i + 1] == '=' {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(ExprError::Parse("expected '==' but found single '='".into()));
                }
            }
            '!' => {
                if i + 1 < chars.len() && chars[i + 1] == '=' {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    return Err(ExprError::Parse("expected '!=' but found single '!'".into()));
                }
            }
            '>' => {
                if i + 1 < chars.len() && chars[i + 1] == '=' {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '<' => {
                if i + 1 < chars.len() && chars[i + 1] == '=' {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '\'' | '"' | '`' => {
                let quote = c;
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(ExprError::Parse("unterminated quoted text".into()));
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(if quote == '`' {
                    Token::Ident(text)
                } else {
                    Token::Str(text)
                });
                i += 1;
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(number(&chars[start..i])?);
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "if" => Token::If,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            _ => {
                return Err(ExprError::Parse(format!("unexpected character: '{c}'")));
            }
        }
    }
    Ok(tokens)
}

fn number(chars: &[char]) -> Result<Token, ExprError> {
    let text: String = chars.iter().collect();
    if text.contains('.') {
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| ExprError::Parse(format!("invalid float: {text}")))
    } else {
        text.parse::<i64>()
            .map(Token::Int)
            .map_err(|_| ExprError::Parse(format!("invalid integer: {text}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Eq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
}

struct Parser<'p> {
    tokens: &'p [Token],
    pos: usize,
    tree: &'p Tree,
}

impl<'p> Parser<'p> {
    fn peek(&self) -> Option<&'p Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'p Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), ExprError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(ExprError::Parse(format!("expected {what}")))
        }
    }

    fn parse_or(&mut self) -> Result<Operator, ExprError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Operator::Or {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Operator, ExprError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Operator::And {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Operator, ExprError> {
        if self.eat(&Token::Not) {
            let inner = self.parse_not()?;
            return Ok(Operator::Not {
                expr: Box::new(inner),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Operator, ExprError> {
        match self.peek() {
            None => Err(ExprError::Parse("unexpected end of expression".into())),
            Some(Token::True) => {
                self.pos += 1;
                Ok(Operator::True)
            }
            Some(Token::False) => {
                self.pos += 1;
                Ok(Operator::False)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect(&Token::RParen, "closing ')'")?;
                Ok(inner)
            }
            Some(Token::If) => {
                self.pos += 1;
                self.expect(&Token::LParen, "'(' after if")?;
                let cond = self.parse_or()?;
                self.expect(&Token::Comma, "',' after if condition")?;
                let then = self.parse_or()?;
                self.expect(&Token::Comma, "',' after if branch")?;
                let otherwise = self.parse_or()?;
                self.expect(&Token::RParen, "closing ')' of if")?;
                Ok(Operator::If {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                })
            }
            Some(token) if token.starts_operand() => self.parse_binary(),
            Some(other) => Err(ExprError::Parse(format!("unexpected token: {other:?}"))),
        }
    }

    fn parse_binary(&mut self) -> Result<Operator, ExprError> {
        let left = self.parse_operand(None)?;
        let declared = self.declared_type(&left);

        let comparison = match self.peek() {
            Some(Token::EqEq) => Some(Comparison::Eq),
            Some(Token::NotEq) => Some(Comparison::NotEq),
            Some(Token::Gt) => Some(Comparison::Gt),
            Some(Token::Ge) => Some(Comparison::Ge),
            Some(Token::Lt) => Some(Comparison::Lt),
            Some(Token::Le) => Some(Comparison::Le),
            _ => None,
        };
        if let Some(comparison) = comparison {
            self.pos += 1;
            let right = self.parse_operand(declared)?;
            return Ok(lower_comparison(comparison, left, right));
        }

        let additive = match self.peek() {
            Some(Token::Plus) => true,
            Some(Token::Minus) => false,
            Some(other) => {
                return Err(ExprError::Parse(format!(
                    "expected a comparison or arithmetic operator, found {other:?}"
                )));
            }
            None => {
                return Err(ExprError::Parse(
                    "expected a comparison or arithmetic operator".into(),
                ));
            }
        };
        self.pos += 1;
        let right = self.parse_operand(declared)?;
        if matches!(
            self.peek(),
            Some(Token::EqEq | Token::NotEq | Token::Gt | Token::Ge | Token::Lt | Token::Le)
        ) {
            return Err(ExprError::Parse(
                "arithmetic results cannot be compared".into(),
            ));
        }
        Ok(if additive {
            Operator::Add { left, right }
        } else {
            Operator::Subtract { left, right }
        })
    }

    /// Parse one operand. `cast_to` is the declared type of the column on the
    /// other side, applied to literals.
    fn parse_operand(&mut self, cast_to: Option<FieldType>) -> Result<Operand, ExprError> {
        let tree = self.tree;
        let literal = match self.next() {
            None => return Err(ExprError::Parse("unexpected end of expression".into())),
            Some(Token::Ident(name)) => {
                return tree
                    .root()
                    .find(name.as_str())
                    .map(Operand::column)
                    .ok_or_else(|| ExprError::UnknownColumn(name.clone()));
            }
            Some(Token::Null) => return Ok(Operand::null()),
            Some(Token::Int(n)) => Value::Int64(*n),
            Some(Token::Float(f)) => Value::Float64(*f),
            Some(Token::Str(s)) => Value::Utf8(s.clone()),
            Some(Token::True) => Value::Bool(true),
            Some(Token::False) => Value::Bool(false),
            Some(other) => {
                return Err(ExprError::Parse(format!("expected an operand, found {other:?}")));
            }
        };
        match cast_to {
            Some(field_type) => Ok(Operand::typed(cast_value(&literal, field_type)?, field_type)),
            None => Ok(Operand::literal(literal)),
        }
    }

    fn declared_type(&self, operand: &Operand) -> Option<FieldType> {
        match operand {
            Operand::Column(idx) => self.tree.node(*idx).ok().map(|node| node.field_type()),
            Operand::Literal { .. } => None,
        }
    }
}

fn lower_comparison(comparison: Comparison, left: Operand, right: Operand) -> Operator {
    match comparison {
        Comparison::Eq => Operator::Eq { left, right },
        Comparison::NotEq => Operator::Ne { left, right },
        Comparison::Gt => Operator::Gt { left, right },
        Comparison::Ge => Operator::Ge { left, right },
        Comparison::Lt => Operator::Lt { left, right },
        Comparison::Le => Operator::Le { left, right },
    }
}
