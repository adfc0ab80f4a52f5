use std::collections::HashSet;
use std::fmt;

use crate::{ActionDecl, EntityDecl};

/// A line/column location in declaration text, both counted from one.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    /// The line.
    pub line: usize,
    /// The column.
    pub column: usize,
}

impl Position {
    fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// An error in the textual declaration language.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// A token other than the one the grammar requires.
    UnexpectedToken {
        /// What the grammar required.
        expected: String,
        /// What was there.
        found: String,
        /// Where.
        position: Position,
    },
    /// The input ended mid-declaration.
    UnexpectedEndOfInput {
        /// What the grammar required.
        expected: String,
        /// Where.
        position: Position,
    },
    /// An action declared twice in one declaration.
    DuplicateAction {
        /// The action.
        name: String,
        /// Where the second declaration starts.
        position: Position,
    },
    /// Any other error.
    Custom {
        /// What went wrong.
        message: String,
        /// Where.
        position: Position,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedToken {
                expected,
                found,
                position,
            } => {
                write!(
                    f,
                    "at line {}:{}: expected {expected}, found '{found}'",
                    position.line, position.column
                )
            }
            ParseError::UnexpectedEndOfInput { expected, position } => {
                write!(
                    f,
                    "at line {}:{}: unexpected end of input, expected {expected}",
                    position.line, position.column
                )
            }
            ParseError::DuplicateAction { name, position } => {
                write!(
                    f,
                    "at line {}:{}: duplicate action '{name}'",
                    position.line, position.column
                )
            }
            ParseError::Custom { message, position } => {
                write!(
                    f,
                    "at line {}:{}: {message}",
                    position.line, position.column
                )
            }
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    // Keywords
    Entity,
    With,
    Any,
    Method,
    Once,
    Repeatable,

    Identifier(String),

    // Symbols
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Colon,
    Comma,
    At,
    DoubleColon,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Entity => write!(f, "entity"),
            Token::With => write!(f, "with"),
            Token::Any => write!(f, "any"),
            Token::Method => write!(f, "method"),
            Token::Once => write!(f, "once"),
            Token::Repeatable => write!(f, "repeatable"),
            Token::Identifier(s) => write!(f, "{s}"),
            Token::LeftBrace => write!(f, "{{"),
            Token::RightBrace => write!(f, "}}"),
            Token::LeftBracket => write!(f, "["),
            Token::RightBracket => write!(f, "]"),
            Token::Colon => write!(f, ":"),
            Token::Comma => write!(f, ","),
            Token::At => write!(f, "@"),
            Token::DoubleColon => write!(f, "::"),
        }
    }
}

struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    fn current_position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        ident
    }

    fn symbol(&mut self, token: Token, pos: Position, tokens: &mut Vec<(Token, Position)>) {
        self.advance();
        tokens.push((token, pos));
    }

    fn tokenize(&mut self) -> Result<Vec<(Token, Position)>, ParseError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();

            let pos = self.current_position();

            match self.peek() {
                None => break,
                Some('{') => self.symbol(Token::LeftBrace, pos, &mut tokens),
                Some('}') => self.symbol(Token::RightBrace, pos, &mut tokens),
                Some('[') => self.symbol(Token::LeftBracket, pos, &mut tokens),
                Some(']') => self.symbol(Token::RightBracket, pos, &mut tokens),
                Some(',') => self.symbol(Token::Comma, pos, &mut tokens),
                Some('@') => self.symbol(Token::At, pos, &mut tokens),
                Some(':') => {
                    self.advance();
                    if self.peek() == Some(':') {
                        self.advance();
                        tokens.push((Token::DoubleColon, pos));
                    } else {
                        tokens.push((Token::Colon, pos));
                    }
                }
                Some(ch) if ch.is_alphabetic() || ch == '_' => {
                    let ident = self.read_identifier();
                    let token = match ident.as_str() {
                        "entity" => Token::Entity,
                        "with" => Token::With,
                        "any" => Token::Any,
                        "method" => Token::Method,
                        "once" => Token::Once,
                        "repeatable" => Token::Repeatable,
                        _ => Token::Identifier(ident),
                    };
                    tokens.push((token, pos));
                }
                Some(ch) => {
                    return Err(ParseError::Custom {
                        message: format!("unexpected character '{ch}'"),
                        position: pos,
                    });
                }
            }
        }

        Ok(tokens)
    }
}

struct Parser {
    tokens: Vec<(Token, Position)>,
    position: usize,
}

impl Parser {
    fn new(tokens: Vec<(Token, Position)>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn current_position(&self) -> Position {
        self.tokens
            .get(self.position)
            .map(|(_, pos)| pos.clone())
            .unwrap_or_else(|| {
                self.tokens
                    .last()
                    .map(|(_, pos)| Position::new(pos.line, pos.column + 1))
                    .unwrap_or_else(|| Position::new(1, 1))
            })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|(token, _)| token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position)?.0.clone();
        self.position += 1;
        Some(token)
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let position = self.current_position();
        match self.peek() {
            Some(token) => ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: token.to_string(),
                position,
            },
            None => ParseError::UnexpectedEndOfInput {
                expected: expected.to_string(),
                position,
            },
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        if self.peek() == Some(&expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&expected.to_string()))
        }
    }

    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Identifier(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    // IDENT (:: IDENT)*
    fn parse_path(&mut self) -> Result<String, ParseError> {
        let mut parts = vec![self.parse_identifier()?];
        while self.peek() == Some(&Token::DoubleColon) {
            self.advance();
            parts.push(self.parse_identifier()?);
        }
        Ok(parts.join("::"))
    }

    fn parse_initiator(&mut self) -> Result<serde_json::Value, ParseError> {
        match self.peek() {
            Some(Token::Any) => {
                self.advance();
                Ok(serde_json::Value::String("any".to_string()))
            }
            Some(Token::Method) => {
                self.advance();
                let name = self.parse_identifier()?;
                Ok(serde_json::json! {{"method": name}})
            }
            Some(Token::LeftBracket) => {
                self.advance();
                let mut types = vec![serde_json::Value::String(self.parse_path()?)];
                while self.peek() == Some(&Token::Comma) {
                    self.advance();
                    types.push(serde_json::Value::String(self.parse_path()?));
                }
                self.expect(Token::RightBracket)?;
                Ok(serde_json::Value::Array(types))
            }
            Some(Token::Identifier(_)) => Ok(serde_json::Value::String(self.parse_path()?)),
            _ => Err(self.unexpected("'any', a type, '[', or 'method'")),
        }
    }

    fn parse_repeat(&mut self) -> Result<serde_json::Value, ParseError> {
        if self.peek() != Some(&Token::At) {
            return Ok(serde_json::Value::Bool(false));
        }
        self.advance();
        match self.peek() {
            Some(Token::Once) => {
                self.advance();
                Ok(serde_json::Value::Bool(true))
            }
            Some(Token::Repeatable) => {
                self.advance();
                Ok(serde_json::Value::Bool(false))
            }
            Some(Token::Method) => {
                self.advance();
                let name = self.parse_identifier()?;
                Ok(serde_json::json! {{"method": name}})
            }
            _ => Err(ParseError::Custom {
                message: "expected 'once', 'repeatable', or 'method' after '@'".to_string(),
                position: self.current_position(),
            }),
        }
    }

    fn parse_clause(&mut self, seen: &mut HashSet<String>) -> Result<ActionDecl, ParseError> {
        let mut actions = vec![];
        loop {
            let pos = self.current_position();
            let action = self.parse_identifier()?;
            if !seen.insert(action.clone()) {
                return Err(ParseError::DuplicateAction {
                    name: action,
                    position: pos,
                });
            }
            actions.push(action);
            match self.peek() {
                Some(Token::Comma) => {
                    self.advance();
                }
                Some(Token::Colon) => {
                    self.advance();
                    break;
                }
                _ => return Err(self.unexpected("',' or ':' after action")),
            }
        }
        self.expect(Token::With)?;
        let with = self.parse_initiator()?;
        let only_once = self.parse_repeat()?;
        Ok(ActionDecl {
            actions,
            with,
            only_once,
        })
    }

    fn parse_entity_decl(&mut self) -> Result<EntityDecl, ParseError> {
        self.expect(Token::Entity)?;
        let name = self.parse_path()?;
        self.expect(Token::LeftBrace)?;

        let mut actions = Vec::new();
        let mut seen = HashSet::new();

        while self.peek() != Some(&Token::RightBrace) && self.peek().is_some() {
            actions.push(self.parse_clause(&mut seen)?);

            // Handle optional comma
            if self.peek() == Some(&Token::Comma) {
                self.advance();
            } else if self.peek() != Some(&Token::RightBrace) {
                return Err(ParseError::Custom {
                    message: "expected ',' or '}' after action clause".to_string(),
                    position: self.current_position(),
                });
            }
        }

        self.expect(Token::RightBrace)?;

        Ok(EntityDecl { name, actions })
    }
}

pub(crate) fn parse(input: &str) -> Result<EntityDecl, ParseError> {
    let mut lexer = Lexer::new(input);
    let tokens = lexer.tokenize()?;
    let mut parser = Parser::new(tokens);
    let decl = parser.parse_entity_decl()?;
    if parser.peek().is_some() {
        return Err(parser.unexpected("end of input"));
    }
    Ok(decl)
}

pub(crate) fn parse_all(input: &str) -> Result<Vec<EntityDecl>, ParseError> {
    let mut lexer = Lexer::new(input);
    let tokens = lexer.tokenize()?;
    let mut parser = Parser::new(tokens);
    let mut decls = vec![];
    while parser.peek().is_some() {
        decls.push(parser.parse_entity_decl()?);
    }
    Ok(decls)
}
