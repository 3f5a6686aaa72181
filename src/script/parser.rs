use std::fmt;

use crate::core::traits::engine::CompileError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Arg {
    Text(String),
    Int(i64),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Text(text) => f.write_str(text),
            Arg::Int(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stmt {
    Print {
        stream: Stream,
        args: Vec<Arg>,
        newline: bool,
    },
    Sleep(u64),
    Exit(i64),
    Panic(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{line}:{column}: {msg}")]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub msg: String,
}

impl From<SyntaxError> for CompileError {
    fn from(e: SyntaxError) -> Self {
        CompileError::Syntax {
            line: e.line,
            column: e.column,
            msg: e.msg,
        }
    }
}

pub fn parse(source: &str) -> Result<Vec<Stmt>, SyntaxError> {
    Parser::new(source).program()
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, msg: impl Into<String>) -> SyntaxError {
        self.error_at((self.line, self.column), msg)
    }

    fn error_at(&self, (line, column): (usize, usize), msg: impl Into<String>) -> SyntaxError {
        SyntaxError {
            line,
            column,
            msg: msg.into(),
        }
    }

    /// Skips spaces, tabs and `//` comments but never a newline.
    fn skip_blank(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.bump();
                }
                Some('/') if self.peek_next() == Some('/') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn program(mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut stmts = Vec::new();
        loop {
            self.skip_blank();
            match self.peek() {
                None => return Ok(stmts),
                Some('\n' | ';') => {
                    self.bump();
                }
                Some(_) => {
                    stmts.push(self.statement()?);
                    self.skip_blank();
                    match self.peek() {
                        None | Some('\n' | ';') => {}
                        Some(c) => return Err(self.error(format!("unexpected {c:?} after statement"))),
                    }
                }
            }
        }
    }

    fn statement(&mut self) -> Result<Stmt, SyntaxError> {
        let start = (self.line, self.column);
        let name = self.ident()?;

        self.skip_blank();
        if self.peek() != Some('(') {
            return Err(self.error(format!("expected '(' after {name}")));
        }
        self.bump();
        let args = self.args()?;

        build_stmt(&name, args).map_err(|msg| self.error_at(start, msg))
    }

    fn ident(&mut self) -> Result<String, SyntaxError> {
        let mut name = String::new();
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            Some(c) => return Err(self.error(format!("unexpected {c:?}"))),
            None => return Err(self.error("unexpected end of input")),
        }
        while let Some(c) = self.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            name.push(c);
            self.bump();
        }
        Ok(name)
    }

    fn args(&mut self) -> Result<Vec<Arg>, SyntaxError> {
        let mut args = Vec::new();
        self.skip_blank();
        if self.peek() == Some(')') {
            self.bump();
            return Ok(args);
        }

        loop {
            self.skip_blank();
            args.push(self.arg()?);
            self.skip_blank();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(')') => {
                    self.bump();
                    return Ok(args);
                }
                Some(c) => return Err(self.error(format!("expected ',' or ')', found {c:?}"))),
                None => return Err(self.error("expected ')'")),
            }
        }
    }

    fn arg(&mut self) -> Result<Arg, SyntaxError> {
        match self.peek() {
            Some('"') => self.string().map(Arg::Text),
            Some(c) if c == '-' || c.is_ascii_digit() => self.int().map(Arg::Int),
            Some(c) => Err(self.error(format!("unexpected {c:?} in argument list"))),
            None => Err(self.error("expected ')'")),
        }
    }

    fn string(&mut self) -> Result<String, SyntaxError> {
        let start = (self.line, self.column);
        self.bump();

        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(text),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some(c) => return Err(self.error(format!("unknown escape sequence \\{c}"))),
                        None => return Err(self.error_at(start, "unterminated string literal")),
                    };
                    text.push(escaped);
                }
                Some('\n') | None => return Err(self.error_at(start, "unterminated string literal")),
                Some(c) => text.push(c),
            }
        }
    }

    fn int(&mut self) -> Result<i64, SyntaxError> {
        let start = (self.line, self.column);
        let mut digits = String::new();
        if self.peek() == Some('-') {
            digits.push('-');
            self.bump();
        }
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            digits.push(c);
            self.bump();
        }

        digits
            .parse()
            .map_err(|_| self.error_at(start, format!("invalid integer literal {digits:?}")))
    }
}

fn build_stmt(name: &str, args: Vec<Arg>) -> Result<Stmt, String> {
    let print = |stream, newline| Stmt::Print {
        stream,
        args: args.clone(),
        newline,
    };

    match name {
        "print" => Ok(print(Stream::Stdout, false)),
        "println" => Ok(print(Stream::Stdout, true)),
        "eprint" => Ok(print(Stream::Stderr, false)),
        "eprintln" => Ok(print(Stream::Stderr, true)),
        "sleep" => match args.as_slice() {
            [Arg::Int(ms)] if *ms >= 0 => Ok(Stmt::Sleep(*ms as u64)),
            _ => Err("sleep expects one non-negative integer".to_string()),
        },
        "exit" => match args.as_slice() {
            [Arg::Int(code)] => Ok(Stmt::Exit(*code)),
            _ => Err("exit expects one integer".to_string()),
        },
        "panic" => match args.as_slice() {
            [arg] => Ok(Stmt::Panic(arg.to_string())),
            _ => Err("panic expects one argument".to_string()),
        },
        _ => Err(format!("undefined: {name}")),
    }
}
