use std::fmt::Display;
use std::io::{self, BufRead};

use thiserror::Error;

/// A single parsed G-code line: a command (or nothing, for blank/comment-only
/// lines) plus whatever trailing comment followed it.
#[derive(Debug, PartialEq, Clone)]
pub struct GCodeCommand {
    pub op: GCodeOperation,
    pub comment: Option<String>,
}

impl Display for GCodeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.op.fmt(f)?;
        if let Some(comment) = &self.comment {
            if !self.op.is_nop() {
                write!(f, " ;{}", comment)?;
            } else {
                write!(f, ";{}", comment)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum GCodeOperation {
    /// Blank line or comment-only line.
    Nop,
    /// `<letter><code>` followed by zero or more `<letter><value>` parameters,
    /// e.g. `G1 X10 Y5 F3000`.
    Command {
        letter: char,
        code: u16,
        params: GCodeParams,
    },
}

impl GCodeOperation {
    pub fn is_nop(&self) -> bool {
        matches!(self, GCodeOperation::Nop)
    }

    pub fn is(&self, letter: char, code: u16) -> bool {
        matches!(self, GCodeOperation::Command { letter: l, code: c, .. } if *l == letter && *c == code)
    }
}

impl Display for GCodeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GCodeOperation::Nop => Ok(()),
            GCodeOperation::Command {
                letter,
                code,
                params,
            } => {
                write!(f, "{}{}", letter, code)?;
                if params.len() > 0 {
                    write!(f, " ")?;
                    params.fmt(f)?;
                }
                Ok(())
            }
        }
    }
}

/// The parameter letters of a single command, in the order they appeared.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct GCodeParams(Vec<(char, String)>);

impl GCodeParams {
    pub fn from_vec(vec: Vec<(char, String)>) -> Self {
        Self(vec)
    }

    pub fn has(&self, key: char) -> bool {
        self.0.iter().any(|(c, _)| *c == key)
    }

    pub fn get_string(&self, key: char) -> Option<&str> {
        self.0.iter().find(|(c, _)| *c == key).map(|v| v.1.as_str())
    }

    pub fn get_number<T: lexical_core::FromLexical>(&self, key: char) -> Option<T> {
        self.get_string(key)
            .and_then(|v| lexical_core::parse(v.as_bytes()).ok())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for GCodeParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (c, v) in &self.0 {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{}{}", c, v)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum GCodeReadError {
    #[error("IO error")]
    IO(#[from] io::Error),
    #[error("invalid gcode")]
    ParseError(#[from] GCodeParseError),
}

/// Iterates the lines of a reader, tokenizing each one. Malformed lines are
/// reported as an `Err` item rather than aborting the stream; callers that want
/// best-effort behavior (as the estimator does) can simply skip them.
pub struct GCodeReader<R: BufRead> {
    rdr: R,
    buf: String,
}

impl<R: BufRead> GCodeReader<R> {
    pub fn new(rdr: R) -> GCodeReader<R> {
        GCodeReader {
            rdr,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for GCodeReader<R> {
    type Item = Result<GCodeCommand, GCodeReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.rdr.read_line(&mut self.buf) {
            Ok(0) => None,
            Ok(_) => Some(parse_gcode(&self.buf).map_err(|e| e.into())),
            Err(e) => Some(Err(GCodeReadError::IO(e))),
        }
    }
}

pub use parser::parse_gcode;
pub use parser::GCodeParseError;

mod parser {
    use super::*;
    use nom::{
        branch::alt,
        bytes::complete::{tag, take_till},
        character::complete::{satisfy, space0, space1},
        combinator::{complete, eof, map, opt},
        error::{Error, ErrorKind, ParseError},
        multi::separated_list0,
        Err, IResult, Slice,
    };

    #[derive(Debug)]
    pub struct GCodeParseError {
        position: String,
    }

    impl std::error::Error for GCodeParseError {}

    impl std::fmt::Display for GCodeParseError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "gcode parse error at: {}", self.position)
        }
    }

    /// Parses a single line of G-code into a [`GCodeCommand`]. Never panics;
    /// any input that doesn't match the grammar yields [`GCodeParseError`].
    pub fn parse_gcode(line: &str) -> Result<GCodeCommand, GCodeParseError> {
        match parse(line.trim()) {
            Ok((_, cmd)) => Ok(cmd),
            Err(Err::Incomplete(_)) => Err(GCodeParseError {
                position: "".into(),
            }),
            Err(Err::Error(e)) | Err(Err::Failure(e)) => Err(GCodeParseError {
                position: e.input.into(),
            }),
        }
    }

    fn parse(s: &str) -> IResult<&str, GCodeCommand> {
        let (s, _) = space0(s)?;
        let (s, _line_no) = opt(line_number)(s)?;

        let (s, (op, comment)) = alt((
            complete(command),
            complete(map(comment, |c| (GCodeOperation::Nop, Some(c)))),
            complete(map(eof, |_| (GCodeOperation::Nop, None))),
        ))(s)?;

        let comment = comment.map(String::from);
        Ok((s, GCodeCommand { op, comment }))
    }

    fn skip_space(s: &str) -> IResult<&str, ()> {
        if s.is_empty() {
            Ok(("", ()))
        } else {
            space0(s).map(|(s, _)| (s, ()))
        }
    }

    fn line_number(s: &str) -> IResult<&str, u64> {
        let (s, _) = tag("N")(s)?;
        let (s, v) = match lexical_core::parse_partial::<u64>(s.as_bytes()) {
            Ok((value, processed)) => (s.slice(processed..), value),
            Err(_) => return Err(Err::Error(Error::from_error_kind(s, ErrorKind::Digit))),
        };
        let (s, _) = skip_space(s)?;
        Ok((s, v))
    }

    fn command(s: &str) -> IResult<&str, (GCodeOperation, Option<&str>)> {
        let (s, letter) = satisfy(|c| c.is_alphabetic())(s)?;
        let (s, code) = match lexical_core::parse_partial::<u16>(s.as_bytes()) {
            Ok((value, processed)) => (s.slice(processed..), value),
            Err(_) => return Err(Err::Error(Error::from_error_kind(s, ErrorKind::Digit))),
        };
        let (s, _) = skip_space(s)?;
        let (s, params) = separated_list0(space1, param)(s)?;
        let (s, comment) = opt(comment)(s)?;
        Ok((
            s,
            (
                GCodeOperation::Command {
                    letter: letter.to_ascii_uppercase(),
                    code,
                    params: GCodeParams(
                        params
                            .into_iter()
                            .map(|(c, v)| (c, String::from(v)))
                            .collect(),
                    ),
                },
                comment,
            ),
        ))
    }

    fn param(s: &str) -> IResult<&str, (char, &str)> {
        let (s, letter) = satisfy(|c| c.is_alphabetic() && c != ';')(s)?;
        let (s, value) = take_till(|c: char| c.is_whitespace() || c == ';')(s)?;
        Ok((s, (letter.to_ascii_uppercase(), value)))
    }

    fn comment(s: &str) -> IResult<&str, &str> {
        let (s, _) = space0(s)?;
        let (s, _) = tag(";")(s)?;
        Ok(("", s.trim_end()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_move_with_feedrate() {
        let cmd = parse_gcode("G1 X100 F6000").unwrap();
        match cmd.op {
            GCodeOperation::Command { letter, code, params } => {
                assert_eq!(letter, 'G');
                assert_eq!(code, 1);
                assert_eq!(params.get_number::<f64>('X'), Some(100.0));
                assert_eq!(params.get_number::<f64>('F'), Some(6000.0));
                assert_eq!(params.get_number::<f64>('Y'), None);
            }
            _ => panic!("expected a command"),
        }
    }

    #[test]
    fn strips_line_numbers_and_comments() {
        let cmd = parse_gcode("N10 G1 X1 ; move over").unwrap();
        assert!(cmd.op.is('G', 1));
        assert_eq!(cmd.comment.as_deref(), Some("move over"));
    }

    #[test]
    fn blank_and_comment_only_lines_are_nop() {
        assert!(parse_gcode("").unwrap().op.is_nop());
        assert!(parse_gcode("   ").unwrap().op.is_nop());
        assert!(parse_gcode("; just a comment").unwrap().op.is_nop());
    }

    #[test]
    fn malformed_line_is_an_error_not_a_panic() {
        assert!(parse_gcode("@#$%").is_err());
    }
}
