use nom::{
    branch::alt,
    bytes::complete::{is_a, tag},
    character::{
        complete::{digit1, space1},
        is_digit,
    },
    combinator::{map, map_res, value, verify},
    sequence::tuple,
    IResult,
};

use crate::ast::{Command::*, Op, Segment::*, *};
use crate::error::{Result, TranslateError};

fn integer(input: &str) -> IResult<&str, u16> {
    map_res(digit1, |c: &str| c.parse())(input)
}

fn segment(input: &str) -> IResult<&str, Segment> {
    alt((
        value(Constant, tag("constant")),
        value(Local, tag("local")),
        value(Static, tag("static")),
        value(Argument, tag("argument")),
        value(This, tag("this")),
        value(That, tag("that")),
        value(Pointer, tag("pointer")),
        value(Temp, tag("temp")),
    ))(input)
}

fn push(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("push"), space1, segment, space1, integer)),
        |(_, _, segment, _, arg)| Push(segment, arg),
    )(input)
}

#[test]
fn test_push() {
    assert_eq!(push("push  pointer  1"), Ok(("", Push(Pointer, 1))));
}

fn pop(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("pop"), space1, segment, space1, integer)),
        |(_, _, segment, _, arg)| Pop(segment, arg),
    )(input)
}

fn prim(input: &str) -> IResult<&str, Command> {
    map(
        alt((
            value(Op::Add, tag("add")),
            value(Op::Sub, tag("sub")),
            value(Op::Neg, tag("neg")),
            value(Op::Eq, tag("eq")),
            value(Op::Gt, tag("gt")),
            value(Op::Lt, tag("lt")),
            value(Op::And, tag("and")),
            value(Op::Or, tag("or")),
            value(Op::Not, tag("not")),
        )),
        Arithmetic,
    )(input)
}

#[test]
fn test_prim() {
    assert_eq!(prim("neg"), Ok(("", Arithmetic(Op::Neg))));
}

fn symbol(input: &str) -> IResult<&str, String> {
    map(
        verify(
            is_a("abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_.$:0123456789"),
            |c: &str| !is_digit(c.as_bytes()[0]),
        ),
        |sym: &str| sym.to_string(),
    )(input)
}

fn branching(input: &str) -> IResult<&str, Command> {
    map(
        tuple((
            alt((tag("label"), tag("goto"), tag("if-goto"))),
            space1,
            symbol,
        )),
        |(op, _, sym)| match op {
            "label" => Label(sym),
            "goto" => Goto(sym),
            _ => IfGoto(sym),
        },
    )(input)
}

fn function(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("function"), space1, symbol, space1, integer)),
        |(_, _, name, _, locals)| Function(name, locals),
    )(input)
}

fn call(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("call"), space1, symbol, space1, integer)),
        |(_, _, name, _, args)| Call(name, args),
    )(input)
}

fn ret(input: &str) -> IResult<&str, Command> {
    value(Return, tag("return"))(input)
}

fn command(input: &str) -> IResult<&str, Command> {
    alt((push, pop, prim, branching, function, call, ret))(input)
}

/// Classifies one stripped, non-empty line. The whole line must be consumed.
fn parse_line(text: &str) -> std::result::Result<Command, String> {
    match command(text) {
        Ok(("", command)) => Ok(command),
        Ok((rest, _)) => Err(format!("command `{text}` has trailing input `{}`", rest.trim())),
        Err(_) => Err(format!("unrecognized or malformed command `{text}`")),
    }
}

fn strip(line: &str) -> &str {
    line.split_once("//").map(|(s, _)| s).unwrap_or(line).trim()
}

/// Streaming command reader over one source unit. Comments and blank lines
/// are skipped; `advance` must be called before the first `current`, and
/// `current` keeps answering the same command until the next `advance`.
pub struct Parser<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    pending: Option<(usize, &'a str)>,
    current: Option<Command>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut parser = Parser {
            lines: source.lines().enumerate(),
            pending: None,
            current: None,
        };
        parser.scan();
        parser
    }

    fn scan(&mut self) {
        self.pending = self.lines.find(|(_, line)| !strip(line).is_empty());
    }

    pub fn has_more(&self) -> bool {
        self.pending.is_some()
    }

    /// Reads the next command and makes it current. Call only while
    /// `has_more` answers true.
    pub fn advance(&mut self) -> Result<()> {
        let (index, line) = self
            .pending
            .take()
            .expect("advance() called with no commands left");
        let command = parse_line(strip(line)).map_err(|message| TranslateError::Syntax {
            line: index + 1,
            message,
        })?;
        self.current = Some(command);
        self.scan();
        Ok(())
    }

    pub fn current(&self) -> &Command {
        self.current
            .as_ref()
            .expect("advance() must be called before current()")
    }
}

/// Drains a whole source unit into a command list.
pub fn parse(input: &str) -> Result<Vec<Command>> {
    let mut parser = Parser::new(input);
    let mut commands = vec![];
    while parser.has_more() {
        parser.advance()?;
        commands.push(parser.current().clone());
    }
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_command_family() {
        let source = "\
            // a program exercising each family\n\
            push argument 2\n\
            pop temp 4   // trailing comment\n\
            add\n\
            label LOOP\n\
            goto LOOP\n\
            if-goto LOOP\n\
            function Foo.bar 2\n\
            push constant 0\n\
            return\n\
            call Foo.bar 0\n";
        let commands = parse(source).unwrap();
        assert_eq!(
            commands,
            vec![
                Push(Argument, 2),
                Pop(Temp, 4),
                Arithmetic(Op::Add),
                Label("LOOP".to_string()),
                Goto("LOOP".to_string()),
                IfGoto("LOOP".to_string()),
                Function("Foo.bar".to_string(), 2),
                Push(Constant, 0),
                Return,
                Call("Foo.bar".to_string(), 0),
            ]
        );
    }

    #[test]
    fn skips_blank_lines_and_comments() {
        let commands = parse("\n  \n// only a comment\n\nadd\n\n").unwrap();
        assert_eq!(commands, vec![Arithmetic(Op::Add)]);
        assert!(parse("// nothing here\n\n").unwrap().is_empty());
    }

    #[test]
    fn current_is_stable_between_advances() {
        let mut parser = Parser::new("push constant 1\nsub\n");
        assert!(parser.has_more());
        parser.advance().unwrap();
        assert_eq!(parser.current(), &Push(Constant, 1));
        assert_eq!(parser.current(), &Push(Constant, 1));
        assert!(parser.has_more());
        parser.advance().unwrap();
        assert_eq!(parser.current(), &Arithmetic(Op::Sub));
        assert!(!parser.has_more());
    }

    #[test]
    fn rejects_unknown_segment() {
        let err = parse("push weird 3\n").unwrap_err();
        match err {
            TranslateError::Syntax { line, .. } => assert_eq!(line, 1),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_and_negative_indices() {
        assert!(parse("push local\n").is_err());
        assert!(parse("pop local -1\n").is_err());
        assert!(parse("function Foo.bar\n").is_err());
    }

    #[test]
    fn rejects_unknown_keyword_and_trailing_tokens() {
        assert!(parse("shove constant 1\n").is_err());
        assert!(parse("add 1\n").is_err());
        assert!(parse("return now\n").is_err());
    }

    #[test]
    fn syntax_errors_carry_the_line_number() {
        let source = "push constant 1\n\n// comment\npop nowhere 0\n";
        match parse(source).unwrap_err() {
            TranslateError::Syntax { line, .. } => assert_eq!(line, 4),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }
}
