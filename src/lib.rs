//! Translator from the stack-machine VM language of the Hack platform to
//! Hack assembly, including the full function call/return protocol.

pub mod ast;
pub mod error;
pub mod parser;
pub mod translator;

use error::Result;
use parser::Parser;
use translator::Translator;

/// Translates one source unit to assembly. `name` scopes static variables
/// and comparison labels, so it must be unique per unit within a program.
pub fn translate(name: &str, source: &str) -> Result<String> {
    let mut translator = Translator::new(Vec::new());
    translator.set_file(name);
    let mut parser = Parser::new(source);
    while parser.has_more() {
        parser.advance()?;
        translator.emit(parser.current())?;
    }
    let out = translator.into_inner();
    Ok(String::from_utf8(out).expect("emitted assembly is ASCII"))
}
