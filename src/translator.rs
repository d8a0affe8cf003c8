use std::io::Write;

use crate::ast::{Command, Op::*, Segment::*, *};
use crate::error::{Result, TranslateError};

macro_rules! svec {
    ($($x:expr),*) => (vec![$($x.to_string()),*]);
}

fn at_c(arg: u16) -> String {
    format!("@{arg}")
}

fn at_s(arg: &str) -> String {
    format!("@{arg}")
}

fn pointer_sym(arg: u16) -> Result<&'static str> {
    match arg {
        0 => Ok("THIS"),
        1 => Ok("THAT"),
        _ => Err(TranslateError::PointerIndex(arg)),
    }
}

fn temp_sym(arg: u16) -> Result<String> {
    if arg >= 8 {
        return Err(TranslateError::TempIndex(arg));
    }
    Ok(format!("R{}", arg + 5))
}

/// Push microcode for the four indirect base segments
fn seg_push(seg_name: &str, seg: &str, arg: u16) -> Vec<String> {
    svec![
        format!("// push {} {}", seg_name, arg),
        at_s(seg),
        "D=M",
        at_c(arg),
        "A=A+D", // A = SEG+arg
        "D=M",   // D = value to push
        "@SP",
        "M=M+1",
        "A=M-1", // Don't need to refetch SP; this is safe
        "M=D"
    ]
}

fn seg_push_direct(seg_name: &str, arg: u16, label: String) -> Vec<String> {
    svec![
        format!("// push {} {}", seg_name, arg),
        format!("@{}", label),
        "D=M",
        "@SP",
        "M=M+1",
        "A=M-1",
        "M=D"
    ]
}

fn seg_pop(seg_name: &str, seg: &str, arg: u16) -> Vec<String> {
    svec![
        format!("// pop {} {}", seg_name, arg),
        at_s(seg),
        "D=M",
        at_c(arg),
        "D=A+D", // D = SEG+arg
        "@R13",
        "M=D", // Stash the target address in R13
        "@SP",
        "AM=M-1", // SP--, A <- new SP (val to be popped)
        "D=M",
        "@R13",
        "A=M", // At the target address...
        "M=D"  // ... store the popped val
    ]
}

fn seg_pop_direct(seg_name: &str, arg: u16, label: String) -> Vec<String> {
    svec![
        format!("// pop {} {}", seg_name, arg),
        "@SP",
        "AM=M-1",
        "D=M",
        format!("@{}", label),
        "M=D"
    ]
}

fn simple_un_op(name: &str, op: char) -> Vec<String> {
    svec![format!("// {}", name), "@SP", "A=M-1", format!("M={}M", op)]
}

// i.e. no conditions or jumps, just pop and run
fn simple_bin_op(name: &str, op: char) -> Vec<String> {
    svec![
        format!("// {}", name),
        "@SP",
        "AM=M-1",              // SP--, looking at top of stack now
        "D=M",                 // Right arg in D
        "A=A-1",               // Looking at second arg of stack, will overwrite
        format!("M=M{}D", op)  // Op and overwrite second element
    ]
}

/// D onto the stack
fn push_d() -> Vec<String> {
    svec!["@SP", "M=M+1", "A=M-1", "M=D"]
}

/// Lowers VM commands to Hack assembly, streaming instructions into `out`.
///
/// One Translator spans one translation session: when several source units
/// feed one output, they share the Translator (and with it the label and
/// return-address counters, which never reset) so that generated symbols
/// stay unique across the whole program.
pub struct Translator<W: Write> {
    out: W,
    file: String,
    function: String,
    label_counter: usize,
    ret_counter: usize,
}

impl<W: Write> Translator<W> {
    pub fn new(out: W) -> Self {
        Translator {
            out,
            file: String::new(),
            function: String::new(),
            label_counter: 0,
            ret_counter: 0,
        }
    }

    /// Marks the start of a new source unit. `name` scopes static symbols
    /// and comparison labels; branch labels outside any function scope
    /// under it too, matching functionless single-unit programs.
    pub fn set_file(&mut self, name: &str) {
        self.file = name.to_string();
        self.function = name.to_string();
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, instructions: Vec<String>) -> Result<()> {
        for line in instructions {
            writeln!(self.out, "{}", line)?;
        }
        Ok(())
    }

    pub fn emit(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::Arithmetic(op) => self.emit_arithmetic(*op),
            Command::Push(segment, index) => self.emit_push(*segment, *index),
            Command::Pop(segment, index) => self.emit_pop(*segment, *index),
            Command::Label(label) => self.emit_label(label),
            Command::Goto(label) => self.emit_goto(label),
            Command::IfGoto(label) => self.emit_if_goto(label),
            Command::Function(name, locals) => self.emit_function(name, *locals),
            Command::Return => self.emit_return(),
            Command::Call(name, args) => self.emit_call(name, *args),
        }
    }

    pub fn emit_arithmetic(&mut self, op: Op) -> Result<()> {
        let instructions = match op {
            Not => simple_un_op("not", '!'),
            Neg => simple_un_op("neg", '-'),
            Add => simple_bin_op("add", '+'),
            Sub => simple_bin_op("sub", '-'),
            And => simple_bin_op("and", '&'),
            Or => simple_bin_op("or", '|'),
            Eq => self.compare("eq", "EQ"),
            Gt => self.compare("gt", "GT"),
            Lt => self.compare("lt", "LT"),
        };
        self.write(instructions)
    }

    /// The target has no conditional assignment, only conditional jump, so
    /// true/false selection takes two fresh file-unique labels per
    /// comparison: jump to the first on the condition, fall through to
    /// write false and skip to the second, the join point.
    fn compare(&mut self, name: &str, jump: &str) -> Vec<String> {
        let n = self.label_counter;
        self.label_counter += 2;
        let true_sym = format!("{}:{}", self.file, n);
        let join_sym = format!("{}:{}", self.file, n + 1);
        svec![
            format!("// {}", name),
            "@SP",
            "AM=M-1", // SP--, looking at top of stack now
            "D=M",    // Right arg in D
            "A=A-1",  // Looking at second arg of stack, will overwrite
            "D=M-D",
            format!("@{}", true_sym),
            format!("D;J{}", jump),
            "D=0",
            format!("@{}", join_sym),
            "0;JMP",
            format!("({})", true_sym),
            "D=-1",
            format!("({})", join_sym),
            "@SP",
            "A=M-1",
            "M=D"
        ]
    }

    pub fn emit_push(&mut self, segment: Segment, index: u16) -> Result<()> {
        let instructions = match segment {
            Constant => svec![
                format!("// push constant {}", index),
                at_c(index),
                "D=A",
                "@SP",
                "A=M",
                "M=D",
                "@SP",
                "M=M+1"
            ],
            Local => seg_push("local", "LCL", index),
            Argument => seg_push("argument", "ARG", index),
            This => seg_push("this", "THIS", index),
            That => seg_push("that", "THAT", index),
            Static => seg_push_direct("static", index, self.static_sym(index)),
            Temp => seg_push_direct("temp", index, temp_sym(index)?),
            Pointer => seg_push_direct("pointer", index, pointer_sym(index)?.to_string()),
        };
        self.write(instructions)
    }

    pub fn emit_pop(&mut self, segment: Segment, index: u16) -> Result<()> {
        let instructions = match segment {
            Constant => return Err(TranslateError::PopConstant),
            Local => seg_pop("local", "LCL", index),
            Argument => seg_pop("argument", "ARG", index),
            This => seg_pop("this", "THIS", index),
            That => seg_pop("that", "THAT", index),
            Static => seg_pop_direct("static", index, self.static_sym(index)),
            Temp => seg_pop_direct("temp", index, temp_sym(index)?),
            Pointer => seg_pop_direct("pointer", index, pointer_sym(index)?.to_string()),
        };
        self.write(instructions)
    }

    /// Static slots live at `File.index`, so equal indices in different
    /// units never alias.
    fn static_sym(&self, index: u16) -> String {
        format!("{}.{}", self.file, index)
    }

    /// VM branch labels are function-local; the emitted symbol carries the
    /// enclosing function name to keep reused label text apart.
    fn scoped(&self, label: &str) -> String {
        format!("{}${}", self.function, label)
    }

    pub fn emit_label(&mut self, label: &str) -> Result<()> {
        self.write(svec![
            format!("// label {}", label),
            format!("({})", self.scoped(label))
        ])
    }

    pub fn emit_goto(&mut self, label: &str) -> Result<()> {
        self.write(svec![
            format!("// goto {}", label),
            format!("@{}", self.scoped(label)),
            "0;JMP" // Unconditional jump
        ])
    }

    pub fn emit_if_goto(&mut self, label: &str) -> Result<()> {
        self.write(svec![
            format!("// if-goto {}", label),
            "@SP",
            "AM=M-1",
            "D=M", // Stack popped into D
            format!("@{}", self.scoped(label)),
            "D;JNE" // False is 0
        ])
    }

    /// Function entry: the globally-unique entry marker, then one zeroed
    /// stack slot per declared local.
    pub fn emit_function(&mut self, name: &str, locals: u16) -> Result<()> {
        let mut instructions = svec![
            format!("// function {} {}", name, locals),
            format!("({})", name)
        ];
        for _ in 0..locals {
            instructions.extend(svec!["@SP", "M=M+1", "A=M-1", "M=0"]);
        }
        self.function = name.to_string();
        self.write(instructions)
    }

    /// Call protocol: push the return address and the caller's LCL, ARG,
    /// THIS, THAT; point ARG at the arguments already on the stack
    /// (SP - 5 - nArgs); point LCL at the new stack top; jump to the
    /// callee; declare the return label.
    pub fn emit_call(&mut self, name: &str, args: u16) -> Result<()> {
        let ret_sym = format!("{}$ret.{}", self.function, self.ret_counter);
        self.ret_counter += 1;

        let mut instructions = svec![
            format!("// call {} {}", name, args),
            format!("@{}", ret_sym),
            "D=A"
        ];
        instructions.extend(push_d());
        for reg in ["LCL", "ARG", "THIS", "THAT"] {
            instructions.push(at_s(reg));
            instructions.push("D=M".to_string());
            instructions.extend(push_d());
        }
        instructions.extend(svec![
            "@SP",
            "D=M",
            at_c(args + 5),
            "D=D-A",
            "@ARG",
            "M=D", // ARG = SP - 5 - nArgs
            "@SP",
            "D=M",
            "@LCL",
            "M=D", // LCL = SP
            format!("@{}", name),
            "0;JMP",
            format!("({})", ret_sym)
        ]);
        self.write(instructions)
    }

    /// Return protocol: R13 walks the frame being torn down. The return
    /// address is read into R14 before the return value is copied down;
    /// with zero arguments the caller's ARG slot *is* the return-address
    /// slot, and the copy would clobber it.
    pub fn emit_return(&mut self) -> Result<()> {
        let mut instructions = svec![
            "// return",
            "@LCL",
            "D=M",
            "@R13",
            "M=D", // R13 = frame base
            "@5",
            "A=D-A",
            "D=M",
            "@R14",
            "M=D", // R14 = return address
            "@SP",
            "AM=M-1",
            "D=M",
            "@ARG",
            "A=M",
            "M=D", // Return value into the caller's next stack top
            "@ARG",
            "D=M+1",
            "@SP",
            "M=D" // SP = ARG + 1, callee frame gone
        ];
        // Restore in reverse order of the saves in emit_call
        for reg in ["THAT", "THIS", "ARG", "LCL"] {
            instructions.extend(svec!["@R13", "AM=M-1", "D=M", at_s(reg), "M=D"]);
        }
        instructions.extend(svec!["@R14", "A=M", "0;JMP"]);
        self.write(instructions)
    }

    /// Whole-program preamble: SP at 256, then a regular call to Sys.init.
    pub fn emit_bootstrap(&mut self) -> Result<()> {
        self.function = "Bootstrap".to_string();
        self.write(svec!["// bootstrap", "@256", "D=A", "@SP", "M=D"])?;
        self.emit_call("Sys.init", 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> Translator<Vec<u8>> {
        let mut translator = Translator::new(Vec::new());
        translator.set_file("Test");
        translator
    }

    fn output(translator: Translator<Vec<u8>>) -> String {
        String::from_utf8(translator.into_inner()).unwrap()
    }

    #[test]
    fn comparison_labels_never_repeat() {
        let mut translator = translator();
        translator.emit_arithmetic(Eq).unwrap();
        translator.emit_arithmetic(Gt).unwrap();
        translator.emit_arithmetic(Lt).unwrap();
        let asm = output(translator);
        for n in 0..6 {
            let declaration = format!("(Test:{n})");
            assert_eq!(
                asm.lines().filter(|line| *line == declaration).count(),
                1,
                "{declaration} should be declared exactly once"
            );
        }
    }

    #[test]
    fn label_counter_survives_set_file() {
        let mut translator = translator();
        translator.emit_arithmetic(Eq).unwrap();
        translator.set_file("Test");
        translator.emit_arithmetic(Eq).unwrap();
        let asm = output(translator);
        assert!(asm.contains("(Test:0)"));
        assert!(asm.contains("(Test:2)"));
    }

    #[test]
    fn statics_are_scoped_per_file() {
        let mut translator = translator();
        translator.set_file("Foo");
        translator.emit_push(Static, 3).unwrap();
        translator.set_file("Bar");
        translator.emit_pop(Static, 3).unwrap();
        let asm = output(translator);
        assert!(asm.contains("@Foo.3"));
        assert!(asm.contains("@Bar.3"));
    }

    #[test]
    fn branch_labels_are_scoped_per_function() {
        let mut translator = translator();
        translator.emit_function("Foo.a", 0).unwrap();
        translator.emit_label("loop").unwrap();
        translator.emit_function("Foo.b", 0).unwrap();
        translator.emit_goto("loop").unwrap();
        let asm = output(translator);
        assert!(asm.contains("(Foo.a$loop)"));
        assert!(asm.contains("@Foo.b$loop"));
    }

    #[test]
    fn return_labels_are_unique_per_call_site() {
        let mut translator = translator();
        translator.emit_call("Foo.bar", 0).unwrap();
        translator.emit_call("Foo.bar", 0).unwrap();
        let asm = output(translator);
        assert!(asm.contains("(Test$ret.0)"));
        assert!(asm.contains("(Test$ret.1)"));
    }

    #[test]
    fn function_reserves_zeroed_locals() {
        let mut translator = translator();
        translator.emit_function("Foo.bar", 3).unwrap();
        let asm = output(translator);
        assert!(asm.contains("(Foo.bar)"));
        assert_eq!(asm.lines().filter(|line| *line == "M=0").count(), 3);
    }

    #[test]
    fn pop_constant_is_rejected() {
        let mut translator = translator();
        assert!(matches!(
            translator.emit_pop(Constant, 0),
            Err(TranslateError::PopConstant)
        ));
        assert!(output(translator).is_empty());
    }

    #[test]
    fn out_of_range_pointer_and_temp_are_rejected() {
        let mut translator = translator();
        assert!(matches!(
            translator.emit_push(Pointer, 2),
            Err(TranslateError::PointerIndex(2))
        ));
        assert!(matches!(
            translator.emit_pop(Temp, 8),
            Err(TranslateError::TempIndex(8))
        ));
        assert!(output(translator).is_empty());
    }

    #[test]
    fn bootstrap_sets_sp_and_calls_sys_init() {
        let mut translator = translator();
        translator.emit_bootstrap().unwrap();
        let asm = output(translator);
        assert!(asm.contains("@256"));
        assert!(asm.contains("@Sys.init"));
        assert!(asm.contains("(Bootstrap$ret.0)"));
    }
}
