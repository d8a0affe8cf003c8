#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Segment {
    Constant,
    Local,
    Static,
    Argument,
    This,
    That,
    Pointer,
    Temp,
}

/// Arithmetic-logical stack operations.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Op {
    Add,
    Sub,
    Neg,
    Eq,
    Gt,
    Lt,
    And,
    Or,
    Not,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Command {
    // Stack basics
    Arithmetic(Op),
    Push(Segment, u16),
    Pop(Segment, u16),

    // Branching
    Label(String),
    Goto(String),
    IfGoto(String),

    // Function protocol
    Function(String, u16),
    Return,
    Call(String, u16),
}
