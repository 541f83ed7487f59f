//! PostScript calculator functions (function type 4).
//!
//! The program text is compiled once into flat code: `{...} if` and
//! `{...} {...} ifelse` become conditional jumps, so evaluation is a
//! single loop over an instruction vector.

use crate::error::{PdfError, Result};
use crate::parser::lexer::{Keyword, Lexer, Token};
use bytes::Bytes;

const MAX_STACK: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Num(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Abs,
    Add,
    Atan,
    Ceiling,
    Cos,
    Cvi,
    Cvr,
    Div,
    Exp,
    Floor,
    Idiv,
    Ln,
    Log,
    Mod,
    Mul,
    Neg,
    Round,
    Sin,
    Sqrt,
    Sub,
    Truncate,
    And,
    Bitshift,
    Eq,
    Ge,
    Gt,
    Le,
    Lt,
    Ne,
    Not,
    Or,
    Xor,
    Copy,
    Dup,
    Exch,
    Index,
    Pop,
    Roll,
}

impl Operator {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Self::Abs,
            "add" => Self::Add,
            "atan" => Self::Atan,
            "ceiling" => Self::Ceiling,
            "cos" => Self::Cos,
            "cvi" => Self::Cvi,
            "cvr" => Self::Cvr,
            "div" => Self::Div,
            "exp" => Self::Exp,
            "floor" => Self::Floor,
            "idiv" => Self::Idiv,
            "ln" => Self::Ln,
            "log" => Self::Log,
            "mod" => Self::Mod,
            "mul" => Self::Mul,
            "neg" => Self::Neg,
            "round" => Self::Round,
            "sin" => Self::Sin,
            "sqrt" => Self::Sqrt,
            "sub" => Self::Sub,
            "truncate" => Self::Truncate,
            "and" => Self::And,
            "bitshift" => Self::Bitshift,
            "eq" => Self::Eq,
            "ge" => Self::Ge,
            "gt" => Self::Gt,
            "le" => Self::Le,
            "lt" => Self::Lt,
            "ne" => Self::Ne,
            "not" => Self::Not,
            "or" => Self::Or,
            "xor" => Self::Xor,
            "copy" => Self::Copy,
            "dup" => Self::Dup,
            "exch" => Self::Exch,
            "index" => Self::Index,
            "pop" => Self::Pop,
            "roll" => Self::Roll,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Instr {
    Push(Value),
    Op(Operator),
    /// Pops a boolean and jumps to the target when it is false.
    JumpIfFalse(usize),
    Jump(usize),
}

/// A compiled calculator program.
#[derive(Debug, Clone, PartialEq)]
pub struct PsProgram {
    code: Vec<Instr>,
}

/// A parsed `{ ... }` block before it is attached to `if`/`ifelse`.
enum Item {
    Code(Vec<Instr>),
    Block(Vec<Instr>),
}

impl PsProgram {
    /// Compiles the program text of a type 4 function stream.
    pub fn compile(source: &[u8]) -> Result<Self> {
        let mut lexer = Lexer::new(Bytes::copy_from_slice(source));
        match lexer.next_token() {
            Some((_, Token::Keyword(Keyword::BraceOpen))) => {}
            _ => return Err(PdfError::SyntaxError("PostScript function must start with '{'".into())),
        }
        let code = Self::compile_block(&mut lexer)?;
        Ok(Self { code })
    }

    /// Compiles up to the matching `}`.
    fn compile_block(lexer: &mut Lexer) -> Result<Vec<Instr>> {
        let mut items: Vec<Item> = Vec::new();
        loop {
            let (pos, tok) = lexer
                .next_token()
                .ok_or_else(|| PdfError::SyntaxError("unterminated PostScript block".into()))?;
            match tok {
                Token::Int(n) => push_code(&mut items, Instr::Push(Value::Num(n as f64))),
                Token::Real(n) => push_code(&mut items, Instr::Push(Value::Num(n))),
                Token::Bool(b) => push_code(&mut items, Instr::Push(Value::Bool(b))),
                Token::Keyword(Keyword::BraceOpen) => items.push(Item::Block(Self::compile_block(lexer)?)),
                Token::Keyword(Keyword::BraceClose) => return Ok(flatten(items)),
                Token::Keyword(kw) => match kw.as_str() {
                    "if" => {
                        let Some(Item::Block(body)) = items.pop() else {
                            return Err(PdfError::SyntaxError("'if' without a procedure".into()));
                        };
                        let mut code = vec![Instr::JumpIfFalse(body.len())];
                        code.extend(body);
                        items.push(Item::Code(code));
                    }
                    "ifelse" => {
                        let (Some(Item::Block(otherwise)), Some(Item::Block(then))) = (items.pop(), items.pop())
                        else {
                            return Err(PdfError::SyntaxError("'ifelse' without two procedures".into()));
                        };
                        // Jump targets are relative to the start of this fragment.
                        let mut code = vec![Instr::JumpIfFalse(then.len() + 1)];
                        code.extend(then);
                        code.push(Instr::Jump(otherwise.len()));
                        code.extend(otherwise);
                        items.push(Item::Code(code));
                    }
                    name => {
                        let op = Operator::from_name(name).ok_or_else(|| PdfError::TokenError {
                            pos,
                            msg: format!("unknown PostScript operator '{name}'"),
                        })?;
                        push_code(&mut items, Instr::Op(op));
                    }
                },
                other => {
                    return Err(PdfError::TokenError {
                        pos,
                        msg: format!("unexpected token in PostScript function: {other:?}"),
                    });
                }
            }
        }
    }

    /// Runs the program on `input`; the whole final stack is returned.
    pub fn execute(&self, input: &[f64]) -> Result<Vec<f64>> {
        let mut stack: Vec<Value> = input.iter().map(|&v| Value::Num(v)).collect();
        let mut pc = 0;
        while pc < self.code.len() {
            let instr = self.code[pc];
            pc += 1;
            match instr {
                Instr::Push(v) => stack.push(v),
                Instr::Jump(skip) => pc += skip,
                Instr::JumpIfFalse(skip) => {
                    if !pop_bool(&mut stack)? {
                        pc += skip;
                    }
                }
                Instr::Op(op) => apply(op, &mut stack)?,
            }
            if stack.len() > MAX_STACK {
                return Err(PdfError::SyntaxError("PostScript stack overflow".into()));
            }
        }
        stack
            .into_iter()
            .map(|v| match v {
                Value::Num(n) => Ok(n),
                Value::Bool(b) => Ok(f64::from(u8::from(b))),
            })
            .collect()
    }
}

fn push_code(items: &mut Vec<Item>, instr: Instr) {
    match items.last_mut() {
        Some(Item::Code(code)) => code.push(instr),
        _ => items.push(Item::Code(vec![instr])),
    }
}

/// Joins fragments; jump offsets are relative so no fixups are needed.
fn flatten(items: Vec<Item>) -> Vec<Instr> {
    let mut out = Vec::new();
    for item in items {
        match item {
            Item::Code(code) => out.extend(code),
            // A procedure that is never consumed by if/ifelse is dropped.
            Item::Block(_) => {}
        }
    }
    out
}

fn underflow() -> PdfError {
    PdfError::SyntaxError("PostScript stack underflow".into())
}

fn pop(stack: &mut Vec<Value>) -> Result<Value> {
    stack.pop().ok_or_else(underflow)
}

fn pop_num(stack: &mut Vec<Value>) -> Result<f64> {
    match pop(stack)? {
        Value::Num(n) => Ok(n),
        Value::Bool(_) => Err(PdfError::TypeError {
            expected: "number",
            got: "bool",
        }),
    }
}

fn pop_bool(stack: &mut Vec<Value>) -> Result<bool> {
    match pop(stack)? {
        Value::Bool(b) => Ok(b),
        Value::Num(_) => Err(PdfError::TypeError {
            expected: "bool",
            got: "number",
        }),
    }
}

fn pop_int(stack: &mut Vec<Value>) -> Result<i64> {
    Ok(pop_num(stack)? as i64)
}

fn apply(op: Operator, stack: &mut Vec<Value>) -> Result<()> {
    let num = Value::Num;
    match op {
        Operator::Abs | Operator::Ceiling | Operator::Cos | Operator::Cvi | Operator::Cvr | Operator::Floor | Operator::Ln | Operator::Log | Operator::Neg | Operator::Round | Operator::Sin | Operator::Sqrt | Operator::Truncate => {
            let a = pop_num(stack)?;
            let r = match op {
                Operator::Abs => a.abs(),
                Operator::Ceiling => a.ceil(),
                Operator::Cos => a.to_radians().cos(),
                Operator::Cvi | Operator::Truncate => a.trunc(),
                Operator::Floor => a.floor(),
                Operator::Ln => a.ln(),
                Operator::Log => a.log10(),
                Operator::Neg => -a,
                // PostScript rounds halves up.
                Operator::Round => (a + 0.5).floor(),
                Operator::Sin => a.to_radians().sin(),
                Operator::Sqrt => a.sqrt(),
                _ => a,
            };
            stack.push(num(r));
        }
        Operator::Add | Operator::Div | Operator::Exp | Operator::Mul | Operator::Sub | Operator::Atan => {
            let b = pop_num(stack)?;
            let a = pop_num(stack)?;
            let r = match op {
                Operator::Add => a + b,
                Operator::Div => a / b,
                Operator::Exp => a.powf(b),
                Operator::Mul => a * b,
                Operator::Sub => a - b,
                _ => {
                    let deg = a.atan2(b).to_degrees();
                    if deg < 0.0 { deg + 360.0 } else { deg }
                }
            };
            stack.push(num(r));
        }
        Operator::Idiv | Operator::Mod => {
            let b = pop_int(stack)?;
            let a = pop_int(stack)?;
            if b == 0 {
                return Err(PdfError::SyntaxError("PostScript division by zero".into()));
            }
            let r = if op == Operator::Idiv { a / b } else { a % b };
            stack.push(num(r as f64));
        }
        Operator::Bitshift => {
            let shift = pop_int(stack)?;
            let a = pop_int(stack)?;
            let r = if shift >= 0 { a << shift.min(63) } else { a >> (-shift).min(63) };
            stack.push(num(r as f64));
        }
        Operator::Eq | Operator::Ne => {
            let b = pop(stack)?;
            let a = pop(stack)?;
            stack.push(Value::Bool((a == b) == (op == Operator::Eq)));
        }
        Operator::Ge | Operator::Gt | Operator::Le | Operator::Lt => {
            let b = pop_num(stack)?;
            let a = pop_num(stack)?;
            stack.push(Value::Bool(match op {
                Operator::Ge => a >= b,
                Operator::Gt => a > b,
                Operator::Le => a <= b,
                _ => a < b,
            }));
        }
        Operator::And | Operator::Or | Operator::Xor => match (pop(stack)?, pop(stack)?) {
            (Value::Bool(b), Value::Bool(a)) => stack.push(Value::Bool(match op {
                Operator::And => a && b,
                Operator::Or => a || b,
                _ => a ^ b,
            })),
            (Value::Num(b), Value::Num(a)) => {
                let (a, b) = (a as i64, b as i64);
                let r = match op {
                    Operator::And => a & b,
                    Operator::Or => a | b,
                    _ => a ^ b,
                };
                stack.push(num(r as f64));
            }
            _ => {
                return Err(PdfError::TypeError {
                    expected: "matching operands",
                    got: "mixed",
                });
            }
        },
        Operator::Not => match pop(stack)? {
            Value::Bool(b) => stack.push(Value::Bool(!b)),
            Value::Num(n) => stack.push(num(!(n as i64) as f64)),
        },
        Operator::Copy => {
            let n = usize::try_from(pop_int(stack)?).map_err(|_| underflow())?;
            let len = stack.len();
            if n > len {
                return Err(underflow());
            }
            stack.extend_from_within(len - n..);
        }
        Operator::Dup => {
            let top = *stack.last().ok_or_else(underflow)?;
            stack.push(top);
        }
        Operator::Exch => {
            let len = stack.len();
            if len < 2 {
                return Err(underflow());
            }
            stack.swap(len - 1, len - 2);
        }
        Operator::Index => {
            let n = usize::try_from(pop_int(stack)?).map_err(|_| underflow())?;
            let len = stack.len();
            if n >= len {
                return Err(underflow());
            }
            stack.push(stack[len - 1 - n]);
        }
        Operator::Pop => {
            pop(stack)?;
        }
        Operator::Roll => {
            let j = pop_int(stack)?;
            let n = usize::try_from(pop_int(stack)?).map_err(|_| underflow())?;
            let len = stack.len();
            if n > len {
                return Err(underflow());
            }
            if n > 0 {
                let shift = j.rem_euclid(n as i64) as usize;
                stack[len - n..].rotate_right(shift);
            }
        }
    }
    Ok(())
}
