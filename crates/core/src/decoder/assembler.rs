// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! One-instruction-per-line assembler driven by the encoding table.

use super::table::{Addressing, Hints, Op, OpcodeEntry, OperandKind, OPCODES};
use super::Condition;
use crate::{SimResult, SimulationError};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Num(i64),
    Punct(char),
}

fn err(msg: impl Into<String>) -> SimulationError {
    SimulationError::Assembly(msg.into())
}

fn tokenize(line: &str) -> SimResult<Vec<Token>> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(Token::Ident(word.to_ascii_lowercase()));
        } else if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let negative = c == '-';
            if negative {
                i += 1;
            }
            let start = i;
            while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let lower = text.to_ascii_lowercase();
            let value = match lower.strip_prefix("0x") {
                Some(hex) => i64::from_str_radix(hex, 16),
                None => lower.parse::<i64>(),
            }
            .map_err(|_| err(format!("bad number '{}'", text)))?;
            tokens.push(Token::Num(if negative { -value } else { value }));
        } else if "[]{}:+,.#".contains(c) {
            if c != '#' {
                tokens.push(Token::Punct(c));
            }
            i += 1;
        } else {
            return Err(err(format!("unexpected character '{}'", c)));
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MemArg {
    Ea,
    EaInc,
    Reg(u8),
    Disp(i64, u8),
    Direct(i64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Arg {
    Reg { index: u8, size: u8 },
    Sp,
    Ea,
    Psw,
    Ecsr,
    Elr,
    Epsw,
    Num(i64),
    Code { segment: i64, offset: i64 },
    Mem(MemArg),
    List(u8),
    Cond(Condition),
}

fn parse_register(name: &str) -> Option<(u8, u8)> {
    let (prefix, size) = if let Some(rest) = name.strip_prefix("er") {
        (rest, 2)
    } else if let Some(rest) = name.strip_prefix("xr") {
        (rest, 4)
    } else if let Some(rest) = name.strip_prefix("qr") {
        (rest, 8)
    } else if let Some(rest) = name.strip_prefix('r') {
        (rest, 1)
    } else {
        return match name {
            "bp" => Some((12, 2)),
            "fp" => Some((14, 2)),
            _ => None,
        };
    };
    let index: u8 = prefix.parse().ok()?;
    (index < 16).then_some((index, size))
}

fn list_bit(name: &str) -> Option<u8> {
    match name {
        "ea" => Some(1),
        "elr" | "pc" => Some(2),
        "epsw" | "psw" => Some(4),
        "lr" => Some(8),
        _ => None,
    }
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

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(&Token::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> SimResult<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(err(format!("expected '{}'", c)))
        }
    }

    /// `[ea]`, `[ea+]`, `[erN]` after the opening bracket.
    fn bracket(&mut self, disp: Option<i64>) -> SimResult<MemArg> {
        let name = match self.next() {
            Some(Token::Ident(name)) => name,
            _ => return Err(err("expected register inside brackets")),
        };
        let mem = if name == "ea" {
            if disp.is_some() {
                return Err(err("displacement not allowed with [ea]"));
            }
            if self.eat('+') {
                MemArg::EaInc
            } else {
                MemArg::Ea
            }
        } else {
            match parse_register(&name) {
                Some((index, 2)) => match disp {
                    Some(d) => MemArg::Disp(d, index),
                    None => MemArg::Reg(index),
                },
                _ => return Err(err(format!("'{}' cannot address memory", name))),
            }
        };
        self.expect(']')?;
        Ok(mem)
    }

    fn list(&mut self) -> SimResult<Arg> {
        let mut bits = 0u8;
        let mut single = None;
        loop {
            match self.next() {
                Some(Token::Punct('}')) => break,
                Some(Token::Ident(name)) => {
                    if let Some(bit) = list_bit(&name) {
                        bits |= bit;
                    } else if let Some((index, size)) = parse_register(&name) {
                        if single.is_some() || bits != 0 {
                            return Err(err("register lists hold one general register"));
                        }
                        single = Some(Arg::Reg { index, size });
                    } else {
                        return Err(err(format!("'{}' cannot be pushed", name)));
                    }
                }
                _ => return Err(err("unterminated register list")),
            }
            self.eat(',');
        }
        match single {
            Some(reg) if bits == 0 => Ok(reg),
            Some(_) => Err(err("register lists hold one general register")),
            None if bits == 0 => Err(err("empty register list")),
            None => Ok(Arg::List(bits)),
        }
    }

    /// One operand; bit operands (`r0.3`) come back as two.
    fn operand(&mut self, out: &mut Vec<Arg>) -> SimResult<()> {
        let arg = match self.next() {
            Some(Token::Punct('[')) => Arg::Mem(self.bracket(None)?),
            Some(Token::Punct('{')) => self.list()?,
            Some(Token::Num(n)) => {
                if self.eat('[') {
                    Arg::Mem(self.bracket(Some(n))?)
                } else if self.eat(':') {
                    match self.next() {
                        Some(Token::Num(offset)) => Arg::Code { segment: n, offset },
                        _ => return Err(err("expected offset after ':'")),
                    }
                } else {
                    Arg::Num(n)
                }
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "sp" => Arg::Sp,
                "ea" => Arg::Ea,
                "psw" => Arg::Psw,
                "ecsr" => Arg::Ecsr,
                "elr" => Arg::Elr,
                "epsw" => Arg::Epsw,
                _ => {
                    if let Some((index, size)) = parse_register(&name) {
                        Arg::Reg { index, size }
                    } else if let Some(cond) = Condition::from_name(&name) {
                        Arg::Cond(cond)
                    } else {
                        return Err(err(format!("unknown operand '{}'", name)));
                    }
                }
            },
            other => return Err(err(format!("unexpected {:?}", other))),
        };

        if self.eat('.') {
            let bit = match self.next() {
                Some(Token::Num(bit)) => bit,
                _ => return Err(err("expected bit number after '.'")),
            };
            let base = match arg {
                Arg::Num(addr) => Arg::Mem(MemArg::Direct(addr)),
                Arg::Reg { .. } => arg,
                _ => return Err(err("bit operands need a register or an address")),
            };
            out.push(base);
            out.push(Arg::Num(bit));
        } else {
            out.push(arg);
        }
        Ok(())
    }
}

fn parse_line(line: &str) -> SimResult<Option<(String, Vec<Arg>)>> {
    let code = line.split(';').next().unwrap_or("");
    let tokens = tokenize(code)?;
    if tokens.is_empty() {
        return Ok(None);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let mnemonic = match parser.next() {
        Some(Token::Ident(m)) => m,
        _ => return Err(err("expected mnemonic")),
    };
    let mut args = Vec::new();
    while parser.peek().is_some() {
        parser.operand(&mut args)?;
        if parser.peek().is_some() {
            parser.expect(',')?;
        }
    }

    // `bne -3` is `b ne, -3`
    if let Some(cond) = mnemonic
        .strip_prefix('b')
        .and_then(Condition::from_name)
    {
        args.insert(0, Arg::Cond(cond));
        return Ok(Some(("b".to_string(), args)));
    }
    Ok(Some((mnemonic, args)))
}

fn fits(value: i64, mask: u16, signed_only: bool) -> bool {
    let mask = mask as i64;
    let half = (mask + 1) / 2;
    if signed_only {
        value >= -half && value < half
    } else if mask >= 0xFF {
        // Byte and wider fields also take a two's-complement value
        (0..=mask).contains(&value) || (value < 0 && value >= -half)
    } else {
        (0..=mask).contains(&value)
    }
}

/// Immediate fields the CPU reads back sign-extended.
fn signed_immediate(entry: &OpcodeEntry) -> bool {
    entry.hints.contains(Hints::IMM_EXTEND) || entry.op == Op::Bcc
}

/// Pair bases must name an even register.
fn pair_base(base: u8) -> bool {
    base & 1 == 0
}

/// Field value plus an optional trailing word for one operand.
fn encode_operand(entry: &OpcodeEntry, i: usize, arg: Arg) -> Option<(u16, Option<u16>)> {
    let desc = entry.operands[i];
    let long = entry.hints.contains(Hints::LONG_IMM);
    match (desc.kind, arg) {
        (OperandKind::Register(size), Arg::Reg { index, size: s })
            if size == s && index as u16 & desc.mask == index as u16 =>
        {
            Some((index as u16, None))
        }
        (OperandKind::StackPointer, Arg::Sp)
        | (OperandKind::ExtendedAddress, Arg::Ea)
        | (OperandKind::Psw, Arg::Psw)
        | (OperandKind::Ecsr, Arg::Ecsr)
        | (OperandKind::Elr, Arg::Elr)
        | (OperandKind::Epsw, Arg::Epsw) => Some((0, None)),
        (OperandKind::Condition, Arg::Cond(cond)) => Some((cond.code() as u16, None)),
        (OperandKind::RegisterList, Arg::List(bits)) => Some((bits as u16, None)),
        // Far branch target: `seg:off` or a flat 20-bit address
        (OperandKind::Immediate, Arg::Code { segment, offset })
            if long && (0..=0xF).contains(&segment) && (0..=0xFFFF).contains(&offset) =>
        {
            Some((segment as u16, Some(offset as u16)))
        }
        (OperandKind::Immediate, Arg::Num(n)) if long && matches!(entry.op, Op::B | Op::Bl) => {
            (0..=0xF_FFFF)
                .contains(&n)
                .then(|| ((n >> 16) as u16, Some((n & 0xFFFF) as u16)))
        }
        (OperandKind::Immediate, Arg::Num(n)) => {
            fits(n, desc.mask, signed_immediate(entry)).then(|| ((n as u16) & desc.mask, None))
        }
        (OperandKind::Memory(mode), Arg::Mem(mem)) => match (mode, mem) {
            (Addressing::Ea, MemArg::Ea) | (Addressing::EaInc, MemArg::EaInc) => Some((0, None)),
            (Addressing::Reg, MemArg::Reg(base)) if pair_base(base) => Some((base as u16, None)),
            (Addressing::Disp16Reg, MemArg::Disp(disp, base))
                if pair_base(base) && fits(disp, 0xFFFF, false) =>
            {
                Some((base as u16, Some(disp as u16)))
            }
            (Addressing::BasePointer, MemArg::Disp(disp, 12))
            | (Addressing::FramePointer, MemArg::Disp(disp, 14))
                if fits(disp, 0x3F, true) =>
            {
                Some(((disp as u16) & 0x3F, None))
            }
            (Addressing::Direct, MemArg::Direct(addr)) if fits(addr, 0xFFFF, false) => {
                Some((0, Some(addr as u16)))
            }
            _ => None,
        },
        (OperandKind::Memory(Addressing::Direct), Arg::Num(addr)) if fits(addr, 0xFFFF, false) => {
            Some((0, Some(addr as u16)))
        }
        _ => None,
    }
}

/// Try to encode `args` with one table entry.
fn encode_with(entry: &OpcodeEntry, args: &[Arg]) -> Option<Vec<u16>> {
    let expected = entry
        .operands
        .iter()
        .filter(|s| !matches!(s.kind, OperandKind::None | OperandKind::Mirror))
        .count();
    if expected != args.len() {
        return None;
    }

    let mut opcode = entry.mask;
    let mut long_imm = None;
    let mut first_field = 0;
    let mut args = args.iter();
    for (i, desc) in entry.operands.iter().enumerate() {
        let field = match desc.kind {
            OperandKind::None => continue,
            OperandKind::Mirror => first_field,
            _ => {
                let (field, long) = encode_operand(entry, i, *args.next()?)?;
                if long.is_some() {
                    long_imm = long;
                }
                field
            }
        };
        if i == 0 {
            first_field = field;
        }
        opcode |= desc.encode(field);
    }

    let mut words = vec![opcode];
    if entry.hints.contains(Hints::LONG_IMM) {
        words.push(long_imm?);
    }
    Some(words)
}

/// Assemble one line. Blank and comment-only lines give no words.
pub fn assemble(line: &str) -> SimResult<Vec<u16>> {
    let Some((mnemonic, args)) = parse_line(line)? else {
        return Ok(Vec::new());
    };
    OPCODES
        .iter()
        .filter(|e| e.mnemonic == mnemonic)
        .filter_map(|e| encode_with(e, &args))
        .min_by_key(Vec::len)
        .ok_or_else(|| {
            err(format!(
                "Instruction not found for '{}'",
                line.split(';').next().unwrap_or(line).trim()
            ))
        })
}

/// Accumulates little-endian code bytes.
#[derive(Debug, Default, Clone)]
pub struct Assembler {
    bytes: Vec<u8>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assemble_line(&mut self, line: &str) -> SimResult<Vec<u16>> {
        let words = assemble(line)?;
        for w in &words {
            self.bytes.extend_from_slice(&w.to_le_bytes());
        }
        Ok(words)
    }

    /// Assemble a multi-line source; errors carry the 1-based line number.
    pub fn assemble_source(&mut self, source: &str) -> SimResult<()> {
        for (n, line) in source.lines().enumerate() {
            self.assemble_line(line).map_err(|e| match e {
                SimulationError::Assembly(msg) => {
                    SimulationError::Assembly(format!("line {}: {}", n + 1, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Current byte offset.
    pub fn position(&self) -> usize {
        self.bytes.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
