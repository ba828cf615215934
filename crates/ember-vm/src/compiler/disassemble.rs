//! Pretty-printer for compiled bytecode, used by the VM's trace logging
//! and the CLI's `--trace` flag. Pure functions over `&Chunk`; no access
//! to parser or VM state.

use ember_core::chunk::OpCode;
use ember_core::Chunk;

/// Renders every instruction in `chunk`, one per line, prefixed by a
/// `== name ==` header.
#[must_use]
pub fn disassemble_chunk(chunk: &Chunk, name: &str) -> String {
    let mut out = format!("== {name} ==\n");
    let mut offset = 0;
    while offset < chunk.len() {
        let (line, next) = disassemble_instruction(chunk, offset);
        out.push_str(&line);
        out.push('\n');
        offset = next;
    }
    out
}

/// Renders the single instruction at `offset`, returning the rendered
/// line and the offset of the next instruction.
#[must_use]
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> (String, usize) {
    let code = chunk.code();
    let line_marker = if offset > 0 && chunk.line(offset) == chunk.line(offset - 1) {
        "   |".to_string()
    } else {
        format!("{:4}", chunk.line(offset))
    };

    let Some(op) = OpCode::from_u8(code[offset]) else {
        return (
            format!("{offset:04} {line_marker} Unknown opcode {}", code[offset]),
            offset + 1,
        );
    };

    match op {
        OpCode::Constant => constant_instruction("OP_CONSTANT", chunk, offset, &line_marker),
        OpCode::Nil => simple_instruction("OP_NIL", offset, &line_marker),
        OpCode::True => simple_instruction("OP_TRUE", offset, &line_marker),
        OpCode::False => simple_instruction("OP_FALSE", offset, &line_marker),
        OpCode::Pop => simple_instruction("OP_POP", offset, &line_marker),
        OpCode::GetLocal => byte_instruction("OP_GET_LOCAL", chunk, offset, &line_marker),
        OpCode::SetLocal => byte_instruction("OP_SET_LOCAL", chunk, offset, &line_marker),
        OpCode::GetGlobal => constant_instruction("OP_GET_GLOBAL", chunk, offset, &line_marker),
        OpCode::DefineGlobal => constant_instruction("OP_DEFINE_GLOBAL", chunk, offset, &line_marker),
        OpCode::SetGlobal => constant_instruction("OP_SET_GLOBAL", chunk, offset, &line_marker),
        OpCode::Equal => simple_instruction("OP_EQUAL", offset, &line_marker),
        OpCode::Greater => simple_instruction("OP_GREATER", offset, &line_marker),
        OpCode::Less => simple_instruction("OP_LESS", offset, &line_marker),
        OpCode::Add => simple_instruction("OP_ADD", offset, &line_marker),
        OpCode::Subtract => simple_instruction("OP_SUBTRACT", offset, &line_marker),
        OpCode::Multiply => simple_instruction("OP_MULTIPLY", offset, &line_marker),
        OpCode::Divide => simple_instruction("OP_DIVIDE", offset, &line_marker),
        OpCode::Not => simple_instruction("OP_NOT", offset, &line_marker),
        OpCode::Negate => simple_instruction("OP_NEGATE", offset, &line_marker),
        OpCode::Print => simple_instruction("OP_PRINT", offset, &line_marker),
        OpCode::Jump => jump_instruction("OP_JUMP", 1, chunk, offset, &line_marker),
        OpCode::JumpIfFalse => jump_instruction("OP_JUMP_IF_FALSE", 1, chunk, offset, &line_marker),
        OpCode::Loop => jump_instruction("OP_LOOP", -1, chunk, offset, &line_marker),
        OpCode::Return => simple_instruction("OP_RETURN", offset, &line_marker),
    }
}

fn simple_instruction(name: &str, offset: usize, line_marker: &str) -> (String, usize) {
    (format!("{offset:04} {line_marker} {name}"), offset + 1)
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize, line_marker: &str) -> (String, usize) {
    let slot = chunk.code()[offset + 1];
    (format!("{offset:04} {line_marker} {name:<16} {slot:4}"), offset + 2)
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize, line_marker: &str) -> (String, usize) {
    let index = chunk.code()[offset + 1];
    let value = chunk.constant(index);
    (
        format!("{offset:04} {line_marker} {name:<16} {index:4} '{value}'"),
        offset + 2,
    )
}

fn jump_instruction(name: &str, sign: i64, chunk: &Chunk, offset: usize, line_marker: &str) -> (String, usize) {
    let code = chunk.code();
    let jump = u16::from_be_bytes([code[offset + 1], code[offset + 2]]);
    #[allow(clippy::cast_possible_wrap)]
    let target = offset as i64 + 3 + sign * i64::from(jump);
    (
        format!("{offset:04} {line_marker} {name:<16} {offset:4} -> {target}"),
        offset + 3,
    )
}
