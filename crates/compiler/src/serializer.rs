//! Bytecode image serialization.
//!
//! Converts an instruction buffer into a `.gvm` file and back:
//!
//! ```text
//! u32 magic  = 0x00ACCE55 (little-endian)
//! u32 number of instructions
//! per instruction:
//!   u8 opcode, u8 argument count (0..=2)
//!   per operand:
//!     u8 tag: 1 = number, 2 = bool, 3 = string
//!     tag 1/2: 8 raw value bytes     tag 3: u32 length + bytes
//! ```
//!
//! Numbers and booleans round-trip bitwise, so a deserialized buffer is
//! instruction-for-instruction identical to the one written.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use opal_core::bytecode::{Instruction, Opcode, Operand};
use opal_core::value::Value;

use crate::error::CompileError;

pub const MAGIC: u32 = 0x00ACCE55;

const TAG_NUM: u8 = 1;
const TAG_BOOL: u8 = 2;
const TAG_STR: u8 = 3;

fn write_value<W: Write>(out: &mut W, operand: &Operand) -> io::Result<()> {
    match operand {
        Operand::Val(value) => {
            let tag = if value.is_bool() { TAG_BOOL } else { TAG_NUM };
            out.write_all(&[tag])?;
            out.write_all(&value.bits().to_le_bytes())
        }
        Operand::Str(text) => {
            out.write_all(&[TAG_STR])?;
            out.write_all(&(text.len() as u32).to_le_bytes())?;
            out.write_all(text.as_bytes())
        }
    }
}

fn write_instruction<W: Write>(out: &mut W, instruction: &Instruction) -> io::Result<()> {
    out.write_all(&[instruction.op as u8, instruction.arg_count()])?;
    if let Some(v1) = &instruction.v1 {
        write_value(out, v1)?;
    }
    if let Some(v2) = &instruction.v2 {
        write_value(out, v2)?;
    }
    Ok(())
}

/// Serialize an instruction buffer to a writer.
pub fn write<W: Write>(out: &mut W, buffer: &[Instruction]) -> Result<(), CompileError> {
    out.write_all(&MAGIC.to_le_bytes())?;
    out.write_all(&(buffer.len() as u32).to_le_bytes())?;
    for instruction in buffer {
        write_instruction(out, instruction)?;
    }
    Ok(())
}

/// Serialize an instruction buffer into `path`.
pub fn serialize(path: &Path, buffer: &[Instruction]) -> Result<(), CompileError> {
    let mut file = File::create(path)
        .map_err(|e| CompileError::File(format!("Could not write '{}': {}", path.display(), e)))?;
    write(&mut file, buffer)
}

fn read_u8<R: Read>(input: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32<R: Read>(input: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_value<R: Read>(input: &mut R) -> Result<Operand, CompileError> {
    let tag = read_u8(input)?;
    match tag {
        TAG_NUM | TAG_BOOL => {
            let mut bits = [0u8; 8];
            input.read_exact(&mut bits)?;
            Ok(Operand::Val(Value::from_bits(u64::from_le_bytes(bits))))
        }
        TAG_STR => {
            let len = read_u32(input)? as usize;
            let mut bytes = vec![0u8; len];
            input.read_exact(&mut bytes)?;
            let text = String::from_utf8(bytes)
                .map_err(|_| CompileError::File("Invalid string constant".to_string()))?;
            Ok(Operand::Str(text))
        }
        _ => Err(CompileError::File(format!("Unknown value tag {}", tag))),
    }
}

/// Deserialize an instruction buffer from a reader.
pub fn read<R: Read>(input: &mut R) -> Result<Vec<Instruction>, CompileError> {
    let magic = read_u32(input)?;
    if magic != MAGIC {
        return Err(CompileError::File("Bytecode magic mismatch".to_string()));
    }

    let count = read_u32(input)? as usize;
    let mut buffer = Vec::with_capacity(count);
    for _ in 0..count {
        let opcode = read_u8(input)?;
        let op = Opcode::from_u8(opcode)
            .ok_or_else(|| CompileError::File(format!("Unknown opcode 0x{:02x}", opcode)))?;
        let args = read_u8(input)?;
        if args > 2 {
            return Err(CompileError::File(format!("Invalid argument count {}", args)));
        }

        let v1 = if args > 0 { Some(read_value(input)?) } else { None };
        let v2 = if args > 1 { Some(read_value(input)?) } else { None };
        buffer.push(Instruction { op, v1, v2 });
    }

    Ok(buffer)
}

/// Deserialize the instruction buffer stored in `path`.
pub fn deserialize(path: &Path) -> Result<Vec<Instruction>, CompileError> {
    let mut file = File::open(path)
        .map_err(|_| CompileError::File(format!("File '{}' does not exist", path.display())))?;
    read(&mut file)
}
