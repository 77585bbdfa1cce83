use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};

use crate::engine::host::DebuggerHost;
use crate::engine::{MemoryCell, Register, SymbolicEngine};
use crate::solver::Error;

/// A solved concretization request: the cells and registers that force the
/// branch at `bound` toward `dst_address`. Values are not stored here; they
/// live in the engine's concrete store and are read out at apply time.
#[derive(Debug, Clone)]
pub struct Input {
    pub bound: usize,
    pub src_address: u64,
    pub dst_address: u64,
    pub memory_operands: Vec<MemoryCell>,
    pub register_operands: Vec<Register>,
}

impl Input {
    pub fn new(bound: usize, src_address: u64, dst_address: u64) -> Self {
        Input {
            bound,
            src_address,
            dst_address,
            memory_operands: Vec::new(),
            register_operands: Vec::new(),
        }
    }

    /// Write this input into the live process and re-assert it into the
    /// engine's store, which concretizes the operands from here on.
    /// Memory first, then registers; the two sets are disjoint.
    pub fn apply<'ctx, E, H>(&self, engine: &mut E, host: &mut H) -> Result<(), Error>
    where
        E: SymbolicEngine<'ctx>,
        H: DebuggerHost,
    {
        for cell in &self.memory_operands {
            let value = engine.get_concrete_memory_value(*cell)?;
            let len = cell.size as usize;
            if len > 16 {
                warn!("{} is wider than 128 bits; writing the low 16 bytes", cell);
            }
            let bytes = le_bytes(value, len.min(16));
            host.write_memory(cell.address, &bytes[..len.min(16)])?;
            engine.set_concrete_memory_value(*cell, value)?;
            engine.concretize_memory(*cell)?;
            debug!("memory {} set to {:#x}", cell, value);
        }
        for register in &self.register_operands {
            let value = engine.get_concrete_register_value(register)?;
            host.write_register(&register.name, value)?;
            engine.set_concrete_register_value(register, value)?;
            engine.concretize_register(register)?;
            debug!("register {} set to {:#x}", register, value);
        }
        Ok(())
    }
}

// Little-endian encoding of the low `len` bytes of `value`, `len <= 16`.
fn le_bytes(value: u128, len: usize) -> [u8; 16] {
    let mut buf = [0u8; 16];
    if len == 0 {
        return buf;
    }
    let masked = if len < 16 {
        value & ((1u128 << (8 * len as u32)) - 1)
    } else {
        value
    };
    LittleEndian::write_uint128(&mut buf[..len], masked, len);
    buf
}
