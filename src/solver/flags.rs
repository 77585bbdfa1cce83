use std::fmt;

use log::debug;

use crate::engine::host::DebuggerHost;
use crate::engine::{Register, SymbolicEngine};
use crate::solver::Error;

/// x86 conditional-jump kinds the negator knows about. The JCXZ family
/// tests a register, not flags, so it carries no flip rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionCode {
    Ja,
    Jae,
    Jb,
    Jbe,
    Je,
    Jne,
    Jg,
    Jge,
    Jl,
    Jle,
    Jo,
    Jno,
    Jp,
    Jnp,
    Js,
    Jns,
    Jcxz,
    Jecxz,
    Jrcxz,
}

impl ConditionCode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            ConditionCode::Ja => "ja",
            ConditionCode::Jae => "jae",
            ConditionCode::Jb => "jb",
            ConditionCode::Jbe => "jbe",
            ConditionCode::Je => "je",
            ConditionCode::Jne => "jne",
            ConditionCode::Jg => "jg",
            ConditionCode::Jge => "jge",
            ConditionCode::Jl => "jl",
            ConditionCode::Jle => "jle",
            ConditionCode::Jo => "jo",
            ConditionCode::Jno => "jno",
            ConditionCode::Jp => "jp",
            ConditionCode::Jnp => "jnp",
            ConditionCode::Js => "js",
            ConditionCode::Jns => "jns",
            ConditionCode::Jcxz => "jcxz",
            ConditionCode::Jecxz => "jecxz",
            ConditionCode::Jrcxz => "jrcxz",
        }
    }

    /// The pure flag rewrite that flips this condition, when flags alone
    /// can flip it.
    pub fn flip_rule(self) -> Option<fn(Flags) -> Flags> {
        match self {
            ConditionCode::Ja => Some(flip_ja),
            ConditionCode::Jae => Some(flip_jae),
            ConditionCode::Jb => Some(flip_jb),
            ConditionCode::Jbe => Some(flip_jbe),
            ConditionCode::Je | ConditionCode::Jne => Some(flip_zero),
            ConditionCode::Jg => Some(flip_jg),
            ConditionCode::Jge => Some(flip_jge),
            ConditionCode::Jl => Some(flip_jl),
            ConditionCode::Jle => Some(flip_jle),
            ConditionCode::Jo | ConditionCode::Jno => Some(flip_overflow),
            ConditionCode::Jp | ConditionCode::Jnp => Some(flip_parity),
            ConditionCode::Js | ConditionCode::Jns => Some(flip_sign),
            ConditionCode::Jcxz | ConditionCode::Jecxz | ConditionCode::Jrcxz => None,
        }
    }
}

impl fmt::Display for ConditionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub zero_flag: bool,       // Set if the result is zero
    pub sign_flag: bool,       // Set if the result is negative
    pub carry_flag: bool,      // Set on unsigned overflow out of the most significant bit
    pub overflow_flag: bool,   // Set on signed overflow out of the most significant bit
    pub parity_flag: bool,     // Set if the number of set bits is even
}

impl Flags {
    fn pairs(self) -> [(&'static str, bool); 5] {
        [
            ("CF", self.carry_flag),
            ("ZF", self.zero_flag),
            ("SF", self.sign_flag),
            ("OF", self.overflow_flag),
            ("PF", self.parity_flag),
        ]
    }

    // Read the five condition-code flags from the live process.
    pub fn read_from<H: DebuggerHost>(host: &H) -> Result<Self, Error> {
        Ok(Flags {
            carry_flag: host.read_register("CF")? != 0,
            zero_flag: host.read_register("ZF")? != 0,
            sign_flag: host.read_register("SF")? != 0,
            overflow_flag: host.read_register("OF")? != 0,
            parity_flag: host.read_register("PF")? != 0,
        })
    }

    // Write the five condition-code flags into the live process.
    pub fn write_to<H: DebuggerHost>(self, host: &mut H) -> Result<(), Error> {
        for (name, value) in self.pairs() {
            host.write_register(name, value as u64)?;
        }
        Ok(())
    }

    // Mirror the five flags into the engine's concrete register store.
    pub fn write_to_engine<'ctx, E: SymbolicEngine<'ctx>>(
        self,
        engine: &mut E,
    ) -> Result<(), Error> {
        for (name, value) in self.pairs() {
            engine.set_concrete_register_value(&Register::new(name), value as u64)?;
        }
        Ok(())
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CF={} ZF={} SF={} OF={} PF={}",
            self.carry_flag as u8,
            self.zero_flag as u8,
            self.sign_flag as u8,
            self.overflow_flag as u8,
            self.parity_flag as u8
        )
    }
}

fn flip_ja(mut flags: Flags) -> Flags {
    if !flags.carry_flag && !flags.zero_flag {
        flags.carry_flag = true;
        flags.zero_flag = true;
    } else {
        flags.carry_flag = false;
        flags.zero_flag = false;
    }
    flags
}

fn flip_jae(mut flags: Flags) -> Flags {
    if !flags.carry_flag || !flags.zero_flag {
        flags.carry_flag = true;
        flags.zero_flag = true;
    } else {
        flags.carry_flag = false;
        flags.zero_flag = false;
    }
    flags
}

fn flip_jb(mut flags: Flags) -> Flags {
    flags.carry_flag = !flags.carry_flag;
    flags
}

fn flip_jbe(mut flags: Flags) -> Flags {
    if flags.carry_flag || flags.zero_flag {
        flags.carry_flag = false;
        flags.zero_flag = false;
    } else {
        flags.carry_flag = true;
        flags.zero_flag = true;
    }
    flags
}

fn flip_zero(mut flags: Flags) -> Flags {
    flags.zero_flag = !flags.zero_flag;
    flags
}

fn flip_jg(mut flags: Flags) -> Flags {
    if flags.sign_flag == flags.overflow_flag && !flags.zero_flag {
        flags.sign_flag = !flags.overflow_flag;
        flags.zero_flag = true;
    } else {
        flags.sign_flag = flags.overflow_flag;
        flags.zero_flag = false;
    }
    flags
}

fn flip_jge(mut flags: Flags) -> Flags {
    if flags.sign_flag == flags.overflow_flag || flags.zero_flag {
        flags.sign_flag = !flags.overflow_flag;
        flags.zero_flag = false;
    } else {
        flags.sign_flag = flags.overflow_flag;
        flags.zero_flag = true;
    }
    flags
}

fn flip_jl(mut flags: Flags) -> Flags {
    if flags.sign_flag == flags.overflow_flag {
        flags.sign_flag = !flags.overflow_flag;
    } else {
        flags.sign_flag = flags.overflow_flag;
    }
    flags
}

fn flip_jle(mut flags: Flags) -> Flags {
    if flags.sign_flag != flags.overflow_flag || flags.zero_flag {
        flags.sign_flag = flags.overflow_flag;
        flags.zero_flag = false;
    } else {
        flags.sign_flag = !flags.overflow_flag;
        flags.zero_flag = true;
    }
    flags
}

fn flip_overflow(mut flags: Flags) -> Flags {
    flags.overflow_flag = !flags.overflow_flag;
    flags
}

fn flip_parity(mut flags: Flags) -> Flags {
    flags.parity_flag = !flags.parity_flag;
    flags
}

fn flip_sign(mut flags: Flags) -> Flags {
    flags.sign_flag = !flags.sign_flag;
    flags
}

/// Negate the conditional jump the process is stopped at by rewriting the
/// condition-code flags, without consulting the solver. The new flags go
/// into both the live process and the engine's concrete register store.
pub fn negate_by_flags<'ctx, E, H>(
    engine: &mut E,
    host: &mut H,
    kind: ConditionCode,
) -> Result<Flags, Error>
where
    E: SymbolicEngine<'ctx>,
    H: DebuggerHost,
{
    let rule = kind
        .flip_rule()
        .ok_or(Error::CannotNegateByFlags(kind))?;
    let before = Flags::read_from(host)?;
    let after = rule(before);
    after.write_to(host)?;
    after.write_to_engine(engine)?;
    debug!("negated {}: {} -> {}", kind, before, after);
    Ok(after)
}
