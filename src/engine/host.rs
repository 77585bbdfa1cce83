use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("cannot read register {0}")]
    RegisterRead(String),
    #[error("cannot write register {0}")]
    RegisterWrite(String),
    #[error("cannot access {len} bytes of process memory at {address:#x}")]
    Memory { address: u64, len: usize },
}

/// Live-process access provided by the hosting debugger. Register names are
/// the debugger's own ("RAX", "ZF", ...); values are zero-extended to 64
/// bits regardless of register width.
pub trait DebuggerHost {
    fn read_register(&self, name: &str) -> Result<u64, HostError>;

    fn write_register(&mut self, name: &str, value: u64) -> Result<(), HostError>;

    fn read_memory(&self, address: u64, buf: &mut [u8]) -> Result<(), HostError>;

    fn write_memory(&mut self, address: u64, bytes: &[u8]) -> Result<(), HostError>;
}
