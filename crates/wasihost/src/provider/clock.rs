//! # Clocks
//!
//! `clock_time_get` and `clock_res_get`. Realtime counts from the UNIX epoch;
//! the monotonic clock counts from the provider's creation. The CPU-time clocks
//! are served from the monotonic clock.

use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use wasmtime::ValType::I32;
use wasmtime::ValType::I64;

use crate::abi::ClockId;
use crate::abi::Errno;
use crate::abi::SysResult;
use crate::provider::FeatureProvider;
use crate::provider::ImportDef;
use crate::provider::memory;
use crate::provider::syscall;
use crate::provider::u32_arg;

/// Reported resolution in nanoseconds.
const RESOLUTION_NS: u64 = 1_000;

#[derive(Clone, Copy, Debug)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Current value of `id` in nanoseconds.
    pub fn now(&self, id: ClockId) -> SysResult<u64> {
        match id {
            ClockId::Realtime => {
                let since = SystemTime::now().duration_since(UNIX_EPOCH).map_err(|_| Errno::Io)?;
                Ok(since.as_nanos() as u64)
            }
            ClockId::Monotonic | ClockId::ProcessCputime | ClockId::ThreadCputime => {
                Ok(self.origin.elapsed().as_nanos() as u64)
            }
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

fn clock_id(raw: u32) -> SysResult<ClockId> {
    ClockId::from_raw(raw).ok_or(Errno::Inval)
}

impl FeatureProvider for Clock {
    fn name(&self) -> &str {
        "clock"
    }

    fn imports(&self) -> Vec<ImportDef> {
        let clock = *self;
        vec![
            // (id, precision, time_out)
            syscall("clock_time_get", &[I32, I64, I32], move |caller, args| {
                let now = clock.now(clock_id(u32_arg(args, 0)?)?)?;
                let out = u32_arg(args, 2)?;
                let (mut mem, _) = memory(caller)?;
                mem.write_u64(out, now)
            }),
            syscall("clock_res_get", &[I32, I32], |caller, args| {
                clock_id(u32_arg(args, 0)?)?;
                let out = u32_arg(args, 1)?;
                let (mut mem, _) = memory(caller)?;
                mem.write_u64(out, RESOLUTION_NS)
            }),
        ]
    }
}
