//! # Randomness
//!
//! `random_get` fills guest memory from the operating system's CSPRNG.

use rand::RngCore;
use rand::rngs::OsRng;
use tracing::warn;
use wasmtime::ValType::I32;

use crate::abi::Errno;
use crate::provider::FeatureProvider;
use crate::provider::ImportDef;
use crate::provider::memory;
use crate::provider::syscall;
use crate::provider::u32_arg;

#[derive(Clone, Copy, Debug, Default)]
pub struct Random;

impl FeatureProvider for Random {
    fn name(&self) -> &str {
        "random"
    }

    fn imports(&self) -> Vec<ImportDef> {
        vec![syscall("random_get", &[I32, I32], |caller, args| {
            let (buf, len) = (u32_arg(args, 0)?, u32_arg(args, 1)?);
            let (mut mem, _) = memory(caller)?;
            OsRng.try_fill_bytes(mem.slice_mut(buf, len)?).map_err(|e| {
                warn!(error = %e, "OS random source failed");
                Errno::Io
            })
        })]
    }
}
