// src/miner/fpenv.rs
//! Floating-point environment capture and restore
//!
//! JIT-compiled VM programs change the rounding mode and leave sticky exception
//! flags behind. The search loop snapshots the calling thread's FP control and
//! status registers on entry and writes them back on every exit path through
//! [`FpEnvGuard`].
//!
//! Covered registers:
//! - x86_64: MXCSR (SSE rounding, masks and sticky flags), the x87 control
//!   word and the x87 exception flags of the status word
//! - aarch64: FPCR and FPSR
//!
//! The x87 stack top, tag word and last-instruction pointers are left as they
//! are on restore.
//!
//! On other targets the snapshot is empty and restoring is a no-op.

#![allow(unsafe_code)]

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
use std::arch::asm;

/// Word offsets of the control and status words in the 28-byte `fnstenv` image
#[cfg(target_arch = "x86_64")]
const X87_CONTROL_WORD: usize = 0;
#[cfg(target_arch = "x86_64")]
const X87_STATUS_WORD: usize = 2;
/// IE, DE, ZE, OE, UE and PE
#[cfg(target_arch = "x86_64")]
const X87_EXCEPTION_FLAGS: u16 = 0x3f;

/// Snapshot of the calling thread's floating-point environment
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FpEnv {
    #[cfg(target_arch = "x86_64")]
    mxcsr: u32,
    #[cfg(target_arch = "x86_64")]
    x87_control: u16,
    #[cfg(target_arch = "x86_64")]
    x87_status: u16,
    #[cfg(target_arch = "aarch64")]
    fpcr: u64,
    #[cfg(target_arch = "aarch64")]
    fpsr: u64,
}

impl FpEnv {
    /// Reads the current environment of the calling thread
    #[cfg(target_arch = "x86_64")]
    pub fn capture() -> Self {
        let mut mxcsr: u32 = 0;
        let mut x87_control: u16 = 0;
        let mut x87_status: u16 = 0;
        // SAFETY: the instructions only store the register into the pointed-to local.
        unsafe {
            asm!("stmxcsr [{}]", in(reg) &raw mut mxcsr, options(nostack, preserves_flags));
            asm!("fnstcw [{}]", in(reg) &raw mut x87_control, options(nostack, preserves_flags));
            asm!("fnstsw word ptr [{}]", in(reg) &raw mut x87_status, options(nostack, preserves_flags));
        }
        Self {
            mxcsr,
            x87_control,
            x87_status: x87_status & X87_EXCEPTION_FLAGS,
        }
    }

    /// Reads the current environment of the calling thread
    #[cfg(target_arch = "aarch64")]
    pub fn capture() -> Self {
        let fpcr: u64;
        let fpsr: u64;
        // SAFETY: reading system FP registers has no side effects.
        unsafe {
            asm!("mrs {}, fpcr", out(reg) fpcr, options(nomem, nostack, preserves_flags));
            asm!("mrs {}, fpsr", out(reg) fpsr, options(nomem, nostack, preserves_flags));
        }
        Self { fpcr, fpsr }
    }

    /// Reads the current environment of the calling thread
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    pub fn capture() -> Self {
        Self {}
    }

    /// Writes this snapshot back into the calling thread's registers
    #[cfg(target_arch = "x86_64")]
    pub fn restore(&self) {
        // SAFETY: the value was read from the same register by `capture`.
        unsafe {
            asm!("ldmxcsr [{}]", in(reg) &raw const self.mxcsr, options(nostack, readonly, preserves_flags));
        }
        load_x87(self.x87_control, self.x87_status);
    }

    /// Writes this snapshot back into the calling thread's registers
    #[cfg(target_arch = "aarch64")]
    pub fn restore(&self) {
        // SAFETY: the values were read from the same registers by `capture`.
        unsafe {
            asm!("msr fpcr, {}", in(reg) self.fpcr, options(nomem, nostack, preserves_flags));
            asm!("msr fpsr, {}", in(reg) self.fpsr, options(nomem, nostack, preserves_flags));
        }
    }

    /// Writes this snapshot back into the calling thread's registers
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    pub fn restore(&self) {}
}

/// Writes the x87 control word and exception flags, keeping the rest of the x87 state
///
/// The status word can only be written through a full environment load, so
/// the current image is stored, patched and loaded back.
#[cfg(target_arch = "x86_64")]
fn load_x87(control: u16, exception_flags: u16) {
    let mut image = [0u16; 14];
    // SAFETY: `fnstenv` writes exactly 28 bytes into `image`.
    unsafe {
        asm!("fnstenv [{}]", in(reg) image.as_mut_ptr(), options(nostack, preserves_flags));
    }
    image[X87_CONTROL_WORD] = control;
    image[X87_STATUS_WORD] =
        (image[X87_STATUS_WORD] & !X87_EXCEPTION_FLAGS) | (exception_flags & X87_EXCEPTION_FLAGS);
    // SAFETY: `image` is a complete environment image produced by `fnstenv` above.
    unsafe {
        asm!("fldenv [{}]", in(reg) image.as_ptr(), options(nostack, readonly, preserves_flags));
    }
}

/// Restores the captured environment when dropped
///
/// ```
/// use rx_miner_rs::miner::fpenv::{FpEnv, FpEnvGuard};
///
/// let before = FpEnv::capture();
/// {
///     let _guard = FpEnvGuard::capture();
///     // code that may clobber the rounding mode
/// }
/// assert_eq!(FpEnv::capture(), before);
/// ```
#[must_use = "the environment is restored when the guard is dropped"]
pub struct FpEnvGuard {
    saved: FpEnv,
}

impl FpEnvGuard {
    /// Snapshots the current environment
    pub fn capture() -> Self {
        Self {
            saved: FpEnv::capture(),
        }
    }
}

impl Drop for FpEnvGuard {
    fn drop(&mut self) {
        self.saved.restore();
    }
}

/// Switches the rounding mode to round-toward-zero and raises the divide-by-zero
/// flags, the way generated VM code does
///
/// Used by the mock backend to reproduce the side effects the guard exists for.
pub(crate) fn clobber_rounding_mode() {
    #[cfg(target_arch = "x86_64")]
    {
        let mut env = FpEnv::capture();
        env.mxcsr |= (0b11 << 13) | (1 << 2);
        env.x87_status |= 1 << 2;
        env.restore();
    }
    #[cfg(target_arch = "aarch64")]
    {
        let mut env = FpEnv::capture();
        env.fpcr |= 0b11 << 22;
        env.restore();
    }
}
