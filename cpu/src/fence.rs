// memory fence helpers
//
// naming the direction at the call site keeps release/acquire pairings
// auditable. on x86/x86_64 these compile down to compiler fences only;
// on weaker architectures they are real barriers

use core::sync::atomic::{fence, Ordering};

// acquire fence - prevents subsequent ops from reordering before the fence
#[inline(always)]
pub fn fence_acquire() {
    fence(Ordering::Acquire);
}

// release fence - prevents prior ops from reordering after the fence
#[inline(always)]
pub fn fence_release() {
    fence(Ordering::Release);
}

// cpu spin-loop hint for tight wait loops - not a memory fence
// maps to PAUSE on x86/x86_64, reduces power and helps the smt sibling
#[inline(always)]
pub fn cpu_pause() {
    core::hint::spin_loop();
}
