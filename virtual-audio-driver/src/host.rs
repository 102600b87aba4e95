//! Host capability probe.
//!
//! OS registration of virtual endpoints is an external-platform concern;
//! this probe only answers whether the current build target has a virtual
//! audio backend at all, and is callable before any instance exists.

/// Whether virtual audio endpoints are available on this build target.
pub fn is_virtual_audio_supported() -> bool {
    cfg!(any(target_os = "macos", target_os = "windows", target_os = "linux"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_is_constant_per_target() {
        // Whatever the answer is on this target, it must not change
        // between calls.
        assert_eq!(is_virtual_audio_supported(), is_virtual_audio_supported());
    }
}
