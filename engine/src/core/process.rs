//! Cross-platform process spawning helpers.
//!
//! The transcoder is spawned from long-running worker tasks. On Windows each
//! console binary would otherwise open a window; on every platform the child
//! must die with the task that owns it so a timed-out burn job never leaves
//! an orphaned encoder behind.

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Apply platform flags and lifetime policy to a tokio process command.
pub fn configure_tokio_command(cmd: &mut tokio::process::Command) {
    #[cfg(target_os = "windows")]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd.kill_on_drop(true);
    cmd.stdin(std::process::Stdio::null());
}

/// Apply platform flags to a std process command (short probes only).
pub fn configure_std_command(cmd: &mut std::process::Command) {
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd.stdin(std::process::Stdio::null());
}
