//! MicroPython REPL control codes.
//!
//! Each code is sent on its own line like any other statement.

/// Enter raw REPL. Also opens a multi-line block.
pub const CTRL_A: &str = "\x01";
/// Leave raw REPL. Also closes a multi-line block.
pub const CTRL_B: &str = "\x02";
/// Keyboard interrupt: stops whatever program is running on the hub.
pub const CTRL_C: &str = "\x03";
/// Soft reboot / end of raw input.
pub const CTRL_D: &str = "\x04";
/// Paste mode.
pub const CTRL_E: &str = "\x05";

/// Interrupt sent on connect to reset any running remote program.
pub const INTERRUPT: &str = CTRL_C;

/// Log-friendly name of a control code, or `None` for ordinary text.
#[must_use]
pub fn control_name(text: &str) -> Option<&'static str> {
    match text {
        CTRL_A => Some("CTRL_A"),
        CTRL_B => Some("CTRL_B"),
        CTRL_C => Some("CTRL_C"),
        CTRL_D => Some("CTRL_D"),
        CTRL_E => Some("CTRL_E"),
        _ => None,
    }
}
