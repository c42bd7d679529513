//! Commands understood by the input-emulation firmware.

use std::fmt;

use super::link::DeviceError;

/// One instruction for the external actuator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Click at the current cursor position.
    FastClick,
    /// Move the cursor to screen coordinates and click.
    Click { x: i32, y: i32 },
    ScrollDown(u32),
    ScrollUp(u32),
    KeyDown(String),
    KeyUp(String),
    /// Load text into the host clipboard; followed by `Paste`.
    PasteText(String),
    /// Paste the clipboard contents.
    Paste,
    /// Press and release F1..F12.
    FunctionKey(u8),
}

impl DeviceCommand {
    /// Rejects payloads that would break line framing on the wire.
    pub fn validate(&self) -> Result<(), DeviceError> {
        match self {
            DeviceCommand::KeyDown(key) | DeviceCommand::KeyUp(key) => {
                if key.is_empty() {
                    return Err(DeviceError::InvalidPayload("empty key name".into()));
                }
                reject_line_breaks(key)
            }
            DeviceCommand::PasteText(text) => reject_line_breaks(text),
            DeviceCommand::FunctionKey(n) if !(1..=12).contains(n) => Err(
                DeviceError::InvalidPayload(format!("function key F{} out of range", n)),
            ),
            _ => Ok(()),
        }
    }

    /// Serializes the command to its ASCII wire form.
    ///
    /// `fast_click` is the only token sent without a line terminator; the
    /// firmware matches it as a bare word.
    pub fn encode(&self) -> String {
        match self {
            DeviceCommand::FastClick => "fast_click".to_string(),
            DeviceCommand::Click { x, y } => format!("click:{},{}\n", x, y),
            DeviceCommand::ScrollDown(n) => format!("scroll_down:{}\n", n),
            DeviceCommand::ScrollUp(n) => format!("scroll_up:{}\n", n),
            DeviceCommand::KeyDown(key) => format!("key_down:{}\n", key),
            DeviceCommand::KeyUp(key) => format!("key_up:{}\n", key),
            DeviceCommand::PasteText(text) => format!("copy_to_clipboard:{}\n", text),
            DeviceCommand::Paste => "paste\n".to_string(),
            DeviceCommand::FunctionKey(n) => format!("fkey:{}\n", n),
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode().trim_end())
    }
}

fn reject_line_breaks(payload: &str) -> Result<(), DeviceError> {
    if payload.contains(['\n', '\r']) {
        return Err(DeviceError::InvalidPayload(
            "payload contains a line terminator".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_forms() {
        assert_eq!(DeviceCommand::FastClick.encode(), "fast_click");
        assert_eq!(DeviceCommand::Click { x: 100, y: 200 }.encode(), "click:100,200\n");
        assert_eq!(DeviceCommand::ScrollDown(1).encode(), "scroll_down:1\n");
        assert_eq!(DeviceCommand::ScrollUp(45).encode(), "scroll_up:45\n");
        assert_eq!(DeviceCommand::KeyDown("ctrl".into()).encode(), "key_down:ctrl\n");
        assert_eq!(DeviceCommand::KeyUp("ctrl".into()).encode(), "key_up:ctrl\n");
        assert_eq!(
            DeviceCommand::PasteText("Sword +3".into()).encode(),
            "copy_to_clipboard:Sword +3\n"
        );
        assert_eq!(DeviceCommand::Paste.encode(), "paste\n");
        assert_eq!(DeviceCommand::FunctionKey(5).encode(), "fkey:5\n");
    }

    #[test]
    fn test_negative_click_coordinates() {
        assert_eq!(DeviceCommand::Click { x: -12, y: 7 }.encode(), "click:-12,7\n");
    }

    #[test]
    fn test_validate_rejects_framing_breaks() {
        assert!(DeviceCommand::PasteText("a\nb".into()).validate().is_err());
        assert!(DeviceCommand::KeyDown("".into()).validate().is_err());
        assert!(DeviceCommand::KeyUp("x\r".into()).validate().is_err());
        assert!(DeviceCommand::FunctionKey(0).validate().is_err());
        assert!(DeviceCommand::FunctionKey(13).validate().is_err());
        assert!(DeviceCommand::FunctionKey(12).validate().is_ok());
        assert!(DeviceCommand::PasteText("plain".into()).validate().is_ok());
    }

    #[test]
    fn test_display_trims_terminator() {
        assert_eq!(format!("{}", DeviceCommand::ScrollDown(3)), "scroll_down:3");
    }
}
