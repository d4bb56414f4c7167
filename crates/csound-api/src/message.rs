//! Message attribute bits: severity type, foreground/background color and text style.
use std::fmt;

use csound_sys as sys;
use serde::{Deserialize, Serialize};

/// Attribute word attached to every engine message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageAttributes(pub u32);

impl MessageAttributes {
    pub const DEFAULT: Self = Self(sys::CSOUNDMSG_DEFAULT as u32);
    pub const ERROR: Self = Self(sys::CSOUNDMSG_ERROR as u32);
    pub const ORCH: Self = Self(sys::CSOUNDMSG_ORCH as u32);
    pub const REALTIME: Self = Self(sys::CSOUNDMSG_REALTIME as u32);
    pub const WARNING: Self = Self(sys::CSOUNDMSG_WARNING as u32);
    pub const STDOUT: Self = Self(sys::CSOUNDMSG_STDOUT as u32);

    pub const FG_BLACK: Self = Self(sys::CSOUNDMSG_FG_BLACK as u32);
    pub const FG_RED: Self = Self(sys::CSOUNDMSG_FG_RED as u32);
    pub const FG_GREEN: Self = Self(sys::CSOUNDMSG_FG_GREEN as u32);
    pub const FG_YELLOW: Self = Self(sys::CSOUNDMSG_FG_YELLOW as u32);
    pub const FG_BLUE: Self = Self(sys::CSOUNDMSG_FG_BLUE as u32);
    pub const FG_MAGENTA: Self = Self(sys::CSOUNDMSG_FG_MAGENTA as u32);
    pub const FG_CYAN: Self = Self(sys::CSOUNDMSG_FG_CYAN as u32);
    pub const FG_WHITE: Self = Self(sys::CSOUNDMSG_FG_WHITE as u32);

    pub const FG_BOLD: Self = Self(sys::CSOUNDMSG_FG_BOLD as u32);
    pub const FG_UNDERLINE: Self = Self(sys::CSOUNDMSG_FG_UNDERLINE as u32);

    pub const BG_BLACK: Self = Self(sys::CSOUNDMSG_BG_BLACK as u32);
    pub const BG_RED: Self = Self(sys::CSOUNDMSG_BG_RED as u32);
    pub const BG_GREEN: Self = Self(sys::CSOUNDMSG_BG_GREEN as u32);
    pub const BG_ORANGE: Self = Self(sys::CSOUNDMSG_BG_ORANGE as u32);
    pub const BG_BLUE: Self = Self(sys::CSOUNDMSG_BG_BLUE as u32);
    pub const BG_MAGENTA: Self = Self(sys::CSOUNDMSG_BG_MAGENTA as u32);
    pub const BG_CYAN: Self = Self(sys::CSOUNDMSG_BG_CYAN as u32);
    pub const BG_GREY: Self = Self(sys::CSOUNDMSG_BG_GREY as u32);

    pub const TYPE_MASK: u32 = sys::CSOUNDMSG_TYPE_MASK as u32;
    pub const FG_COLOR_MASK: u32 = sys::CSOUNDMSG_FG_COLOR_MASK as u32;
    pub const FG_ATTR_MASK: u32 = sys::CSOUNDMSG_FG_ATTR_MASK as u32;
    pub const BG_COLOR_MASK: u32 = sys::CSOUNDMSG_BG_COLOR_MASK as u32;

    const FG_SET: u32 = 0x0100;
    const BG_SET: u32 = 0x0200;

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn kind(self) -> MessageKind {
        match self.0 & Self::TYPE_MASK {
            0x0000 => MessageKind::Default,
            0x1000 => MessageKind::Error,
            0x2000 => MessageKind::Orchestra,
            0x3000 => MessageKind::Realtime,
            0x4000 => MessageKind::Warning,
            0x5000 => MessageKind::Stdout,
            other => MessageKind::Other(other),
        }
    }

    pub fn foreground(self) -> Option<Color> {
        let bits = self.0 & Self::FG_COLOR_MASK;
        (bits & Self::FG_SET != 0).then(|| Color::from_index(bits & 0x7))
    }

    /// Background color. Slot 3 is orange and slot 7 grey on the engine side.
    pub fn background(self) -> Option<Color> {
        let bits = self.0 & Self::BG_COLOR_MASK;
        (bits & Self::BG_SET != 0).then(|| Color::from_index((bits >> 4) & 0x7))
    }

    pub fn is_bold(self) -> bool {
        self.0 & Self::FG_BOLD.0 != 0
    }

    pub fn is_underlined(self) -> bool {
        self.0 & Self::FG_UNDERLINE.0 != 0
    }

    /// Whether any color or style bit is present.
    pub fn is_styled(self) -> bool {
        self.0 & (Self::FG_COLOR_MASK | Self::FG_ATTR_MASK | Self::BG_COLOR_MASK) != 0
    }
}

impl std::ops::BitOr for MessageAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for MessageAttributes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl From<i32> for MessageAttributes {
    fn from(raw: i32) -> Self {
        Self(raw as u32)
    }
}

impl fmt::Display for MessageAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Default,
    Error,
    Orchestra,
    Realtime,
    Warning,
    Stdout,
    Other(u32),
}

impl MessageKind {
    pub fn attributes(self) -> MessageAttributes {
        match self {
            MessageKind::Default => MessageAttributes::DEFAULT,
            MessageKind::Error => MessageAttributes::ERROR,
            MessageKind::Orchestra => MessageAttributes::ORCH,
            MessageKind::Realtime => MessageAttributes::REALTIME,
            MessageKind::Warning => MessageAttributes::WARNING,
            MessageKind::Stdout => MessageAttributes::STDOUT,
            MessageKind::Other(bits) => MessageAttributes(bits & MessageAttributes::TYPE_MASK),
        }
    }
}

/// One of the eight palette slots shared by foreground and background bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl Color {
    pub const ALL: [Color; 8] = [
        Color::Black,
        Color::Red,
        Color::Green,
        Color::Yellow,
        Color::Blue,
        Color::Magenta,
        Color::Cyan,
        Color::White,
    ];

    fn from_index(index: u32) -> Self {
        Self::ALL[(index & 0x7) as usize]
    }

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn foreground(self) -> MessageAttributes {
        MessageAttributes(MessageAttributes::FG_SET | self.index())
    }

    pub fn background(self) -> MessageAttributes {
        MessageAttributes(MessageAttributes::BG_SET | (self.index() << 4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_are_bit_exact() {
        assert_eq!(MessageAttributes::TYPE_MASK, 0x7000);
        assert_eq!(MessageAttributes::FG_COLOR_MASK, 0x0107);
        assert_eq!(MessageAttributes::FG_ATTR_MASK, 0x0088);
        assert_eq!(MessageAttributes::BG_COLOR_MASK, 0x0270);
    }

    #[test]
    fn decodes_combined_attributes() {
        let attrs = MessageAttributes::WARNING
            | MessageAttributes::FG_YELLOW
            | MessageAttributes::FG_UNDERLINE
            | MessageAttributes::BG_BLUE;

        assert_eq!(attrs.kind(), MessageKind::Warning);
        assert_eq!(attrs.foreground(), Some(Color::Yellow));
        assert_eq!(attrs.background(), Some(Color::Blue));
        assert!(attrs.is_underlined());
        assert!(!attrs.is_bold());
    }

    #[test]
    fn palette_constructors_match_constants() {
        assert_eq!(Color::Cyan.foreground(), MessageAttributes::FG_CYAN);
        assert_eq!(Color::Yellow.background(), MessageAttributes::BG_ORANGE);
        assert_eq!(Color::White.background(), MessageAttributes::BG_GREY);
        assert_eq!(Color::Black.foreground().foreground(), Some(Color::Black));
    }

    #[test]
    fn plain_message_has_no_style() {
        let attrs = MessageAttributes::ORCH;
        assert_eq!(attrs.foreground(), None);
        assert_eq!(attrs.background(), None);
        assert!(!attrs.is_styled());
        assert_eq!(MessageKind::Orchestra.attributes(), attrs);
    }
}
