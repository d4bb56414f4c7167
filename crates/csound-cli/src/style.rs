//! Terminal rendering of engine message attributes.
//!
//! White text renders as bright black (grey); the engine's orange and grey backgrounds
//! render as yellow and white. Color output follows `colored`'s terminal and
//! `NO_COLOR`/`CLICOLOR_FORCE` detection.

use colored::{Color as Ansi, ColoredString, Colorize};
use csound_api::{Color, MessageAttributes};

pub fn render(attributes: MessageAttributes, text: &str) -> String {
    let mut styled: ColoredString = text.normal();
    if let Some(color) = attributes.foreground() {
        styled = styled.color(match color {
            Color::White => Ansi::BrightBlack,
            other => ansi(other),
        });
    }
    if attributes.is_bold() {
        styled = styled.bold();
    }
    if attributes.is_underlined() {
        styled = styled.underline();
    }
    if let Some(color) = attributes.background() {
        styled = styled.on_color(ansi(color));
    }
    styled.to_string()
}

fn ansi(color: Color) -> Ansi {
    match color {
        Color::Black => Ansi::Black,
        Color::Red => Ansi::Red,
        Color::Green => Ansi::Green,
        Color::Yellow => Ansi::Yellow,
        Color::Blue => Ansi::Blue,
        Color::Magenta => Ansi::Magenta,
        Color::Cyan => Ansi::Cyan,
        Color::White => Ansi::White,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    /// Parameters of the leading SGR sequence.
    fn codes(rendered: &str) -> BTreeSet<&str> {
        rendered
            .strip_prefix("\x1b[")
            .and_then(|rest| rest.split_once('m'))
            .map_or_else(BTreeSet::new, |(params, _)| params.split(';').collect())
    }

    fn styled(attributes: MessageAttributes, text: &str) -> String {
        colored::control::set_override(true);
        render(attributes, text)
    }

    #[test]
    fn plain_messages_pass_through() {
        assert_eq!(styled(MessageAttributes::WARNING, "careful"), "careful");
    }

    #[test]
    fn every_layer_is_applied() {
        let attributes = MessageAttributes::FG_YELLOW
            | MessageAttributes::FG_UNDERLINE
            | MessageAttributes::BG_BLUE;
        let rendered = styled(attributes, "Hail!");
        assert_eq!(codes(&rendered), BTreeSet::from(["33", "4", "44"]));
        assert!(rendered.contains("mHail!\x1b[0m"));
    }

    #[test]
    fn engine_palette_quirks() {
        assert_eq!(codes(&styled(MessageAttributes::FG_WHITE, "x")), BTreeSet::from(["90"]));
        assert_eq!(codes(&styled(MessageAttributes::BG_ORANGE, "x")), BTreeSet::from(["43"]));
        assert_eq!(codes(&styled(MessageAttributes::BG_GREY, "x")), BTreeSet::from(["47"]));
        assert_eq!(
            codes(&styled(MessageAttributes::FG_BLACK | MessageAttributes::FG_BOLD, "x")),
            BTreeSet::from(["1", "30"])
        );
    }
}
