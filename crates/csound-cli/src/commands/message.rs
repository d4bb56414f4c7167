use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use csound_api::{Color, Engine, Host, InstanceId, MessageAttributes, MessageKind};

use crate::error::CliError;
use crate::style;

/// Attribute choices for the `message` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageStyle {
    pub kind: Option<MessageKind>,
    pub foreground: Option<Color>,
    pub background: Option<Color>,
    pub bold: bool,
    pub underline: bool,
}

impl MessageStyle {
    pub fn attributes(&self) -> MessageAttributes {
        let mut attributes = self.kind.map_or(MessageAttributes::DEFAULT, MessageKind::attributes);
        if let Some(color) = self.foreground {
            attributes |= color.foreground();
        }
        if let Some(color) = self.background {
            attributes |= color.background();
        }
        if self.bold {
            attributes |= MessageAttributes::FG_BOLD;
        }
        if self.underline {
            attributes |= MessageAttributes::FG_UNDERLINE;
        }
        attributes
    }
}

/// Sends `text` through the engine's attributed message call and prints what comes back,
/// styled from the attribute bits the callback receives.
pub fn handle_message<E: Engine>(
    host: &mut Host<E>,
    id: InstanceId,
    text: &str,
    message_style: &MessageStyle,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    host.set_message_callback(id, move |_, _, attributes, text| {
        sink.borrow_mut().push((attributes, text.to_string()))
    })?;

    host.message_s(id, message_style.attributes(), text)?;
    host.run_until_idle();
    host.clear_message_callback(id)?;

    let received = received.take();
    for (attributes, text) in &received {
        let line = style::render(*attributes, text.trim_end_matches('\n'));
        writeln!(out, "{line}").map_err(CliError::Output)?;
    }
    Ok(())
}
