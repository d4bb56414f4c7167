//! The orchestra subset understood by [`ScriptedEngine`](crate::ScriptedEngine).
//!
//! Line based: header assignments (`sr = 48000`), `instr N ... endin` blocks whose
//! statements are assignments or opcode calls, channel declarations (`chn_k "name", 3`)
//! and a top-level `return` for code evaluation. Comments start with `;` or `//`.

use csound_sys as sys;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct SyntaxError {
    pub line: i32,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: i32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign {
        target: String,
        expr: String,
        line: i32,
    },
    Opcode {
        outputs: Vec<String>,
        name: String,
        args: Vec<String>,
        line: i32,
    },
    Instrument(Instrument),
    Return {
        expr: String,
        line: i32,
    },
}

impl Statement {
    pub fn line(&self) -> i32 {
        match self {
            Statement::Assign { line, .. }
            | Statement::Opcode { line, .. }
            | Statement::Return { line, .. } => *line,
            Statement::Instrument(instrument) => instrument.line,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub numbers: Vec<i32>,
    pub line: i32,
    pub body: Vec<Statement>,
}

/// A variable of a running instrument, as seen by the debugger.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub type_name: String,
    pub value: VariableData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VariableData {
    Number(f64),
    Text(String),
}

impl Instrument {
    /// Values of the instrument's variables for one event, computed in statement order.
    pub fn variables(&self, pfields: &[f64]) -> Vec<Variable> {
        let mut variables: Vec<Variable> = Vec::new();
        for statement in &self.body {
            match statement {
                Statement::Assign { target, expr, .. } => {
                    let type_name = rate_of(target);
                    let value = if type_name == "S" {
                        VariableData::Text(unquote(expr).unwrap_or_else(|| expr.clone()))
                    } else {
                        let lookup = |name: &str| lookup_value(name, pfields, &variables);
                        VariableData::Number(evaluate(expr, &lookup).unwrap_or(0.0))
                    };
                    variables.retain(|variable| variable.name != *target);
                    variables.push(Variable {
                        name: target.clone(),
                        type_name,
                        value,
                    });
                }
                Statement::Opcode { outputs, .. } => {
                    for output in outputs {
                        if variables.iter().any(|variable| variable.name == *output) {
                            continue;
                        }
                        let type_name = rate_of(output);
                        let value = if type_name == "S" {
                            VariableData::Text(String::new())
                        } else {
                            VariableData::Number(0.0)
                        };
                        variables.push(Variable {
                            name: output.clone(),
                            type_name,
                            value,
                        });
                    }
                }
                Statement::Instrument(_) | Statement::Return { .. } => {}
            }
        }
        variables
    }

    /// Text printed by `prints` statements when the instrument starts.
    pub fn init_messages(&self) -> Vec<String> {
        self.body
            .iter()
            .filter_map(|statement| match statement {
                Statement::Opcode { name, args, .. } if name == "prints" => {
                    args.first().and_then(|arg| unquote(arg))
                }
                _ => None,
            })
            .collect()
    }

    /// Name and line of the first opcode call, reported as the current opcode at a breakpoint.
    pub fn first_opcode(&self) -> Option<(&str, i32)> {
        self.body.iter().find_map(|statement| match statement {
            Statement::Opcode { name, line, .. } => Some((name.as_str(), *line)),
            _ => None,
        })
    }
}

/// A channel declared with `chn_k`, `chn_a` or `chn_S`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDecl {
    pub name: String,
    pub channel_type: i32,
    pub line: i32,
}

pub const HEADER_VARIABLES: [&str; 6] = ["sr", "kr", "ksmps", "nchnls", "nchnls_i", "0dbfs"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Orchestra {
    pub statements: Vec<Statement>,
}

impl Orchestra {
    pub fn parse(text: &str) -> Result<Self, SyntaxError> {
        let mut statements = Vec::new();
        let mut current: Option<Instrument> = None;

        for (index, raw) in text.lines().enumerate() {
            let line = index as i32 + 1;
            let code = strip_comment(raw, line)?;
            if code.is_empty() {
                continue;
            }
            let (head, rest) = split_word(code);
            match head {
                "instr" => {
                    if current.is_some() {
                        return Err(SyntaxError::new(line, "instr inside instr"));
                    }
                    let numbers = split_args(rest)
                        .iter()
                        .map(|number| {
                            number
                                .parse::<i32>()
                                .map_err(|_| {
                                    let message = format!("invalid instrument number `{number}`");
                                    SyntaxError::new(line, message)
                                })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    if numbers.is_empty() {
                        return Err(SyntaxError::new(line, "instr without a number"));
                    }
                    current = Some(Instrument {
                        numbers,
                        line,
                        body: Vec::new(),
                    });
                }
                "endin" => {
                    let instrument = current
                        .take()
                        .ok_or_else(|| SyntaxError::new(line, "endin without instr"))?;
                    statements.push(Statement::Instrument(instrument));
                }
                _ => {
                    let statement = parse_statement(code, line)?;
                    match current.as_mut() {
                        Some(instrument) => instrument.body.push(statement),
                        None => statements.push(statement),
                    }
                }
            }
        }

        if let Some(instrument) = current {
            return Err(SyntaxError::new(instrument.line, "missing endin"));
        }
        Ok(Self { statements })
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Top-level assignments to header variables, in order.
    pub fn header(&self) -> impl Iterator<Item = (&str, &str)> {
        self.statements.iter().filter_map(|statement| match statement {
            Statement::Assign { target, expr, .. }
                if HEADER_VARIABLES.contains(&target.as_str()) =>
            {
                Some((target.as_str(), expr.as_str()))
            }
            _ => None,
        })
    }

    pub fn instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.statements.iter().filter_map(|statement| match statement {
            Statement::Instrument(instrument) => Some(instrument),
            _ => None,
        })
    }

    pub fn channels(&self) -> Vec<ChannelDecl> {
        let mut channels = Vec::new();
        collect_channels(&self.statements, &mut channels);
        channels
    }

    /// Expression of the last top-level `return`.
    pub fn result(&self) -> Option<&str> {
        self.statements.iter().rev().find_map(|statement| match statement {
            Statement::Return { expr, .. } => Some(expr.as_str()),
            _ => None,
        })
    }
}

fn collect_channels(statements: &[Statement], channels: &mut Vec<ChannelDecl>) {
    for statement in statements {
        match statement {
            Statement::Opcode { name, args, line, .. } => {
                let data_type = match name.as_str() {
                    "chn_k" => sys::CSOUND_CONTROL_CHANNEL,
                    "chn_a" => sys::CSOUND_AUDIO_CHANNEL,
                    "chn_S" => sys::CSOUND_STRING_CHANNEL,
                    _ => continue,
                };
                let Some(channel) = args.first().and_then(|arg| unquote(arg)) else {
                    continue;
                };
                let mode = args.get(1).and_then(|mode| mode.parse::<i32>().ok()).unwrap_or(3);
                let mut channel_type = data_type;
                if mode & 1 != 0 {
                    channel_type |= sys::CSOUND_INPUT_CHANNEL;
                }
                if mode & 2 != 0 {
                    channel_type |= sys::CSOUND_OUTPUT_CHANNEL;
                }
                channels.push(ChannelDecl {
                    name: channel,
                    channel_type,
                    line: *line,
                });
            }
            Statement::Instrument(instrument) => collect_channels(&instrument.body, channels),
            _ => {}
        }
    }
}

fn parse_statement(code: &str, line: i32) -> Result<Statement, SyntaxError> {
    let (head, rest) = split_word(code);
    if head == "return" {
        return Ok(Statement::Return {
            expr: rest.to_string(),
            line,
        });
    }

    if let Some((target, expr)) = split_assignment(code) {
        if !is_identifier(target) && target != "0dbfs" {
            return Err(SyntaxError::new(line, format!("cannot assign to `{target}`")));
        }
        if expr.is_empty() {
            return Err(SyntaxError::new(line, format!("missing value for `{target}`")));
        }
        return Ok(Statement::Assign {
            target: target.to_string(),
            expr: expr.to_string(),
            line,
        });
    }

    // `a1, a2 pan2 asig, 0.5` or `kenv line 0, 1, 1` or `out a1`
    let mut outputs = Vec::new();
    let mut rest = code;
    loop {
        let (word, after) = split_word(rest);
        if let Some(name) = word.strip_suffix(',') {
            outputs.push(name.to_string());
            rest = after;
            continue;
        }
        let (next, _) = split_word(after);
        if !outputs.is_empty() || (is_variable(word) && is_identifier(next)) {
            outputs.push(word.to_string());
            rest = after;
        }
        break;
    }
    let (name, args) = split_word(rest);
    if !is_identifier(name) {
        return Err(SyntaxError::new(line, format!("unexpected `{name}`")));
    }
    if let Some(output) = outputs.iter().find(|output| !is_identifier(output)) {
        return Err(SyntaxError::new(line, format!("invalid output `{output}`")));
    }
    Ok(Statement::Opcode {
        outputs,
        name: name.to_string(),
        args: split_args(args),
        line,
    })
}

/// Removes the comment and surrounding whitespace from one line.
fn strip_comment(line: &str, number: i32) -> Result<&str, SyntaxError> {
    let bytes = line.as_bytes();
    let mut quoted = false;
    let mut end = bytes.len();
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'\\' if quoted => index += 1,
            b'"' => quoted = !quoted,
            b';' if !quoted => {
                end = index;
                break;
            }
            b'/' if !quoted && bytes.get(index + 1) == Some(&b'/') => {
                end = index;
                break;
            }
            _ => {}
        }
        index += 1;
    }
    if quoted {
        return Err(SyntaxError::new(number, "unterminated string"));
    }
    Ok(line[..end].trim())
}

fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(index) => (&text[..index], text[index..].trim_start()),
        None => (text, ""),
    }
}

/// `target = expr`, where `=` is not part of `==`, `<=`, `>=` or `!=` and not quoted.
fn split_assignment(code: &str) -> Option<(&str, &str)> {
    let bytes = code.as_bytes();
    let mut quoted = false;
    for (index, byte) in bytes.iter().enumerate() {
        match byte {
            b'"' => quoted = !quoted,
            b'=' if !quoted => {
                let before = index.checked_sub(1).map(|i| bytes[i]);
                let after = bytes.get(index + 1).copied();
                if matches!(before, Some(b'=' | b'<' | b'>' | b'!')) || after == Some(b'=') {
                    return None;
                }
                return Some((code[..index].trim(), code[index + 1..].trim()));
            }
            _ => {}
        }
    }
    None
}

/// Splits an argument list on commas outside quotes.
pub fn split_args(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in text.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => args.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    args.push(current.trim().to_string());
    args
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn is_variable(text: &str) -> bool {
    let name = text.strip_prefix('g').unwrap_or(text);
    is_identifier(text)
        && name.len() > 1
        && matches!(name.as_bytes()[0], b'a' | b'k' | b'i' | b'S' | b'f' | b'w')
}

fn rate_of(name: &str) -> String {
    let name = name.strip_prefix('g').filter(|rest| !rest.is_empty()).unwrap_or(name);
    match name.chars().next() {
        Some(c @ ('a' | 'k' | 'i' | 'S' | 'f' | 'w')) => c.to_string(),
        _ => "i".to_string(),
    }
}

/// The contents of a quoted string literal, with `\n`, `\t`, `\"` and `\\` resolved.
pub fn unquote(text: &str) -> Option<String> {
    let inner = text.trim().strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    Some(out)
}

fn lookup_value(name: &str, pfields: &[f64], variables: &[Variable]) -> Option<f64> {
    if let Some(index) = name.strip_prefix('p').and_then(|digits| digits.parse::<usize>().ok()) {
        return Some(index.checked_sub(1).and_then(|i| pfields.get(i)).copied().unwrap_or(0.0));
    }
    let variable = variables.iter().rev().find(|variable| variable.name == name)?;
    match variable.value {
        VariableData::Number(value) => Some(value),
        VariableData::Text(_) => None,
    }
}

/// Evaluates an arithmetic expression over numbers and named values.
///
/// Supports `+ - * /`, unary minus and parentheses. `None` if the expression is malformed
/// or names something `lookup` does not know.
pub fn evaluate(expr: &str, lookup: &dyn Fn(&str) -> Option<f64>) -> Option<f64> {
    let mut parser = ExprParser {
        text: expr.as_bytes(),
        pos: 0,
        lookup,
    };
    let value = parser.sum()?;
    parser.skip_space();
    (parser.pos == parser.text.len()).then_some(value)
}

struct ExprParser<'a> {
    text: &'a [u8],
    pos: usize,
    lookup: &'a dyn Fn(&str) -> Option<f64>,
}

impl ExprParser<'_> {
    fn skip_space(&mut self) {
        while self.text.get(self.pos).is_some_and(u8::is_ascii_whitespace) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_space();
        self.text.get(self.pos).copied()
    }

    fn sum(&mut self) -> Option<f64> {
        let mut value = self.product()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.product()?;
            value = if op == b'+' { value + rhs } else { value - rhs };
        }
        Some(value)
    }

    fn product(&mut self) -> Option<f64> {
        let mut value = self.factor()?;
        while let Some(op @ (b'*' | b'/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            value = if op == b'*' { value * rhs } else { value / rhs };
        }
        Some(value)
    }

    fn factor(&mut self) -> Option<f64> {
        match self.peek()? {
            b'-' => {
                self.pos += 1;
                Some(-self.factor()?)
            }
            b'(' => {
                self.pos += 1;
                let value = self.sum()?;
                (self.peek()? == b')').then(|| self.pos += 1)?;
                Some(value)
            }
            c if c.is_ascii_digit() || c == b'.' => {
                let start = self.pos;
                while self
                    .text
                    .get(self.pos)
                    .is_some_and(|c| c.is_ascii_digit() || *c == b'.' || *c == b'e')
                {
                    self.pos += 1;
                }
                std::str::from_utf8(&self.text[start..self.pos]).ok()?.parse().ok()
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = self.pos;
                while self
                    .text
                    .get(self.pos)
                    .is_some_and(|c| c.is_ascii_alphanumeric() || *c == b'_')
                {
                    self.pos += 1;
                }
                let name = std::str::from_utf8(&self.text[start..self.pos]).ok()?;
                (self.lookup)(name)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORC: &str = r#"
sr = 48000
ksmps = 32
nchnls = 2
0dbfs = 1

chn_k "cutoff", 1

instr 1, 2
  kfreq = p4 * 2      ; doubled
  Slabel = "lead"
  asig oscili 0.5, kfreq
  prints "started\n"
  outs asig, asig
endin
"#;

    #[test]
    fn parses_header_instruments_and_channels() {
        let orc = Orchestra::parse(ORC).unwrap();
        let header: Vec<_> = orc.header().collect();
        assert_eq!(header, [("sr", "48000"), ("ksmps", "32"), ("nchnls", "2"), ("0dbfs", "1")]);

        let instrument = orc.instruments().next().unwrap();
        assert_eq!(instrument.numbers, [1, 2]);
        assert_eq!(instrument.line, 9);
        assert_eq!(instrument.body.len(), 5);
        assert_eq!(instrument.first_opcode(), Some(("oscili", 12)));
        assert_eq!(instrument.init_messages(), ["started\n"]);

        let channels = orc.channels();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "cutoff");
        assert_eq!(
            channels[0].channel_type,
            sys::CSOUND_CONTROL_CHANNEL | sys::CSOUND_INPUT_CHANNEL
        );
    }

    #[test]
    fn opcode_outputs_are_recognised() {
        let orc = Orchestra::parse("instr 1\na1, a2 pan2 asig, 0.5\nout a1\nendin\n").unwrap();
        let body = &orc.instruments().next().unwrap().body;
        assert!(matches!(
            &body[0],
            Statement::Opcode { outputs, name, .. } if outputs == &["a1", "a2"] && name == "pan2"
        ));
        assert!(matches!(
            &body[1],
            Statement::Opcode { outputs, name, args, .. }
                if outputs.is_empty() && name == "out" && args == &["a1"]
        ));
    }

    #[test]
    fn variables_follow_pfields() {
        let orc = Orchestra::parse(ORC).unwrap();
        let variables = orc.instruments().next().unwrap().variables(&[1.0, 0.0, 1.0, 220.0]);
        let names: Vec<_> = variables.iter().map(|variable| variable.name.as_str()).collect();
        assert_eq!(names, ["kfreq", "Slabel", "asig"]);
        assert_eq!(variables[0].value, VariableData::Number(440.0));
        assert_eq!(variables[0].type_name, "k");
        assert_eq!(variables[1].value, VariableData::Text("lead".into()));
        assert_eq!(variables[2].type_name, "a");
    }

    #[test]
    fn reports_structural_errors_with_lines() {
        assert_eq!(Orchestra::parse("endin").unwrap_err().line, 1);
        assert_eq!(Orchestra::parse("instr 1\ninstr 2\n").unwrap_err().line, 2);
        assert_eq!(Orchestra::parse("\n\ninstr 1\n").unwrap_err().message, "missing endin");
        assert!(Orchestra::parse("instr x\nendin").is_err());
        assert!(Orchestra::parse("prints \"open").is_err());
        assert!(Orchestra::parse("1 + 2").is_err());
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let orc = Orchestra::parse("; nothing\n\n// still nothing\n").unwrap();
        assert!(orc.is_empty());
    }

    #[test]
    fn evaluates_arithmetic() {
        let none = |_: &str| None;
        assert_eq!(evaluate("1 + 2 * 3", &none), Some(7.0));
        assert_eq!(evaluate("(1 + 2) * 3", &none), Some(9.0));
        assert_eq!(evaluate("-4 / 2", &none), Some(-2.0));
        assert_eq!(evaluate("1 +", &none), None);
        assert_eq!(evaluate("x", &none), None);
        assert_eq!(evaluate("x * 2", &|name| (name == "x").then_some(21.0)), Some(42.0));
    }

    #[test]
    fn return_value_of_code() {
        let orc = Orchestra::parse("instr 9\nendin\nreturn 2 + 3\n").unwrap();
        assert_eq!(orc.result(), Some("2 + 3"));
    }
}
