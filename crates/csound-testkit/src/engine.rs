use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::ffi::{CStr, CString};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use std::{fs, ptr, thread};

use csound_api::marshal::{hints_from_native, ChannelHints};
use csound_api::{file_type, CallbackHub, CallbackKind, Engine, MessageAttributes, Status};
use csound_sys::{self as sys, controlChannelHints_t, controlChannelInfo_t, opcodeListEntry, TREE};
use libc::c_char;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::native::{
    alloc_channel_list, alloc_name_list, alloc_opcode_list, alloc_tree, c_string, free_channel_list,
    free_name_list, free_opcode_list, free_tree, raw_hints, window, with_native_report,
    BreakpointReport, ChannelRecord, InstanceSnapshot,
};
use crate::orchestra::{evaluate, Instrument, Orchestra};
use crate::score::{generate, parse_score, ScoreStatement};

pub const DEFAULT_SR: f64 = 44100.0;
pub const DEFAULT_KSMPS: u32 = 10;
pub const DEFAULT_ZERO_DBFS: f64 = 32768.0;
pub const VERSION: i32 = 6180;
pub const API_VERSION: i32 = 400;

const EPSILON: f64 = 1e-9;
const PAUSE_POLL: Duration = Duration::from_millis(1);

static INITIALIZED: AtomicBool = AtomicBool::new(false);
static DEFAULT_MESSAGES: AtomicBool = AtomicBool::new(false);
static GLOBAL_ENV: Lazy<Mutex<HashMap<String, String>>> = Lazy::new(Default::default);

/// Opcodes reported by `new_opcode_list`: name, output types, input types.
pub const OPCODES: [(&str, &str, &str); 8] = [
    ("chn_k", "", "Sio"),
    ("chnget", "k", "S"),
    ("chnset", "", "kS"),
    ("line", "k", "iii"),
    ("oscili", "a", "kkjo"),
    ("out", "", "y"),
    ("prints", "", "STN"),
    ("vco2", "a", "kkoM"),
];

pub const UTILITIES: [(&str, &str); 7] = [
    ("atsa", "Soundfile analysis for ATS opcodes"),
    ("cvanal", "Soundfile analysis for convolve"),
    ("envext", "Extract envelope of a soundfile"),
    ("hetro", "Soundfile analysis for adsyn"),
    ("lpanal", "Linear predictor analysis for lp opcodes"),
    ("pvanal", "Soundfile analysis for pvoc opcodes"),
    ("sndinfo", "Prints information about sound files"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoteState {
    Pending,
    Active,
    Done,
}

#[derive(Debug, Clone)]
struct Note {
    /// p1..pN with p2 made absolute.
    pfields: Vec<f64>,
    state: NoteState,
    kcounter: u64,
}

impl Note {
    fn start(&self) -> f64 {
        self.pfields[1]
    }

    /// A negative duration holds the note until the performance ends.
    fn end(&self) -> f64 {
        let duration = self.pfields[2];
        if duration < 0.0 {
            f64::INFINITY
        } else {
            self.start() + duration
        }
    }
}

struct Table {
    data: Vec<f64>,
    shown: bool,
}

struct Channel {
    channel_type: i32,
    value: f64,
    hints: ChannelHints,
    /// C copy of `hints.attributes`, lent out by `control_channel_hints`.
    attributes: Option<CString>,
}

impl Channel {
    fn new(channel_type: i32) -> Self {
        Self {
            channel_type,
            value: 0.0,
            hints: ChannelHints::default(),
            attributes: None,
        }
    }
}

enum Allocation {
    Tree(Orchestra),
    Channels(usize),
    Opcodes(usize),
    Utilities,
}

struct MessageBuffer {
    echo: bool,
    entries: VecDeque<(i32, String)>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Rates {
    sr: Option<f64>,
    kr: Option<f64>,
    ksmps: Option<u32>,
}

struct State {
    header: Rates,
    overrides: Rates,
    sr: f64,
    kr: f64,
    ksmps: u32,
    nchnls: u32,
    nchnls_input: u32,
    zero_dbfs: f64,
    buffer_frames: u32,

    debug: bool,
    displays: bool,
    graphable: bool,
    output: Option<String>,
    output_type: Option<String>,
    output_format: Option<String>,
    message_level: i32,
    messages: Option<MessageBuffer>,

    compiled: bool,
    started: bool,
    finished: bool,
    stop_requested: bool,
    instruments: BTreeMap<i32, Instrument>,
    notes: Vec<Note>,
    hold_until: f64,
    end_at: Option<f64>,
    samples: i64,
    score_pending: bool,
    score_offset: f64,
    tables: BTreeMap<i32, Table>,
    channels: BTreeMap<String, Channel>,

    installed: HashSet<CallbackKind>,
    env: HashMap<String, String>,
    debugger: bool,
    breakpoints: Vec<(f64, i32)>,
    paused: bool,
    allocations: HashMap<usize, Allocation>,
}

impl State {
    fn new(env: HashMap<String, String>) -> Self {
        Self {
            header: Rates::default(),
            overrides: Rates::default(),
            sr: DEFAULT_SR,
            kr: DEFAULT_SR / DEFAULT_KSMPS as f64,
            ksmps: DEFAULT_KSMPS,
            nchnls: 1,
            nchnls_input: 1,
            zero_dbfs: DEFAULT_ZERO_DBFS,
            buffer_frames: 256,
            debug: false,
            displays: true,
            graphable: false,
            output: None,
            output_type: None,
            output_format: None,
            message_level: 135,
            messages: None,
            compiled: false,
            started: false,
            finished: false,
            stop_requested: false,
            instruments: BTreeMap::new(),
            notes: Vec::new(),
            hold_until: 0.0,
            end_at: None,
            samples: 0,
            score_pending: true,
            score_offset: 0.0,
            tables: BTreeMap::new(),
            channels: BTreeMap::new(),
            installed: HashSet::new(),
            env,
            debugger: false,
            breakpoints: Vec::new(),
            paused: false,
            allocations: HashMap::new(),
        }
    }

    fn time(&self) -> f64 {
        self.samples as f64 / self.sr
    }

    /// Score time new events are relative to.
    fn clock(&self) -> f64 {
        if self.started {
            self.time()
        } else {
            0.0
        }
    }

    fn horizon(&self) -> f64 {
        self.notes.iter().map(Note::end).fold(self.hold_until, f64::max)
    }

    fn end_time(&self) -> f64 {
        self.end_at.unwrap_or_else(|| self.horizon())
    }

    fn recompute_rates(&mut self) {
        let sr = self.overrides.sr.or(self.header.sr).unwrap_or(DEFAULT_SR);
        let from_kr = |kr: f64| (kr > 0.0).then(|| (sr / kr).round().max(1.0) as u32);
        let ksmps = self
            .overrides
            .ksmps
            .or_else(|| self.overrides.kr.and_then(from_kr))
            .or(self.header.ksmps)
            .or_else(|| self.header.kr.and_then(from_kr))
            .unwrap_or(DEFAULT_KSMPS)
            .max(1);
        self.sr = sr;
        self.ksmps = ksmps;
        self.kr = sr / ksmps as f64;
    }

    fn jump_to_offset(&mut self) {
        let target = (self.score_offset * self.sr) as i64;
        if target <= self.samples {
            return;
        }
        self.samples = target;
        let now = self.time();
        for note in &mut self.notes {
            if note.end() <= now + EPSILON {
                note.state = NoteState::Done;
            }
        }
    }
}

/// A deterministic, in-process [`Engine`].
///
/// It keeps the engine's observable contract (status codes, ownership of returned
/// structures, callback timing) for a small orchestra and score language, so the binding
/// can be exercised without `libcsound64`. Control periods take no real time unless the
/// output is a `dac` device.
pub struct ScriptedEngine {
    hub: Arc<CallbackHub>,
    state: Mutex<State>,
    alive: Arc<()>,
    /// Whether the default message callback was installed when this instance was created.
    default_messages: bool,
}

struct Step {
    result: i32,
    breakpoint: Option<BreakpointReport>,
    pause: Option<Duration>,
}

impl Step {
    fn done(result: i32) -> Self {
        Self {
            result,
            breakpoint: None,
            pause: None,
        }
    }
}

impl ScriptedEngine {
    pub fn hub(&self) -> &Arc<CallbackHub> {
        &self.hub
    }

    /// Goes dead when the engine is destroyed.
    pub fn liveness(&self) -> Weak<()> {
        Arc::downgrade(&self.alive)
    }

    /// Trees and lists handed out and not released yet.
    pub fn live_allocations(&self) -> usize {
        self.state.lock().allocations.len()
    }

    pub fn is_callback_installed(&self, kind: CallbackKind) -> bool {
        self.state.lock().installed.contains(&kind)
    }

    /// Whether the debugger holds the performance at a breakpoint.
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn emit(&self, state: &mut State, attributes: i32, text: &str) {
        match state.messages.as_mut() {
            Some(buffer) => {
                if buffer.echo {
                    print!("{text}");
                }
                buffer.entries.push_back((attributes, text.to_string()));
            }
            None if state.installed.contains(&CallbackKind::Message) => {
                self.hub.message(attributes, &c_string(text));
            }
            None if self.default_messages => {
                csound_api::deliver_default_message(attributes, &c_string(text))
            }
            None => log::debug!(target: "csound", "{}", text.trim_end()),
        }
    }

    fn error(&self, state: &mut State, text: &str) {
        self.emit(state, sys::CSOUNDMSG_ERROR, text);
    }

    fn warning(&self, state: &mut State, text: &str) {
        self.emit(state, sys::CSOUNDMSG_WARNING, text);
    }

    fn parse(&self, state: &mut State, text: &str) -> Option<Orchestra> {
        match Orchestra::parse(text) {
            Ok(orchestra) => Some(orchestra),
            Err(err) => {
                self.error(state, &format!("error: syntax error, {err}\n"));
                None
            }
        }
    }

    fn install(&self, state: &mut State, orchestra: &Orchestra) -> Status {
        let header: Vec<(&str, &str)> = orchestra.header().collect();
        if state.started && !header.is_empty() {
            self.warning(state, "WARNING: header statements ignored after start\n");
        } else {
            for (name, expr) in header {
                let Some(value) = evaluate(expr, &|_| None) else {
                    self.error(state, &format!("error: `{name}` needs a constant value\n"));
                    return Status::ERROR;
                };
                match name {
                    "sr" => state.header.sr = Some(value),
                    "kr" => state.header.kr = Some(value),
                    "ksmps" => state.header.ksmps = Some(value.max(1.0) as u32),
                    "nchnls" => state.nchnls = value.max(1.0) as u32,
                    "nchnls_i" => state.nchnls_input = value.max(1.0) as u32,
                    "0dbfs" => state.zero_dbfs = value,
                    _ => {}
                }
            }
            state.recompute_rates();
        }

        for instrument in orchestra.instruments() {
            for number in &instrument.numbers {
                state.instruments.insert(*number, instrument.clone());
            }
        }
        for channel in orchestra.channels() {
            state
                .channels
                .entry(channel.name)
                .or_insert_with(|| Channel::new(channel.channel_type));
        }
        state.compiled = true;
        Status::SUCCESS
    }

    fn schedule(&self, state: &mut State, text: &str) -> Status {
        let statements = match parse_score(text) {
            Ok(statements) => statements,
            Err(err) => {
                self.error(state, &format!("error: score {err}\n"));
                return Status::ERROR;
            }
        };
        let clock = state.clock();
        for statement in statements {
            match statement {
                ScoreStatement::Note(mut pfields) => {
                    pfields[1] += clock;
                    state.notes.push(Note {
                        pfields,
                        state: NoteState::Pending,
                        kcounter: 0,
                    });
                }
                ScoreStatement::Table { number: 0, time, .. } => {
                    state.hold_until = state.hold_until.max(clock + time);
                }
                ScoreStatement::Table {
                    number,
                    size,
                    gen,
                    args,
                    ..
                } => self.create_table(state, number, size, gen, &args),
                ScoreStatement::End(at) => {
                    let end = match at {
                        Some(at) => clock + at,
                        None => state.horizon().max(clock),
                    };
                    state.end_at = Some(end);
                }
            }
        }
        Status::SUCCESS
    }

    fn create_table(&self, state: &mut State, number: i32, size: usize, gen: i32, args: &[f64]) {
        match generate(size, gen, args) {
            Some(data) => {
                state.tables.insert(number, Table { data, shown: false });
                if state.started {
                    self.show_tables(state);
                }
            }
            None => self.error(state, &format!("ftable {number}: GEN{gen} is not available\n")),
        }
    }

    fn show_tables(&self, state: &mut State) {
        if !(state.graphable && state.displays) {
            return;
        }
        let make = state.installed.contains(&CallbackKind::MakeGraph);
        let draw = state.installed.contains(&CallbackKind::DrawGraph);
        for (number, table) in state.tables.iter_mut().filter(|(_, table)| !table.shown) {
            let caption = format!("ftable {number}:");
            let name = c_string(&caption);
            let data = window(*number as usize, &caption, &mut table.data);
            unsafe {
                if make {
                    self.hub.make_graph(&data, name.as_ptr());
                }
                if draw {
                    self.hub.draw_graph(&data);
                }
            }
            table.shown = true;
        }
    }

    fn hide_tables(&self, state: &mut State) {
        let kill = state.installed.contains(&CallbackKind::KillGraph);
        for (number, table) in state.tables.iter_mut().filter(|(_, table)| table.shown) {
            if kill {
                let data = window(*number as usize, &format!("ftable {number}:"), &mut table.data);
                unsafe { self.hub.kill_graph(&data) };
            }
            table.shown = false;
        }
    }

    fn open_output(&self, state: &mut State) {
        let Some(path) = state.output.clone() else {
            return;
        };
        if is_device(&path) {
            return;
        }
        if let Err(err) = fs::File::create(&path) {
            self.error(state, &format!("error: cannot open output `{path}`: {err}\n"));
            return;
        }
        if state.installed.contains(&CallbackKind::FileOpen) {
            let kind = output_file_type(state.output_type.as_deref(), &path);
            let path = c_string(&path);
            unsafe { self.hub.file_open(path.as_ptr(), kind, 1, 0) };
        }
    }

    fn apply_option(&self, state: &mut State, option: &str) -> Status {
        if let Some(long) = option.strip_prefix("--") {
            let (key, value) = long.split_once('=').unwrap_or((long, ""));
            match key {
                "output" if !value.is_empty() => state.output = Some(value.to_string()),
                "sample-rate" => match value.parse() {
                    Ok(sr) => state.overrides.sr = Some(sr),
                    Err(_) => return Status::ERROR,
                },
                "control-rate" => match value.parse() {
                    Ok(kr) => state.overrides.kr = Some(kr),
                    Err(_) => return Status::ERROR,
                },
                "ksmps" => match value.parse() {
                    Ok(ksmps) => state.overrides.ksmps = Some(ksmps),
                    Err(_) => return Status::ERROR,
                },
                "nodisplays" => state.displays = false,
                "displays" => state.displays = true,
                "messagelevel" => match value.parse() {
                    Ok(level) => state.message_level = level,
                    Err(_) => return Status::ERROR,
                },
                _ => match key.strip_prefix("env:") {
                    Some(name) if !name.is_empty() => {
                        state.env.insert(name.to_string(), value.to_string());
                    }
                    _ => log::debug!("Scripted engine ignores option `{}`.", option),
                },
            }
            state.recompute_rates();
            return Status::SUCCESS;
        }

        let Some(flag) = option.strip_prefix('-') else {
            return Status::ERROR;
        };
        let mut chars = flag.chars();
        let Some(letter) = chars.next() else {
            return Status::ERROR;
        };
        let value = chars.as_str();
        let number = |value: &str| value.parse::<f64>().ok();
        match letter {
            'o' if !value.is_empty() => state.output = Some(value.to_string()),
            'o' => return Status::ERROR,
            'n' => state.output = None,
            'd' => state.displays = false,
            'W' => state.output_type = Some("wav".to_string()),
            'A' => state.output_type = Some("aiff".to_string()),
            'm' => match value.parse() {
                Ok(level) => state.message_level = level,
                Err(_) => return Status::ERROR,
            },
            'r' => match number(value) {
                Some(sr) => state.overrides.sr = Some(sr),
                None => return Status::ERROR,
            },
            'k' => match number(value) {
                Some(kr) => state.overrides.kr = Some(kr),
                None => return Status::ERROR,
            },
            'b' => match value.parse() {
                Ok(frames) => state.buffer_frames = frames,
                Err(_) => return Status::ERROR,
            },
            _ => log::debug!("Scripted engine ignores option `{}`.", option),
        }
        state.recompute_rates();
        Status::SUCCESS
    }

    fn step(&self, state: &mut State) -> Step {
        if !state.started {
            self.error(
                state,
                "Csound not ready for performance: csoundStart() has not been called\n",
            );
            return Step::done(Status::ERROR.code());
        }
        if state.stop_requested || state.finished {
            state.finished = true;
            return Step::done(1);
        }
        if state.paused {
            return Step {
                result: 0,
                breakpoint: None,
                pause: Some(PAUSE_POLL),
            };
        }

        let now = state.time();
        if state.score_pending {
            if now + EPSILON >= state.end_time() {
                state.finished = true;
                return Step::done(1);
            }

            for note in &mut state.notes {
                if note.state == NoteState::Active && note.end() <= now + EPSILON {
                    note.state = NoteState::Done;
                }
            }

            let mut printed = Vec::new();
            let mut undefined = Vec::new();
            for note in &mut state.notes {
                if note.state != NoteState::Pending || note.start() > now + EPSILON {
                    continue;
                }
                match state.instruments.get(&(note.pfields[0] as i32)) {
                    Some(instrument) => {
                        note.state = NoteState::Active;
                        printed.extend(instrument.init_messages());
                    }
                    None => {
                        note.state = NoteState::Done;
                        undefined.push(note.pfields[0]);
                    }
                }
            }
            for number in undefined {
                self.error(state, &format!("ERROR: instr {number} not defined\n"));
            }
            for text in printed {
                self.emit(state, sys::CSOUNDMSG_ORCH, &text);
            }
        }

        let breakpoint = self.check_breakpoints(state);
        if breakpoint.is_some() {
            state.paused = true;
        }
        for note in state.notes.iter_mut().filter(|note| note.state == NoteState::Active) {
            note.kcounter += 1;
        }
        state.samples += i64::from(state.ksmps);

        let realtime = state.output.as_deref().is_some_and(|output| output.starts_with("dac"));
        Step {
            result: 0,
            breakpoint,
            pause: realtime.then(|| Duration::from_secs_f64(f64::from(state.ksmps) / state.sr)),
        }
    }

    fn check_breakpoints(&self, state: &State) -> Option<BreakpointReport> {
        if !state.debugger
            || state.breakpoints.is_empty()
            || !state.installed.contains(&CallbackKind::Breakpoint)
        {
            return None;
        }
        let snapshot = |note: &Note| InstanceSnapshot {
            p1: note.pfields[0],
            p2: note.pfields[1],
            p3: note.pfields[2],
            kcounter: note.kcounter,
            line: state
                .instruments
                .get(&(note.pfields[0] as i32))
                .map_or(0, |instrument| instrument.line),
        };
        let active: Vec<&Note> = state
            .notes
            .iter()
            .filter(|note| note.state == NoteState::Active)
            .collect();
        let hit = active.iter().find(|note| {
            state.breakpoints.iter().any(|(instrument, skip)| {
                (note.pfields[0] == *instrument || note.pfields[0].trunc() == *instrument)
                    && note.kcounter % (*skip as u64 + 1) == 0
            })
        })?;
        let instrument = state.instruments.get(&(hit.pfields[0] as i32))?;
        Some(BreakpointReport {
            instrument: snapshot(*hit),
            active: active.iter().map(|note| snapshot(*note)).collect(),
            variables: instrument.variables(&hit.pfields),
            opcode: instrument
                .first_opcode()
                .map(|(name, line)| (name.to_string(), line)),
        })
    }

    fn release(&self, key: usize) -> Option<Allocation> {
        let released = self.state.lock().allocations.remove(&key);
        if released.is_none() {
            log::warn!("Scripted engine asked to free unknown allocation {:#x}.", key);
        }
        released
    }

    fn read_file(&self, path: &str) -> Option<String> {
        match fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(err) => {
                let mut state = self.state.lock();
                self.error(&mut state, &format!("error: cannot open `{path}`: {err}\n"));
                None
            }
        }
    }
}

impl Drop for ScriptedEngine {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        log::debug!(
            "Destroying scripted instance {} ({} allocations outstanding).",
            self.hub.instance(),
            state.allocations.len()
        );
        for (key, allocation) in state.allocations.drain() {
            unsafe { free(key, allocation) };
        }
    }
}

unsafe fn free(key: usize, allocation: Allocation) {
    match allocation {
        Allocation::Tree(_) => free_tree(key as *mut TREE),
        Allocation::Channels(len) => free_channel_list(key as *mut controlChannelInfo_t, len),
        Allocation::Opcodes(len) => free_opcode_list(key as *mut opcodeListEntry, len),
        Allocation::Utilities => free_name_list(key as *mut *mut c_char),
    }
}

fn is_control(channel_type: i32) -> bool {
    channel_type & sys::CSOUND_CHANNEL_TYPE_MASK == sys::CSOUND_CONTROL_CHANNEL
}

fn is_device(output: &str) -> bool {
    output.starts_with("dac")
        || output.starts_with("adc")
        || matches!(output, "null" | "stdout" | "-")
}

fn output_file_type(requested: Option<&str>, path: &str) -> i32 {
    let extension = requested.map(str::to_ascii_lowercase).or_else(|| {
        Path::new(path)
            .extension()
            .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
    });
    match extension.as_deref() {
        Some("aif" | "aiff") => file_type::AIFF,
        Some("aifc") => file_type::AIFC,
        Some("au") => file_type::AU,
        Some("flac") => file_type::FLAC,
        Some("ogg") => file_type::OGG,
        Some("w64") => file_type::W64,
        Some("caf") => file_type::CAF,
        Some("raw") => file_type::RAW_AUDIO,
        _ => file_type::WAVE,
    }
}

/// Extracts the text between `<tag>` and `</tag>` of a unified CSD file.
fn csd_section<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(&text[start..end])
}

fn lossy(text: &CStr) -> String {
    text.to_string_lossy().into_owned()
}

impl Engine for ScriptedEngine {
    fn initialize(flags: i32) -> i32 {
        let again = INITIALIZED.swap(true, Ordering::AcqRel);
        log::debug!("Scripted engine initialised with flags {:#x}.", flags);
        i32::from(again)
    }

    fn version() -> i32 {
        VERSION
    }

    fn api_version() -> i32 {
        API_VERSION
    }

    fn size_of_myflt() -> i32 {
        std::mem::size_of::<sys::MYFLT>() as i32
    }

    fn set_global_env(name: &CStr, value: &CStr) -> Status {
        let name = lossy(name);
        if name.is_empty() {
            return Status::ERROR;
        }
        GLOBAL_ENV.lock().insert(name, lossy(value));
        Status::SUCCESS
    }

    fn create(hub: Arc<CallbackHub>) -> Option<Self> {
        let env = GLOBAL_ENV.lock().clone();
        Some(Self {
            hub,
            state: Mutex::new(State::new(env)),
            alive: Arc::new(()),
            default_messages: DEFAULT_MESSAGES.load(Ordering::Acquire),
        })
    }

    fn set_default_message_callback(enabled: bool) {
        DEFAULT_MESSAGES.store(enabled, Ordering::Release);
    }

    fn install_callback(&self, kind: CallbackKind, enabled: bool) {
        let mut state = self.state.lock();
        if enabled {
            state.installed.insert(kind);
        } else {
            state.installed.remove(&kind);
        }
    }

    fn parse_orc(&self, orchestra: &CStr) -> *mut TREE {
        let mut state = self.state.lock();
        let Some(orchestra) = self.parse(&mut state, &lossy(orchestra)) else {
            return ptr::null_mut();
        };
        if orchestra.is_empty() {
            return ptr::null_mut();
        }
        let root = alloc_tree(&orchestra);
        state.allocations.insert(root as usize, Allocation::Tree(orchestra));
        root
    }

    unsafe fn compile_tree(&self, tree: *mut TREE) -> Status {
        let mut state = self.state.lock();
        let orchestra = match state.allocations.get(&(tree as usize)) {
            Some(Allocation::Tree(orchestra)) => orchestra.clone(),
            _ => return Status::ERROR,
        };
        self.install(&mut state, &orchestra)
    }

    unsafe fn delete_tree(&self, tree: *mut TREE) {
        if let Some(allocation) = self.release(tree as usize) {
            free(tree as usize, allocation);
        }
    }

    fn compile_orc(&self, orchestra: &CStr) -> Status {
        let mut state = self.state.lock();
        match self.parse(&mut state, &lossy(orchestra)) {
            Some(orchestra) if !orchestra.is_empty() => self.install(&mut state, &orchestra),
            Some(_) => {
                self.error(&mut state, "error: empty orchestra\n");
                Status::ERROR
            }
            None => Status::ERROR,
        }
    }

    fn eval_code(&self, code: &CStr) -> f64 {
        let mut state = self.state.lock();
        let Some(orchestra) = self.parse(&mut state, &lossy(code)) else {
            return 0.0;
        };
        if !self.install(&mut state, &orchestra).is_success() {
            return 0.0;
        }
        orchestra
            .result()
            .and_then(|expr| evaluate(expr, &|_| None))
            .unwrap_or(0.0)
    }

    fn compile_args(&self, args: &[&CStr]) -> Status {
        let mut positional = Vec::new();
        let mut args = args.iter().skip(1).map(|arg| lossy(arg));
        while let Some(arg) = args.next() {
            if arg == "-o" {
                let Some(name) = args.next() else {
                    return Status::ERROR;
                };
                self.state.lock().output = Some(name);
            } else if arg.starts_with('-') {
                let status = self.set_option(&c_string(&arg));
                if !status.is_success() {
                    return status;
                }
            } else {
                positional.push(arg);
            }
        }

        match positional.as_slice() {
            [csd] => self.compile_csd(&c_string(csd)),
            [orc, sco] => {
                let (Some(orc), Some(sco)) = (self.read_file(orc), self.read_file(sco)) else {
                    return Status::ERROR;
                };
                let status = self.compile_orc(&c_string(&orc));
                if !status.is_success() {
                    return status;
                }
                self.read_score(&c_string(&sco))
            }
            _ => {
                let mut state = self.state.lock();
                self.error(&mut state, "error: expected a CSD file or an orchestra and a score\n");
                Status::ERROR
            }
        }
    }

    fn compile(&self, args: &[&CStr]) -> Status {
        let status = self.compile_args(args);
        if !status.is_success() {
            return status;
        }
        self.start()
    }

    fn compile_csd(&self, path: &CStr) -> Status {
        let Some(text) = self.read_file(&lossy(path)) else {
            return Status::ERROR;
        };
        if let Some(options) = csd_section(&text, "CsOptions") {
            let mut words = options.split_whitespace();
            while let Some(word) = words.next() {
                let status = match word {
                    "-o" => match words.next() {
                        Some(name) => {
                            self.state.lock().output = Some(name.to_string());
                            Status::SUCCESS
                        }
                        None => Status::ERROR,
                    },
                    option => self.set_option(&c_string(option)),
                };
                if !status.is_success() {
                    return status;
                }
            }
        }
        let Some(orchestra) = csd_section(&text, "CsInstruments") else {
            let mut state = self.state.lock();
            self.error(&mut state, "error: no <CsInstruments> section\n");
            return Status::ERROR;
        };
        let status = self.compile_orc(&c_string(orchestra));
        if !status.is_success() {
            return status;
        }
        match csd_section(&text, "CsScore") {
            Some(score) => self.read_score(&c_string(score)),
            None => Status::SUCCESS,
        }
    }

    fn start(&self) -> Status {
        let mut state = self.state.lock();
        if state.started {
            self.warning(
                &mut state,
                "Csound is already started, call csoundReset() before starting again.\n",
            );
            return Status::ERROR;
        }
        if !state.compiled {
            self.error(&mut state, "error: no orchestra compiled\n");
            return Status::INITIALIZATION;
        }
        state.started = true;
        state.finished = false;
        state.stop_requested = false;
        state.jump_to_offset();
        self.open_output(&mut state);
        self.show_tables(&mut state);
        Status::SUCCESS
    }

    fn perform(&self) -> i32 {
        loop {
            let result = self.perform_ksmps();
            if result != 0 {
                return result;
            }
        }
    }

    fn perform_ksmps(&self) -> i32 {
        let step = {
            let mut state = self.state.lock();
            self.step(&mut state)
        };
        if let Some(report) = step.breakpoint {
            with_native_report(&report, |info| unsafe { self.hub.breakpoint(info) });
        }
        if let Some(pause) = step.pause {
            thread::sleep(pause);
        }
        step.result
    }

    fn perform_buffer(&self) -> i32 {
        let periods = {
            let state = self.state.lock();
            state.buffer_frames.div_ceil(state.ksmps).max(1)
        };
        for _ in 0..periods {
            let result = self.perform_ksmps();
            if result != 0 {
                return result;
            }
        }
        0
    }

    fn stop(&self) {
        self.state.lock().stop_requested = true;
    }

    fn cleanup(&self) -> Status {
        let mut state = self.state.lock();
        self.hide_tables(&mut state);
        state.finished = true;
        Status::SUCCESS
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        let installed = std::mem::take(&mut state.installed);
        let env = std::mem::take(&mut state.env);
        let messages = state.messages.take();
        let allocations = std::mem::take(&mut state.allocations);
        *state = State {
            installed,
            messages,
            allocations,
            ..State::new(env)
        };
    }

    fn sr(&self) -> f64 {
        self.state.lock().sr
    }

    fn kr(&self) -> f64 {
        self.state.lock().kr
    }

    fn ksmps(&self) -> u32 {
        self.state.lock().ksmps
    }

    fn nchnls(&self) -> u32 {
        self.state.lock().nchnls
    }

    fn nchnls_input(&self) -> u32 {
        self.state.lock().nchnls_input
    }

    fn zero_dbfs(&self) -> f64 {
        self.state.lock().zero_dbfs
    }

    fn current_time_samples(&self) -> i64 {
        self.state.lock().samples
    }

    fn set_option(&self, option: &CStr) -> Status {
        let mut state = self.state.lock();
        self.apply_option(&mut state, &lossy(option))
    }

    fn debug(&self) -> bool {
        self.state.lock().debug
    }

    fn set_debug(&self, debug: bool) {
        self.state.lock().debug = debug;
    }

    fn output_name(&self) -> Option<String> {
        self.state.lock().output.clone()
    }

    fn set_output(&self, name: &CStr, file_type: Option<&CStr>, format: Option<&CStr>) {
        let mut state = self.state.lock();
        state.output = Some(lossy(name));
        state.output_type = file_type.map(lossy);
        state.output_format = format.map(lossy);
    }

    fn read_score(&self, score: &CStr) -> Status {
        let mut state = self.state.lock();
        self.schedule(&mut state, &lossy(score))
    }

    fn score_time(&self) -> f64 {
        self.state.lock().time()
    }

    fn is_score_pending(&self) -> bool {
        self.state.lock().score_pending
    }

    fn set_score_pending(&self, pending: bool) {
        self.state.lock().score_pending = pending;
    }

    fn score_offset_seconds(&self) -> f64 {
        self.state.lock().score_offset
    }

    fn set_score_offset_seconds(&self, offset: f64) {
        let mut state = self.state.lock();
        state.score_offset = offset.max(0.0);
        if state.started {
            state.jump_to_offset();
        }
    }

    fn rewind_score(&self) {
        let mut state = self.state.lock();
        state.samples = 0;
        state.finished = false;
        state.paused = false;
        for note in &mut state.notes {
            note.state = NoteState::Pending;
            note.kcounter = 0;
        }
        state.jump_to_offset();
    }

    fn score_event(&self, kind: c_char, pfields: &[f64]) -> Status {
        let mut state = self.state.lock();
        let clock = state.clock();
        match kind as u8 {
            b'i' if pfields.len() >= 3 => {
                let mut pfields = pfields.to_vec();
                pfields[1] += clock;
                state.notes.push(Note {
                    pfields,
                    state: NoteState::Pending,
                    kcounter: 0,
                });
                Status::SUCCESS
            }
            b'f' => match pfields {
                [number, time, ..] if *number == 0.0 => {
                    state.hold_until = state.hold_until.max(clock + time);
                    Status::SUCCESS
                }
                [number, _, size, gen, args @ ..] => {
                    let (number, size, gen) = (*number as i32, *size as usize, *gen as i32);
                    self.create_table(&mut state, number, size, gen, args);
                    Status::SUCCESS
                }
                _ => Status::ERROR,
            },
            b'e' => {
                state.end_at = Some(clock + pfields.first().copied().unwrap_or(0.0).max(0.0));
                Status::SUCCESS
            }
            b'a' | b'q' => Status::SUCCESS,
            _ => Status::ERROR,
        }
    }

    fn input_message(&self, message: &CStr) {
        let mut state = self.state.lock();
        let _ = self.schedule(&mut state, &lossy(message));
    }

    fn message(&self, attributes: Option<MessageAttributes>, text: &CStr) {
        let mut state = self.state.lock();
        let attributes = attributes.map_or(0, |attributes| attributes.bits() as i32);
        self.emit(&mut state, attributes, &lossy(text));
    }

    fn message_level(&self) -> i32 {
        self.state.lock().message_level
    }

    fn set_message_level(&self, level: i32) {
        self.state.lock().message_level = level;
    }

    fn create_message_buffer(&self, echo_to_stdout: bool) {
        self.state.lock().messages = Some(MessageBuffer {
            echo: echo_to_stdout,
            entries: VecDeque::new(),
        });
    }

    fn first_message(&self) -> Option<String> {
        let state = self.state.lock();
        state.messages.as_ref()?.entries.front().map(|(_, text)| text.clone())
    }

    fn first_message_attributes(&self) -> i32 {
        let state = self.state.lock();
        state
            .messages
            .as_ref()
            .and_then(|buffer| buffer.entries.front())
            .map_or(0, |(attributes, _)| *attributes)
    }

    fn pop_first_message(&self) {
        if let Some(buffer) = self.state.lock().messages.as_mut() {
            buffer.entries.pop_front();
        }
    }

    fn message_count(&self) -> i32 {
        let state = self.state.lock();
        state.messages.as_ref().map_or(0, |buffer| buffer.entries.len() as i32)
    }

    fn destroy_message_buffer(&self) {
        self.state.lock().messages = None;
    }

    fn list_channels(&self, list: &mut *mut controlChannelInfo_t) -> i32 {
        let mut state = self.state.lock();
        let records: Vec<ChannelRecord<'_>> = state
            .channels
            .iter()
            .map(|(name, channel)| ChannelRecord {
                name,
                channel_type: channel.channel_type,
                hints: &channel.hints,
            })
            .collect();
        let len = records.len();
        let raw = alloc_channel_list(&records);
        state.allocations.insert(raw as usize, Allocation::Channels(len));
        *list = raw;
        len as i32
    }

    unsafe fn delete_channel_list(&self, list: *mut controlChannelInfo_t) {
        if let Some(allocation) = self.release(list as usize) {
            free(list as usize, allocation);
        }
    }

    fn control_channel_hints(&self, name: &CStr, hints: &mut controlChannelHints_t) -> Status {
        let state = self.state.lock();
        match state.channels.get(&lossy(name)) {
            Some(channel) if is_control(channel.channel_type) => {
                // The attribute text stays owned by the channel.
                let attributes = channel
                    .attributes
                    .as_ref()
                    .map_or(ptr::null_mut(), |text| text.as_ptr().cast_mut());
                *hints = raw_hints(&channel.hints, attributes);
                Status::SUCCESS
            }
            _ => Status::ERROR,
        }
    }

    fn set_control_channel_hints(&self, name: &CStr, hints: controlChannelHints_t) -> Status {
        let mut state = self.state.lock();
        let Some(channel) = state.channels.get_mut(&lossy(name)) else {
            return Status::ERROR;
        };
        if channel.channel_type & sys::CSOUND_CHANNEL_TYPE_MASK != sys::CSOUND_CONTROL_CHANNEL {
            return Status::ERROR;
        }
        let hints = unsafe { hints_from_native(&hints) };
        channel.attributes = hints.attributes.as_deref().map(c_string);
        channel.hints = hints;
        Status::SUCCESS
    }

    fn control_channel(&self, name: &CStr) -> (f64, Status) {
        let state = self.state.lock();
        match state.channels.get(&lossy(name)) {
            Some(channel) => (channel.value, Status::SUCCESS),
            None => (0.0, Status::ERROR),
        }
    }

    fn set_control_channel(&self, name: &CStr, value: f64) {
        let mut state = self.state.lock();
        state
            .channels
            .entry(lossy(name))
            .or_insert_with(|| {
                Channel::new(sys::CSOUND_CONTROL_CHANNEL | sys::CSOUND_INPUT_CHANNEL)
            })
            .value = value;
    }

    fn table_length(&self, table: i32) -> i32 {
        self.state
            .lock()
            .tables
            .get(&table)
            .map_or(-1, |table| table.data.len() as i32)
    }

    fn table_get(&self, table: i32, index: i32) -> f64 {
        let state = self.state.lock();
        state
            .tables
            .get(&table)
            .and_then(|table| usize::try_from(index).ok().and_then(|index| table.data.get(index)))
            .copied()
            .unwrap_or(0.0)
    }

    fn table_set(&self, table: i32, index: i32, value: f64) {
        let mut state = self.state.lock();
        let slot = state
            .tables
            .get_mut(&table)
            .zip(usize::try_from(index).ok())
            .and_then(|(table, index)| table.data.get_mut(index));
        if let Some(slot) = slot {
            *slot = value;
        }
    }

    fn set_is_graphable(&self, graphable: bool) -> bool {
        std::mem::replace(&mut self.state.lock().graphable, graphable)
    }

    fn new_opcode_list(&self, list: &mut *mut opcodeListEntry) -> i32 {
        let raw = alloc_opcode_list(&OPCODES);
        self.state
            .lock()
            .allocations
            .insert(raw as usize, Allocation::Opcodes(OPCODES.len()));
        *list = raw;
        OPCODES.len() as i32
    }

    unsafe fn dispose_opcode_list(&self, list: *mut opcodeListEntry) {
        if let Some(allocation) = self.release(list as usize) {
            free(list as usize, allocation);
        }
    }

    fn list_utilities(&self) -> *mut *mut c_char {
        let names: Vec<&str> = UTILITIES.iter().map(|(name, _)| *name).collect();
        let raw = alloc_name_list(&names);
        self.state.lock().allocations.insert(raw as usize, Allocation::Utilities);
        raw
    }

    unsafe fn delete_utility_list(&self, list: *mut *mut c_char) {
        if let Some(allocation) = self.release(list as usize) {
            free(list as usize, allocation);
        }
    }

    fn utility_description(&self, name: &CStr) -> Option<String> {
        let name = lossy(name);
        UTILITIES
            .iter()
            .find(|(utility, _)| *utility == name)
            .map(|(_, description)| description.to_string())
    }

    fn env(&self, name: &CStr) -> Option<String> {
        let name = lossy(name);
        let state = self.state.lock();
        state.env.get(&name).cloned().or_else(|| std::env::var(&name).ok())
    }

    fn debugger_init(&self) {
        self.state.lock().debugger = true;
    }

    fn debugger_clean(&self) {
        let mut state = self.state.lock();
        state.debugger = false;
        state.breakpoints.clear();
        state.paused = false;
    }

    fn set_instrument_breakpoint(&self, instrument: f64, skip: i32) {
        let mut state = self.state.lock();
        state.breakpoints.retain(|(existing, _)| *existing != instrument);
        state.breakpoints.push((instrument, skip.max(0)));
    }

    fn remove_instrument_breakpoint(&self, instrument: f64) {
        self.state
            .lock()
            .breakpoints
            .retain(|(existing, _)| *existing != instrument);
    }

    fn clear_breakpoints(&self) {
        self.state.lock().breakpoints.clear();
    }

    fn debug_continue(&self) {
        self.state.lock().paused = false;
    }

    fn debug_stop(&self) {
        let mut state = self.state.lock();
        if state.debugger {
            state.paused = true;
        }
    }
}
