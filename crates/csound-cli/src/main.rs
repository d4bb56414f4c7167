use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use csound_api::{Color, CsoundHost, HostConfig, HostData, MessageKind};
use csound_cli::commands::{ast, message, opcodes, play, utilities};
use csound_cli::{io, CliError};

#[derive(Parser, Debug)]
#[command(name = "csound-bridge")]
#[command(about = "Drive the Csound engine from the command line", long_about = None)]
struct Args {
    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,

    /// Host configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Parse an orchestra and print its syntax tree
    Ast {
        /// Orchestra file
        #[arg(value_name = "ORC")]
        file: PathBuf,
        /// Print JSON with argument chains grouped under `nextNodes`
        #[arg(long)]
        json: bool,
    },

    /// List the opcodes the engine knows
    Opcodes,

    /// Route a message through the engine and print it styled
    Message {
        /// Text to send
        text: String,
        /// Message type
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        /// Foreground color
        #[arg(long, value_enum)]
        fg: Option<ColorArg>,
        /// Background color
        #[arg(long, value_enum)]
        bg: Option<ColorArg>,
        #[arg(long)]
        bold: bool,
        #[arg(long)]
        underline: bool,
    },

    /// Compile an orchestra and score and perform them
    Play {
        /// Orchestra file
        #[arg(value_name = "ORC")]
        orchestra: PathBuf,
        /// Score file
        #[arg(value_name = "SCO")]
        score: PathBuf,
        /// Output file or device (`dac` for real-time audio)
        #[arg(short, long, value_name = "OUT")]
        output: Option<String>,
        /// Perform on a worker thread
        #[arg(long = "async")]
        asynchronous: bool,
        /// Stop after this many milliseconds
        #[arg(long, value_name = "MS")]
        stop_after: Option<u64>,
        /// Show a spinner while performing
        #[arg(short, long)]
        progress: bool,
    },

    /// List the engine's utilities
    Utilities,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Default,
    Error,
    Orchestra,
    Realtime,
    Warning,
    Stdout,
}

impl From<KindArg> for MessageKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Default => MessageKind::Default,
            KindArg::Error => MessageKind::Error,
            KindArg::Orchestra => MessageKind::Orchestra,
            KindArg::Realtime => MessageKind::Realtime,
            KindArg::Warning => MessageKind::Warning,
            KindArg::Stdout => MessageKind::Stdout,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ColorArg {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl From<ColorArg> for Color {
    fn from(color: ColorArg) -> Self {
        match color {
            ColorArg::Black => Color::Black,
            ColorArg::Red => Color::Red,
            ColorArg::Green => Color::Green,
            ColorArg::Yellow => Color::Yellow,
            ColorArg::Blue => Color::Blue,
            ColorArg::Magenta => Color::Magenta,
            ColorArg::Cyan => Color::Cyan,
            ColorArg::White => Color::White,
        }
    }
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    let config = match &args.config {
        Some(path) => HostConfig::load(path).map_err(CliError::from)?,
        None => HostConfig::default(),
    };
    let mut host = CsoundHost::new(config);
    let id = host.create(HostData::none()).map_err(CliError::from)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let outcome = match args.command {
        Command::Ast { file, json } => {
            let orchestra = io::read_file(&file)?;
            ast::handle_ast(&host, id, &orchestra, json, &mut out)
        }
        Command::Opcodes => opcodes::handle_opcodes(&host, id, &mut out),
        Command::Message {
            text,
            kind,
            fg,
            bg,
            bold,
            underline,
        } => {
            let message_style = message::MessageStyle {
                kind: kind.map(MessageKind::from),
                foreground: fg.map(Color::from),
                background: bg.map(Color::from),
                bold,
                underline,
            };
            message::handle_message(&mut host, id, &text, &message_style, &mut out)
        }
        Command::Play {
            orchestra,
            score,
            output,
            asynchronous,
            stop_after,
            progress,
        } => {
            let orchestra = io::read_file(&orchestra)?;
            let score = io::read_file(&score)?;
            let options = play::PlayOptions {
                output,
                asynchronous,
                stop_after: stop_after.map(Duration::from_millis),
                progress,
                echo: true,
            };
            play::handle_play(&mut host, id, &orchestra, &score, &options).map(|report| {
                log::info!(
                    "Performance result {} after {} periods.",
                    report.result,
                    report.periods
                );
            })
        }
        Command::Utilities => utilities::handle_utilities(&host, id, &mut out),
    };

    host.destroy(id).map_err(CliError::from)?;
    outcome?;
    Ok(())
}
