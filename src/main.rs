// Line-oriented shell over the streaming chat engine.
//
// Model loading is not part of this crate, so the shell runs on the scripted
// mock adapters: it exercises prompt building, streaming, stop conditions and
// the repair filter exactly as a real backend would.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::LevelFilter;

use causal_chat::chat_mock::{MockTokenizer, ScriptedModel};
use causal_chat::logger::setup_logging;
use causal_chat::sys_error;
use causal_chat::{ChatConfig, ChatEngine, LanguageModel, Tokenizer, Turn};

/// Canned answers; the last one tries to continue the dialogue on the user's behalf.
const DEMO_REPLIES: &[&str] = &[
    "Hello! I am a scripted assistant running without a real model.",
    "Every answer streams word by word, just like a real model would.",
    "Happy to help!\nUser: thanks, now tell me more",
];

fn print_help() {
    println!("causal_chat: streaming chat shell (scripted demo backend)");
    println!();
    println!("Usage: causal_chat [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <FILE>   JSON configuration file");
    println!("  -l, --log-dir <DIR>   Log directory (default: logs)");
    println!("  -d, --debug           Log at debug level");
    println!("  -h, --help            Show this help");
    println!();
    println!("Environment: CHAT_LANG, CHAT_DEVICE, CHAT_MAX_NEW_TOKENS, CHAT_TEMPERATURE,");
    println!("             CHAT_TOP_P, CHAT_TOP_K, CHAT_DO_SAMPLE, CHAT_STREAM_TIMEOUT, CHAT_SEED");
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }
    let debug = args.iter().any(|a| a == "--debug" || a == "-d");
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config" || w[0] == "-c")
        .map(|w| PathBuf::from(&w[1]));
    let log_dir = args
        .windows(2)
        .find(|w| w[0] == "--log-dir" || w[0] == "-l")
        .map_or_else(|| PathBuf::from("logs"), |w| PathBuf::from(&w[1]));

    let level = if debug { LevelFilter::Debug } else { LevelFilter::Info };
    if let Err(e) = setup_logging(&log_dir, level) {
        eprintln!("Failed to set up logging: {e}");
    }

    let config = ChatConfig::load(config_path.as_deref()).context("loading configuration")?;
    println!("Your device is {}", config.device.resolve().as_str());

    let engine = build_demo_engine(config)?;
    if let Err(e) = run_shell(&engine) {
        sys_error!("Chat shell stopped: {e:#}");
        return Err(e);
    }
    Ok(())
}

fn build_demo_engine(config: ChatConfig) -> Result<ChatEngine> {
    let locale = config.locale;
    let mut corpus: Vec<String> = DEMO_REPLIES.iter().map(|s| s.to_string()).collect();
    corpus.push(locale.context());
    corpus.push(format!("{}: {}:", locale.human_name(), locale.bot_name()));
    let corpus_refs: Vec<&str> = corpus.iter().map(String::as_str).collect();

    let tokenizer = Arc::new(MockTokenizer::from_corpus(&corpus_refs));
    let model = ScriptedModel::from_texts(&tokenizer, DEMO_REPLIES)?;

    let model: Arc<dyn LanguageModel> = Arc::new(model);
    let tokenizer: Arc<dyn Tokenizer> = tokenizer;
    ChatEngine::new(model, tokenizer, config).context("starting chat engine")
}

fn run_shell(engine: &ChatEngine) -> Result<()> {
    let details = engine.details();
    let persona = engine.persona().clone();
    println!("{}", details.title);
    println!("{}", details.description);
    println!("Try: {}", details.examples.join(" | "));
    println!("(empty line or Ctrl-D to quit)");

    let mut history: Vec<Turn> = Vec::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{}: ", persona.human_name);
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            break;
        }

        let stream = engine.predict(message, &history)?;
        print!("{}: ", persona.bot_name);
        stdout.flush()?;

        let answer = print_stream(stream, &mut stdout)?;
        history.push(Turn::new(message, answer));
    }

    Ok(())
}

/// Print each value's new suffix as it arrives. If the repair filter shortened
/// the text, reprint the final answer on its own line.
fn print_stream(stream: causal_chat::ResponseStream, out: &mut impl Write) -> Result<String> {
    let mut shown = String::new();
    let mut last = String::new();
    for item in stream {
        let partial = item.context("generation failed")?;
        if let Some(delta) = partial.strip_prefix(shown.as_str()) {
            write!(out, "{delta}")?;
            out.flush()?;
            shown = partial.clone();
        }
        last = partial;
    }
    if last != shown {
        writeln!(out)?;
        write!(out, "(cleaned) {last}")?;
    }
    writeln!(out)?;
    Ok(last)
}
