use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use imebridge_core::{Bridge, BridgeSettings, CallbackRegistry, ConfigNode, ConfigTree, EngineEvent};
use memengine::MemoryEngine;
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imebridge")]
#[command(about = "Drive the in-memory input method engine through the bridge")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log filter, e.g. `info` or `imebridge_core=debug`
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Directory holding persisted configuration (in-memory when absent)
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Bridge settings TOML file
    #[arg(long)]
    settings: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive REPL mode
    Repl,
    /// Print the effective bridge settings as TOML
    Settings,
}

fn print_event(event: EngineEvent) {
    match event {
        EngineEvent::Ready => println!("[ready]"),
        EngineEvent::StringCommitted(text) => println!("[commit] {text}"),
        EngineEvent::CandidateListUpdated(list) if list.is_empty() => {}
        EngineEvent::CandidateListUpdated(list) => {
            let shown: Vec<String> = list
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{}.{c}", i + 1))
                .collect();
            println!("[candidates] {}", shown.join(" "));
        }
        EngineEvent::PreeditUpdated { preedit, cursor, .. } => {
            if !preedit.is_empty() {
                println!("[preedit] {preedit} (cursor {cursor})");
            }
        }
        EngineEvent::AuxTextUpdated { aux_up, aux_down } => {
            if !aux_up.is_empty() || !aux_down.is_empty() {
                println!("[aux] {aux_up} {aux_down}");
            }
        }
        EngineEvent::RawKeyForwarded { code, symbol } => println!("[forward] {symbol} ({code:#x})"),
        EngineEvent::InputMethodChanged(Some(status)) => {
            println!("[im] {} ({})", status.entry.unique_name, status.entry.display_name)
        }
        EngineEvent::InputMethodChanged(None) => println!("[im] none"),
    }
}

fn print_help() {
    println!("commands:");
    println!("  key <desc>            send one key, e.g. `key Control+space`");
    println!("  type <text>           send each character as a key");
    println!("  select <n>            select candidate n (1-based)");
    println!("  reset | cursor <n> | focus on|off");
    println!("  im <name> | ims <name>... | list | available | status");
    println!("  addons | enable <addon> | disable <addon>");
    println!("  config get global|addon <name>|im <name>");
    println!("  config set global|addon <name>|im <name> <json>");
    println!("  punc <char> [lang] | quickphrase | unicode");
    println!("  save | sync | exit");
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn print_tree(tree: Option<ConfigTree>) -> Result<()> {
    match tree {
        Some(tree) => println!("{}", to_json(&tree.to_node(tree.root()))?),
        None => println!("(no configuration)"),
    }
    Ok(())
}

fn parse_tree(json: &str) -> Result<ConfigTree> {
    let node: ConfigNode = serde_json::from_str(json).context("config value must be a JSON node")?;
    Ok(ConfigTree::from_node(&node)?)
}

/// Run one REPL line. Returns `false` once the session should end.
fn run_command(bridge: &Bridge, line: &str) -> Result<bool> {
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match cmd {
        "help" | "?" => print_help(),
        "key" => bridge.send_key_str(rest)?,
        "type" => rest.chars().for_each(|ch| bridge.send_char(ch)),
        "select" => {
            let n: usize = rest.parse().context("candidate number")?;
            bridge.select(n.checked_sub(1).ok_or_else(|| anyhow!("candidates start at 1"))?);
        }
        "reset" => bridge.reset_input_panel(),
        "cursor" => bridge.reposition_cursor(rest.parse().context("cursor position")?),
        "focus" => bridge.focus_input_context(rest != "off"),
        "im" => bridge.set_input_method(rest),
        "ims" => bridge.set_enabled_input_methods(rest.split_whitespace()),
        "list" => println!("{}", to_json(&bridge.list_input_methods())?),
        "available" => println!("{}", to_json(&bridge.available_input_methods())?),
        "status" => println!("{}", to_json(&bridge.input_method_status())?),
        "addons" => {
            bridge.sync();
            for state in bridge.get_addons() {
                println!(
                    "{:<16} {:<12} {}",
                    state.info.unique_name,
                    format!("{:?}", state.info.category),
                    if state.enabled { "enabled" } else { "disabled" }
                );
            }
        }
        "enable" | "disable" => {
            let desired = BTreeMap::from([(rest.to_string(), cmd == "enable")]);
            bridge.set_addon_state(desired);
        }
        "config" => run_config(bridge, rest)?,
        "punc" => {
            let mut parts = rest.split_whitespace();
            let ch = parts
                .next()
                .and_then(|s| s.chars().next())
                .ok_or_else(|| anyhow!("usage: punc <char> [lang]"))?;
            let (open, close) = bridge.query_punctuation(ch, parts.next().unwrap_or("zh_CN"));
            println!("{open} {close}");
        }
        "quickphrase" => bridge.trigger_quick_phrase(),
        "unicode" => bridge.trigger_unicode(),
        "save" => bridge.save_config(),
        "sync" => println!("{}", if bridge.sync() { "ok" } else { "not running" }),
        "exit" | "quit" => return Ok(false),
        "" => {}
        other => bail!("unknown command `{other}` (try `help`)"),
    }
    Ok(true)
}

fn run_config(bridge: &Bridge, args: &str) -> Result<()> {
    let mut parts = args.splitn(2, ' ');
    let verb = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();
    let (scope, rest) = rest.split_once(' ').unwrap_or((rest, ""));
    let (name, payload) = match scope {
        "global" => ("", rest.trim()),
        _ => rest.trim().split_once(' ').unwrap_or((rest.trim(), "")),
    };
    match (verb, scope) {
        ("get", "global") => print_tree(bridge.get_global_config())?,
        ("get", "addon") => print_tree(bridge.get_addon_config(name))?,
        ("get", "im") => print_tree(bridge.get_input_method_config(name))?,
        ("set", "global") => bridge.set_global_config(parse_tree(payload)?),
        ("set", "addon") => bridge.set_addon_config(name, parse_tree(payload)?),
        ("set", "im") => bridge.set_input_method_config(name, parse_tree(payload)?),
        _ => bail!("usage: config get|set global|addon <name>|im <name> [json]"),
    }
    Ok(())
}

fn run_repl(bridge: &Bridge) -> Result<()> {
    println!("imebridge demo CLI - type `help` for commands, Ctrl-D to exit.");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        let line = line?;
        if !bridge.is_running() {
            println!("engine stopped");
            break;
        }
        match run_command(bridge, line.trim()) {
            Ok(true) => {
                // Let events from this command print before the next prompt.
                bridge.sync();
            }
            Ok(false) => break,
            Err(err) => eprintln!("error: {err:#}"),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let settings = match &cli.settings {
        Some(path) => BridgeSettings::load_toml(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => BridgeSettings::default(),
    };

    if let Some(Commands::Settings) = cli.command {
        print!("{}", settings.to_toml_string()?);
        return Ok(());
    }

    let mut builder = MemoryEngine::builder();
    if let Some(dir) = &cli.config_dir {
        builder = builder.config_dir(dir);
    }

    let bridge = Arc::new(Bridge::new(settings));
    let owner = {
        let bridge = Arc::clone(&bridge);
        thread::Builder::new()
            .name("imebridge-owner".into())
            .spawn(move || {
                let callbacks = CallbackRegistry::new().forward_all(print_event);
                bridge.startup(builder.into_factory(), callbacks)
            })?
    };

    if bridge.wait_until_running(Duration::from_secs(5)) {
        run_repl(&bridge)?;
        bridge.exit();
    } else {
        eprintln!("engine failed to start");
    }

    let status = owner
        .join()
        .map_err(|_| anyhow!("owner thread panicked"))?;
    tracing::info!(?status, "engine stopped");
    std::process::exit(status.code());
}
