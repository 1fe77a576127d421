use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use hotswap_bytecode::{decode, disassemble, encode, UnitNode};
use hotswap_core::{
    unit_files, DirectoryWatcher, HotSwapConfig, HotSwapEngine, Loader, SandboxLoader, SandboxRuntime,
    UnitTransformer,
};
use hotswap_registry::GenerationRegistry;
use hotswap_rewrite::UnitRewriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("hotswap")
        .version(hotswap_core::VERSION)
        .about("Inspect, rewrite and hot-swap compiled units")
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .help("Default log filter (overridden by RUST_LOG)"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("inspect")
                .about("Print a unit's disassembly")
                .arg(Arg::new("file").required(true).value_parser(value_parser!(PathBuf)))
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the structured unit as JSON"),
                ),
        )
        .subcommand(
            Command::new("assemble")
                .about("Encode a JSON unit description into a unit file")
                .arg(Arg::new("json").required(true).value_parser(value_parser!(PathBuf)))
                .arg(Arg::new("out").required(true).value_parser(value_parser!(PathBuf))),
        )
        .subcommand(
            Command::new("rewrite")
                .about("Run the unit rewriter and report what changed")
                .arg(Arg::new("file").required(true).value_parser(value_parser!(PathBuf)))
                .arg(
                    Arg::new("out")
                        .long("out")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the rewritten unit here"),
                )
                .arg(Arg::new("suffix").long("suffix").help("Generation suffix")),
        )
        .subcommand(
            Command::new("watch")
                .about("Watch a directory and hot-swap changed units into a sandbox runtime")
                .arg(
                    Arg::new("dir")
                        .long("dir")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory to watch"),
                )
                .arg(
                    Arg::new("interval")
                        .long("interval")
                        .value_parser(value_parser!(u64))
                        .help("Polling interval in milliseconds"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML configuration file"),
                )
                .arg(
                    Arg::new("agent-args")
                        .long("agent-args")
                        .help("Settings as key=value;key=value"),
                )
                .arg(
                    Arg::new("for")
                        .long("for")
                        .value_parser(value_parser!(u64))
                        .help("Stop after this many seconds"),
                ),
        )
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn read_unit(path: &Path) -> Result<UnitNode> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    decode(&bytes).with_context(|| format!("decoding {}", path.display()))
}

fn inspect(args: &ArgMatches) -> Result<()> {
    let path = args.get_one::<PathBuf>("file").context("missing file")?;
    let unit = read_unit(path)?;
    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&unit)?);
    } else {
        print!("{}", disassemble(&unit));
    }
    Ok(())
}

fn assemble(args: &ArgMatches) -> Result<()> {
    let json = args.get_one::<PathBuf>("json").context("missing input")?;
    let out = args.get_one::<PathBuf>("out").context("missing output")?;
    let text = std::fs::read_to_string(json).with_context(|| format!("reading {}", json.display()))?;
    let unit: UnitNode = serde_json::from_str(&text).with_context(|| format!("parsing {}", json.display()))?;
    std::fs::write(out, encode(&unit)?).with_context(|| format!("writing {}", out.display()))?;
    println!("{} -> {}", unit.name, out.display());
    Ok(())
}

fn rewrite(args: &ArgMatches) -> Result<()> {
    let path = args.get_one::<PathBuf>("file").context("missing file")?;
    let rewriter = args
        .get_one::<String>("suffix")
        .map_or_else(UnitRewriter::default, UnitRewriter::new);
    let mut unit = read_unit(path)?;
    let report = rewriter.rewrite(&mut unit)?;
    println!("{report}");
    match args.get_one::<PathBuf>("out") {
        Some(out) => {
            std::fs::write(out, encode(&unit)?).with_context(|| format!("writing {}", out.display()))?;
        }
        None => print!("{}", disassemble(&unit)),
    }
    Ok(())
}

fn watch_config(args: &ArgMatches) -> Result<HotSwapConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => HotSwapConfig::load(path)?,
        None => HotSwapConfig::default(),
    };
    if let Some(agent_args) = args.get_one::<String>("agent-args") {
        config.apply_agent_args(agent_args);
    }
    if let Some(dir) = args.get_one::<PathBuf>("dir") {
        config.watch_dir.clone_from(dir);
    }
    if let Some(ms) = args.get_one::<u64>("interval") {
        config.poll_interval_ms = *ms;
    }
    config.validate()?;
    Ok(config)
}

fn preload(loader: &SandboxLoader, config: &HotSwapConfig) -> usize {
    let mut loaded = 0;
    for path in unit_files(&config.watch_dir, &config.unit_extension) {
        let loaded_type = std::fs::read(&path)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| loader.load_unit(&bytes).map_err(anyhow::Error::from));
        match loaded_type {
            Ok(ty) => {
                tracing::info!("loaded {} from {}", ty.internal_name(), path.display());
                loaded += 1;
            }
            Err(e) => tracing::warn!("skipping {}: {}", path.display(), e),
        }
    }
    loaded
}

fn watch(args: &ArgMatches, config: &HotSwapConfig) -> Result<()> {
    if !config.watch_dir.is_dir() {
        bail!("{} is not a directory", config.watch_dir.display());
    }

    let registry = Arc::new(GenerationRegistry::new());
    let transformer = UnitTransformer::new(UnitRewriter::new(config.suffix.clone()));
    let runtime = Arc::new(SandboxRuntime::with_transformer(Arc::clone(&registry), transformer));
    let loader = match &config.custom_loader {
        Some(name) => runtime.add_loader(name.clone(), true),
        None => Arc::clone(runtime.primary()),
    };
    let loaded = preload(&loader, config);
    tracing::info!("{} units loaded by {}", loaded, loader.id());

    let engine = Arc::new(HotSwapEngine::new(runtime, registry).with_config(config));
    let sink_engine = Arc::clone(&engine);
    let handle = DirectoryWatcher::from_config(config).spawn(move |path: &Path, bytes: Vec<u8>| {
        match sink_engine.submit(&bytes) {
            Ok(outcome) => tracing::info!("{}: {}", path.display(), outcome),
            Err(e) => tracing::warn!("{}: {} ({:?})", path.display(), e, e.kind()),
        }
    })?;

    match args.get_one::<u64>("for") {
        Some(secs) => std::thread::sleep(Duration::from_secs(*secs)),
        None => loop {
            std::thread::park();
        },
    }

    handle.stop();
    println!("{}", serde_json::to_string_pretty(&engine.stats())?);
    Ok(())
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    let cli_level = matches.get_one::<String>("log-level").cloned();

    match matches.subcommand() {
        Some(("watch", args)) => {
            let config = watch_config(args)?;
            init_logging(cli_level.as_deref().unwrap_or(&config.log_level));
            watch(args, &config)
        }
        Some((name, args)) => {
            init_logging(cli_level.as_deref().unwrap_or("info"));
            match name {
                "inspect" => inspect(args),
                "assemble" => assemble(args),
                "rewrite" => rewrite(args),
                other => bail!("unknown command {other}"),
            }
        }
        None => bail!("no command given"),
    }
}
