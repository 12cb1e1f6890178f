use facet::Facet;
use figue as args;
use std::path::PathBuf;
use stepwise_types::RunStats;

mod scenarios;

type AnyResult<T> = Result<T, String>;
pub(crate) const OUT_DIR_ENV: &str = "STEPWISE_OUT_DIR";

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    /// Directory receiving trace, dictionary and class files.
    #[facet(args::named, default)]
    out_dir: Option<String>,
    /// Raw agent option string; overrides the files chosen from --out-dir.
    #[facet(args::named, default)]
    options: Option<String>,
    /// Print a JSON run summary on stdout.
    #[facet(args::named, default)]
    summary: bool,
    #[facet(args::subcommand)]
    command: CommandKind,
}

#[derive(Facet, Debug)]
#[repr(u8)]
enum CommandKind {
    CallSequence,
    SharedMethod,
    SingleStep,
    ThreadStorm {
        #[facet(args::named, default)]
        threads: Option<usize>,
    },
    Delegate,
}

impl CommandKind {
    fn name(&self) -> &'static str {
        match self {
            Self::CallSequence => "call-sequence",
            Self::SharedMethod => "shared-method",
            Self::SingleStep => "single-step",
            Self::ThreadStorm { .. } => "thread-storm",
            Self::Delegate => "delegate",
        }
    }
}

#[derive(Facet, Debug)]
struct Summary {
    scenario: String,
    out_dir: String,
    stats: Option<RunStats>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> AnyResult<()> {
    let cli = parse_cli()?;
    let session = scenarios::Session {
        out_dir: out_dir_from_cli(&cli),
        options: cli.options.clone(),
    };
    std::fs::create_dir_all(&session.out_dir).map_err(|e| {
        format!(
            "failed to create output directory {}: {e}",
            session.out_dir.display()
        )
    })?;

    let stats = dispatch_command(&session, &cli.command)?;

    if cli.summary {
        let summary = Summary {
            scenario: cli.command.name().to_owned(),
            out_dir: session.out_dir.display().to_string(),
            stats,
        };
        let json = facet_json::to_string(&summary)
            .map_err(|e| format!("failed to serialize run summary: {e}"))?;
        println!("{json}");
    }
    Ok(())
}

fn parse_cli() -> AnyResult<Cli> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("stepwise-examples")
                .description("Drive stepwise recording scenarios against a simulated host")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();

    args::Driver::new(figue_config)
        .run()
        .into_result()
        .map(|v| v.value)
        .map_err(|e| e.to_string())
}

fn out_dir_from_cli(cli: &Cli) -> PathBuf {
    cli.out_dir
        .as_ref()
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(OUT_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("stepwise-out"))
}

fn dispatch_command(
    session: &scenarios::Session,
    command: &CommandKind,
) -> AnyResult<Option<RunStats>> {
    match command {
        CommandKind::CallSequence => scenarios::call_sequence::run(session),
        CommandKind::SharedMethod => scenarios::shared_method::run(session),
        CommandKind::SingleStep => scenarios::single_step::run(session),
        CommandKind::ThreadStorm { threads } => {
            scenarios::thread_storm::run(session, threads.unwrap_or(8))
        }
        CommandKind::Delegate => scenarios::delegate::run(session),
    }
}
