use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use failsafe_core::{
    Engine, EngineConfig, ErrorType, FailsafeError, Feature, Invocation, VERSION,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
const LOG_ENV: &str = "FAILSAFE_LOG";
/// Error log lines shown by `status` and `doctor`
const STATUS_LOG_LINES: usize = 10;
/// Exit code when a human was asked to step in
const ESCALATED_EXIT_CODE: i32 = 2;

fn cli() -> Command {
    Command::new("failsafe")
        .version(VERSION)
        .about("Error recovery and graceful degradation for assistant sessions")
        .subcommand_required(true)
        .arg(
            Arg::new("state-dir")
                .long("state-dir")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("State directory (default: $FAILSAFE_STATE_DIR or ~/.claude/failsafe)"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log recovery decisions to stderr"),
        )
        .subcommand(
            Command::new("status")
                .about("Show health state, feature gates and recent errors")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("doctor")
                .about("Diagnostics dump; exits with the degradation level"),
        )
        .subcommand(Command::new("reset").about("Clear degradation and session counters"))
        .subcommand(
            Command::new("feature")
                .about("Exit 0 if a feature is enabled at the current level, 1 otherwise")
                .arg(Arg::new("name").required(true).help("Feature name")),
        )
        .subcommand(
            Command::new("hook")
                .about("Run a hook; failures are bypassed and never fail the caller")
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Hook executable"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_parser(value_parser!(u64))
                        .help("Timeout in seconds (default: tuned or configured value)"),
                )
                .arg(
                    Arg::new("input")
                        .long("input")
                        .help("Text passed on the hook's stdin"),
                ),
        )
        .subcommand(
            Command::new("agent")
                .about("Run an agent under a timeout")
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_parser(value_parser!(u64))
                        .help("Timeout in seconds (default: configured value)"),
                )
                .arg(
                    Arg::new("retry-on-invalid")
                        .long("retry-on-invalid")
                        .action(ArgAction::SetTrue)
                        .help("Re-run once if the agent exits non-zero"),
                )
                .arg(command_arg()),
        )
        .subcommand(
            Command::new("handle")
                .about("Recover a failed operation: retry, alternatives, degrade, escalate")
                .arg(
                    Arg::new("type")
                        .long("type")
                        .required(true)
                        .help("Error type, e.g. network or hook_failure"),
                )
                .arg(
                    Arg::new("context")
                        .long("context")
                        .default_value("")
                        .help("What the operation was doing"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_parser(value_parser!(u64))
                        .help("Per-attempt timeout in seconds (default: configured agent timeout)"),
                )
                .arg(
                    Arg::new("alt")
                        .long("alt")
                        .action(ArgAction::Append)
                        .help("Alternative command, split on whitespace (repeatable)"),
                )
                .arg(command_arg()),
        )
        .subcommand(
            Command::new("escalate")
                .about("Raise a user attention report")
                .arg(Arg::new("issue").long("issue").required(true).help("What happened"))
                .arg(
                    Arg::new("context")
                        .long("context")
                        .required(true)
                        .help("What was tried"),
                )
                .arg(
                    Arg::new("suggest")
                        .long("suggest")
                        .action(ArgAction::Append)
                        .help("Suggested next step (repeatable)"),
                ),
        )
        .subcommand(
            Command::new("heal")
                .about("Apply self-healing for a repeated pattern; exit 0 if applied")
                .arg(Arg::new("pattern").required(true).help("Error type"))
                .arg(
                    Arg::new("frequency")
                        .required(true)
                        .value_parser(value_parser!(u32))
                        .help("How often the pattern was seen"),
                ),
        )
        .subcommand(
            Command::new("log")
                .about("Print the newest error log lines")
                .arg(
                    Arg::new("lines")
                        .long("lines")
                        .short('n')
                        .default_value("20")
                        .value_parser(value_parser!(usize))
                        .help("Number of lines"),
                ),
        )
}

/// Trailing `-- <argv...>` of the supervised command
fn command_arg() -> Arg {
    Arg::new("command")
        .required(true)
        .num_args(1..)
        .last(true)
        .help("Command to run, after --")
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn text<'a>(args: &'a ArgMatches, id: &str) -> Option<&'a str> {
    args.get_one::<String>(id).map(String::as_str)
}

fn texts(args: &ArgMatches, id: &str) -> Vec<String> {
    args.get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn seconds(args: &ArgMatches, id: &str) -> Option<Duration> {
    args.get_one::<u64>(id).copied().map(Duration::from_secs)
}

fn error_type(args: &ArgMatches, id: &str) -> Result<ErrorType> {
    let name = text(args, id).with_context(|| format!("missing --{id}"))?;
    Ok(name.parse()?)
}

fn supervised_command(args: &ArgMatches) -> Result<Invocation> {
    Invocation::from_argv(texts(args, "command")).context("invalid command")
}

/// `--alt` commands, each bounded by `limit`
fn alternatives(args: &ArgMatches, limit: Duration) -> Result<Vec<Invocation>> {
    texts(args, "alt")
        .iter()
        .map(|line| Ok(Invocation::parse_words(line)?.or_timeout(limit)))
        .collect::<Result<Vec<_>>>()
        .context("invalid --alt command")
}

/// Run the selected command and return the process exit code
async fn run(matches: &ArgMatches) -> Result<i32> {
    let state_dir = matches.get_one::<PathBuf>("state-dir").cloned();
    let config = EngineConfig::resolve(state_dir).context("failed to load configuration")?;
    tracing::debug!(state_dir = %config.state_dir.display(), "configuration resolved");
    let engine = Engine::from_config(config);

    match matches.subcommand() {
        Some(("status", args)) => {
            let report = engine.status(STATUS_LOG_LINES)?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
            Ok(0)
        }
        Some(("doctor", _)) => {
            let report = engine.status(STATUS_LOG_LINES)?;
            println!("failsafe {VERSION}");
            println!("State directory:    {}", engine.services().config.state_dir.display());
            print!("{report}");
            println!();
            if report.state.is_nominal() {
                println!("Verdict: healthy");
            } else {
                println!(
                    "Verdict: degraded to level {}; run `failsafe reset` once resolved",
                    report.state.degradation_level
                );
            }
            Ok(report.exit_code())
        }
        Some(("reset", _)) => {
            let state = engine.degradation().reset()?;
            println!("Reset to level {}", state.degradation_level);
            Ok(0)
        }
        Some(("feature", args)) => {
            let name = text(args, "name").context("missing feature name")?;
            let enabled = engine.degradation().is_feature_enabled(Feature::from_name(name));
            Ok(if enabled { 0 } else { 1 })
        }
        Some(("hook", args)) => {
            let path = args
                .get_one::<PathBuf>("path")
                .context("missing hook path")?;
            let outcome = engine
                .hooks()
                .run(path, text(args, "input"), seconds(args, "timeout"))
                .await;
            print!("{}", outcome.output);
            Ok(0)
        }
        Some(("agent", args)) => {
            let agent = supervised_command(args)?;
            let result = engine
                .agents()
                .run(&agent, seconds(args, "timeout"), args.get_flag("retry-on-invalid"))
                .await;
            match result {
                Ok(outcome) => {
                    print!("{}", outcome.output);
                    Ok(0)
                }
                Err(e) => report_failure(&e),
            }
        }
        Some(("handle", args)) => {
            let error_type = error_type(args, "type")?;
            let limit = seconds(args, "timeout")
                .unwrap_or_else(|| engine.services().config.agent_timeout());
            let component = supervised_command(args)?.or_timeout(limit);
            let alternatives = alternatives(args, limit)?;
            let context = text(args, "context").unwrap_or_default();
            let result = engine
                .handler()
                .handle(error_type, &component, context, &alternatives)
                .await;
            match result {
                Ok(outcome) => {
                    print!("{}", outcome.output);
                    Ok(0)
                }
                Err(e) => report_failure(&e),
            }
        }
        Some(("escalate", args)) => {
            let issue = text(args, "issue").context("missing --issue")?;
            let context = text(args, "context").context("missing --context")?;
            engine
                .escalation()
                .escalate(issue, context, texts(args, "suggest"));
            Ok(ESCALATED_EXIT_CODE)
        }
        Some(("heal", args)) => {
            let pattern = error_type(args, "pattern")?;
            let frequency = args.get_one::<u32>("frequency").copied().unwrap_or(0);
            let applied = engine.healer().attempt_self_heal(pattern, frequency);
            Ok(if applied { 0 } else { 1 })
        }
        Some(("log", args)) => {
            let lines = args.get_one::<usize>("lines").copied().unwrap_or(20);
            for line in engine.services().errors.tail(lines)? {
                println!("{line}");
            }
            Ok(0)
        }
        _ => Ok(0),
    }
}

/// Exit code for a supervised failure: 2 when a human was asked to step in
fn report_failure(error: &FailsafeError) -> Result<i32> {
    match error {
        // The report was already printed by the escalation handler
        FailsafeError::Escalated(_) => Ok(ESCALATED_EXIT_CODE),
        FailsafeError::Io { .. } | FailsafeError::Json { .. } | FailsafeError::Config { .. } => {
            Err(anyhow::anyhow!("{error}"))
        }
        other => {
            eprintln!("{other}");
            Ok(1)
        }
    }
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("verbose"));

    let code = match run(&matches).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> ArgMatches {
        cli().try_get_matches_from(argv).unwrap()
    }

    #[test]
    fn command_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn handle_collects_alternatives_and_trailing_command() {
        let matches = parse(&[
            "failsafe", "handle", "--type", "network", "--context", "fetch docs",
            "--alt", "wget -q https://example.com", "--alt", "true",
            "--", "curl", "-sf", "https://example.com",
        ]);
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(error_type(args, "type").unwrap(), ErrorType::Network);
        let alts = alternatives(args, Duration::from_secs(300)).unwrap();
        assert_eq!(alts.len(), 2);
        assert_eq!(alts[0].program, "wget");
        assert!(alts.iter().all(|a| a.timeout == Some(Duration::from_secs(300))));

        let command = supervised_command(args).unwrap();
        assert_eq!(command.program, "curl");
        assert_eq!(command.args, vec!["-sf", "https://example.com"]);
    }

    #[test]
    fn handle_accepts_a_timeout() {
        let matches = parse(&[
            "failsafe", "handle", "--type", "transient", "--timeout", "30", "--", "sync",
        ]);
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(seconds(args, "timeout"), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn escalate_exits_as_escalated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(failsafe_core::config::CONFIG_FILE),
            "desktop_notifications = false\n",
        )
        .unwrap();
        let state_dir = dir.path().to_str().unwrap();
        let matches = parse(&[
            "failsafe", "--state-dir", state_dir, "escalate",
            "--issue", "data_loss", "--context", "notes.md truncated",
        ]);
        assert_eq!(run(&matches).await.unwrap(), ESCALATED_EXIT_CODE);
        let log = std::fs::read_to_string(dir.path().join("errors.log")).unwrap();
        assert!(log.contains("[user_escalation]"));
    }

    #[test]
    fn agent_requires_a_command() {
        assert!(cli().try_get_matches_from(["failsafe", "agent"]).is_err());
        let matches = parse(&["failsafe", "agent", "--timeout", "60", "--", "planner"]);
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(seconds(args, "timeout"), Some(Duration::from_secs(60)));
        assert!(!args.get_flag("retry-on-invalid"));
    }

    #[test]
    fn unknown_error_type_is_rejected() {
        let matches = parse(&["failsafe", "heal", "cosmic_rays", "3"]);
        let (_, args) = matches.subcommand().unwrap();
        assert!(error_type(args, "pattern").is_err());
    }

    #[test]
    fn state_dir_is_global() {
        let matches = parse(&["failsafe", "status", "--state-dir", "/tmp/fs", "--json"]);
        assert_eq!(
            matches.get_one::<PathBuf>("state-dir"),
            Some(&PathBuf::from("/tmp/fs"))
        );
    }
}
