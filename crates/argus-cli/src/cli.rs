//! Command line interface for argus.
//!
//! Defines the commands and options via `clap` and carries the glue that
//! parses a model file, compiles the query and drives the verification
//! crates. Logging goes through `log4rs`, configured to stdout by
//! default or from a log4rs configuration file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use log::{info, LevelFilter};
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    Config,
};

use argus_compile::{CompilationUnit, Compiler, EncodingMgr};
use argus_expr::{ExprId, ExprPool, TypeStore};
use argus_parser::{parse_expression, ModelParser, ParseModel};
use argus_reach::{
    check_init_consistency, CompiledFsm, ConsistencyStatus, FsmUnits, ReachStatus, Reachability,
};
use argus_sat::{EngineMgr, MICROCODE_PATH_ENV};

use crate::argus_config::ArgusConfig;

/// Exit code for decided runs
pub const EXIT_DECIDED: i32 = 0;
/// Exit code for errors
pub const EXIT_ERROR: i32 = 1;
/// Exit code for undecided runs
pub const EXIT_UNDECIDED: i32 = 2;

/// argus — a symbolic reachability checker for finite-state synchronous
/// transition systems
///
/// Models are module-structured with typed variables, DEFINEs and
/// INIT/TRANS/INVAR predicate sections. The `reach` command answers
/// whether a target condition is reachable from the initial states and
/// prints a witness trajectory when it is; `init-consistency` checks that
/// the initial states are non-empty.
#[derive(Parser, Debug)]
#[command(version, name = "argus", about, long_about)]
pub struct Cli {
    #[command(flatten)]
    pub log_config: LoggerConfig,
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decide whether a target condition is reachable
    Reach {
        #[command(flatten)]
        input: ModelFileInput,

        /// The target expression
        #[arg(short, long, value_name = "EXPR")]
        target: String,

        /// Constraint assumed on the forward unrolling only (repeatable)
        #[arg(long = "forward-constraint", value_name = "EXPR")]
        forward_constraints: Vec<String>,

        /// Constraint assumed on the backward unrolling only (repeatable)
        #[arg(long = "backward-constraint", value_name = "EXPR")]
        backward_constraints: Vec<String>,

        /// Constraint assumed on both unrollings (repeatable)
        #[arg(short, long = "constraint", value_name = "EXPR")]
        constraints: Vec<String>,

        /// Configuration file for the checker
        #[arg(long, value_name = "CONFIG_FILE")]
        config_file: Option<PathBuf>,

        /// Wall-clock budget in seconds; on expiry the run reports
        /// UNDECIDED
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
    /// Check that INIT, INVAR and the given constraints admit a state
    InitConsistency {
        #[command(flatten)]
        input: ModelFileInput,

        /// Additional constraint at time 0 (repeatable)
        #[arg(short, long = "constraint", value_name = "EXPR")]
        constraints: Vec<String>,

        /// Configuration file for the checker
        #[arg(long, value_name = "CONFIG_FILE")]
        config_file: Option<PathBuf>,
    },
}

/// Model file argument
#[derive(Args, Debug)]
pub struct ModelFileInput {
    /// Location of the model file
    pub model_file: PathBuf,
}

/// Logging options
#[derive(Args, Debug)]
pub struct LoggerConfig {
    /// Read the logger configuration from a log4rs configuration file
    #[arg(long)]
    pub logger_config_file: Option<String>,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    pub debug: bool,
}

/// Initialize the logger: stdout by default, a log4rs configuration file
/// when one is given.
pub fn initialize_logger(cfg: LoggerConfig) -> Result<(), anyhow::Error> {
    if let Some(f) = cfg.logger_config_file {
        log4rs::init_file(f, Default::default())
            .with_context(|| "failed to read logger config file")?;
        return Ok(());
    }

    let encoder = match cfg.debug {
        true => PatternEncoder::new("{d(%H:%M:%S)} - {h({l})} - [{M}] - {m}{n}"),
        false => PatternEncoder::new("{d(%H:%M:%S)} - {h({l})} - {m}{n}"),
    };

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(encoder))
        .build();

    let level = if cfg.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let log_config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .expect("failed to assemble logger configuration");

    log4rs::init_config(log_config).expect("failed to initialize console logger");
    Ok(())
}

/// Layer the configuration file (when given) under `ARGUS_`-prefixed
/// environment variables.
pub fn load_config(config_file: Option<PathBuf>) -> Result<ArgusConfig, anyhow::Error> {
    let mut settings = config::Config::builder();
    if let Some(f) = config_file {
        if !f.exists() {
            return Err(anyhow!(
                "specified configuration file '{}' does not exist",
                f.display()
            ));
        }
        settings = settings.add_source(config::File::from(f));
    }
    settings = settings.add_source(config::Environment::with_prefix("ARGUS"));
    let cfg = settings
        .build()?
        .try_deserialize::<ArgusConfig>()
        .with_context(|| "failed to read configuration")?;
    Ok(cfg)
}

fn apply_config(cfg: &ArgusConfig) {
    if let Some(dir) = cfg.microcode_path() {
        // the template loaders pick the directory up from the
        // environment
        std::env::set_var(MICROCODE_PATH_ENV, dir);
    }
}

/// Everything a compiled query needs to run
struct Compiled {
    pool: ExprPool,
    fsm: CompiledFsm,
    units: Vec<CompilationUnit>,
}

/// Parse the model file and compile the FSM plus the given expressions
/// (in order).
fn compile_query(model_file: &PathBuf, exprs: &[String]) -> Result<Compiled, anyhow::Error> {
    let source = std::fs::read_to_string(model_file)
        .with_context(|| format!("cannot read model file '{}'", model_file.display()))?;

    let mut pool = ExprPool::new();
    let mut types = TypeStore::new();
    let model = ModelParser::new().parse_model(&source, &mut pool, &mut types)?;
    info!(
        "parsed model with {} state variable(s)",
        model.state_variables().count()
    );

    let parsed: Vec<ExprId> = exprs
        .iter()
        .map(|e| parse_expression(e, &mut pool))
        .collect::<Result<_, _>>()?;

    let ctx = pool.empty();
    let mut enc = EncodingMgr::new();
    let (fsm_units, units) = {
        let mut compiler = Compiler::new(&pool, &mut types, model.symbols(), &mut enc);
        let fsm_units = FsmUnits::compile(&mut compiler, &model)
            .with_context(|| "failed to compile the model")?;
        let units = parsed
            .iter()
            .map(|e| compiler.compile(ctx, *e, 0))
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| "failed to compile the query expressions")?;
        (fsm_units, units)
    };

    Ok(Compiled {
        pool,
        fsm: CompiledFsm::new(fsm_units, Arc::new(enc)),
        units,
    })
}

/// Run the `reach` command; returns the process exit code.
#[allow(clippy::too_many_arguments)]
pub fn run_reach(
    input: ModelFileInput,
    target: String,
    forward: Vec<String>,
    backward: Vec<String>,
    global: Vec<String>,
    config_file: Option<PathBuf>,
    timeout: Option<u64>,
) -> Result<i32, anyhow::Error> {
    let mut cfg = load_config(config_file)?;
    if let Some(secs) = timeout {
        cfg.set_timeout_secs(secs);
    }
    apply_config(&cfg);

    // the target leads, then forward, backward and global constraints
    let mut exprs = vec![target.clone()];
    exprs.extend(forward.iter().cloned());
    exprs.extend(backward.iter().cloned());
    exprs.extend(global.iter().cloned());

    let compiled = compile_query(&input.model_file, &exprs)?;
    let mut units = compiled.units.into_iter();
    let target_cu = units.next().expect("the target was compiled");
    let forward_cus: Vec<_> = units.by_ref().take(forward.len()).collect();
    let backward_cus: Vec<_> = units.by_ref().take(backward.len()).collect();
    let global_cus: Vec<_> = units.collect();

    let reach = Arc::new(Reachability::new(
        compiled.fsm,
        target.clone(),
        target_cu,
        forward_cus,
        backward_cus,
        global_cus,
    ));

    if let Some(secs) = cfg.timeout_secs() {
        let armed = reach.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            armed.engine_mgr().interrupt();
        });
    }

    let status = reach.process();
    match status {
        ReachStatus::Reachable => {
            match reach.take_witness() {
                Some(w) => {
                    println!(
                        "Target is reachable, registered witness `{}`, {} steps.",
                        w.id(),
                        w.len()
                    );
                    print!("{}", w.render(&compiled.pool));
                }
                None => println!("Target is reachable."),
            }
            Ok(EXIT_DECIDED)
        }
        ReachStatus::Unreachable => {
            println!("Target is unreachable.");
            Ok(EXIT_DECIDED)
        }
        ReachStatus::Unknown => {
            println!("Reachability could not be decided.");
            Ok(EXIT_UNDECIDED)
        }
        ReachStatus::Error => Err(anyhow!("unexpected error during reachability analysis")),
    }
}

/// Run the `init-consistency` command; returns the process exit code.
pub fn run_init_consistency(
    input: ModelFileInput,
    constraints: Vec<String>,
    config_file: Option<PathBuf>,
) -> Result<i32, anyhow::Error> {
    let cfg = load_config(config_file)?;
    apply_config(&cfg);

    let compiled = compile_query(&input.model_file, &constraints)?;
    let mgr = EngineMgr::new();
    let status = check_init_consistency(&compiled.fsm, &compiled.units, &mgr);

    println!("Initial-state consistency: {status}");
    match status {
        ConsistencyStatus::Ok | ConsistencyStatus::Ko => Ok(EXIT_DECIDED),
        ConsistencyStatus::Undecided => Ok(EXIT_UNDECIDED),
    }
}
