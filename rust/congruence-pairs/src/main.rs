//! congruence-pairs CLI: find elliptic curves with isomorphic mod-p
//! representations and write the pair lists.
//!
//! ```text
//! congruence-pairs --database curves.json --prime 5 --max-conductor 500000
//! congruence-pairs --config mod7.json --no-checkpoints
//! ```
//!
//! Logging goes through `env_logger`; set `RUST_LOG=info` (or `debug` for
//! every individual test) to follow a run.

use std::path::PathBuf;
use std::process;
use std::time::Instant;

use clap::Parser;

use congruence_pairs::{
    CongruenceError, MemoryDatabase, Pipeline, PipelineConfig, SubprocessBackend,
    SubprocessConfig,
};

#[derive(Parser, Debug)]
#[command(name = "congruence-pairs", version, about)]
struct Args {
    /// JSON configuration file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Curve database (JSON isogeny classes)
    #[arg(long)]
    database: PathBuf,

    /// The prime p (2, 3, 5, 7 or 13)
    #[arg(long, short)]
    prime: Option<u64>,

    #[arg(long)]
    min_conductor: Option<u64>,

    #[arg(long)]
    max_conductor: Option<u64>,

    /// Directory for stage checkpoints
    #[arg(long, conflicts_with = "no_checkpoints")]
    checkpoint_dir: Option<PathBuf>,

    /// Recompute every stage and save nothing
    #[arg(long)]
    no_checkpoints: bool,

    /// Directory for the pair lists
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Sage executable
    #[arg(long, default_value = "sage")]
    sage: String,

    /// Magma executable
    #[arg(long, default_value = "magma")]
    magma: String,

    /// Magma file defining IntegralFrobenius
    #[arg(long, default_value = "IntFrobFunctions.m")]
    frobenius_script: PathBuf,
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig, CongruenceError> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(p) = self.prime {
            config.p = p;
        }
        if let Some(min) = self.min_conductor {
            config.min_conductor = min;
        }
        if let Some(max) = self.max_conductor {
            config.max_conductor = max;
        }
        if self.no_checkpoints {
            config.checkpoint_dir = None;
        } else if let Some(dir) = &self.checkpoint_dir {
            config.checkpoint_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }

    fn backend_config(&self) -> SubprocessConfig {
        SubprocessConfig {
            sage: self.sage.clone(),
            magma: Some(self.magma.clone()),
            frobenius_script: Some(self.frobenius_script.clone()),
        }
    }
}

fn run(args: &Args) -> Result<(), CongruenceError> {
    let config = args.pipeline_config()?;

    let db = MemoryDatabase::load_json(&args.database)?;

    let backend = SubprocessBackend::start(&args.backend_config())?;

    let start = Instant::now();
    let output = Pipeline::new(&config, &db, &backend).run()?;
    println!("{}", output);
    println!("  elapsed: {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        if let CongruenceError::ConsistencyViolation { pairs, .. } = &e {
            for (a, b) in pairs {
                eprintln!("  {} / {}", a, b);
            }
        }
        process::exit(1);
    }
}
