//! Command-line interface for mlbridge.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Load compiled ML models and run predictions over raw buffers.
#[derive(Parser, Debug)]
#[command(name = "mlbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a prediction on JSON input.
    Infer {
        /// Path to the model source (.yaml) or compiled artifact.
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Path to input data file.
        ///
        /// JSON object mapping input names to `{ "data": [...], "shape": [...] }`,
        /// or an array of such objects for a batch prediction.
        #[arg(short, long)]
        input: PathBuf,

        /// Compute units (cpu, cpu_and_ne, cpu_and_gpu).
        #[arg(short, long)]
        backend: Option<String>,

        /// Output format (json, pretty).
        #[arg(short, long)]
        format: Option<String>,

        /// Path to optional config file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Treat `--model` as an already compiled artifact.
        #[arg(long)]
        compiled: bool,

        /// Write outputs into preallocated backing buffers.
        #[arg(long)]
        backing: bool,
    },

    /// Load a model and print its interface.
    Info {
        /// Path to the model source (.yaml) or compiled artifact.
        #[arg(short, long)]
        model: PathBuf,

        /// Compute units (cpu, cpu_and_ne, cpu_and_gpu).
        #[arg(short, long, default_value = "cpu")]
        backend: String,

        /// Treat `--model` as an already compiled artifact.
        #[arg(long)]
        compiled: bool,
    },

    /// Compile a model source into the artifact cache.
    Compile {
        /// Path to the model source (.yaml).
        #[arg(short, long)]
        model: PathBuf,

        /// Cache directory.
        #[arg(short, long)]
        out_dir: PathBuf,

        /// Artifact name inside the cache directory.
        #[arg(short, long, default_value = "model.mlc.json")]
        name: String,
    },
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_infer() {
        let cli = Cli::try_parse_from([
            "mlbridge", "infer", "-m", "sum.yaml", "-i", "input.json", "--backing",
        ])
        .unwrap();
        match cli.command {
            Commands::Infer {
                model,
                backing,
                compiled,
                ..
            } => {
                assert_eq!(model, Some(PathBuf::from("sum.yaml")));
                assert!(backing);
                assert!(!compiled);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_compile_default_name() {
        let cli = Cli::try_parse_from(["mlbridge", "compile", "-m", "sum.yaml", "-o", "cache"]).unwrap();
        match cli.command {
            Commands::Compile { name, .. } => assert_eq!(name, "model.mlc.json"),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
