//! Stencil CLI
//!
//! Usage:
//!   stencil generate <TEMPLATE>              Print the generated program
//!   stencil compile <TEMPLATE> -o <FILE>     Compile to an artifact file
//!   stencil render <TEMPLATE> [--model M]    Compile and render
//!   stencil run <ARTIFACT> [--model M]       Render a saved artifact
//!
//! Every command accepts `--config <options.toml>`. Set `RUST_LOG` or pass
//! `-v` for log output on stderr.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use stencil::{
    compile_template, generate_program, CompilationOptions, CompiledArtifact, Error, Value,
};

#[derive(Parser)]
#[command(name = "stencil")]
#[command(about = "Compile and render Razor-style templates")]
struct Cli {
    /// Compilation options file (TOML format)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the program generated for a template
    Generate { template: PathBuf },

    /// Compile a template into an artifact file
    Compile {
        template: PathBuf,

        /// Artifact output path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Compile a template and render it
    Render {
        template: PathBuf,

        /// JSON model file
        #[arg(short, long)]
        model: Option<PathBuf>,
    },

    /// Render a previously compiled artifact
    Run {
        artifact: PathBuf,

        /// JSON model file
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Entry type (defaults to the configured namespace and type name)
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = match &cli.config {
        Some(path) => match CompilationOptions::from_file(path) {
            Ok(options) => options,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => CompilationOptions::default(),
    };

    if let Err(e) = run(cli.command, &options) {
        match e {
            Error::Compile(err) => {
                let label = options.filename().unwrap_or("template");
                eprint!("{}", err.report(label));
            }
            other => eprintln!("Error: {}", other),
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::from_default_env(),
        1 => EnvFilter::new("stencil=debug"),
        _ => EnvFilter::new("stencil=trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Command, options: &CompilationOptions) -> Result<(), Error> {
    match command {
        Command::Generate { template } => {
            let source = fs::read_to_string(&template)?;
            print!("{}", generate_program(&source, &labelled(options, &template))?);
        }
        Command::Compile { template, output } => {
            let source = fs::read_to_string(&template)?;
            let artifact = compile_template(&source, &labelled(options, &template))?;
            artifact.save_to_file(&output)?;
            eprintln!(
                "Compiled {} to {} ({} bytes)",
                artifact.type_name(),
                output.display(),
                artifact.payload().len()
            );
        }
        Command::Render { template, model } => {
            let source = fs::read_to_string(&template)?;
            let artifact = compile_template(&source, &labelled(options, &template))?;
            print!("{}", artifact.run(load_model(model.as_deref())?)?);
        }
        Command::Run {
            artifact,
            model,
            type_name,
        } => {
            let type_name = type_name.unwrap_or_else(|| options.full_type_name());
            let artifact =
                CompiledArtifact::load_from_file_with(&artifact, &type_name, options.references())?;
            print!("{}", artifact.run(load_model(model.as_deref())?)?);
        }
    }
    Ok(())
}

/// Options with the template path as the source label unless one is configured
fn labelled(options: &CompilationOptions, template: &Path) -> CompilationOptions {
    match options.filename() {
        Some(_) => options.clone(),
        None => options.clone().with_filename(template.display().to_string()),
    }
}

fn load_model(path: Option<&Path>) -> Result<Value, Error> {
    let Some(path) = path else {
        return Ok(Value::Null);
    };
    let json = fs::read_to_string(path)?;
    Ok(Value::from_json_str(&json)?)
}
