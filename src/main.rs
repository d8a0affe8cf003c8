use std::{
    ffi::OsStr,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use vmtranslator::parser;
use vmtranslator::translator::Translator;

#[derive(Parser, Debug)]
#[command(
    name = "vmtranslator",
    version,
    about = "Translates Hack VM code to Hack assembly"
)]
struct Cli {
    /// A .vm file, or a directory whose .vm files form one program
    input: PathBuf,

    /// Output .asm path (defaults to a sibling of the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit the bootstrap preamble (SP = 256, call Sys.init 0)
    #[arg(long)]
    init: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let sources = collect_sources(&cli.input)?;
    if sources.is_empty() {
        bail!("no .vm files found at {}", cli.input.display());
    }

    let out_path = match &cli.output {
        Some(path) => path.clone(),
        None => default_output(&cli.input)?,
    };
    let out = File::create(&out_path)
        .with_context(|| format!("cannot create {}", out_path.display()))?;
    let mut translator = Translator::new(BufWriter::new(out));

    if cli.init {
        translator.emit_bootstrap()?;
    }

    for path in &sources {
        let stem = path
            .file_stem()
            .and_then(OsStr::to_str)
            .with_context(|| format!("bad file name: {}", path.display()))?;
        info!("translating {}", path.display());
        let source = fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;

        translator.set_file(stem);
        let mut parser = parser::Parser::new(&source);
        while parser.has_more() {
            parser.advance().with_context(|| format!("in {}", path.display()))?;
            translator
                .emit(parser.current())
                .with_context(|| format!("in {}", path.display()))?;
        }
    }

    translator.into_inner().flush()?;
    info!("wrote {}", out_path.display());
    Ok(())
}

/// A file translates alone; a directory contributes every .vm file inside,
/// in name order so rebuilds are deterministic.
fn collect_sources(input: &Path) -> Result<Vec<PathBuf>> {
    if !input.is_dir() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = fs::read_dir(input)
        .with_context(|| format!("cannot read directory {}", input.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension() == Some(OsStr::new("vm")))
        .collect();
    files.sort();
    Ok(files)
}

fn default_output(input: &Path) -> Result<PathBuf> {
    if input.is_dir() {
        // <dir>/<dirname>.asm, resolving "." and ".." to a real name
        let resolved = input
            .canonicalize()
            .with_context(|| format!("cannot resolve {}", input.display()))?;
        let name = resolved
            .file_name()
            .and_then(OsStr::to_str)
            .context("directory has no usable name")?
            .to_string();
        Ok(input.join(format!("{name}.asm")))
    } else {
        Ok(input.with_extension("asm"))
    }
}
