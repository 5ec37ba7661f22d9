use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};
use comfy_table::{presets, CellAlignment, Table};
use dexinfo::file::{dump::ReportOptions, DexFileContainer, DexImage, VerifyPreset};

#[derive(Parser, Debug)]
#[command(
    name = "dexinfo",
    about = "Print the header, methods and classes of an Android DEX file",
    version
)]
struct Cli {
    /// Path to the .dex file.
    file: PathBuf,

    /// Print header offsets, class details, fields and code metadata.
    #[arg(short = 'V', long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Print the decoded image as JSON instead of the text report.
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Print the header sections as a table before the report.
    #[arg(long, action = ArgAction::SetTrue)]
    header_table: bool,

    /// Integrity checks to run before parsing.
    #[arg(long, value_enum, default_value_t = Verify::None)]
    verify: Verify,

    /// Enable debug logging.
    #[arg(long, action = ArgAction::SetTrue)]
    debug: bool,

    /// Enable trace logging.
    #[arg(long, action = ArgAction::SetTrue)]
    trace: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Verify {
    None,
    Checksum,
    All,
}

impl From<Verify> for VerifyPreset {
    fn from(value: Verify) -> Self {
        match value {
            Verify::None => VerifyPreset::None,
            Verify::Checksum => VerifyPreset::ChecksumOnly,
            Verify::All => VerifyPreset::All,
        }
    }
}

fn init_logger(cli: &Cli) {
    let env = env_logger::Env::new()
        .filter_or("DEXINFO_LOG", "warn")
        .write_style("DEXINFO_LOG_STYLE");

    let mut builder = env_logger::Builder::from_env(env);
    if cli.trace {
        builder.filter_level(log::LevelFilter::Trace);
    } else if cli.debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();
}

fn header_table(dex: &DexImage) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_header(vec!["section", "count", "offset", "bytes"]);
    for section in dex.header().sections() {
        table.add_row(vec![
            section.kind.name().to_string(),
            section.count.to_string(),
            format!("{:#x}", section.offset),
            section.byte_len().to_string(),
        ]);
    }
    for idx in 1..4 {
        if let Some(column) = table.column_mut(idx) {
            column.set_cell_alignment(CellAlignment::Right);
        }
    }
    table
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(&cli);

    let location = cli.file.display().to_string();
    let file = File::open(&cli.file).with_context(|| format!("failed to open {location}"))?;
    let dex = DexFileContainer::new(&file)
        .with_context(|| format!("failed to map {location}"))?
        .location(location.clone())
        .verify(cli.verify.into())
        .open()
        .with_context(|| format!("failed to parse {location}"))?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    if cli.json {
        serde_json::to_writer_pretty(&mut out, &dex)?;
        writeln!(out)?;
        out.flush()?;
        return Ok(());
    }

    if cli.header_table {
        writeln!(out, "{}\n", header_table(&dex))?;
    }
    let opts = ReportOptions {
        verbose: cli.verbose,
        location: Some(location),
    };
    dex.write_report(&mut out, &opts)?;
    out.flush()?;
    Ok(())
}
