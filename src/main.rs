// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, LevelFilter};
use simple_logger::SimpleLogger;

use ovmf_varenroll::variable::secure_boot_attributes;
use ovmf_varenroll::{enroll, read_store, Enrollment};

/// A tool for enrolling variables into OVMF
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Opt {
    /// OVMF input file
    #[arg(short = 'f', long = "file")]
    input: PathBuf,

    /// OVMF output file after the var is enrolled
    #[arg(short, long, required_unless_present = "list")]
    output: Option<PathBuf>,

    /// Name of the variable to be enrolled, such as PK/KEK/db/dbx/SecureBootEnable etc
    #[arg(short, long, required_unless_present = "list")]
    name: Option<String>,

    /// For PK/KEK/db/dbx, it's guid of signature owner. For other variable it's vendor guid
    #[arg(short, long, required_unless_present = "list")]
    guid: Option<String>,

    /// For PK/KEK/db/dbx, ignored. For other variables means its attribute, e.g 0x3
    #[arg(short, long, value_parser = parse_attributes)]
    attributes: Option<u32>,

    /// For PK/KEK/db/dbx, it's the cert file. Otherwise it's the payload of the variables.
    #[arg(short, long, required_unless_present = "list")]
    data: Option<PathBuf>,

    /// List the variables in the input file and exit
    #[arg(short, long)]
    list: bool,

    /// Log the store walk
    #[arg(short, long)]
    verbose: bool,
}

fn parse_attributes(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|err| format!("invalid attributes {:?}: {}", s, err))
}

fn run(opt: Opt) -> Result<()> {
    let image = fs::read(&opt.input)
        .with_context(|| format!("failed to read {}", opt.input.display()))?;

    if opt.list {
        read_store(&image)?.dump();
        return Ok(());
    }

    // clap enforces these when not listing
    let (Some(output), Some(name), Some(guid), Some(data_path)) = (opt.output, opt.name, opt.guid, opt.data) else {
        bail!("--output, --name, --guid and --data are required");
    };

    let attributes = match (secure_boot_attributes(&name), opt.attributes) {
        (Some(fixed), _) => fixed,
        (None, Some(attributes)) => attributes,
        (None, None) => bail!("--attributes is required for {}", name),
    };

    let data = fs::read(&data_path)
        .with_context(|| format!("failed to read {}", data_path.display()))?;

    let enrollment = Enrollment {
        name,
        vendor_guid: guid,
        attributes,
        data,
    };
    let new_image = enroll(&image, &enrollment)
        .with_context(|| format!("failed to enroll {}", enrollment.name))?;

    fs::write(&output, new_image)
        .with_context(|| format!("failed to write {}", output.display()))?;

    Ok(())
}

fn main() {
    let opt = Opt::parse();
    let level = if opt.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = SimpleLogger::new().with_level(level).init();

    run(opt).unwrap_or_else(|err| {
        error!("{:#}", err);
        std::process::exit(1);
    });
}
