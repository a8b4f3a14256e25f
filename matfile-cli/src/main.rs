// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{anyhow, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::LevelFilter;
use matfile_core::{
    ClassKind, Compression, MatReader, MatVar, MatVersion, MatWriter, NumericBuffer, Payload,
    SparseValues,
};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

/// Most rows and columns a dump prints before eliding.
const PREVIEW_LIMIT: usize = 15;

fn class_description(class: ClassKind) -> &'static str {
    match class {
        ClassKind::Empty => "Undefined",
        ClassKind::Cell => "Cell Array",
        ClassKind::Struct => "Structure",
        ClassKind::Object => "Object",
        ClassKind::Char => "Character Array",
        ClassKind::Sparse => "Sparse Array",
        ClassKind::Double => "Double Precision Array",
        ClassKind::Single => "Single Precision Array",
        ClassKind::Int8 => "8-bit, signed integer array",
        ClassKind::UInt8 => "8-bit, unsigned integer array",
        ClassKind::Int16 => "16-bit, signed integer array",
        ClassKind::UInt16 => "16-bit, unsigned integer array",
        ClassKind::Int32 => "32-bit, signed integer array",
        ClassKind::UInt32 => "32-bit, unsigned integer array",
        ClassKind::Int64 => "64-bit, signed integer array",
        ClassKind::UInt64 => "64-bit, unsigned integer array",
        ClassKind::Function => "Function",
        ClassKind::Opaque => "Opaque",
        ClassKind::Unknown(_) => "Unknown",
    }
}

fn dims_string(dims: &[usize]) -> String {
    dims.iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(" x ")
}

fn element_string(buf: &NumericBuffer, index: usize) -> String {
    match buf {
        NumericBuffer::I8(v) => v[index].to_string(),
        NumericBuffer::U8(v) => v[index].to_string(),
        NumericBuffer::I16(v) => v[index].to_string(),
        NumericBuffer::U16(v) => v[index].to_string(),
        NumericBuffer::I32(v) => v[index].to_string(),
        NumericBuffer::U32(v) => v[index].to_string(),
        NumericBuffer::I64(v) => v[index].to_string(),
        NumericBuffer::U64(v) => v[index].to_string(),
        NumericBuffer::F32(v) => v[index].to_string(),
        NumericBuffer::F64(v) => v[index].to_string(),
    }
}

fn print_var(var: &MatVar, print_data: bool) {
    if !var.name().is_empty() {
        println!("      Name: {}", var.name());
    }
    println!("      Rank: {}", var.rank());
    println!("Dimensions: {}", dims_string(var.dims()));
    let mut kind = class_description(var.class()).to_string();
    if var.is_complex() {
        kind.push_str(" (complex)");
    } else if var.is_logical() {
        kind.push_str(" (logical)");
    }
    println!("Class Type: {kind}");

    match var.payload() {
        Payload::Struct(data) => {
            println!("Fields[{}] {{", data.children.len());
            for child in &data.children {
                print_var(child, print_data);
            }
            println!("}}");
        }
        Payload::Cell(children) => {
            println!("{{");
            for child in children {
                print_var(child, print_data);
            }
            println!("}}");
        }
        Payload::Numeric(data) if print_data && var.rank() == 2 => {
            let (m, n) = (var.dims()[0], var.dims()[1]);
            println!("{{");
            for i in 0..m.min(PREVIEW_LIMIT) {
                let mut row = String::new();
                for j in 0..n.min(PREVIEW_LIMIT) {
                    let idx = j * m + i;
                    row.push_str(&element_string(&data.re, idx));
                    if let Some(im) = &data.im {
                        row.push_str(" + ");
                        row.push_str(&element_string(im, idx));
                        row.push('i');
                    }
                    row.push(' ');
                }
                if n > PREVIEW_LIMIT {
                    row.push_str("...");
                }
                println!("{row}");
            }
            if m > PREVIEW_LIMIT {
                println!(".\n.\n.");
            }
            println!("}}");
        }
        Payload::Char(_) if print_data => {
            println!("{{");
            match matfile_core::bridge::to_host(var, &mut matfile_core::Diagnostics::new()) {
                Ok(matfile_core::HostValue::Str(s)) => println!("{s}"),
                Ok(matfile_core::HostValue::StringArray(rows)) => {
                    for row in rows {
                        println!("{row}");
                    }
                }
                _ => {}
            }
            println!("}}");
        }
        Payload::Sparse(data) if print_data => {
            println!("{{");
            for k in 0..data.values.len() {
                let (row, col) = (data.ir[k] + 1, data.column_of(k) + 1);
                match &data.values {
                    SparseValues::Real(v) => println!("    ({row},{col})  {}", v[k]),
                    SparseValues::Complex { re, im } => {
                        println!("    ({row},{col})  {} + {}i", re[k], im[k])
                    }
                    SparseValues::Logical(v) => println!("    ({row},{col})  {}", v[k]),
                }
            }
            println!("}}");
        }
        _ => {}
    }
}

trait CliCommand {
    fn run(&self) -> Result<()>;
}

#[derive(Args)]
struct MatSource {
    /// Path to a MAT file.
    #[arg(long)]
    pub path: Option<PathBuf>,
}

impl MatSource {
    fn reader(&self) -> Result<MatReader<BufReader<File>>> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| anyhow!("must define a source file"))?;
        Ok(MatReader::open(path)?)
    }
}

#[derive(Parser)]
struct ListVars {
    #[command(flatten)]
    source: MatSource,
}

impl CliCommand for ListVars {
    fn run(&self) -> Result<()> {
        let mut reader = self.source.reader()?;
        for info in reader.variables()? {
            let mut notes = String::new();
            if info.complex {
                notes.push_str(" complex");
            }
            if info.logical {
                notes.push_str(" logical");
            }
            println!(
                "{:24} {:28} {}{}",
                info.name,
                class_description(info.class),
                dims_string(&info.dims),
                notes
            );
        }
        for warning in reader.diagnostics().warnings() {
            eprintln!("warning: {warning}");
        }
        Ok(())
    }
}

#[derive(Parser)]
struct DumpVar {
    #[command(flatten)]
    source: MatSource,

    /// Variable to dump; omit to dump every variable.
    name: Option<String>,

    /// Print array contents, not just headers.
    #[arg(long)]
    data: bool,
}

impl CliCommand for DumpVar {
    fn run(&self) -> Result<()> {
        let mut reader = self.source.reader()?;
        match &self.name {
            Some(name) => {
                let var = reader
                    .read_var(name)?
                    .ok_or_else(|| anyhow!("no variable named {name:?}"))?;
                print_var(&var, self.data);
            }
            None => {
                while let Some(var) = reader.read_next()? {
                    print_var(&var, self.data);
                }
            }
        }
        for warning in reader.diagnostics().warnings() {
            eprintln!("warning: {warning}");
        }
        Ok(())
    }
}

#[derive(Parser)]
struct Repack {
    #[command(flatten)]
    source: MatSource,

    /// Path of the rewritten file.
    #[arg(long)]
    output: PathBuf,

    /// Write a v4 file instead of v5.
    #[arg(long)]
    v4: bool,

    /// Compress variables in the output (v5 only).
    #[arg(long)]
    compress: bool,
}

impl CliCommand for Repack {
    fn run(&self) -> Result<()> {
        let mut reader = self.source.reader()?;
        let version = if self.v4 {
            MatVersion::V4
        } else {
            MatVersion::V5
        };
        let compression = if self.compress {
            Compression::Zlib
        } else {
            Compression::None
        };
        let mut writer = MatWriter::create(&self.output, version, None, compression)?;
        let mut count = 0usize;
        while let Some(var) = reader.read_next()? {
            writer.write(&var)?;
            count += 1;
        }
        log::info!("rewrote {} variables to {}", count, self.output.display());
        Ok(())
    }
}

#[derive(Subcommand)]
enum Subcommands {
    /// List the variables in a MAT file.
    List(ListVars),
    /// Print decoded variables.
    ///
    /// This reads variable trees in file order and prints their
    /// headers, with contents on request.
    Dump(DumpVar),
    /// Read a MAT file and write its variables to a new file,
    /// changing version or compression.
    Repack(Repack),
}

impl Subcommands {
    fn as_cli_command(&self) -> &dyn CliCommand {
        match self {
            Self::List(c) => c,
            Self::Dump(c) => c,
            Self::Repack(c) => c,
        }
    }
}

#[derive(Parser)]
struct Cli {
    /// Increase logging verbosity. Can be specified multiple times
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Subcommands,
}

impl Cli {
    fn run() -> Result<()> {
        let cli = Self::parse();

        let log_level = match cli.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        let mut builder = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(log_level.as_str()),
        );

        builder.init();

        let command = cli.command.as_cli_command();

        command.run()
    }
}

fn main() {
    let exit_code = match Cli::run() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {err}");
            1
        }
    };

    std::process::exit(exit_code)
}
