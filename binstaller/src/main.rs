#![deny(missing_docs)]

//! CLI binary interface for binstaller

use std::io::Write;

use axoasset::LocalAsset;
use binstaller::{config, embed_checksums, generate_script, net, validate, EmbedMode};
use binstaller_schema::InstallSpec;
use clap::Parser;
use console::Term;
use miette::IntoDiagnostic;

use crate::cli::{
    CheckArgs, Cli, Commands, EmbedArgs, EmbedModeKind, GenArgs, OutputFormat, SchemaArgs,
};

mod cli;

fn main() {
    let config = Cli::parse();
    axocli::CliAppBuilder::new("binstaller")
        .verbose(config.verbose)
        .json_errors(config.output_format == OutputFormat::Json)
        .start(config, real_main);
}

fn real_main(cli: &axocli::CliApp<Cli>) -> Result<(), miette::Report> {
    let config = &cli.config;
    match &config.command {
        Commands::Gen(args) => cmd_gen(config, args),
        Commands::Embed(args) => cmd_embed(config, args),
        Commands::Check(args) => cmd_check(config, args),
        Commands::Schema(args) => cmd_schema(config, args),
    }
}

fn cmd_gen(_cli: &Cli, args: &GenArgs) -> Result<(), miette::Report> {
    let script_type: binstaller::ScriptType = args.script_type.into();
    let spec = config::load_spec(&args.config)?;
    let script = generate_script(&spec, args.target_version.as_deref(), script_type)?;
    match &args.output {
        Some(path) => {
            // write-temp-then-rename: an interrupted run never leaves a
            // truncated script at the target path
            let tmp = camino::Utf8PathBuf::from(format!("{path}.tmp"));
            LocalAsset::write_new(&script, &tmp).into_diagnostic()?;
            std::fs::rename(&tmp, path).into_diagnostic()?;
            let mut out = Term::stderr();
            writeln!(out, "wrote {script_type} script to {path}").into_diagnostic()?;
        }
        None => print!("{script}"),
    }
    Ok(())
}

fn cmd_embed(_cli: &Cli, args: &EmbedArgs) -> Result<(), miette::Report> {
    let mode = match args.mode {
        EmbedModeKind::Download => EmbedMode::Download,
        EmbedModeKind::ChecksumFile => {
            let file = args.file.clone().ok_or_else(|| {
                miette::miette!("--file is required with --mode checksum-file")
            })?;
            EmbedMode::ChecksumFile(file)
        }
        EmbedModeKind::Calculate => EmbedMode::Calculate,
    };
    let client = net::create_client(&net::ClientSettings::new())?;
    let mut spec = config::load_spec(&args.config)?;
    let count = embed_checksums(&client, &mut spec, &args.version, mode)?;
    config::save_spec(&args.config, &spec)?;
    let mut out = Term::stderr();
    writeln!(
        out,
        "embedded {count} checksums for {} into {}",
        args.version, args.config
    )
    .into_diagnostic()?;
    Ok(())
}

fn cmd_check(cli: &Cli, args: &CheckArgs) -> Result<(), miette::Report> {
    let mut spec = config::load_spec(&args.config)?;
    spec.normalize();
    validate::validate_spec(&spec)?;
    match cli.output_format {
        OutputFormat::Human => {
            let mut out = Term::stdout();
            writeln!(out, "{} is a valid install spec", args.config).into_diagnostic()?;
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&spec).into_diagnostic()?;
            println!("{json}");
        }
    }
    Ok(())
}

fn cmd_schema(_cli: &Cli, _args: &SchemaArgs) -> Result<(), miette::Report> {
    let schema = InstallSpec::json_schema();
    let json = serde_json::to_string_pretty(&schema).into_diagnostic()?;
    println!("{json}");
    Ok(())
}
