use std::io::Read;

use anyhow::Context;
use fhirview_sof::{SqlGenerator, ViewDefinition};

use crate::cli::{Cli, CreateTableArgs, CreateViewArgs, TranspileArgs, ValidateArgs};
use crate::output;

/// Command failure, split by exit code: compilation errors exit 1,
/// I/O errors exit 2.
#[derive(Debug)]
pub enum CommandError {
    Compile(fhirview_sof::Error),
    Io(anyhow::Error),
}

impl CommandError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Compile(_) => 1,
            Self::Io(_) => 2,
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compile(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "{e:#}"),
        }
    }
}

impl From<fhirview_sof::Error> for CommandError {
    fn from(e: fhirview_sof::Error) -> Self {
        Self::Compile(e)
    }
}

pub fn transpile(cli: &Cli, args: &TranspileArgs) -> Result<(), CommandError> {
    let view = load_view(args.file.as_deref())?;
    let generator = SqlGenerator::with_options(cli.transpile_options());
    let generated = generator.generate(&view)?;
    println!("{}", generated.sql);
    Ok(())
}

pub fn create_view(cli: &Cli, args: &CreateViewArgs) -> Result<(), CommandError> {
    let view = load_view(args.file.as_deref())?;
    let generator = SqlGenerator::with_options(cli.transpile_options());
    println!("{}", generator.create_view(&view, &args.name)?);
    Ok(())
}

pub fn create_table(cli: &Cli, args: &CreateTableArgs) -> Result<(), CommandError> {
    let view = load_view(args.file.as_deref())?;
    let generator = SqlGenerator::with_options(cli.transpile_options());
    println!("{}", generator.create_table(&view, &args.name)?);
    Ok(())
}

pub fn validate(_cli: &Cli, args: &ValidateArgs) -> Result<(), CommandError> {
    let value = read_json(args.file.as_deref())?;
    let view = fhirview_sof::parse_view_definition(&value)?;
    output::print_success(&format!(
        "valid ViewDefinition for {} ({} columns: {})",
        view.resource,
        view.column_names().len(),
        view.column_names().join(", ")
    ));
    Ok(())
}

fn load_view(file: Option<&str>) -> Result<ViewDefinition, CommandError> {
    let text = read_input(file)?;
    Ok(ViewDefinition::parse(&text)?)
}

fn read_json(file: Option<&str>) -> Result<serde_json::Value, CommandError> {
    let text = read_input(file)?;
    serde_json::from_str(&text)
        .map_err(|e| CommandError::Compile(fhirview_sof::Error::InvalidViewDefinition {
            pointer: String::new(),
            message: e.to_string(),
        }))
}

fn read_input(file: Option<&str>) -> Result<String, CommandError> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {path}"))
            .map_err(CommandError::Io),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")
                .map_err(CommandError::Io)?;
            Ok(buffer)
        }
    }
}
