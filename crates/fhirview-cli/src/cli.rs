use clap::{Parser, Subcommand};
use fhirview_sof::TranspileOptions;

#[derive(Parser)]
#[command(name = "fhirview")]
#[command(about = "fhirview — transpile SQL on FHIR ViewDefinitions to T-SQL")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Source table holding FHIR resources
    #[arg(long, global = true, env = "FHIRVIEW_TABLE", default_value = "fhir_resources")]
    pub table: String,

    /// Schema of the source table
    #[arg(long, global = true, env = "FHIRVIEW_SCHEMA", default_value = "dbo")]
    pub schema: String,

    /// Column holding the resource id
    #[arg(long, global = true, default_value = "id")]
    pub id_column: String,

    /// Column holding the resource JSON
    #[arg(long, global = true, default_value = "json")]
    pub json_column: String,
}

impl Cli {
    pub fn transpile_options(&self) -> TranspileOptions {
        TranspileOptions {
            table_name: self.table.clone(),
            schema_name: self.schema.clone(),
            resource_id_column: self.id_column.clone(),
            resource_json_column: self.json_column.clone(),
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transpile a ViewDefinition to a SELECT statement
    Transpile(TranspileArgs),
    /// Emit a CREATE VIEW statement
    CreateView(CreateViewArgs),
    /// Emit a SELECT INTO statement materialising the view
    CreateTable(CreateTableArgs),
    /// Validate a ViewDefinition without generating SQL
    Validate(ValidateArgs),
}

#[derive(clap::Args)]
pub struct TranspileArgs {
    /// Path to the ViewDefinition JSON (reads from stdin if omitted)
    pub file: Option<String>,
}

#[derive(clap::Args)]
pub struct CreateViewArgs {
    /// Name of the view to create
    pub name: String,
    /// Path to the ViewDefinition JSON (reads from stdin if omitted)
    pub file: Option<String>,
}

#[derive(clap::Args)]
pub struct CreateTableArgs {
    /// Name of the table to materialise into
    pub name: String,
    /// Path to the ViewDefinition JSON (reads from stdin if omitted)
    pub file: Option<String>,
}

#[derive(clap::Args)]
pub struct ValidateArgs {
    /// Path to the ViewDefinition JSON (reads from stdin if omitted)
    pub file: Option<String>,
}
