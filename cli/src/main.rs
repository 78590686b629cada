use apollo_compiler::ExecutableDocument;
use clap::Parser;
use federation_query_planner::{ComposedSchema, QueryPlanner, QueryPlannerConfig};
use std::path::PathBuf;

/// Build a query plan for an operation against a composed supergraph.
#[derive(Parser)]
struct Cli {
    /// Path to the composed supergraph schema (SDL with join directives).
    schema: PathBuf,
    /// Path to the operation document.
    query: PathBuf,
    /// Operation to plan when the document contains more than one.
    #[arg(long)]
    operation_name: Option<String>,
    /// Compress repeated selection sets into generated fragments.
    #[arg(long)]
    auto_fragmentization: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let schema_source = std::fs::read_to_string(&cli.schema)?;
    let supergraph = ComposedSchema::parse(&schema_source)?;

    let query_source = std::fs::read_to_string(&cli.query)?;
    let document = ExecutableDocument::parse_and_validate(
        supergraph.schema(),
        query_source,
        cli.query.display().to_string(),
    )
    .map_err(|err| err.errors.to_string())?;

    let planner = QueryPlanner::new(
        supergraph,
        QueryPlannerConfig {
            auto_fragmentization: cli.auto_fragmentization,
        },
    );
    let plan = planner.build_query_plan(&document, cli.operation_name.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
