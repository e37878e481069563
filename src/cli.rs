use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "docsect",
    about = "Section extraction, chunking and retrieval for academic materials"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest a material from a JSON file of { material, toc, pages }
    Ingest(IngestArgs),
    /// List the saved sections of a material
    Sections(SectionsArgs),
    /// Retrieve the sections of a material most relevant to a message
    Query(QueryArgs),
    /// Rank the ready materials of a subject
    Search(SearchArgs),
    /// Delete a material with its sections, chunks and registrations
    Remove {
        /// Material id
        doc_id: String,
    },
    /// Show stored materials and their processing state
    Status(StatusArgs),
    /// Manage tunable settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Ingest --

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Path to the input JSON file
    pub file: PathBuf,

    /// Output the ingestion report as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Sections --

#[derive(Debug, Parser)]
pub struct SectionsArgs {
    /// Material id
    pub doc_id: String,

    /// Glob pattern applied to section paths (e.g. "5.*")
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Output as JSON array
    #[arg(long)]
    pub json: bool,
}

// -- Query --

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// Material id
    pub doc_id: String,

    /// The user message
    pub message: String,

    /// Number of sections to return (defaults to the score.top_k setting)
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// Subject id
    pub subject_id: String,

    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Maximum preview length in characters
    #[arg(long, default_value = "200")]
    pub preview_len: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective value of a setting
    Get {
        /// Setting key
        key: String,
    },
    /// Persist a setting
    Set {
        /// Setting key
        key: String,
        /// New value
        value: String,
    },
    /// List every setting with its effective value
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear a stored setting (revert to default)
    Clear {
        /// Setting key
        key: String,
    },
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docsect",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_search_defaults() {
        let cli = Cli::parse_from(["docsect", "search", "s1", "keš memorija"]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.subject_id, "s1");
                assert_eq!(args.query, "keš memorija");
                assert_eq!(args.count, 10);
                assert_eq!(args.preview_len, 200);
                assert!(!args.json);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_query_count_is_optional() {
        let cli = Cli::parse_from(["docsect", "query", "m1", "hardver"]);
        match cli.command {
            Command::Query(args) => assert_eq!(args.count, None),
            _ => panic!("expected query command"),
        }

        let cli =
            Cli::parse_from(["docsect", "-v", "query", "m1", "hardver", "-n", "3"]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Query(args) => assert_eq!(args.count, Some(3)),
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn parse_config_set() {
        let cli = Cli::parse_from(["docsect", "config", "set", "chunk_size", "800"]);
        match cli.command {
            Command::Config {
                action: ConfigAction::Set { key, value },
            } => {
                assert_eq!(key, "chunk_size");
                assert_eq!(value, "800");
            }
            _ => panic!("expected config set command"),
        }
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let parsed = Cli::try_parse_from(["docsect", "-q", "-v", "status"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
