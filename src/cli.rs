use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use lectern::config::EmbedderKind;

#[derive(Debug, Parser)]
#[command(
    name = "lectern",
    about = "Subject-scoped semantic search over your course materials"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Override the sentence-embedding model ID or local model path
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Embedder backend: sentence or hash
    #[arg(long, global = true)]
    pub embedder: Option<EmbedderKind>,

    /// Override the language-model service URL
    #[arg(long, global = true)]
    pub ai_url: Option<String>,

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
    /// Ingest documents or directories of documents under a subject
    Ingest(IngestArgs),
    /// Search ingested materials
    Search(SearchArgs),
    /// Print the grounding context block for a question
    Context(ContextArgs),
    /// List subjects with ingested materials
    Subjects(SubjectsArgs),
    /// Ask the tutor a question answered from the materials
    Ask(AskArgs),
    /// Explain the answer to a multiple-choice question
    Explain(ExplainArgs),
    /// Get a hint for a multiple-choice question
    Hint(HintArgs),
    /// Grade a short written answer
    Evaluate(EvaluateArgs),
    /// Show system status and statistics
    Status(StatusArgs),
    /// Start MCP server for AI agent integration
    Mcp,
    /// Manage the embedding model configuration
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Manage persisted settings
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
    /// Files or directories to ingest (.pdf, .txt, .md)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Subject tag for the ingested passages
    #[arg(short, long)]
    pub subject: String,

    /// Description recorded for the subject
    #[arg(short, long)]
    pub description: Option<String>,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Search only within this subject
    #[arg(short, long)]
    pub subject: Option<String>,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "3")]
    pub count: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Context --

#[derive(Debug, Parser)]
pub struct ContextArgs {
    /// The question to find context for
    pub query: String,

    /// Subject whose materials are searched
    #[arg(short, long)]
    pub subject: String,

    /// Number of passages to include
    #[arg(short = 'n', long, default_value = "3")]
    pub count: usize,
}

// -- Subjects --

#[derive(Debug, Parser)]
pub struct SubjectsArgs {
    /// Also list each subject's source documents
    #[arg(long)]
    pub sources: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Ask --

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question
    pub question: String,

    /// Subject whose materials ground the answer
    #[arg(short, long)]
    pub subject: String,

    /// Earlier conversation to pass along
    #[arg(long, default_value = "")]
    pub conversation: String,
}

// -- Quiz --

#[derive(Debug, Parser)]
pub struct QuizArgs {
    /// The question text
    pub question: String,

    /// Answer option, repeated in order (A, B, C, ...)
    #[arg(short, long = "option")]
    pub options: Vec<String>,

    /// Subject whose materials ground the reply
    #[arg(short, long)]
    pub subject: String,
}

#[derive(Debug, Parser)]
pub struct ExplainArgs {
    #[command(flatten)]
    pub quiz: QuizArgs,

    /// The correct option
    #[arg(short, long)]
    pub correct: String,

    /// What the student wants explained
    #[arg(short, long, default_value = "Explain the correct answer.")]
    pub request: String,
}

#[derive(Debug, Parser)]
pub struct HintArgs {
    #[command(flatten)]
    pub quiz: QuizArgs,
}

#[derive(Debug, Parser)]
pub struct EvaluateArgs {
    /// The question text
    pub question: String,

    /// The student's answer
    #[arg(short, long)]
    pub answer: String,

    /// A point a complete answer covers (repeatable)
    #[arg(short, long = "expect")]
    pub expected: Vec<String>,

    /// Subject whose materials ground the grade
    #[arg(short, long)]
    pub subject: String,

    /// Output as JSON
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

// -- Model --

#[derive(Debug, Subcommand)]
pub enum ModelAction {
    /// Show the currently resolved model
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist a default model ID or local path in config.redb
    Set {
        /// Model ID (HuggingFace) or local path
        model: String,
    },
    /// Clear the stored model setting (revert to default)
    Clear,
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print a stored setting
    Get {
        key: String,
    },
    /// Store a setting
    Set {
        key: String,
        value: String,
    },
    /// Remove a stored setting
    Unset {
        key: String,
    },
    /// List stored settings
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
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
            "lectern",
            &mut std::io::stdout(),
        );
    }
}
