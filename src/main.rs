use clap::Parser;
use kdam::{BarExt, tqdm};
use lectern::{
    Corpus,
    assistant::{AssistantClient, QuizQuestion, Tutor, reply_text},
    config::{self, MODEL_KEY, Overrides, Settings},
    config_db::ConfigDb,
    data_dir::DataDir,
    error::{self, Error},
    mcp,
    snapshot::Snapshot,
    walker,
};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, ConfigAction, ModelAction};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("LECTERN_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;
    let overrides = Overrides {
        model: cli.model.clone(),
        embedder: cli.embedder,
        ai_url: cli.ai_url.clone(),
    };
    let settings = Settings::resolve(&overrides, Some(&config_db))?;

    match cli.command {
        Command::Ingest(args) => {
            let corpus = open_corpus(&data_dir, &settings)?;
            cmd_ingest(&corpus, &args)?;
        }
        Command::Search(args) => {
            let corpus = open_corpus(&data_dir, &settings)?;
            let results = corpus.try_search(
                &args.query,
                args.subject.as_deref(),
                args.count,
            )?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No results found for \"{}\"", args.query);
            } else {
                for (i, r) in results.iter().enumerate() {
                    println!(
                        "{}. [{}] {} (page {}) distance {:.4}",
                        i + 1,
                        r.subject,
                        r.source,
                        r.page,
                        r.distance
                    );
                    println!("   {}", preview(&r.text, 200));
                }
            }
        }
        Command::Context(args) => {
            let corpus = open_corpus(&data_dir, &settings)?;
            print!("{}", corpus.get_context(&args.query, &args.subject, args.count));
        }
        Command::Subjects(args) => {
            cmd_subjects(&data_dir, &args)?;
        }
        Command::Ask(args) => {
            let corpus = open_corpus(&data_dir, &settings)?;
            let client = AssistantClient::from_settings(&settings);
            let reply = Tutor::new(&corpus, &client).ask(
                &args.question,
                &args.conversation,
                &args.subject,
            );
            println!("{}", reply_text(reply));
        }
        Command::Explain(args) => {
            let corpus = open_corpus(&data_dir, &settings)?;
            let client = AssistantClient::from_settings(&settings);
            let (question, subject) = quiz_question(args.quiz, args.correct);
            let reply = Tutor::new(&corpus, &client).explain(
                &question,
                &args.request,
                &subject,
            );
            println!("{}", reply_text(reply));
        }
        Command::Hint(args) => {
            let corpus = open_corpus(&data_dir, &settings)?;
            let client = AssistantClient::from_settings(&settings);
            let (question, subject) = quiz_question(args.quiz, String::new());
            let reply = Tutor::new(&corpus, &client).hint(&question, &subject);
            println!("{}", reply_text(reply));
        }
        Command::Evaluate(args) => {
            let corpus = open_corpus(&data_dir, &settings)?;
            let client = AssistantClient::from_settings(&settings);
            let evaluation = Tutor::new(&corpus, &client).evaluate(
                &args.question,
                &args.answer,
                &args.subject,
                &args.expected,
            );
            if args.json {
                println!("{}", serde_json::to_string_pretty(&evaluation)?);
            } else {
                println!("Score: {}/5", evaluation.score);
                for strength in &evaluation.strengths {
                    println!("+ {strength}");
                }
                for improvement in &evaluation.improvements {
                    println!("- {improvement}");
                }
                println!("{}", evaluation.explanation);
                println!("{}", evaluation.suggestion);
            }
        }
        Command::Status(args) => {
            cmd_status(&data_dir, &settings, args.json)?;
        }
        Command::Mcp => {
            let corpus = open_corpus(&data_dir, &settings)?;
            mcp::run_mcp(corpus)?;
        }
        Command::Model { action } => match action {
            ModelAction::Show { json } => {
                let stored = config_db.get_setting(MODEL_KEY)?;
                if json {
                    println!(
                        "{}",
                        serde_json::json!({
                            "model": settings.model,
                            "embedder": settings.embedder.to_string(),
                            "stored": stored,
                        })
                    );
                } else {
                    println!("Model: {}", settings.model);
                    println!("Embedder: {}", settings.embedder);
                    match stored {
                        Some(model) => println!("Stored setting: {model}"),
                        None => println!("Stored setting: (default)"),
                    }
                }
            }
            ModelAction::Set { model } => {
                config_db.set_setting(MODEL_KEY, &model)?;
                println!("Default model set to '{model}'");
            }
            ModelAction::Clear => {
                if config_db.remove_setting(MODEL_KEY)? {
                    println!("Cleared stored model setting");
                } else {
                    println!("No stored model setting");
                }
            }
        },
        Command::Config { action } => cmd_config(&config_db, action)?,
        Command::Completions(_) => {}
    }

    Ok(())
}

fn open_corpus(data_dir: &DataDir, settings: &Settings) -> error::Result<Corpus> {
    let embedder = settings.build_embedder()?;
    Corpus::open(&data_dir.corpus_dir()?, embedder)
}

fn quiz_question(args: cli::QuizArgs, correct: String) -> (QuizQuestion, String) {
    let question = QuizQuestion {
        question: args.question,
        options: args.options,
        correct,
    };
    (question, args.subject)
}

fn cmd_ingest(corpus: &Corpus, args: &cli::IngestArgs) -> error::Result<()> {
    let documents = walker::discover_documents(&args.paths)?;
    if documents.is_empty() {
        eprintln!("No documents found.");
        return Ok(());
    }

    let mut progress = (documents.len() > 1)
        .then(|| tqdm!(total = documents.len(), desc = "Ingesting"));
    let mut passages = 0;
    let mut failed = 0;

    for path in &documents {
        match corpus.try_ingest(path, &args.subject, args.description.as_deref()) {
            Ok(added) => passages += added,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to ingest document");
                failed += 1;
            }
        }
        if let Some(pb) = progress.as_mut() {
            pb.update(1)?;
        }
    }
    if progress.is_some() {
        eprintln!();
    }

    println!(
        "Ingested {passages} passages from {} document(s) into '{}'",
        documents.len() - failed,
        args.subject
    );

    if failed > 0 {
        return Err(Error::IngestFailed(failed));
    }
    Ok(())
}

/// Read the persisted corpus without loading a model.
fn load_snapshot(data_dir: &DataDir) -> error::Result<Option<Snapshot>> {
    Snapshot::load(&data_dir.corpus_dir()?)
}

fn cmd_subjects(data_dir: &DataDir, args: &cli::SubjectsArgs) -> error::Result<()> {
    let Some(snapshot) = load_snapshot(data_dir)? else {
        if args.json {
            println!("[]");
        } else {
            println!("No subjects have been ingested.");
        }
        return Ok(());
    };
    let passages = &snapshot.passages;
    let subjects = passages.subjects();

    if args.json {
        let items: Vec<_> = subjects
            .iter()
            .map(|subject| {
                serde_json::json!({
                    "subject": subject,
                    "description": passages.description(subject),
                    "sources": passages.sources_for(subject),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if subjects.is_empty() {
        println!("No subjects have been ingested.");
    } else {
        for subject in &subjects {
            match passages.description(subject) {
                Some(description) => println!("{subject}\t{description}"),
                None => println!("{subject}"),
            }
            if args.sources {
                for source in passages.sources_for(subject) {
                    println!("  {source}");
                }
            }
        }
    }
    Ok(())
}

fn cmd_status(
    data_dir: &DataDir,
    settings: &Settings,
    json: bool,
) -> error::Result<()> {
    let snapshot = load_snapshot(data_dir)?;
    let passages = snapshot.as_ref().map_or(0, Snapshot::len);
    let dimension = snapshot.as_ref().map(|s| s.index.dimension());
    let subjects: Vec<String> = snapshot
        .as_ref()
        .map(|s| s.passages.subjects().into_iter().collect())
        .unwrap_or_default();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "data_dir": data_dir.root().display().to_string(),
                "embedder": settings.embedder_label(),
                "ai_url": settings.ai_url,
                "passages": passages,
                "dimension": dimension,
                "subjects": subjects,
            })
        );
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Embedder: {}", settings.embedder_label());
        println!("Language model service: {}", settings.ai_url);
        println!("Passages: {passages}");
        if let Some(dimension) = dimension {
            println!("Dimension: {dimension}");
        }
        println!("Subjects: {}", subjects.len());
        for subject in &subjects {
            println!("  {subject}");
        }
    }
    Ok(())
}

fn cmd_config(config_db: &ConfigDb, action: ConfigAction) -> error::Result<()> {
    match action {
        ConfigAction::Get { key } => match config_db.get_setting(&key)? {
            Some(value) => println!("{value}"),
            None => {
                return Err(Error::NotFound {
                    kind: "setting",
                    name: key,
                });
            }
        },
        ConfigAction::Set { key, value } => {
            config::validate_setting(&key, &value)?;
            config_db.set_setting(&key, &value)?;
            println!("Set {key} = {value}");
        }
        ConfigAction::Unset { key } => {
            if !config_db.remove_setting(&key)? {
                return Err(Error::NotFound {
                    kind: "setting",
                    name: key,
                });
            }
            println!("Removed {key}");
        }
        ConfigAction::List { json } => {
            let settings = config_db.list_settings()?;
            if json {
                let map: serde_json::Map<String, serde_json::Value> = settings
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect();
                println!("{}", serde_json::Value::Object(map));
            } else if settings.is_empty() {
                println!("No settings stored.");
            } else {
                for (key, value) in &settings {
                    println!("{key}\t{value}");
                }
            }
        }
    }
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
