use clap::Parser;
use docsect::{
    DataDir,
    IngestInput,
    LocalVectorStore,
    SectionDb,
    config,
    error::{self, Error},
    material::MaterialStatus,
    pipeline,
    retrieval,
    subject_search::{self, SubjectSearchOptions},
};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, ConfigAction};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCSECT_LOG") {
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
    let db = SectionDb::open(&data_dir.sections_db())?;

    match cli.command {
        Command::Ingest(args) => {
            let vectors = LocalVectorStore::open(&data_dir.vectors_db())?;
            cmd_ingest(&db, &vectors, &args)?;
        }
        Command::Sections(args) => {
            cmd_sections(&db, &args)?;
        }
        Command::Query(args) => {
            let vectors = LocalVectorStore::open(&data_dir.vectors_db())?;
            cmd_query(&db, &vectors, &args)?;
        }
        Command::Search(args) => {
            cmd_search(&db, &args)?;
        }
        Command::Remove { doc_id } => {
            let vectors = LocalVectorStore::open(&data_dir.vectors_db())?;
            cmd_remove(&db, &vectors, &doc_id)?;
        }
        Command::Status(args) => {
            cmd_status(&db, &data_dir, args.json)?;
        }
        Command::Config { action } => match action {
            ConfigAction::Get { key } => config_get(&db, &key)?,
            ConfigAction::Set { key, value } => config_set(&db, &key, &value)?,
            ConfigAction::List { json } => config_list(&db, json)?,
            ConfigAction::Clear { key } => config_clear(&db, &key)?,
        },
        Command::Completions(_) => {}
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> error::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_ingest(
    db: &SectionDb,
    vectors: &LocalVectorStore,
    args: &cli::IngestArgs,
) -> error::Result<()> {
    let raw = std::fs::read_to_string(&args.file)?;
    let input: IngestInput = serde_json::from_str(&raw)?;
    let config = config::chunking_config(db)?;

    let report = pipeline::ingest_input(db, vectors, input, &config)?;

    if args.json {
        print_json(&report)?;
    } else {
        println!("Ingested '{}'", report.doc_id);
        println!(
            "  Sections saved: {} ({} parts, {} chunks)",
            report.sections_saved, report.parts_saved, report.chunks_saved
        );
        println!(
            "  Boundaries refined: {}, kept as extracted: {}",
            report.refined, report.unrefined
        );
        println!(
            "  Skipped: {} already processed, {} too short",
            report.skipped_processed, report.skipped_short
        );
        if report.failed > 0 {
            println!("  Failed: {}", report.failed);
        }
    }
    Ok(())
}

fn cmd_sections(db: &SectionDb, args: &cli::SectionsArgs) -> error::Result<()> {
    if db.get_material(&args.doc_id)?.is_none() {
        return Err(Error::NotFound {
            kind: "material",
            name: args.doc_id.clone(),
        });
    }

    let matcher = args
        .pattern
        .as_deref()
        .map(|pattern| {
            globset::Glob::new(pattern)
                .map(|g| g.compile_matcher())
                .map_err(|e| {
                    Error::Config(format!("invalid glob pattern: {e}"))
                })
        })
        .transpose()?;

    let sections: Vec<_> = db
        .list_sections(&args.doc_id)?
        .into_iter()
        .filter(|s| matcher.as_ref().is_none_or(|m| m.is_match(&s.path)))
        .collect();

    if args.json {
        print_json(&sections)?;
    } else if sections.is_empty() {
        println!("No sections found.");
    } else {
        for s in &sections {
            println!(
                "{}\t{}\t{}\tpp. {}-{}\t{} chars",
                s.section_id,
                s.path,
                s.clean_title,
                s.page_start,
                s.page_end,
                s.char_end - s.char_start
            );
        }
        println!("\n{} section(s)", sections.len());
    }
    Ok(())
}

fn cmd_query(
    db: &SectionDb,
    vectors: &LocalVectorStore,
    args: &cli::QueryArgs,
) -> error::Result<()> {
    let mut scoring = config::scoring_config(db)?;
    if let Some(count) = args.count {
        scoring.top_k = count;
    }

    let candidates =
        retrieval::retrieve(db, vectors, &args.doc_id, &args.message, &scoring)?;

    if args.json {
        print_json(&candidates)?;
    } else {
        retrieval::format_human(&candidates);
    }
    Ok(())
}

fn cmd_search(db: &SectionDb, args: &cli::SearchArgs) -> error::Result<()> {
    let documents = subject_search::subject_documents(db, &args.subject_id)?;
    let options = SubjectSearchOptions {
        limit: args.count,
        preview_len: args.preview_len,
    };

    let results = subject_search::search_subject(&args.query, &documents, &options);

    if args.json {
        print_json(&results)?;
    } else {
        subject_search::format_human(&results);
    }
    Ok(())
}

fn cmd_remove(
    db: &SectionDb,
    vectors: &LocalVectorStore,
    doc_id: &str,
) -> error::Result<()> {
    if !db.remove_material(doc_id)? {
        return Err(Error::NotFound {
            kind: "material",
            name: doc_id.to_string(),
        });
    }
    let registrations = vectors.remove_document(doc_id)?;
    println!("Removed '{doc_id}' ({registrations} vector registration(s))");
    Ok(())
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct MaterialStatusLine {
    doc_id: String,
    name: String,
    subject_id: String,
    status: MaterialStatus,
    total_sections: usize,
    processed_sections: usize,
    saved_sections: usize,
}

fn cmd_status(
    db: &SectionDb,
    data_dir: &DataDir,
    json: bool,
) -> error::Result<()> {
    let mut lines = Vec::new();
    for material in db.list_materials()? {
        let toc = db.get_toc_analysis(&material.doc_id)?;
        lines.push(MaterialStatusLine {
            saved_sections: db.list_sections(&material.doc_id)?.len(),
            total_sections: toc.as_ref().map_or(0, |t| t.total_sections),
            processed_sections: toc.as_ref().map_or(0, |t| t.processed_sections),
            doc_id: material.doc_id,
            name: material.name,
            subject_id: material.subject_id,
            status: material.status,
        });
    }

    if json {
        print_json(&serde_json::json!({
            "dataDir": data_dir.root(),
            "materials": lines,
        }))?;
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Materials: {}", lines.len());
        for l in &lines {
            println!(
                "  {} [{}] {:?}: {}/{} TOC sections processed, {} saved",
                l.doc_id,
                l.subject_id,
                l.status,
                l.processed_sections,
                l.total_sections,
                l.saved_sections
            );
        }
    }
    Ok(())
}

fn config_get(db: &SectionDb, key: &str) -> error::Result<()> {
    let default = config::default_value(key).ok_or_else(|| Error::NotFound {
        kind: "setting",
        name: key.to_string(),
    })?;
    println!("{}", db.get_setting_or(key, &default)?);
    Ok(())
}

fn config_set(db: &SectionDb, key: &str, value: &str) -> error::Result<()> {
    config::validate(key, value)?;
    db.set_setting(key, value)?;
    println!("Set {key} = {value}");
    Ok(())
}

fn config_list(db: &SectionDb, json: bool) -> error::Result<()> {
    let mut settings = Vec::new();
    for key in config::KNOWN_KEYS {
        let default = config::default_value(key).unwrap_or_default();
        settings.push((key, db.get_setting_or(key, &default)?));
    }

    if json {
        let map: serde_json::Map<String, serde_json::Value> = settings
            .into_iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v)))
            .collect();
        print_json(&map)?;
    } else {
        for (key, value) in &settings {
            println!("{key}\t{value}");
        }
    }
    Ok(())
}

fn config_clear(db: &SectionDb, key: &str) -> error::Result<()> {
    if !db.remove_setting(key)? {
        return Err(Error::NotFound {
            kind: "setting",
            name: key.to_string(),
        });
    }
    println!("Cleared {key}");
    Ok(())
}
