//! Implementations of the `pdfchat` subcommands.
//!
//! Each `run_*` function loads what it needs from the [`Config`], performs
//! one action, and prints human-readable output to stdout. Diagnostics go
//! through `tracing` to stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::conversation::Answer;
use crate::extract::extract_documents;
use crate::index;
use crate::models::UploadedFile;
use crate::session::Session;

/// Reads PDF files from disk, keeping the order they were given in.
pub fn read_uploads(paths: &[PathBuf]) -> Result<Vec<UploadedFile>> {
    paths
        .iter()
        .map(|path| -> Result<UploadedFile> {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read PDF: {}", path.display()))?;
            Ok(UploadedFile::new(display_name(path), bytes))
        })
        .collect()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub async fn run_init(config: &Config) -> Result<()> {
    let pool = index::open_store(&config.index).await?;
    pool.close().await;
    println!(
        "Index initialized at {}",
        config.index.db_path().display()
    );
    Ok(())
}

pub fn run_extract(paths: &[PathBuf]) -> Result<()> {
    let files = read_uploads(paths)?;
    let text = extract_documents(&files)?;
    print!("{}", text);
    Ok(())
}

#[derive(Serialize)]
struct ChunkOutput<'a> {
    index: i64,
    chars: usize,
    hash: &'a str,
    text: &'a str,
}

pub fn run_chunk(config: &Config, paths: &[PathBuf], json: bool) -> Result<()> {
    let files = read_uploads(paths)?;
    let text = extract_documents(&files)?;
    let chunks = chunk_text(&text, &config.chunking);

    if json {
        let out: Vec<ChunkOutput> = chunks
            .iter()
            .map(|c| ChunkOutput {
                index: c.index,
                chars: c.text.chars().count(),
                hash: &c.hash,
                text: &c.text,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{} chunks", chunks.len());
    for chunk in &chunks {
        println!();
        println!(
            "--- chunk {} ({} chars) ---",
            chunk.index,
            chunk.text.chars().count()
        );
        println!("{}", chunk.text);
    }
    Ok(())
}

pub async fn run_process(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let files = read_uploads(paths)?;
    let mut session = Session::open(config.clone()).await?;
    let summary = session.process(&files).await?;

    println!("Processing Complete!");
    println!("  files: {}", summary.files);
    println!("  characters: {}", summary.characters);
    println!("  chunks: {}", summary.chunks);
    println!("  collection: {}", summary.collection_id);
    Ok(())
}

pub async fn run_collections(config: &Config) -> Result<()> {
    let pool = index::open_store(&config.index).await?;
    let collections = index::list_collections(&pool).await?;
    pool.close().await;

    if collections.is_empty() {
        println!("No collections.");
        return Ok(());
    }

    println!(
        "{:<38} {:<21} {:>7}  MODEL",
        "ID", "CREATED", "CHUNKS"
    );
    for c in collections {
        let created = Utc
            .timestamp_opt(c.created_at, 0)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| c.created_at.to_string());
        println!(
            "{:<38} {:<21} {:>7}  {}",
            c.id, created, c.chunk_count, c.embedding_model
        );
    }
    Ok(())
}

pub async fn run_ask(
    config: &Config,
    collection: &str,
    question: &str,
    show_sources: bool,
) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        anyhow::bail!("question must not be empty");
    }

    let mut session = Session::open(config.clone()).await?;
    session.resume(collection).await?;
    let answer = session.ask(question).await?;
    print_answer(&answer, show_sources);
    Ok(())
}

/// Processes `paths`, then answers one question per stdin line until EOF
/// or `exit`.
pub async fn run_chat(config: &Config, paths: &[PathBuf], show_sources: bool) -> Result<()> {
    let files = read_uploads(paths)?;
    let mut session = Session::open(config.clone()).await?;
    let summary = session.process(&files).await?;
    println!(
        "Processing Complete! {} chunks from {} file(s). Ask a question about your documents.",
        summary.chunks, summary.files
    );

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        // A failed question leaves the conversation usable
        match session.ask(question).await {
            Ok(answer) => print_answer(&answer, show_sources),
            Err(e) => eprintln!("Error: {}", e),
        }
    }
    println!();
    Ok(())
}

fn print_answer(answer: &Answer, show_sources: bool) {
    println!("{}", answer.reply);
    if show_sources {
        for (i, source) in answer.sources.iter().enumerate() {
            println!();
            println!("[{}] {}", i + 1, source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn uploads_keep_argument_order_and_file_names() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("b-second.pdf");
        let b = tmp.path().join("a-first.pdf");
        fs::write(&a, b"one").unwrap();
        fs::write(&b, b"two").unwrap();

        let files = read_uploads(&[a, b]).unwrap();
        assert_eq!(files[0].name, "b-second.pdf");
        assert_eq!(files[0].bytes, b"one");
        assert_eq!(files[1].name, "a-first.pdf");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = read_uploads(&[PathBuf::from("/nonexistent/doc.pdf")]).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/doc.pdf"));
    }
}
