use serde::Serialize;
use toxiscan_lib::api::{has_flag, parse_arg_value};
use toxiscan_lib::models::TextUnit;
use toxiscan_lib::services::text_processor::{chunk_units, normalize_transcript, sentence_units};

fn preview(s: &str, max_chars: usize) -> String {
    let mut out: String = s.chars().take(max_chars).collect();
    if s.chars().count() > max_chars {
        out.push_str("...");
    }
    out.replace('\n', " ")
}

fn print_units(title: &str, tag: char, units: &[TextUnit], limit: usize) {
    println!("{}: {}", title, units.len());
    for u in units.iter().take(limit) {
        println!(
            "[{}{:04}] chars={}  {}",
            tag,
            u.index,
            u.text.chars().count(),
            preview(&u.text, 120)
        );
    }
    if units.len() > limit {
        println!("... ({} more)", units.len() - limit);
    }
    println!();
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!(
            "Usage:\n  cargo run --bin segment_text -- <path.txt> [--chunk <chars>] [--sentences <n>] [--chunks <n>] [--no-chunks] [--out <json_path>]\n\nPrints how a transcript is split into sentences and fixed-size chunks without calling any model service."
        );
        return Ok(());
    }

    let path = args[1].clone();
    let chunk_size: usize = match parse_arg_value(&args, "--chunk") {
        Some(v) => v.parse()?,
        None => 400,
    };
    let sentences_n: usize = parse_arg_value(&args, "--sentences")
        .and_then(|s| s.parse().ok())
        .unwrap_or(50);
    let chunks_n: usize = parse_arg_value(&args, "--chunks")
        .and_then(|s| s.parse().ok())
        .unwrap_or(20);
    let show_chunks = !has_flag(&args, "--no-chunks");
    let out_path = parse_arg_value(&args, "--out");

    let raw = std::fs::read_to_string(&path)?;
    let text = normalize_transcript(&raw);
    let source = std::path::Path::new(&path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.clone());

    println!("File: {}", path);
    println!("Text: {} chars ({} bytes)", text.chars().count(), text.len());
    println!("Chunk size: {}", chunk_size);
    println!();

    let sentences = sentence_units(&source, &text);
    print_units("Sentences", 'S', &sentences, sentences_n);

    let chunks = if show_chunks {
        chunk_units(&source, &text, chunk_size)?
    } else {
        Vec::new()
    };
    if show_chunks {
        print_units("Chunks", 'C', &chunks, chunks_n);
    }

    let oversized = sentences
        .iter()
        .filter(|s| s.text.chars().count() > chunk_size)
        .count();
    println!("Sentences longer than one chunk: {}", oversized);

    if let Some(out_path) = out_path {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Output {
            file: String,
            chunk_size: usize,
            text_chars: usize,
            sentences: Vec<TextUnit>,
            chunks: Vec<TextUnit>,
        }

        let out = Output {
            file: path.clone(),
            chunk_size,
            text_chars: text.chars().count(),
            sentences,
            chunks,
        };

        std::fs::write(&out_path, serde_json::to_string_pretty(&out)?)?;
        println!();
        println!("Wrote JSON: {}", out_path);
    }

    Ok(())
}
