//! Splits fetched documents into searchable chunks.
//!
//! Sections follow markdown headings. Short sections are merged forward,
//! long ones are cut into windows on paragraph (or line) boundaries.

/// Sections shorter than this are merged with the next one.
pub const MIN_CHUNK_CHARS: usize = 200;
/// Sections longer than this are split into windows.
pub const MAX_CHUNK_CHARS: usize = 2400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub title: String,
    pub content: String,
    pub index: usize,
}

pub fn chunk_markdown(input: &str) -> Vec<Chunk> {
    chunk_markdown_with(input, MIN_CHUNK_CHARS, MAX_CHUNK_CHARS)
}

pub fn chunk_markdown_with(input: &str, min_chars: usize, max_chars: usize) -> Vec<Chunk> {
    let mut sections = Vec::new();
    let mut current_title = String::from("Intro");
    let mut current_lines: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in input.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        let heading = if in_fence { None } else { parse_heading(line) };
        if let Some(title) = heading {
            push_section(&mut sections, &current_title, &current_lines);
            current_title = title;
            current_lines.clear();
        } else {
            current_lines.push(line);
        }
    }
    push_section(&mut sections, &current_title, &current_lines);

    let merged = merge_small_chunks(sections, min_chars);
    let mut chunks = Vec::new();
    for chunk in merged {
        for content in split_long(&chunk.content, max_chars) {
            chunks.push(Chunk {
                title: chunk.title.clone(),
                content,
                index: chunks.len(),
            });
        }
    }
    chunks
}

fn push_section(sections: &mut Vec<Chunk>, title: &str, lines: &[&str]) {
    let content = lines.join("\n").trim().to_string();
    if !content.is_empty() {
        sections.push(Chunk {
            title: title.to_string(),
            content,
            index: sections.len(),
        });
    }
}

fn parse_heading(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return None;
    }
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    // "#hashtag" is not a heading.
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

fn merge_small_chunks(chunks: Vec<Chunk>, min_chars: usize) -> Vec<Chunk> {
    if chunks.len() <= 1 {
        return chunks;
    }

    let mut merged = Vec::new();
    let mut i = 0;
    while i < chunks.len() {
        let mut current = chunks[i].clone();
        while current.content.len() < min_chars && i + 1 < chunks.len() {
            i += 1;
            let next = &chunks[i];
            current.content.push_str("\n\n");
            current.content.push_str(&next.content);
        }
        current.index = merged.len();
        merged.push(current);
        i += 1;
    }

    merged
}

fn split_long(content: &str, max_chars: usize) -> Vec<String> {
    if content.len() <= max_chars {
        return vec![content.to_string()];
    }

    let mut windows = Vec::new();
    let mut current = String::new();
    for piece in content.split("\n\n").flat_map(|para| split_oversized(para, max_chars)) {
        if !current.is_empty() && current.len() + piece.len() + 2 > max_chars {
            windows.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(&piece);
    }
    if !current.trim().is_empty() {
        windows.push(current);
    }
    windows
}

/// Cut a single paragraph that alone exceeds the limit, on line and then
/// char boundaries.
fn split_oversized(paragraph: &str, max_chars: usize) -> Vec<String> {
    if paragraph.len() <= max_chars {
        return vec![paragraph.to_string()];
    }

    let mut out = Vec::new();
    let mut current = String::new();
    for line in paragraph.lines() {
        let mut line = line;
        while line.len() > max_chars {
            let cut = floor_char_boundary(line, max_chars);
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            out.push(line[..cut].to_string());
            line = &line[cut..];
        }
        if !current.is_empty() && current.len() + line.len() + 1 > max_chars {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut idx = index.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx.max(1)
}
