use crate::srt::CaptionEntry;

use anyhow::{Context, Result};
use regex::Regex;

#[derive(Debug, Clone, Default)]
pub struct CaptionStyle {
    pub strip_markup: bool,
    pub uppercase: bool,
}

/// Turns caption text into what ends up on screen.
pub struct CaptionFormatter {
    style: CaptionStyle,
    markup: Vec<Regex>,
}

impl CaptionFormatter {
    pub fn new(style: CaptionStyle) -> Result<Self> {
        Ok(Self {
            style,
            markup: load_regex()?,
        })
    }

    pub fn format(&self, text: &str) -> String {
        let mut text = text.to_string();
        if self.style.strip_markup {
            for regex in &self.markup {
                text = regex.replace_all(&text, "").into_owned();
            }
            text = text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
        }
        if self.style.uppercase {
            text = text.to_uppercase();
        }
        text
    }
}

fn load_regex() -> Result<Vec<Regex>> {
    // HTML-ish tags (`<i>`, `<font color=...>`) and ASS override blocks (`{\an8}`).
    const PATTERNS: [&str; 2] = [r"</?[A-Za-z][^>]*>", r"\{\\[^}]*\}"];
    PATTERNS
        .iter()
        .map(|p| Regex::new(p).context("Invalid markup pattern."))
        .collect()
}

/// Sequence numbers 1..n in track order.
pub fn renumber(entries: &[CaptionEntry]) -> Vec<CaptionEntry> {
    let mut seqnum = 0;
    entries
        .iter()
        .cloned()
        .map(|mut e| {
            seqnum += 1;
            e.index = seqnum;
            e
        })
        .collect()
}
