use include_dir::{include_dir, Dir};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;

use crate::definition::Difficulty;
use crate::error::{AssessError, Result};

static TEXT_DIR: Dir = include_dir!("src/texts");

/// Embedded word pool for one difficulty
#[derive(Deserialize, Clone, Debug)]
pub struct WordList {
    pub name: String,
    pub size: u32,
    pub words: Vec<String>,
}

impl WordList {
    pub fn for_difficulty(difficulty: Difficulty) -> Result<Self> {
        let file_name = format!("{difficulty}.json");
        let file = TEXT_DIR
            .get_file(&file_name)
            .ok_or_else(|| AssessError::Validation(format!("word list {file_name} not found")))?;
        let contents = file.contents_utf8().ok_or_else(|| {
            AssessError::Validation(format!("word list {file_name} is not utf-8"))
        })?;
        Ok(serde_json::from_str(contents)?)
    }
}

/// How a difficulty shapes the generated reference text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextProfile {
    pub words: usize,
    pub capitalize: bool,
    pub comma_chance: f64,
    pub digit_chance: f64,
    pub time_limit_seconds: u64,
}

impl TextProfile {
    pub fn for_difficulty(difficulty: Difficulty) -> Self {
        match difficulty {
            Difficulty::Easy => Self {
                words: 20,
                capitalize: false,
                comma_chance: 0.0,
                digit_chance: 0.0,
                time_limit_seconds: 60,
            },
            Difficulty::Medium => Self {
                words: 30,
                capitalize: true,
                comma_chance: 0.1,
                digit_chance: 0.0,
                time_limit_seconds: 60,
            },
            Difficulty::Hard => Self {
                words: 30,
                capitalize: true,
                comma_chance: 0.2,
                digit_chance: 0.1,
                time_limit_seconds: 90,
            },
        }
    }
}

/// Build a reference text for `difficulty`
pub fn generate<R: Rng + ?Sized>(difficulty: Difficulty, rng: &mut R) -> Result<String> {
    let list = WordList::for_difficulty(difficulty)?;
    let profile = TextProfile::for_difficulty(difficulty);
    let words: Vec<String> = (0..profile.words)
        .filter_map(|_| list.words.choose(rng).cloned())
        .collect();
    Ok(format_words(words, &profile, rng))
}

fn format_words<R: Rng + ?Sized>(words: Vec<String>, profile: &TextProfile, rng: &mut R) -> String {
    let count = words.len();
    let mut out = Vec::with_capacity(count);

    for (i, word) in words.into_iter().enumerate() {
        let mut word = if profile.capitalize && (i == 0 || rng.gen_bool(0.1)) {
            capitalize_first_letter(&word)
        } else {
            word
        };
        if profile.digit_chance > 0.0 && rng.gen_bool(profile.digit_chance) {
            out.push(rng.gen_range(2u32..=99).to_string());
        }
        if i + 1 < count && profile.comma_chance > 0.0 && rng.gen_bool(profile.comma_chance) {
            word.push(',');
        }
        out.push(word);
    }

    let mut text = out.join(" ");
    if profile.capitalize && !text.is_empty() {
        text.push('.');
    }
    text
}

fn capitalize_first_letter(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}
