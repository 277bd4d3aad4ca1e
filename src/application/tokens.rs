//! Token budgeting helpers.
//!
//! Token counts are estimated, not computed with a model tokenizer: roughly
//! 0.75 words per token plus a little extra for punctuation. Prefixes and
//! suffixes of a text always estimate to at most the whole.

fn punct_count(word: &str) -> usize {
    word.chars().filter(|c| c.is_ascii_punctuation()).count()
}

fn estimate(words: usize, punct: usize) -> usize {
    (punct as f64).mul_add(0.1, words as f64 / 0.75) as usize
}

/// Estimates how many tokens `text` costs.
pub fn estimate_token_count(text: &str) -> usize {
    let (words, punct) = text
        .split_whitespace()
        .fold((0, 0), |(w, p), word| (w + 1, p + punct_count(word)));
    estimate(words, punct)
}

fn take_within<'a>(words: impl Iterator<Item = &'a str>, budget: usize) -> Vec<&'a str> {
    let mut taken = Vec::new();
    let mut punct = 0;
    for word in words {
        let next_punct = punct + punct_count(word);
        if estimate(taken.len() + 1, next_punct) > budget {
            break;
        }
        punct = next_punct;
        taken.push(word);
    }
    taken
}

/// Leading words of `text` that fit in `budget` tokens.
pub fn truncate_to_tokens(text: &str, budget: usize) -> String {
    take_within(text.split_whitespace(), budget).join(" ")
}

/// Trailing words of `text` that fit in `budget` tokens.
pub fn tail_within_tokens(text: &str, budget: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut tail = take_within(words.iter().rev().copied(), budget);
    tail.reverse();
    tail.join(" ")
}
