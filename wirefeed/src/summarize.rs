//! Extractive summarizer.
//!
//! Picks the `k` sentences whose non-stop-word tokens occur most often across
//! the whole text and returns them in their original order. Pure and
//! deterministic; ties go to the earlier sentence.

use std::collections::HashMap;

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and",
    "any", "are", "as", "at", "be", "because", "been", "before", "being", "below",
    "between", "both", "but", "by", "can", "could", "did", "do", "does", "doing", "down",
    "during", "each", "few", "for", "from", "further", "had", "has", "have", "having", "he",
    "her", "here", "hers", "herself", "him", "himself", "his", "how", "i", "if", "in",
    "into", "is", "it", "its", "itself", "just", "me", "more", "most", "my", "myself", "no",
    "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours",
    "ourselves", "out", "over", "own", "same", "she", "should", "so", "some", "such",
    "than", "that", "the", "their", "theirs", "them", "themselves", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom",
    "why", "will", "with", "would", "you", "your", "yours", "yourself", "yourselves",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Reduce `text` to its `k` most salient sentences.
pub fn summarize(text: &str, k: usize) -> String {
    if k == 0 {
        return String::new();
    }
    let sentences = split_sentences(text);
    if sentences.len() <= k {
        return sentences.join(" ");
    }

    let tokenized: Vec<Vec<String>> = sentences.iter().map(|s| tokenize(s)).collect();

    let mut frequencies: HashMap<&str, usize> = HashMap::new();
    for token in tokenized.iter().flatten() {
        *frequencies.entry(token.as_str()).or_insert(0) += 1;
    }

    if frequencies.is_empty() {
        return sentences[..k].join(" ");
    }

    let mut ranked: Vec<(usize, usize)> = tokenized
        .iter()
        .enumerate()
        .map(|(position, tokens)| {
            let score = tokens
                .iter()
                .map(|t| frequencies.get(t.as_str()).copied().unwrap_or(0))
                .sum();
            (position, score)
        })
        .collect();

    // stable: equal scores keep ascending position
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let mut chosen: Vec<usize> = ranked.into_iter().take(k).map(|(position, _)| position).collect();
    chosen.sort_unstable();

    chosen
        .into_iter()
        .map(|position| sentences[position].as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split on `.`, `?` or `!` followed by whitespace, after collapsing whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = collapsed.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '?' | '!') && chars.peek() == Some(&' ') {
            chars.next();
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }

    sentences
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Lowercase alphanumeric words minus stop words. Anything after an apostrophe
/// ("AI's", "don't") is dropped, other punctuation splits words.
fn tokenize(sentence: &str) -> Vec<String> {
    sentence
        .split_whitespace()
        .map(|word| word.split(['\'', '\u{2019}']).next().unwrap_or(""))
        .flat_map(|word| word.split(|c: char| !c.is_alphanumeric()))
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .filter(|token| !is_stop_word(token))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_sentences_with_repeated_terms() {
        let text = "AI grows fast. Stocks rise today. Rain expected tomorrow. AI stocks surge.";
        assert_eq!(summarize(text, 2), "AI grows fast. AI stocks surge.");
    }

    #[test]
    fn short_text_is_returned_whole() {
        let text = "  First   line here.\nSecond line!  ";
        assert_eq!(summarize(text, 2), "First line here. Second line!");
        assert_eq!(summarize(text, 5), "First line here. Second line!");
    }

    #[test]
    fn empty_input_and_zero_k() {
        assert_eq!(summarize("", 3), "");
        assert_eq!(summarize("   \n\t ", 3), "");
        assert_eq!(summarize("Something happened.", 0), "");
    }

    #[test]
    fn only_stop_words_falls_back_to_leading_sentences() {
        let text = "It is what it is. We were there. They had been. Was it?";
        assert_eq!(summarize(text, 2), "It is what it is. We were there.");
    }

    #[test]
    fn ties_go_to_earlier_sentences() {
        let text = "Alpha beta. Gamma delta. Epsilon zeta. Eta theta.";
        assert_eq!(summarize(text, 2), "Alpha beta. Gamma delta.");
    }

    #[test]
    fn selection_keeps_original_order() {
        let text = "Budget talks stall. Weather is mild. Budget vote delayed again as budget fight grows.";
        // the third sentence outranks the first, but the first still comes first
        assert_eq!(
            summarize(text, 2),
            "Budget talks stall. Budget vote delayed again as budget fight grows."
        );
    }

    #[test]
    fn repeated_calls_are_identical() {
        let text = "Markets open higher. Oil slips. Markets close higher as oil rebounds. Analysts shrug.";
        assert_eq!(summarize(text, 2), summarize(text, 2));
    }

    #[test]
    fn splitting_needs_whitespace_after_terminator() {
        let sentences = split_sentences("Version 2.5 shipped. Really?! Yes.");
        assert_eq!(sentences, vec!["Version 2.5 shipped.", "Really?!", "Yes."]);
    }

    #[test]
    fn tokenizer_strips_possessives_and_stop_words() {
        assert_eq!(tokenize("The AI's rise, and Canada-wide growth!"), vec![
            "ai", "rise", "canada", "wide", "growth"
        ]);
    }
}
