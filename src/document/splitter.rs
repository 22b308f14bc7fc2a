use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::VecDeque;
use uuid::Uuid;

use super::{Chunk, ChunkMetadata, Page};

const SEPARATOR: &str = "\n\n";
const CLOSING_PUNCTUATION: &[char] = &['"', '\'', ')', ']', '}', '\u{201d}', '\u{2019}'];
/// Words that may precede a personal initial, as in "by J. Smith".
const NAME_LEAD_INS: &[&str] = &["and", "by", "from", "of", "with"];
const ABBREVIATIONS: &[&str] = &[
    "al", "approx", "cf", "ch", "dr", "e.g", "eq", "eqs", "fig", "figs", "i.e", "mr", "mrs",
    "ms", "pp", "prof", "ref", "refs", "resp", "sec", "tab", "viz", "vol", "vs",
];

lazy_static! {
    static ref HYPHENATED_BREAK: Regex =
        Regex::new(r"(\p{L})-[ \t]*\r?\n\s*(\p{Ll})").expect("hyphenation pattern is valid");
}

/// Sentence-aware splitter: sentences are packed into chunks of at most
/// `chunk_size` characters, neighbouring chunks sharing up to
/// `chunk_overlap` characters of trailing sentences.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        let sentences = split_sentences(text);
        self.merge_splits(&sentences)
    }

    /// Splits every page on its own so chunks never straddle a page break.
    pub fn split_pages(&self, pages: &[Page], source: &str) -> Vec<Chunk> {
        let ingested_at = Utc::now();
        let mut chunks = Vec::new();
        for page in pages {
            for content in self.split_text(&page.text) {
                let chunk_index = chunks.len();
                chunks.push(Chunk {
                    id: Uuid::new_v4().to_string(),
                    content,
                    metadata: ChunkMetadata {
                        source: source.to_string(),
                        page: page.number,
                        chunk_index,
                        ingested_at,
                    },
                });
            }
        }
        chunks
    }

    pub fn merge_splits<S: AsRef<str>>(&self, splits: &[S]) -> Vec<String> {
        let separator_len = char_len(SEPARATOR);
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let split = split.as_ref();
            let len = char_len(split);
            let joiner = if current.is_empty() { 0 } else { separator_len };

            if total + len + joiner > self.chunk_size {
                if total > self.chunk_size {
                    log::warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total,
                        self.chunk_size
                    );
                }
                if !current.is_empty() {
                    docs.push(self.join(&current));
                    loop {
                        let joiner = if current.is_empty() { 0 } else { separator_len };
                        let too_long = total > 0 && total + len + joiner > self.chunk_size;
                        if total <= self.chunk_overlap && !too_long {
                            break;
                        }
                        let Some(first) = current.pop_front() else {
                            break;
                        };
                        let dropped = char_len(first)
                            + if current.is_empty() { 0 } else { separator_len };
                        total = total.saturating_sub(dropped);
                    }
                }
            }

            let joiner = if current.is_empty() { 0 } else { separator_len };
            current.push_back(split);
            total += len + joiner;
        }

        if !current.is_empty() {
            if total > self.chunk_size {
                log::warn!(
                    "Created a chunk of size {}, which is longer than the specified {}",
                    total,
                    self.chunk_size
                );
            }
            docs.push(self.join(&current));
        }
        docs
    }

    fn join(&self, parts: &VecDeque<&str>) -> String {
        parts
            .iter()
            .copied()
            .collect::<Vec<_>>()
            .join(SEPARATOR)
            .trim()
            .to_string()
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Joins words broken across lines and collapses whitespace runs.
pub fn normalize_whitespace(text: &str) -> String {
    let joined = HYPHENATED_BREAK.replace_all(text, "$1$2");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits prose into sentences on `.`, `!` and `?` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    let chars: Vec<(usize, char)> = normalized.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let (offset, ch) = chars[i];
        if !matches!(ch, '.' | '!' | '?') {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < chars.len()
            && (matches!(chars[j].1, '.' | '!' | '?') || CLOSING_PUNCTUATION.contains(&chars[j].1))
        {
            j += 1;
        }
        if j >= chars.len() {
            break;
        }

        let next_word = chars.get(j + 1).map(|&(_, c)| c);
        if chars[j].1 == ' ' && ends_sentence(&normalized[start..offset], ch, next_word) {
            let end = chars[j].0;
            let sentence = normalized[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = end + 1;
            i = j + 1;
        } else {
            i = j;
        }
    }

    let rest = normalized[start.min(normalized.len())..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

fn ends_sentence(preceding: &str, terminator: char, next_word: Option<char>) -> bool {
    if terminator != '.' {
        return true;
    }
    if next_word.is_some_and(|c| c.is_lowercase()) {
        return false;
    }
    let mut words = preceding.rsplit(' ');
    let word = words
        .next()
        .unwrap_or("")
        .trim_start_matches(|c: char| !c.is_alphanumeric());
    let lowered = word.to_lowercase();

    // "No. 3" abbreviates number, "no." before anything else is the word
    if lowered == "no" {
        return !next_word.is_some_and(|c| c.is_ascii_digit());
    }
    if word.chars().count() == 1 && word.chars().all(|c| c.is_uppercase()) {
        return !is_initial(words.next());
    }
    !ABBREVIATIONS.contains(&lowered.as_str())
}

/// A lone capital is an initial at the start of a sentence, after a
/// capitalised word or comma, or after a name lead-in. Elsewhere ("model A.")
/// it ends the sentence.
fn is_initial(previous: Option<&str>) -> bool {
    let Some(previous) = previous.filter(|w| !w.is_empty()) else {
        return true;
    };
    if previous.ends_with(',') || previous.chars().next().is_some_and(|c| c.is_uppercase()) {
        return true;
    }
    NAME_LEAD_INS.contains(&previous.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminal_punctuation() {
        let sentences = split_sentences("Transformers read context. Do they use it? Yes!");
        assert_eq!(
            sentences,
            vec!["Transformers read context.", "Do they use it?", "Yes!"]
        );
    }

    #[test]
    fn keeps_abbreviations_and_initials_inside_sentences() {
        let sentences = split_sentences(
            "As shown by Liu et al. in Fig. 2 the curve is U-shaped. J. Smith agrees, e.g. for long inputs.",
        );
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].ends_with("U-shaped."));
        assert!(sentences[1].starts_with("J. Smith"));
    }

    #[test]
    fn no_is_only_an_abbreviation_before_a_number() {
        assert_eq!(
            split_sentences("The answer is no. The next test follows."),
            vec!["The answer is no.", "The next test follows."]
        );
        assert_eq!(split_sentences("See Table No. 4 for details.").len(), 1);
    }

    #[test]
    fn capital_after_lowercase_word_ends_sentence() {
        assert_eq!(
            split_sentences("We compare model A. It wins."),
            vec!["We compare model A.", "It wins."]
        );
        assert_eq!(split_sentences("Proposed by J. Smith, Liu, K. Chen and W. Wu.").len(), 1);
    }

    #[test]
    fn decimals_and_lowercase_continuations_do_not_split() {
        let sentences = split_sentences("Accuracy rose to 3.5 points vs. the baseline. Done.");
        assert_eq!(sentences.len(), 2);
    }

    #[test]
    fn closing_quotes_stay_with_their_sentence() {
        let sentences = split_sentences("He said \"stop.\" Then left.");
        assert_eq!(sentences, vec!["He said \"stop.\"", "Then left."]);
    }

    #[test]
    fn joins_hyphenated_line_breaks() {
        assert_eq!(
            normalize_whitespace("long con-\ntext   models\nwork"),
            "long context models work"
        );
    }

    #[test]
    fn chunks_respect_size_and_overlap() {
        let splitter = TextSplitter::new(60, 30);
        let text = (1..=12)
            .map(|i| format!("Sentence number {} is here.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = splitter.split_text(&text);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 60));
        for pair in chunks.windows(2) {
            let last_of_prev = pair[0].rsplit("\n\n").next().unwrap();
            assert!(
                pair[1].starts_with(last_of_prev),
                "expected overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
        assert!(chunks[0].starts_with("Sentence number 1 "));
        assert!(chunks.last().unwrap().ends_with("Sentence number 12 is here."));
    }

    #[test]
    fn oversize_sentence_becomes_its_own_chunk() {
        let splitter = TextSplitter::new(20, 5);
        let chunks = splitter.merge_splits(&["short one.", "this sentence is far longer than twenty characters.", "tail."]);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], "this sentence is far longer than twenty characters.");
    }

    #[test]
    fn zero_overlap_produces_disjoint_chunks() {
        let splitter = TextSplitter::new(30, 0);
        let chunks = splitter.merge_splits(&["aaaa aaaa.", "bbbb bbbb.", "cccc cccc.", "dddd dddd."]);
        assert_eq!(chunks, vec!["aaaa aaaa.\n\nbbbb bbbb.", "cccc cccc.\n\ndddd dddd."]);
    }

    #[test]
    fn split_pages_tracks_page_and_global_index() {
        let splitter = TextSplitter::new(40, 10);
        let pages = vec![
            Page { number: 1, text: "First page text. It has two sentences.".to_string() },
            Page { number: 4, text: "Fourth page.".to_string() },
        ];
        let chunks = splitter.split_pages(&pages, "paper.pdf");

        assert!(chunks.len() >= 2);
        let last = chunks.last().unwrap();
        assert_eq!(last.metadata.page, 4);
        assert_eq!(last.metadata.chunk_index, chunks.len() - 1);
        assert!(chunks.iter().all(|c| c.metadata.source == "paper.pdf"));
        assert!(chunks.windows(2).all(|w| w[0].id != w[1].id));
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let splitter = TextSplitter::new(500, 100);
        assert!(splitter.split_text("   \n ").is_empty());
    }
}
