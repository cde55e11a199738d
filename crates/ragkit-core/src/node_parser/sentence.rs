use super::estimate_tokens;

const CLOSERS: [char; 9] = ['.', '!', '?', '"', '\'', ')', ']', '\u{201d}', '\u{2019}'];

/// Split text into sentences.
///
/// A sentence ends at `.`, `!` or `?` (plus trailing quotes/brackets) when
/// followed by whitespace and a character that is not lowercase, or at a
/// blank line. Internal whitespace is collapsed to single spaces.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < chars.len() {
        let (pos, c) = chars[i];
        if c == '\n' {
            let mut k = i + 1;
            while k < chars.len() && matches!(chars[k].1, ' ' | '\t' | '\r') {
                k += 1;
            }
            if k < chars.len() && chars[k].1 == '\n' {
                push_sentence(&mut out, &text[start..pos]);
                while k < chars.len() && chars[k].1.is_whitespace() {
                    k += 1;
                }
                start = chars.get(k).map_or(text.len(), |(p, _)| *p);
                i = k;
                continue;
            }
        }
        if matches!(c, '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && CLOSERS.contains(&chars[j].1) {
                j += 1;
            }
            if j < chars.len() && chars[j].1.is_whitespace() {
                let mut k = j;
                while k < chars.len() && chars[k].1.is_whitespace() {
                    k += 1;
                }
                let continues_lowercase = k < chars.len() && chars[k].1.is_lowercase();
                if !continues_lowercase {
                    push_sentence(&mut out, &text[start..chars[j].0]);
                    start = chars.get(k).map_or(text.len(), |(p, _)| *p);
                    i = k;
                    continue;
                }
            }
            i = j;
            continue;
        }
        i += 1;
    }
    if start < text.len() {
        push_sentence(&mut out, &text[start..]);
    }
    out
}

fn push_sentence(out: &mut Vec<String>, raw: &str) {
    let s = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if !s.is_empty() {
        out.push(s);
    }
}

/// Sentence-aware splitter packing text into chunks of at most `chunk_size`
/// estimated tokens, with up to `chunk_overlap` tokens of trailing sentences
/// repeated at the start of the next chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size: chunk_size.max(1), chunk_overlap: chunk_overlap.min(chunk_size / 2) }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let units = self.units(text);
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_tokens = 0usize;
        for unit in &units {
            let tokens = estimate_tokens(unit);
            if !current.is_empty() && current_tokens + tokens > self.chunk_size {
                chunks.push(current.join(" "));
                let (carry, carry_tokens) = self.overlap_tail(&current);
                if carry_tokens + tokens > self.chunk_size {
                    current = Vec::new();
                    current_tokens = 0;
                } else {
                    current = carry;
                    current_tokens = carry_tokens;
                }
            }
            current.push(unit);
            current_tokens += tokens;
        }
        if !current.is_empty() {
            chunks.push(current.join(" "));
        }
        chunks
    }

    /// Sentences, with any sentence longer than a chunk cut into word runs.
    fn units(&self, text: &str) -> Vec<String> {
        let max_words = ((self.chunk_size as f32) * 0.75).floor().max(1.0) as usize;
        let mut units = Vec::new();
        for sentence in split_sentences(text) {
            if estimate_tokens(&sentence) <= self.chunk_size {
                units.push(sentence);
            } else {
                let words: Vec<&str> = sentence.split_whitespace().collect();
                units.extend(words.chunks(max_words).map(|w| w.join(" ")));
            }
        }
        units
    }

    fn overlap_tail<'a>(&self, current: &[&'a str]) -> (Vec<&'a str>, usize) {
        let mut carry = Vec::new();
        let mut carry_tokens = 0usize;
        for prev in current.iter().rev() {
            let t = estimate_tokens(prev);
            if carry_tokens + t > self.chunk_overlap || carry.len() + 1 == current.len() {
                break;
            }
            carry.push(*prev);
            carry_tokens += t;
        }
        carry.reverse();
        (carry, carry_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminal_punctuation() {
        let s = split_sentences("Fire needs air. Wood burns!  Does water boil? Yes.");
        assert_eq!(s, vec!["Fire needs air.", "Wood burns!", "Does water boil?", "Yes."]);
    }

    #[test]
    fn keeps_decimals_and_lowercase_continuations() {
        let s = split_sentences("Pi is 3.14 roughly. See e.g. the table. Done");
        assert_eq!(s, vec!["Pi is 3.14 roughly.", "See e.g. the table.", "Done"]);
    }

    #[test]
    fn blank_lines_end_sentences() {
        let s = split_sentences("Heading\n\nBody text here.\nStill body.");
        assert_eq!(s, vec!["Heading", "Body text here.", "Still body."]);
    }

    #[test]
    fn chunks_respect_size() {
        let text = (0..200).map(|i| format!("Sentence number {i} has six words.")).collect::<Vec<_>>().join(" ");
        let splitter = TextSplitter::new(64, 10);
        let chunks = splitter.split(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(estimate_tokens(c) <= 64, "chunk too large: {}", estimate_tokens(c));
        }
    }

    #[test]
    fn long_sentence_is_cut_into_word_runs() {
        let text = vec!["word"; 500].join(" ");
        let chunks = TextSplitter::new(128, 0).split(&text);
        assert!(chunks.len() >= 4);
        assert!(chunks.iter().all(|c| estimate_tokens(c) <= 128));
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(TextSplitter::new(128, 20).split("Just one. Two."), vec!["Just one. Two."]);
        assert!(TextSplitter::new(128, 20).split("   ").is_empty());
    }
}
