use ragkit_core::types::NodeWithScore;
use std::fmt;

/// Synthesized answer plus the nodes it was generated from.
#[derive(Debug, Clone)]
pub struct Response {
    pub response: String,
    pub source_nodes: Vec<NodeWithScore>,
}

impl Response {
    /// One line per source: score and the first `length` characters.
    pub fn formatted_sources(&self, length: usize) -> String {
        self.source_nodes
            .iter()
            .map(|n| {
                let text: String = n.node.text.chars().take(length).collect();
                let ellipsis = if n.node.text.chars().count() > length { "..." } else { "" };
                format!("> Source (score {:.3}): {}{}", n.score, text.replace('\n', " "), ellipsis)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.response)
    }
}
