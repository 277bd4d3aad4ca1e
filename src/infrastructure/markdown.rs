use comrak::nodes::{AstNode, NodeValue};
use comrak::{parse_document, Arena, Options};

/// Deepest heading level that starts a new section.
const SECTION_HEADING_LEVEL: u8 = 2;

/// A heading-delimited slice of a markdown text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownSection {
    pub heading: Option<String>,
    pub text: String,
}

/// Splits markdown into sections at level 1 and 2 headings.
///
/// Text before the first heading becomes a section without a heading. Each
/// section keeps its heading line so the heading stays searchable. Sections
/// holding only whitespace are dropped.
pub fn split_sections(markdown: &str) -> Vec<MarkdownSection> {
    let arena = Arena::new();
    let root = parse_document(&arena, markdown, &Options::default());

    // (1-based start line, heading text)
    let mut boundaries: Vec<(usize, String)> = Vec::new();
    for node in root.children() {
        let data = node.data.borrow();
        if let NodeValue::Heading(heading) = &data.value {
            if heading.level <= SECTION_HEADING_LEVEL {
                boundaries.push((data.sourcepos.start.line, collect_text(node)));
            }
        }
    }

    let lines: Vec<&str> = markdown.lines().collect();
    let mut sections = Vec::new();

    // Text before the first heading forms an untitled section
    let first_heading_line = boundaries.first().map_or(lines.len() + 1, |(line, _)| *line);
    push_section(&mut sections, None, &lines, 1, first_heading_line);

    for (i, (start, heading)) in boundaries.iter().enumerate() {
        let end = boundaries.get(i + 1).map_or(lines.len() + 1, |(line, _)| *line);
        push_section(&mut sections, Some(heading.clone()), &lines, *start, end);
    }
    sections
}

fn push_section(
    sections: &mut Vec<MarkdownSection>,
    heading: Option<String>,
    lines: &[&str],
    start_line: usize,
    end_line: usize,
) {
    // 1-based lines, end exclusive
    let start = start_line.saturating_sub(1).min(lines.len());
    let end = end_line.saturating_sub(1).min(lines.len());
    if start >= end {
        return;
    }
    let text = lines[start..end].join("\n").trim().to_string();
    if !text.is_empty() {
        sections.push(MarkdownSection { heading, text });
    }
}

fn collect_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut text = String::new();
    for descendant in node.descendants() {
        match &descendant.data.borrow().value {
            NodeValue::Text(t) => text.push_str(t),
            NodeValue::Code(code) => text.push_str(&code.literal),
            NodeValue::SoftBreak | NodeValue::LineBreak => text.push(' '),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
