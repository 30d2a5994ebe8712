//! Line-oriented patching of YAML documents.
//!
//! Auto-update must not reflow a test specification: comments, quoting,
//! key order, and blank lines all survive a run through this module.
//! Instead of re-serializing, it navigates the text by key path with
//! indentation-aware scanning and splices replacement tokens over the
//! exact byte ranges of the scalars it rewrites.
//!
//! The navigator understands block mappings, inline scalars, flow
//! sequences (`[a, b]`), and block sequences (`- a`). Leaves written as
//! flow mappings cannot be patched; edits against them fail with a
//! configuration error rather than corrupting the document.

use touchstone_kernel::HarnessError;

/// A YAML document held as editable lines.
#[derive(Debug, Clone)]
pub struct PatchDocument {
    lines: Vec<String>,
    modified: bool,
}

/// The direct entries of one mapping: a line range and their indent.
#[derive(Debug, Clone, Copy)]
struct Block {
    start: usize,
    end: usize,
    indent: usize,
}

/// A located `key:` line.
#[derive(Debug, Clone, Copy)]
struct LineKey {
    line: usize,
    indent: usize,
    /// Byte offset just past the colon.
    value_pos: usize,
}

impl PatchDocument {
    pub fn new(text: &str) -> PatchDocument {
        PatchDocument {
            lines: text.split('\n').map(String::from).collect(),
            modified: false,
        }
    }

    /// Reassembled text; byte-identical to the input when nothing was
    /// edited.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// The scalar token of `key` inside the mapping at `path`, verbatim.
    pub fn scalar_token(&self, path: &[String], key: &str) -> Option<String> {
        let block = self.locate_block(path)?;
        let entry = self.find_key(&block, key)?;
        let span = self.value_span(&entry)?;
        Some(self.lines[entry.line][span.0..span.1].to_string())
    }

    /// The `index`-th element token of the list under `key`, verbatim.
    /// Understands both flow and block sequences.
    pub fn list_element_token(&self, path: &[String], key: &str, index: usize) -> Option<String> {
        let block = self.locate_block(path)?;
        let entry = self.find_key(&block, key)?;
        let (line, span) = self.list_element(&entry, index)?;
        Some(self.lines[line][span.0..span.1].to_string())
    }

    /// Replace the scalar value of `key` with `rendered`.
    pub fn set_scalar(
        &mut self,
        path: &[String],
        key: &str,
        rendered: &str,
    ) -> Result<(), HarnessError> {
        let block = self
            .locate_block(path)
            .ok_or_else(|| locate_failure(path, key))?;
        let entry = self
            .find_key(&block, key)
            .ok_or_else(|| locate_failure(path, key))?;
        let span = self
            .value_span(&entry)
            .ok_or_else(|| locate_failure(path, key))?;
        self.splice(entry.line, span, rendered);
        Ok(())
    }

    /// Replace the `index`-th element of the list under `key`.
    pub fn set_list_element(
        &mut self,
        path: &[String],
        key: &str,
        index: usize,
        rendered: &str,
    ) -> Result<(), HarnessError> {
        let block = self
            .locate_block(path)
            .ok_or_else(|| locate_failure(path, key))?;
        let entry = self
            .find_key(&block, key)
            .ok_or_else(|| locate_failure(path, key))?;
        let (line, span) = self
            .list_element(&entry, index)
            .ok_or_else(|| locate_failure(path, key))?;
        self.splice(line, span, rendered);
        Ok(())
    }

    /// Add a `key: rendered` line at the end of the mapping at `path`.
    pub fn insert_key(
        &mut self,
        path: &[String],
        key: &str,
        rendered: &str,
    ) -> Result<(), HarnessError> {
        let entry = self
            .locate_entry(path)
            .ok_or_else(|| locate_failure(path, key))?;
        if self.value_span(&entry).is_some() {
            // flow mapping on the key line; no block to extend
            return Err(locate_failure(path, key));
        }
        let block = self.child_block(&entry);
        let line = format!("{}{key}: {rendered}", " ".repeat(block.indent));
        self.lines.insert(block.end, line);
        self.modified = true;
        Ok(())
    }

    fn splice(&mut self, line: usize, span: (usize, usize), rendered: &str) {
        let old = &self.lines[line];
        let mut new = String::with_capacity(old.len() + rendered.len());
        new.push_str(&old[..span.0]);
        new.push_str(rendered);
        new.push_str(&old[span.1..]);
        self.lines[line] = new;
        self.modified = true;
    }

    fn root_block(&self) -> Block {
        let indent = self
            .lines
            .iter()
            .find_map(|line| parse_key_line(line).map(|key| key.indent))
            .unwrap_or(0);
        Block {
            start: 0,
            end: self.lines.len(),
            indent,
        }
    }

    /// The key line reached by walking `path` from the document root.
    fn locate_entry(&self, path: &[String]) -> Option<LineKey> {
        let mut block = self.root_block();
        let mut entry = None;
        for element in path {
            let found = self.find_key(&block, element)?;
            block = self.child_block(&found);
            entry = Some(found);
        }
        entry
    }

    fn locate_block(&self, path: &[String]) -> Option<Block> {
        if path.is_empty() {
            return Some(self.root_block());
        }
        let entry = self.locate_entry(path)?;
        Some(self.child_block(&entry))
    }

    fn find_key(&self, block: &Block, key: &str) -> Option<LineKey> {
        self.lines[block.start..block.end]
            .iter()
            .enumerate()
            .find_map(|(offset, line)| {
                let parsed = parse_key_line(line)?;
                (parsed.indent == block.indent && parsed.key == key).then(|| LineKey {
                    line: block.start + offset,
                    indent: parsed.indent,
                    value_pos: parsed.value_pos,
                })
            })
    }

    /// The entries nested under a key line: every following line deeper
    /// than the key, with trailing blanks left outside the block.
    fn child_block(&self, entry: &LineKey) -> Block {
        let mut first_indent = None;
        let mut end = entry.line + 1;
        for i in entry.line + 1..self.lines.len() {
            let content = strip_cr(&self.lines[i]);
            let trimmed = content.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let indent = content.len() - trimmed.len();
            if indent <= entry.indent {
                break;
            }
            if first_indent.is_none() {
                first_indent = Some(indent);
            }
            end = i + 1;
        }
        Block {
            start: entry.line + 1,
            end,
            indent: first_indent.unwrap_or(entry.indent + 2),
        }
    }

    /// The byte span of the inline scalar on a key line, comment and
    /// trailing whitespace excluded.
    fn value_span(&self, entry: &LineKey) -> Option<(usize, usize)> {
        let content = strip_cr(&self.lines[entry.line]);
        let value = &content[entry.value_pos..];
        let lead = value.len() - value.trim_start().len();
        let start = entry.value_pos + lead;
        let rest = &content[start..];
        if rest.is_empty() {
            return None;
        }

        let mut in_single = false;
        let mut in_double = false;
        let mut end = rest.len();
        let mut after_space = true;
        for (i, ch) in rest.char_indices() {
            match ch {
                '\'' if !in_double => in_single = !in_single,
                '"' if !in_single => in_double = !in_double,
                '#' if !in_single && !in_double && after_space => {
                    end = i;
                    break;
                }
                _ => {}
            }
            after_space = ch == ' ' || ch == '\t';
        }
        let token = rest[..end].trim_end();
        if token.is_empty() {
            return None;
        }
        Some((start, start + token.len()))
    }

    fn list_element(&self, entry: &LineKey, index: usize) -> Option<(usize, (usize, usize))> {
        if let Some(span) = self.value_span(entry) {
            let spans = self.flow_elements(entry.line, span)?;
            return spans.get(index).map(|span| (entry.line, *span));
        }
        self.block_list_item(entry, index)
    }

    /// Element spans inside a `[a, b, c]` token.
    fn flow_elements(&self, line: usize, span: (usize, usize)) -> Option<Vec<(usize, usize)>> {
        let token = &strip_cr(&self.lines[line])[span.0..span.1];
        if !(token.starts_with('[') && token.ends_with(']')) {
            return None;
        }
        let inner_start = span.0 + 1;
        let inner = &token[1..token.len() - 1];

        let mut raw = Vec::new();
        let mut depth = 0usize;
        let mut in_single = false;
        let mut in_double = false;
        let mut element_start = 0usize;
        for (i, ch) in inner.char_indices() {
            match ch {
                '\'' if !in_double => in_single = !in_single,
                '"' if !in_single => in_double = !in_double,
                '[' | '{' if !in_single && !in_double => depth += 1,
                ']' | '}' if !in_single && !in_double => depth = depth.saturating_sub(1),
                ',' if depth == 0 && !in_single && !in_double => {
                    raw.push((element_start, i));
                    element_start = i + 1;
                }
                _ => {}
            }
        }
        raw.push((element_start, inner.len()));

        Some(
            raw.into_iter()
                .map(|(a, b)| {
                    let piece = &inner[a..b];
                    let lead = piece.len() - piece.trim_start().len();
                    let trail = piece.len() - piece.trim_end().len();
                    (inner_start + a + lead, inner_start + b - trail)
                })
                .collect(),
        )
    }

    /// The `index`-th `- item` line of a block sequence under a key.
    /// Items may sit at the key's own indent or deeper.
    fn block_list_item(&self, entry: &LineKey, index: usize) -> Option<(usize, (usize, usize))> {
        let mut seen = 0usize;
        for i in entry.line + 1..self.lines.len() {
            let content = strip_cr(&self.lines[i]);
            let trimmed = content.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let indent = content.len() - trimmed.len();
            if indent < entry.indent {
                break;
            }
            let is_item = trimmed == "-" || trimmed.starts_with("- ");
            if !is_item {
                if indent <= entry.indent {
                    break;
                }
                continue;
            }
            if seen == index {
                let after = &content[indent + 1..];
                let lead = after.len() - after.trim_start().len();
                let start = indent + 1 + lead;
                let rest = &content[start..];
                let mut end = rest.len();
                let mut after_space = true;
                for (j, ch) in rest.char_indices() {
                    if ch == '#' && after_space {
                        end = j;
                        break;
                    }
                    after_space = ch == ' ' || ch == '\t';
                }
                let token = rest[..end].trim_end();
                return Some((i, (start, start + token.len())));
            }
            seen += 1;
        }
        None
    }
}

pub(crate) fn locate_failure(path: &[String], key: &str) -> HarnessError {
    HarnessError::Config(format!(
        "Failed to update test file: cannot locate '{key}' under '{}'",
        path.join(".")
    ))
}

fn strip_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

/// Split a line into indent, key, and the position past the colon.
/// Returns `None` for blanks, comments, and sequence items.
fn parse_key_line(line: &str) -> Option<ParsedKey> {
    let content = strip_cr(line);
    let trimmed = content.trim_start();
    let indent = content.len() - trimmed.len();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('-') {
        return None;
    }

    for quote in ['"', '\''] {
        if let Some(rest) = trimmed.strip_prefix(quote) {
            let close = rest.find(quote)?;
            let after = &rest[close + 1..];
            let colon = after.find(':')?;
            if !after[..colon].trim().is_empty() {
                return None;
            }
            return Some(ParsedKey {
                indent,
                key: rest[..close].to_string(),
                value_pos: indent + 1 + close + 1 + colon + 1,
            });
        }
    }

    for (i, ch) in trimmed.char_indices() {
        if ch == ':' {
            let next = trimmed[i + 1..].chars().next();
            if next.is_none() || next == Some(' ') || next == Some('\t') {
                let key = trimmed[..i].trim_end();
                if key.is_empty() {
                    return None;
                }
                return Some(ParsedKey {
                    indent,
                    key: key.to_string(),
                    value_pos: indent + i + 1,
                });
            }
        }
    }
    None
}

#[derive(Debug)]
struct ParsedKey {
    indent: usize,
    key: String,
    value_pos: usize,
}
