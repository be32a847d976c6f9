use std::{collections::VecDeque, io::Read};
use thiserror::Error;

const DEFAULT_ESCAPE: char = '\\';

/// Instructions whose arguments form a list rather than one opaque string.
const LIST_INSTRUCTIONS: &[&str] = &["add", "arg", "copy", "expose", "from", "volume"];

/// Instructions that accept either a JSON array or a shell string.
const EXEC_INSTRUCTIONS: &[&str] = &["cmd", "entrypoint", "run", "shell"];

/// Instructions that may take here-documents in their shell form.
const HEREDOC_INSTRUCTIONS: &[&str] = &["add", "copy", "run"];

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: invalid escape token {value:?}, expected ` or \\")]
    InvalidEscape { line: usize, value: String },

    #[error("line {line}: here-document {name} is never terminated")]
    UnterminatedHeredoc { line: usize, name: String },

    #[error("couldn't read the dockerfile")]
    Io(#[from] std::io::Error),
}

/// One top level instruction of a Dockerfile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    /// Lowercase instruction name, e.g. `from` or `copy`.
    pub value: String,
    /// The argument chain in source order. Leading `--flag` arguments of
    /// list instructions are kept in place.
    pub args: Vec<String>,
    /// The instruction text with line continuations joined.
    pub original: String,
    pub start_line: usize,
    /// Last line of the instruction, including any here-document bodies.
    pub end_line: usize,
    pub heredocs: Vec<Heredoc>,
}

/// A `<<NAME` here-document body following an instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Heredoc {
    pub name: String,
    pub content: String,
}

struct PendingHeredoc {
    name: String,
    strip_tabs: bool,
    line: usize,
}

impl Node {
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(|arg| arg.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dockerfile {
    pub escape: char,
    pub children: Vec<Node>,
}

impl Default for Dockerfile {
    fn default() -> Self {
        Dockerfile {
            escape: DEFAULT_ESCAPE,
            children: Vec::new(),
        }
    }
}

impl Dockerfile {
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Dockerfile, ParseError> {
        let mut input = String::new();
        reader.read_to_string(&mut input)?;

        parse(&input)
    }
}

/// Parses Dockerfile text into its instruction nodes.
///
/// Handles the `escape` parser directive, comments, blank lines, line
/// continuations and here-documents. Arguments are split but not
/// interpreted: variable expansion, flag semantics and instruction names
/// are left to the caller, so unknown instructions become plain nodes.
pub fn parse(input: &str) -> Result<Dockerfile, ParseError> {
    let mut dockerfile = Dockerfile::default();
    let mut looking_for_directives = true;
    let mut pending: Option<(usize, String)> = None;
    let mut heredocs: VecDeque<PendingHeredoc> = VecDeque::new();
    let mut body = String::new();

    for (index, line) in input.lines().enumerate() {
        let line_number = index + 1;
        let trimmed = line.trim();

        if let Some(heredoc) = heredocs.front() {
            let text = if heredoc.strip_tabs {
                line.trim_start_matches('\t')
            } else {
                line
            };

            if text != heredoc.name {
                body.push_str(text);
                body.push('\n');
                continue;
            }

            let finished = heredocs.pop_front();
            if let (Some(heredoc), Some(node)) = (finished, dockerfile.children.last_mut()) {
                node.heredocs.push(Heredoc {
                    name: heredoc.name,
                    content: std::mem::take(&mut body),
                });
                node.end_line = line_number;
            }
            continue;
        }

        if looking_for_directives {
            match parser_directive(trimmed) {
                Some((key, value)) if key == "escape" => {
                    dockerfile.escape = match value {
                        "\\" => '\\',
                        "`" => '`',
                        _ => {
                            return Err(ParseError::InvalidEscape {
                                line: line_number,
                                value: value.into(),
                            })
                        }
                    };
                    continue;
                }
                Some(_) => continue,
                None => looking_for_directives = false,
            }
        }

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let content = line.trim_end();
        let (content, continues) = match content.strip_suffix(dockerfile.escape) {
            Some(content) => (content, true),
            None => (content, false),
        };

        let (start_line, mut text) = pending.take().unwrap_or((line_number, String::new()));
        text.push_str(content);

        if continues {
            pending = Some((start_line, text));
        } else {
            let node = instruction(&text, start_line, line_number);
            heredocs.extend(heredoc_markers(&node, line_number));
            dockerfile.children.push(node);
        }
    }

    if let Some(heredoc) = heredocs.pop_front() {
        return Err(ParseError::UnterminatedHeredoc {
            line: heredoc.line,
            name: heredoc.name,
        });
    }

    if let Some((start_line, text)) = pending {
        let end_line = input.lines().count();
        dockerfile
            .children
            .push(instruction(&text, start_line, end_line));
    }

    Ok(dockerfile)
}

/// Recognizes `# key=value` lines at the top of a file.
fn parser_directive(line: &str) -> Option<(String, &str)> {
    let rest = line.strip_prefix('#')?;
    let (key, value) = rest.split_once('=')?;
    let key = key.trim();

    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    Some((key.to_lowercase(), value.trim()))
}

fn instruction(text: &str, start_line: usize, end_line: usize) -> Node {
    let text = text.trim();
    let (name, rest) = match text.find(char::is_whitespace) {
        Some(split_index) => text.split_at(split_index),
        None => (text, ""),
    };
    let rest = rest.trim();

    let value = name.to_lowercase();

    let args = if LIST_INSTRUCTIONS.contains(&value.as_str()) {
        list_args(rest)
    } else if EXEC_INSTRUCTIONS.contains(&value.as_str()) {
        json_array(rest).unwrap_or_else(|| single_arg(rest))
    } else {
        single_arg(rest)
    };

    Node {
        value,
        args,
        original: text.into(),
        start_line,
        end_line,
        heredocs: Vec::new(),
    }
}

/// Here-documents opened by `<<NAME`, `<<-NAME` or a quoted name, in the
/// order their bodies follow the instruction.
fn heredoc_markers(node: &Node, line: usize) -> Vec<PendingHeredoc> {
    if !HEREDOC_INSTRUCTIONS.contains(&node.value.as_str()) {
        return Vec::new();
    }

    node.original
        .split_whitespace()
        .skip(1)
        .filter_map(|word| {
            let word = word.strip_prefix("<<")?;
            let (word, strip_tabs) = match word.strip_prefix('-') {
                Some(word) => (word, true),
                None => (word, false),
            };
            let word = word.trim_start_matches(|c| c == '"' || c == '\'');
            let name: String = word
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();

            if name.is_empty() {
                None
            } else {
                Some(PendingHeredoc {
                    name,
                    strip_tabs,
                    line,
                })
            }
        })
        .collect()
}

/// Splits leading `--flag` words off, then reads the rest either as a
/// JSON string array or as whitespace separated words.
fn list_args(rest: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut rest = rest.trim_start();

    while rest.starts_with("--") {
        let (flag, remainder) = match rest.find(char::is_whitespace) {
            Some(split_index) => rest.split_at(split_index),
            None => (rest, ""),
        };
        args.push(flag.to_string());
        rest = remainder.trim_start();
    }

    match json_array(rest) {
        Some(values) => args.extend(values),
        None => args.extend(rest.split_whitespace().map(String::from)),
    }

    args
}

fn json_array(rest: &str) -> Option<Vec<String>> {
    if !rest.starts_with('[') {
        return None;
    }

    serde_json::from_str::<Vec<String>>(rest).ok()
}

fn single_arg(rest: &str) -> Vec<String> {
    if rest.is_empty() {
        Vec::new()
    } else {
        vec![rest.to_string()]
    }
}
