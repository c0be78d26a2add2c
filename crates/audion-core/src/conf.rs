// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of AudION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Parser for the hierarchical conf files the host framework uses
//! (plugin.conf, items.conf, logic.conf).
//!
//! The syntax nests sections by bracket depth and treats `#` as a
//! full-line comment:
//!
//! ```text
//! [someroom]
//!     [[mydevice]]
//!         type = bool
//!         my_attr = setting
//! ```

use thiserror::Error;

/// Errors raised while parsing a conf file
#[derive(Debug, Error)]
pub enum ConfError {
    #[error("line {line}: unbalanced section brackets: '{text}'")]
    UnbalancedBrackets { line: usize, text: String },

    #[error("line {line}: section '[{name}]' at depth {depth} has no parent at depth {parent}")]
    OrphanSection {
        line: usize,
        name: String,
        depth: usize,
        parent: usize,
    },

    #[error("line {line}: duplicate section '{name}'")]
    DuplicateSection { line: usize, name: String },

    #[error("line {line}: expected 'key = value': '{text}'")]
    MissingAssignment { line: usize, text: String },

    #[error("line {line}: 'key = value' outside of any section")]
    KeyOutsideSection { line: usize },

    #[error("line {line}: empty section name")]
    EmptySectionName { line: usize },
}

/// One section of a conf file: named, with ordered attributes and subsections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<ConfNode>,
}

impl ConfNode {
    fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Parse a complete conf document into a nameless root node
    pub fn parse(input: &str) -> Result<ConfNode, ConfError> {
        let mut root = ConfNode::default();
        // Open sections, innermost last; stack[i] sits at bracket depth i + 1
        let mut stack: Vec<ConfNode> = Vec::new();

        for (idx, raw) in input.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') {
                let depth = line.chars().take_while(|c| *c == '[').count();
                let closing = line.chars().rev().take_while(|c| *c == ']').count();
                if depth != closing {
                    return Err(ConfError::UnbalancedBrackets {
                        line: line_no,
                        text: line.to_owned(),
                    });
                }
                let name = line[depth..line.len() - closing].trim();
                if name.is_empty() {
                    return Err(ConfError::EmptySectionName { line: line_no });
                }

                // Close every section at this depth or deeper
                while stack.len() >= depth {
                    let Some(closed) = stack.pop() else { break };
                    attach(&mut root, &mut stack, closed);
                }
                if stack.len() != depth - 1 {
                    return Err(ConfError::OrphanSection {
                        line: line_no,
                        name: name.to_owned(),
                        depth,
                        parent: depth - 1,
                    });
                }

                let siblings = match stack.last() {
                    Some(parent) => &parent.children,
                    None => &root.children,
                };
                if siblings.iter().any(|c| c.name == name) {
                    return Err(ConfError::DuplicateSection {
                        line: line_no,
                        name: name.to_owned(),
                    });
                }
                stack.push(ConfNode::named(name));
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfError::MissingAssignment {
                    line: line_no,
                    text: line.to_owned(),
                });
            };
            let Some(section) = stack.last_mut() else {
                return Err(ConfError::KeyOutsideSection { line: line_no });
            };
            section
                .attributes
                .push((key.trim().to_owned(), unquote(value.trim()).to_owned()));
        }

        while let Some(closed) = stack.pop() {
            attach(&mut root, &mut stack, closed);
        }
        Ok(root)
    }

    /// Look up an attribute value in this section
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Look up a direct subsection by name
    pub fn child(&self, name: &str) -> Option<&ConfNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Depth-first iteration over all subsections, yielding dotted paths
    /// such as `someroom.mydevice`
    pub fn walk(&self) -> Vec<(String, &ConfNode)> {
        let mut out = Vec::new();
        for child in &self.children {
            walk_into(child, &child.name, &mut out);
        }
        out
    }
}

fn walk_into<'a>(node: &'a ConfNode, path: &str, out: &mut Vec<(String, &'a ConfNode)>) {
    out.push((path.to_owned(), node));
    for child in &node.children {
        let child_path = format!("{path}.{}", child.name);
        walk_into(child, &child_path, out);
    }
}

fn attach(root: &mut ConfNode, stack: &mut [ConfNode], closed: ConfNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(closed),
        None => root.children.push(closed),
    }
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
