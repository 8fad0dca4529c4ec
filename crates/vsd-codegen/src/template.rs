//! Line-oriented template language used by application templates and the
//! simulator script template.
//!
//! ```text
//! //! for led in leds
//! toggle(&{{ led }});            // {{ led.upper() }} and {{ led.lower() }} work too
//! //! endfor
//! ```
//!
//! Directive lines start with `//!` (after indentation) and are removed from the
//! output. Loops nest; inner loop variables shadow outer ones and plain
//! variables. Rendering is a pure function of the text and the context.

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::TemplateError;

/// Values a template can refer to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateContext {
    lists: BTreeMap<String, Vec<String>>,
    vars: BTreeMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_list(mut self, name: impl Into<String>, items: Vec<String>) -> Self {
        self.lists.insert(name.into(), items);
        self
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        self.lists.get(name).map(Vec::as_slice)
    }
}

impl From<BTreeMap<String, Vec<String>>> for TemplateContext {
    fn from(lists: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            lists,
            vars: BTreeMap::new(),
        }
    }
}

/// Whether `text` uses any template syntax.
pub fn has_markers(text: &str) -> bool {
    text.contains("{{") || text.lines().any(|l| l.trim_start().starts_with("//!"))
}

#[derive(Debug)]
enum Block<'t> {
    Line {
        text: &'t str,
        number: usize,
    },
    Loop {
        var: &'t str,
        list: &'t str,
        number: usize,
        body: Vec<Block<'t>>,
    },
}

struct Frame<'t> {
    header: Option<(&'t str, &'t str, usize)>,
    body: Vec<Block<'t>>,
}

/// Render `text` against `ctx`.
pub fn render(text: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
    let blocks = parse(text)?;
    let placeholder = Regex::new(r"\{\{(.*?)\}\}")?;
    let expression = Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)(?:\.(upper|lower)\(\))?\s*$")?;
    let renderer = Renderer {
        ctx,
        placeholder,
        expression,
    };
    let mut out = String::with_capacity(text.len());
    let mut scope = Vec::new();
    renderer.blocks(&blocks, &mut scope, &mut out)?;
    Ok(out)
}

fn parse(text: &str) -> Result<Vec<Block<'_>>, TemplateError> {
    let header = Regex::new(r"^for\s+([A-Za-z_][A-Za-z0-9_]*)\s+in\s+([A-Za-z_][A-Za-z0-9_]*)$")?;
    let mut stack = vec![Frame {
        header: None,
        body: Vec::new(),
    }];

    for (index, line) in text.split_inclusive('\n').enumerate() {
        let number = index + 1;
        let Some(directive) = line.trim_start().strip_prefix("//!") else {
            if let Some(frame) = stack.last_mut() {
                frame.body.push(Block::Line { text: line, number });
            }
            continue;
        };
        let directive = directive.trim();
        if directive == "endfor" {
            if stack.len() < 2 {
                return Err(TemplateError::UnexpectedEndfor { line: number });
            }
            let Some(Frame {
                header: Some((var, list, start)),
                body,
            }) = stack.pop()
            else {
                return Err(TemplateError::UnexpectedEndfor { line: number });
            };
            if let Some(parent) = stack.last_mut() {
                parent.body.push(Block::Loop {
                    var,
                    list,
                    number: start,
                    body,
                });
            }
        } else if let Some(caps) = header.captures(directive) {
            let (Some(var), Some(list)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            stack.push(Frame {
                header: Some((var.as_str(), list.as_str(), number)),
                body: Vec::new(),
            });
        } else {
            return Err(TemplateError::InvalidDirective {
                directive: directive.to_string(),
                line: number,
            });
        }
    }

    if stack.len() > 1 {
        let line = stack
            .last()
            .and_then(|f| f.header.map(|(_, _, n)| n))
            .unwrap_or_default();
        return Err(TemplateError::UnclosedLoop { line });
    }
    Ok(stack.pop().map(|f| f.body).unwrap_or_default())
}

struct Renderer<'c> {
    ctx: &'c TemplateContext,
    placeholder: Regex,
    expression: Regex,
}

impl<'c> Renderer<'c> {
    fn blocks<'t>(
        &self,
        blocks: &'t [Block<'t>],
        scope: &mut Vec<(&'t str, &'c str)>,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        for block in blocks {
            match block {
                Block::Line { text, number } => self.line(text, *number, scope, out)?,
                Block::Loop {
                    var,
                    list,
                    number,
                    body,
                } => {
                    let items = self.ctx.lists.get(*list).ok_or_else(|| TemplateError::UnknownList {
                        list: list.to_string(),
                        line: *number,
                    })?;
                    for item in items {
                        scope.push((*var, item.as_str()));
                        let result = self.blocks(body, scope, out);
                        scope.pop();
                        result?;
                    }
                }
            }
        }
        Ok(())
    }

    fn line(
        &self,
        text: &str,
        number: usize,
        scope: &[(&str, &str)],
        out: &mut String,
    ) -> Result<(), TemplateError> {
        let mut last = 0;
        for caps in self.placeholder.captures_iter(text) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&text[last..whole.start()]);
            out.push_str(&self.evaluate(inner.as_str(), number, scope)?);
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(())
    }

    fn evaluate(&self, expr: &str, line: usize, scope: &[(&str, &str)]) -> Result<String, TemplateError> {
        let invalid = || TemplateError::InvalidExpression {
            expr: expr.trim().to_string(),
            line,
        };
        let caps = self.expression.captures(expr).ok_or_else(invalid)?;
        let name = caps.get(1).ok_or_else(invalid)?.as_str();
        let value = scope
            .iter()
            .rev()
            .find(|(var, _)| *var == name)
            .map(|(_, value)| *value)
            .or_else(|| self.ctx.vars.get(name).map(String::as_str))
            .ok_or_else(|| TemplateError::UnknownVariable {
                name: name.to_string(),
                line,
            })?;
        Ok(match caps.get(2).map(|m| m.as_str()) {
            Some("upper") => value.to_uppercase(),
            Some("lower") => value.to_lowercase(),
            _ => value.to_string(),
        })
    }
}
