//! Groups scanned blocks into one [`Example`] per `<details>` unit

use super::scanner::{Block, FenceKind, Section};
use super::test_case::JsonMap;
use crate::error::{Location, SpecTestError, SpecTestResult};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// One annotated unit recovered from a document, before any defaults apply
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    /// Declared name, e.g. `hello_task.wdl`
    pub name: String,
    /// WDL source text
    pub code: String,
    pub input_block: Option<JsonMap>,
    pub output_block: Option<JsonMap>,
    pub config_block: Option<JsonMap>,
    /// Position among the document's examples, starting at zero
    pub source_ordinal: usize,
    /// Line of the opening `<details>`
    pub line: usize,
}

/// Validates block runs and builds examples.
///
/// In strict mode (the default) an unrecognized section header is an error.
/// Lenient mode skips the header and its code block with a warning.
#[derive(Debug, Clone)]
pub struct ExampleAssembler {
    document: String,
    strict: bool,
}

#[derive(Debug, Default)]
struct Partial {
    line: usize,
    name: Option<String>,
    code: Option<String>,
    in_annotation: bool,
    sections: HashSet<Section>,
    skip_next_fence: bool,
    input_block: Option<JsonMap>,
    output_block: Option<JsonMap>,
    config_block: Option<JsonMap>,
}

impl Partial {
    fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("<unnamed example at line {}>", self.line))
    }
}

impl ExampleAssembler {
    pub fn new<S: Into<String>>(document: S) -> Self {
        Self {
            document: document.into(),
            strict: true,
        }
    }

    /// Set whether unknown sections are fatal
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn location(&self, line: usize) -> Location {
        Location::new(self.document.clone(), Some(line))
    }

    /// Consume a block sequence and return its examples in document order
    pub fn assemble<I>(&self, blocks: I) -> SpecTestResult<Vec<Example>>
    where
        I: IntoIterator<Item = SpecTestResult<Block>>,
    {
        let mut examples = Vec::new();
        let mut seen_names: HashMap<String, usize> = HashMap::new();
        let mut current: Option<Partial> = None;

        for block in blocks {
            let block = block?;
            match block {
                Block::ExampleStart { line } => {
                    current = Some(Partial {
                        line,
                        ..Partial::default()
                    });
                }
                Block::ExampleEnd { line } => {
                    let partial = current.take().ok_or_else(|| {
                        SpecTestError::malformed(
                            self.location(line),
                            "</details> without a matching <details>",
                        )
                    })?;
                    let example = self.finish(partial, examples.len(), &mut seen_names)?;
                    debug!(
                        document = %self.document,
                        name = %example.name,
                        line = example.line,
                        "assembled example"
                    );
                    examples.push(example);
                }
                other => match current.as_mut() {
                    Some(partial) => self.apply(partial, other)?,
                    None => {
                        return Err(SpecTestError::malformed(
                            self.location(other.line()),
                            "block outside of any <details> example",
                        ))
                    }
                },
            }
        }

        if let Some(partial) = current {
            return Err(SpecTestError::malformed(
                self.location(partial.line),
                "<details> is never closed",
            ));
        }
        Ok(examples)
    }

    fn apply(&self, partial: &mut Partial, block: Block) -> SpecTestResult<()> {
        match block {
            Block::Name { label, value, line } => {
                if partial.name.is_some() {
                    return Err(SpecTestError::malformed(
                        self.location(line),
                        format!("example '{}' declares its name twice", partial.display_name()),
                    ));
                }
                if !label.eq_ignore_ascii_case("example") {
                    return Err(SpecTestError::malformed(
                        self.location(line),
                        format!("expected 'Example: <name>', found '{}: {}'", label, value),
                    ));
                }
                if partial.code.is_some() {
                    return Err(SpecTestError::malformed(
                        self.location(line),
                        "example name must precede its wdl code block",
                    ));
                }
                if value.chars().any(char::is_whitespace) {
                    return Err(SpecTestError::malformed(
                        self.location(line),
                        format!("example name '{}' contains whitespace", value),
                    ));
                }
                partial.name = Some(value);
            }
            Block::AnnotationStart { .. } => partial.in_annotation = true,
            Block::SectionHeader { label, line } => {
                let section = match Section::from_label(&label) {
                    Some(section) => section,
                    None if self.strict => {
                        return Err(SpecTestError::UnknownSection {
                            location: self.location(line),
                            name: partial.display_name(),
                            label,
                        })
                    }
                    None => {
                        warn!(
                            document = %self.document,
                            line,
                            example = %partial.display_name(),
                            "skipping unknown section '{}'",
                            label
                        );
                        partial.skip_next_fence = true;
                        return Ok(());
                    }
                };
                if !partial.in_annotation {
                    return Err(SpecTestError::malformed(
                        self.location(line),
                        format!("section '{}' must follow </summary>", section),
                    ));
                }
                if !partial.sections.insert(section) {
                    return Err(SpecTestError::malformed(
                        self.location(line),
                        format!(
                            "section '{}' appears more than once in example '{}'",
                            section,
                            partial.display_name()
                        ),
                    ));
                }
            }
            Block::CodeFence { kind, text, line } => self.apply_fence(partial, kind, text, line)?,
            Block::ExampleStart { line } | Block::ExampleEnd { line } => {
                return Err(SpecTestError::malformed(
                    self.location(line),
                    "unexpected example boundary",
                ))
            }
        }
        Ok(())
    }

    fn apply_fence(
        &self,
        partial: &mut Partial,
        kind: FenceKind,
        text: String,
        line: usize,
    ) -> SpecTestResult<()> {
        if partial.skip_next_fence {
            partial.skip_next_fence = false;
            return Ok(());
        }
        if partial.name.is_none() {
            return Err(SpecTestError::malformed(
                self.location(line),
                "code block appears before the 'Example: <name>' line",
            ));
        }

        match kind {
            FenceKind::Source => {
                if partial.code.is_some() {
                    return Err(SpecTestError::malformed(
                        self.location(line),
                        format!(
                            "example '{}' has more than one wdl code block",
                            partial.display_name()
                        ),
                    ));
                }
                if partial.in_annotation {
                    return Err(SpecTestError::malformed(
                        self.location(line),
                        "wdl code block must be inside <summary>",
                    ));
                }
                partial.code = Some(text);
            }
            FenceKind::Json => {
                return Err(SpecTestError::malformed(
                    self.location(line),
                    "json code block without a section header",
                ))
            }
            section_kind => {
                if partial.code.is_none() {
                    return Err(SpecTestError::MissingCode {
                        location: self.location(line),
                        name: partial.display_name(),
                    });
                }
                let parsed = self.parse_json(partial, &section_kind, &text, line)?;
                match section_kind {
                    FenceKind::InputJson => partial.input_block = Some(parsed),
                    FenceKind::OutputJson => partial.output_block = Some(parsed),
                    _ => partial.config_block = Some(parsed),
                }
            }
        }
        Ok(())
    }

    fn parse_json(
        &self,
        partial: &Partial,
        kind: &FenceKind,
        text: &str,
        line: usize,
    ) -> SpecTestResult<JsonMap> {
        if text.trim().is_empty() {
            return Ok(JsonMap::new());
        }
        serde_json::from_str::<JsonMap>(text).map_err(|e| {
            let message = format!("json must be an object: {}", e);
            if *kind == FenceKind::ConfigJson {
                SpecTestError::invalid_config(self.location(line), partial.display_name(), message)
            } else {
                SpecTestError::malformed(self.location(line), message)
            }
        })
    }

    fn finish(
        &self,
        partial: Partial,
        ordinal: usize,
        seen_names: &mut HashMap<String, usize>,
    ) -> SpecTestResult<Example> {
        let name = partial.name.clone().ok_or_else(|| {
            SpecTestError::malformed(
                self.location(partial.line),
                "example has no 'Example: <name>' line",
            )
        })?;
        if partial.skip_next_fence {
            return Err(SpecTestError::malformed(
                self.location(partial.line),
                format!("unknown section in example '{}' has no code block", name),
            ));
        }
        let code = partial.code.ok_or_else(|| SpecTestError::MissingCode {
            location: self.location(partial.line),
            name: name.clone(),
        })?;
        if let Some(first_line) = seen_names.get(&name) {
            return Err(SpecTestError::DuplicateName {
                location: self.location(partial.line),
                name,
                first_line: *first_line,
            });
        }
        seen_names.insert(name.clone(), partial.line);

        Ok(Example {
            name,
            code,
            input_block: partial.input_block,
            output_block: partial.output_block,
            config_block: partial.config_block,
            source_ordinal: ordinal,
            line: partial.line,
        })
    }
}
