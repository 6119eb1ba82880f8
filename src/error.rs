use ariadne::{Color, Config, Fmt, IndexType, Label, Report, ReportKind, Source};
use std::fmt;
use std::io::{self, Write};
use std::ops::Range;
use thiserror::Error;

/// Width a tab is expanded to when rendering a caret under a source line.
const TAB_WIDTH: usize = 4;

/// Byte range into the source plus the 1-based line and column of its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    pub fn single(pos: usize, line: usize, column: usize) -> Self {
        Self::new(pos, pos + 1, line, column)
    }

    /// Span running from the start of `self` to the end of `other`.
    pub fn to(&self, other: &Span) -> Self {
        Self {
            start: self.start,
            end: other.end.max(self.start),
            line: self.line,
            column: self.column,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LexError,
    ParseError,
    RuntimeError,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} on line {}, column {}", .span.line, .span.column)]
pub struct ScrawlError {
    pub kind: ErrorKind,
    pub span: Span,
    pub message: String,
    pub help: Option<String>,
}

impl ScrawlError {
    pub fn new(kind: ErrorKind, span: Span, message: String) -> Self {
        Self {
            kind,
            span,
            message,
            help: None,
        }
    }

    pub fn new_with_help(kind: ErrorKind, span: Span, message: String, help: String) -> Self {
        Self {
            kind,
            span,
            message,
            help: Some(help),
        }
    }

    pub fn lex_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::LexError, span, message)
    }

    pub fn parse_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::ParseError, span, message)
    }

    pub fn parse_error_with_help(span: Span, message: String, help: String) -> Self {
        Self::new_with_help(ErrorKind::ParseError, span, message, help)
    }

    pub fn runtime_error(span: Span, message: String) -> Self {
        Self::new(ErrorKind::RuntimeError, span, message)
    }

    pub fn runtime_error_with_help(span: Span, message: String, help: String) -> Self {
        Self::new_with_help(ErrorKind::RuntimeError, span, message, help)
    }

    /// Plain-text rendering: the message, the offending line with tabs
    /// expanded, and a caret under the offending column.
    pub fn render(&self, source: &str) -> String {
        let mut out = format!("{}:\n", self);

        let line = source
            .split('\n')
            .nth(self.span.line.saturating_sub(1))
            .unwrap_or("");
        let line = line.strip_suffix('\r').unwrap_or(line);

        let before: String = line.chars().take(self.span.column.saturating_sub(1)).collect();
        let tabs = before.chars().filter(|c| *c == '\t').count();

        out.push_str(&line.replace('\t', &" ".repeat(TAB_WIDTH)));
        out.push('\n');
        out.push_str(&"-".repeat(before.chars().count() + (TAB_WIDTH - 1) * tabs));
        out.push('^');
        out
    }

    pub fn report(&self, source: &str, filename: Option<&str>) {
        let filename = filename.unwrap_or("<repl>");

        // A failed write to stderr leaves nothing better to report to.
        let _ = self
            .build_report(source, filename, true)
            .eprint((filename, Source::from(source)));
    }

    /// Same report as [`ScrawlError::report`], uncoloured, written to `out`.
    pub fn write_report<W: Write>(
        &self,
        source: &str,
        filename: Option<&str>,
        out: W,
    ) -> io::Result<()> {
        let filename = filename.unwrap_or("<repl>");
        self.build_report(source, filename, false)
            .write((filename, Source::from(source)), out)
    }

    fn build_report<'a>(
        &self,
        source: &str,
        filename: &'a str,
        colored: bool,
    ) -> Report<'a, (&'a str, Range<usize>)> {
        let color = match self.kind {
            ErrorKind::LexError => Color::Red,
            ErrorKind::ParseError => Color::Yellow,
            ErrorKind::RuntimeError => Color::Magenta,
        };

        let kind_str = match self.kind {
            ErrorKind::LexError => "Lexical Error",
            ErrorKind::ParseError => "Parse Error",
            ErrorKind::RuntimeError => "Runtime Error",
        };
        let paint = |text: &str, color: Color| {
            if colored {
                text.fg(color).to_string()
            } else {
                text.to_string()
            }
        };

        // Spans are byte offsets.
        let config = Config::default()
            .with_index_type(IndexType::Byte)
            .with_color(colored);

        let end = self.span.end.min(source.len()).max(self.span.start);
        let mut report_builder = Report::build(ReportKind::Error, filename, self.span.start)
            .with_config(config)
            .with_message(format!("{}: {}", paint(kind_str, color), self.message))
            .with_label(
                Label::new((filename, self.span.start..end))
                    .with_message(&self.message)
                    .with_color(color),
            );

        if let Some(ref help_text) = self.help {
            report_builder =
                report_builder.with_note(format!("{}: {}", paint("help", Color::Cyan), help_text));
        }

        report_builder.finish()
    }
}

/// Every diagnostic recorded during a single parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseErrors {
    pub errors: Vec<ScrawlError>,
}

impl ParseErrors {
    pub fn new(errors: Vec<ScrawlError>) -> Self {
        Self { errors }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScrawlError> {
        self.errors.iter()
    }

    pub fn first(&self) -> Option<&ScrawlError> {
        self.errors.first()
    }

    pub fn render(&self, source: &str) -> String {
        self.errors
            .iter()
            .map(|error| error.render(source))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn report(&self, source: &str, filename: Option<&str>) {
        for error in &self.errors {
            error.report(source, filename);
        }
    }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseErrors {}
