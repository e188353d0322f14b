//! Output format selection.

use clap::{Args, ValueEnum};

/// Output format choices for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// `key: value` lines.
    Text,
    /// One pretty-printed JSON document.
    Json,
    /// One JSON object per line.
    Ndjson,
}

/// Output-related CLI flags.
#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Output format for command responses.
    #[arg(long, global = true, value_enum)]
    pub output: Option<OutputFormat>,
    /// Machine-friendly defaults: NDJSON output and no progress lines.
    #[arg(long, global = true)]
    pub agent: bool,
    /// Suppress `info:` progress lines on stderr.
    #[arg(long, global = true)]
    pub no_progress: bool,
}

/// Output mode derived from CLI flags.
#[derive(Debug, Clone, Copy)]
pub struct OutputMode {
    pub format: OutputFormat,
    pub no_progress: bool,
}

impl OutputMode {
    /// Build output mode from CLI flags; an explicit `--output` wins over `--agent`.
    #[must_use]
    pub const fn from_args(args: &OutputArgs) -> Self {
        let format = match (args.output, args.agent) {
            (Some(value), _) => value,
            (None, true) => OutputFormat::Ndjson,
            (None, false) => OutputFormat::Text,
        };
        Self {
            format,
            no_progress: args.agent || args.no_progress,
        }
    }

    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    #[must_use]
    pub const fn is_ndjson(self) -> bool {
        matches!(self.format, OutputFormat::Ndjson)
    }
}
