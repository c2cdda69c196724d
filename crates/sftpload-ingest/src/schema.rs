//! Header resolution
//!
//! The destination column list comes from one of three places, selected once
//! from the `(has_header, auto_generate_schema)` flags:
//!
//! | has_header | auto_generate_schema | policy |
//! |---|---|---|
//! | true  | true  | [`HeaderPolicy::FirstLine`]: first line, split on `,`, fields trimmed |
//! | true  | false | [`HeaderPolicy::Explicit`]: configured names, no line consumed |
//! | false | true  | [`HeaderPolicy::Synthesized`]: `column1..columnN` from a lookahead line |
//! | false | false | rejected when the [`SchemaConfig`] is built |
//!
//! The lookahead line of `Synthesized` is consumed and never loaded.

use std::collections::HashSet;
use std::io::BufRead;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{IngestError, Result};
use crate::source::LineStream;

/// Field delimiter for header and data rows
pub const DELIMITER: char = ',';

/// Ordered destination column names for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct Header(Vec<String>);

impl Header {
    /// Build a header, rejecting empty or repeated column names.
    ///
    /// Names are compared after [`column_key`] folding, so `Id` and `id`
    /// collide the same way they would in the table.
    pub fn new(columns: Vec<String>) -> Result<Self> {
        if columns.is_empty() {
            return Err(IngestError::Schema("header has no columns".to_string()));
        }

        let mut seen = HashSet::with_capacity(columns.len());
        for (position, column) in columns.iter().enumerate() {
            if column.trim().is_empty() {
                return Err(IngestError::Schema(format!(
                    "column {} of the header has an empty name",
                    position + 1
                )));
            }
            if !seen.insert(column_key(column)) {
                return Err(IngestError::Schema(format!(
                    "column '{}' appears more than once in the header",
                    column
                )));
            }
        }

        Ok(Self(columns))
    }

    /// `column1..columnN`
    pub fn synthesized(count: usize) -> Result<Self> {
        Self::new((1..=count).map(|i| format!("column{}", i)).collect())
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<String>> for Header {
    type Error = IngestError;

    fn try_from(columns: Vec<String>) -> Result<Self> {
        Self::new(columns)
    }
}

/// Column name as PostgreSQL resolves it: trimmed, and folded to lower case
/// when it is a plain identifier (`[A-Za-z_][A-Za-z0-9_$]*`)
pub fn column_key(name: &str) -> String {
    let name = name.trim();
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');

    if plain {
        name.to_ascii_lowercase()
    } else {
        name.to_string()
    }
}

/// Where the header comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", content = "columns", rename_all = "snake_case")]
pub enum HeaderPolicy {
    FirstLine,
    Explicit(Header),
    Synthesized,
}

impl HeaderPolicy {
    /// Map the two configuration flags onto a policy
    pub fn from_flags(
        has_header: bool,
        auto_generate_schema: bool,
        explicit: Option<Vec<String>>,
    ) -> Result<Self> {
        match (has_header, auto_generate_schema) {
            (true, true) => Ok(HeaderPolicy::FirstLine),
            (true, false) => {
                let columns = explicit.ok_or_else(|| {
                    IngestError::config(
                        "an explicit header is required when has_header is set and \
                         auto_generate_schema is not",
                    )
                })?;
                let header = Header::new(columns)
                    .map_err(|e| IngestError::config(format!("invalid explicit header: {}", e)))?;
                Ok(HeaderPolicy::Explicit(header))
            },
            (false, true) => Ok(HeaderPolicy::Synthesized),
            (false, false) => Err(IngestError::config(
                "has_header=false with auto_generate_schema=false leaves the header undefined",
            )),
        }
    }

    /// Produce the header, consuming at most one line of `lines`
    pub fn resolve<R: BufRead>(&self, lines: &mut LineStream<R>) -> Result<Header> {
        match self {
            HeaderPolicy::Explicit(header) => Ok(header.clone()),
            HeaderPolicy::FirstLine => {
                let line = first_line(lines)?;
                Header::new(line.split(DELIMITER).map(|s| s.trim().to_string()).collect())
            },
            HeaderPolicy::Synthesized => {
                let line = first_line(lines)?;
                Header::synthesized(line.split(DELIMITER).count())
            },
        }
    }
}

fn first_line<R: BufRead>(lines: &mut LineStream<R>) -> Result<String> {
    lines
        .next_line()
        .map_err(|e| IngestError::transport("Failed to read first line of remote file", e))?
        .ok_or_else(|| {
            IngestError::Schema("remote file is empty; cannot infer a header".to_string())
        })
}

/// Schema options for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Lines discarded after header resolution
    pub skip_lines: usize,
    pub policy: HeaderPolicy,
}

impl SchemaConfig {
    /// Fails fast on the undefined `(false, false)` combination
    pub fn new(
        skip_lines: usize,
        header: Option<Vec<String>>,
        has_header: bool,
        auto_generate_schema: bool,
    ) -> Result<Self> {
        Ok(Self {
            skip_lines,
            policy: HeaderPolicy::from_flags(has_header, auto_generate_schema, header)?,
        })
    }

    /// Resolve the header and position `lines` on the first data row
    pub fn resolve<R: BufRead>(&self, lines: &mut LineStream<R>) -> Result<Header> {
        let header = self.policy.resolve(lines)?;
        info!(columns = ?header.columns(), "Resolved header");

        let skipped = lines
            .skip_lines(self.skip_lines)
            .map_err(|e| IngestError::transport("Failed to skip leading lines", e))?;
        if skipped < self.skip_lines {
            debug!(
                requested = self.skip_lines,
                skipped, "Stream ended while skipping leading lines"
            );
        }

        Ok(header)
    }
}
