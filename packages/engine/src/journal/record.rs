//! Journal header and record lines
//!
//! ```text
//! respcache.journal
//! 1
//! <app version>
//! <stream count>
//!
//! DIRTY 3f2a… 12
//! CLEAN 3f2a… 12 4096 311
//! READ 3f2a…
//! REMOVE 3f2a…
//! ```

use std::fmt;
use std::io::{self, Write};

pub const MAGIC: &str = "respcache.journal";
pub const JOURNAL_VERSION: &str = "1";

const DIRTY: &str = "DIRTY";
const CLEAN: &str = "CLEAN";
const REMOVE: &str = "REMOVE";
const READ: &str = "READ";

/// Journal file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub app_version: u32,
    pub stream_count: usize,
}

impl Header {
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(
            out,
            "{MAGIC}\n{JOURNAL_VERSION}\n{}\n{}\n\n",
            self.app_version, self.stream_count
        )
    }

    /// Checks the five header lines, explaining the first mismatch.
    pub fn check(&self, lines: &[&str]) -> Result<(), String> {
        let [magic, version, app_version, stream_count, blank] = lines else {
            return Err(format!("expected 5 header lines, found {}", lines.len()));
        };
        if *magic != MAGIC {
            return Err(format!("unexpected magic {magic:?}"));
        }
        if *version != JOURNAL_VERSION {
            return Err(format!("unsupported journal version {version:?}"));
        }
        if *app_version != self.app_version.to_string() {
            return Err(format!(
                "app version {app_version:?} does not match {}",
                self.app_version
            ));
        }
        if *stream_count != self.stream_count.to_string() {
            return Err(format!(
                "stream count {stream_count:?} does not match {}",
                self.stream_count
            ));
        }
        if !blank.is_empty() {
            return Err(format!("expected blank line after header, found {blank:?}"));
        }
        Ok(())
    }
}

/// One journal line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// An editor started writing `generation`.
    Dirty { key: String, generation: u64 },
    /// `generation` was committed with the given stream lengths.
    Clean {
        key: String,
        generation: u64,
        lengths: Vec<u64>,
    },
    Remove { key: String },
    Read { key: String },
}

impl Record {
    pub fn key(&self) -> &str {
        match self {
            Record::Dirty { key, .. }
            | Record::Clean { key, .. }
            | Record::Remove { key }
            | Record::Read { key } => key,
        }
    }

    pub fn parse(line: &str, stream_count: usize) -> Result<Record, String> {
        let mut fields = line.split(' ');
        let op = fields.next().unwrap_or_default();
        let key = fields
            .next()
            .filter(|key| crate::store::layout::validate_key(key).is_ok())
            .ok_or_else(|| format!("missing or invalid key in {line:?}"))?
            .to_string();

        let record = match op {
            DIRTY => Record::Dirty {
                key,
                generation: parse_number(fields.next(), line)?,
            },
            CLEAN => {
                let generation = parse_number(fields.next(), line)?;
                let lengths = fields
                    .by_ref()
                    .take(stream_count)
                    .map(|field| parse_number(Some(field), line))
                    .collect::<Result<Vec<u64>, String>>()?;
                if lengths.len() != stream_count {
                    return Err(format!("expected {stream_count} lengths in {line:?}"));
                }
                if lengths
                    .iter()
                    .try_fold(0u64, |total, &length| total.checked_add(length))
                    .is_none()
                {
                    return Err(format!("entry size overflows in {line:?}"));
                }
                Record::Clean {
                    key,
                    generation,
                    lengths,
                }
            }
            REMOVE => Record::Remove { key },
            READ => Record::Read { key },
            _ => return Err(format!("unknown record {op:?}")),
        };

        if fields.next().is_some() {
            return Err(format!("trailing fields in {line:?}"));
        }
        Ok(record)
    }
}

fn parse_number(field: Option<&str>, line: &str) -> Result<u64, String> {
    field
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| format!("bad number in {line:?}"))
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Dirty { key, generation } => write!(f, "{DIRTY} {key} {generation}"),
            Record::Clean {
                key,
                generation,
                lengths,
            } => {
                write!(f, "{CLEAN} {key} {generation}")?;
                for length in lengths {
                    write!(f, " {length}")?;
                }
                Ok(())
            }
            Record::Remove { key } => write!(f, "{REMOVE} {key}"),
            Record::Read { key } => write!(f, "{READ} {key}"),
        }
    }
}
