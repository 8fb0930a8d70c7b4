//! Parsing of the machine-readable records the tool prints.
//!
//! Operations that report per-path outcomes emit one `;`-separated record
//! per line, introduced by a short tag:
//!
//! - `WK;<name>;<root>;<server>`: identity of the enclosing workspace
//! - `ST;<code>;<path>[;cl=<name>][;lock=<owner>@<workspace>]`: a file
//!   status; codes are `PV IG UC CO AD MV CP DE CH CF LK`
//! - `REV;<path>;<id>;<changeset>;<author>;<date>;<ref>;<description>`:
//!   one history entry; the description comes last and may itself contain
//!   separators
//! - `UP;...`: same fields as `REV`, a file brought to a new head by update
//! - `CI;<path>`: a path included in a completed checkin
//! - `RS;<path>`: a path whose merge conflict was resolved
//!
//! Unrecognized tags are skipped so newer tool versions stay readable; a
//! recognized tag with malformed fields is an error. The pending-changelists
//! query is the one exception to the line grammar: it prints a JSON array,
//! handled by [`parse_changelists`].

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use vcs::{ChangelistId, FileRevision, FileState, LockInfo, WorkspaceStatus};

/// Identity of the connected workspace, reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub name: String,
    pub root: PathBuf,
    pub server: String,
}

/// One file status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub path: String,
    pub status: WorkspaceStatus,
    pub changelist: Option<String>,
    pub lock: Option<LockInfo>,
}

impl StatusRecord {
    pub fn into_file_state(self) -> FileState {
        let changelist = match self.changelist {
            Some(name) => {
                // The tool only reports changelists that exist server-side.
                let mut id = ChangelistId::new(name);
                id.set_initialized();
                id
            }
            None => ChangelistId::default_changelist(),
        };
        FileState {
            path: self.path,
            status: self.status,
            changelist,
            lock: self.lock,
            history: Vec::new(),
        }
    }
}

/// One history line: the path it belongs to plus the revision itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRecord {
    pub path: String,
    pub revision: FileRevision,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Workspace(WorkspaceInfo),
    Status(StatusRecord),
    Revision(RevisionRecord),
    Updated(RevisionRecord),
    CheckedIn(String),
    Resolved(String),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed {tag} record ({reason}): {line:?}")]
    Malformed {
        tag: &'static str,
        reason: &'static str,
        line: String,
    },
    #[error("malformed changelist listing: {0}")]
    Changelists(#[from] serde_json::Error),
}

fn malformed(tag: &'static str, reason: &'static str, line: &str) -> ParseError {
    ParseError::Malformed {
        tag,
        reason,
        line: line.to_string(),
    }
}

/// Parse every record line, failing on the first malformed one.
pub fn parse_lines(lines: &[String]) -> Result<Vec<Record>, ParseError> {
    let mut records = Vec::new();
    for line in lines {
        if let Some(record) = parse_line(line)? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Parse what can be parsed, dropping malformed lines.
///
/// Used on the output of a failed invocation, where valid records emitted
/// before the failure may be interleaved with arbitrary diagnostics.
pub fn parse_lines_lossy(lines: &[String]) -> Vec<Record> {
    lines
        .iter()
        .filter_map(|line| match parse_line(line) {
            Ok(record) => record,
            Err(err) => {
                warn!(%err, "dropping malformed record");
                None
            }
        })
        .collect()
}

fn parse_line(line: &str) -> Result<Option<Record>, ParseError> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let (tag, rest) = line.split_once(';').unwrap_or((line, ""));
    match tag {
        "WK" => parse_workspace(rest, line).map(|info| Some(Record::Workspace(info))),
        "ST" => parse_status(rest, line).map(|status| Some(Record::Status(status))),
        "REV" => parse_revision("REV", rest, line).map(|rev| Some(Record::Revision(rev))),
        "UP" => parse_revision("UP", rest, line).map(|rev| Some(Record::Updated(rev))),
        "CI" => parse_path("CI", rest, line).map(|path| Some(Record::CheckedIn(path))),
        "RS" => parse_path("RS", rest, line).map(|path| Some(Record::Resolved(path))),
        other => {
            warn!(tag = other, "skipping unrecognized record tag");
            Ok(None)
        }
    }
}

fn parse_workspace(rest: &str, line: &str) -> Result<WorkspaceInfo, ParseError> {
    let fields: Vec<&str> = rest.splitn(3, ';').collect();
    match fields.as_slice() {
        [name, root, server] if !name.is_empty() && !root.is_empty() => Ok(WorkspaceInfo {
            name: name.to_string(),
            root: PathBuf::from(root),
            server: server.to_string(),
        }),
        _ => Err(malformed("WK", "expected name;root;server", line)),
    }
}

fn parse_status(rest: &str, line: &str) -> Result<StatusRecord, ParseError> {
    let mut fields = rest.split(';');
    let code = fields.next().unwrap_or("");
    let path = match fields.next() {
        Some(path) if !path.is_empty() => path,
        _ => return Err(malformed("ST", "missing path", line)),
    };
    let status =
        status_from_code(code).ok_or_else(|| malformed("ST", "unknown status code", line))?;

    let mut changelist = None;
    let mut lock = None;
    for field in fields {
        if let Some(name) = field.strip_prefix("cl=") {
            changelist = Some(name.to_string());
        } else if let Some(spec) = field.strip_prefix("lock=") {
            let (owner, workspace) = spec
                .split_once('@')
                .ok_or_else(|| malformed("ST", "lock must be owner@workspace", line))?;
            lock = Some(LockInfo {
                owner: owner.to_string(),
                workspace: workspace.to_string(),
            });
        } else {
            return Err(malformed("ST", "unexpected field", line));
        }
    }

    Ok(StatusRecord {
        path: path.to_string(),
        status,
        changelist,
        lock,
    })
}

fn parse_revision(
    tag: &'static str,
    rest: &str,
    line: &str,
) -> Result<RevisionRecord, ParseError> {
    let fields: Vec<&str> = rest.splitn(7, ';').collect();
    let [path, id, changeset, author, date, reference, description] = fields.as_slice() else {
        return Err(malformed(tag, "expected 7 fields", line));
    };
    let changeset: i64 = changeset
        .parse()
        .map_err(|_| malformed(tag, "invalid changeset number", line))?;
    let date = DateTime::parse_from_rfc3339(date)
        .map_err(|_| malformed(tag, "invalid RFC3339 date", line))?
        .with_timezone(&Utc);
    Ok(RevisionRecord {
        path: path.to_string(),
        revision: FileRevision {
            id: id.to_string(),
            changeset,
            author: author.to_string(),
            date,
            description: description.to_string(),
            reference: reference.to_string(),
        },
    })
}

fn parse_path(tag: &'static str, rest: &str, line: &str) -> Result<String, ParseError> {
    if rest.is_empty() {
        return Err(malformed(tag, "missing path", line));
    }
    Ok(rest.to_string())
}

pub(crate) fn status_from_code(code: &str) -> Option<WorkspaceStatus> {
    Some(match code {
        "PV" => WorkspaceStatus::Private,
        "IG" => WorkspaceStatus::Ignored,
        "UC" => WorkspaceStatus::Controlled,
        "CO" => WorkspaceStatus::CheckedOut,
        "AD" => WorkspaceStatus::Added,
        "MV" => WorkspaceStatus::Moved,
        "CP" => WorkspaceStatus::Copied,
        "DE" => WorkspaceStatus::Deleted,
        "CH" => WorkspaceStatus::Changed,
        "CF" => WorkspaceStatus::Conflicted,
        "LK" => WorkspaceStatus::LockedByOther,
        _ => return None,
    })
}

/// A changelist as reported by the pending-changelists query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChangelist {
    pub name: String,
    pub description: String,
    pub files: Vec<PendingFile>,
    pub shelved: Vec<PendingShelved>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub path: String,
    pub status: WorkspaceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingShelved {
    pub path: String,
    pub status: WorkspaceStatus,
    pub shelf: String,
}

#[derive(Debug, Deserialize)]
struct RawChangelist {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    files: Vec<RawFile>,
    #[serde(default)]
    shelved: Vec<RawShelved>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    path: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct RawShelved {
    path: String,
    status: String,
    shelf: String,
}

/// Parse the JSON array printed by the pending-changelists query.
pub fn parse_changelists(lines: &[String]) -> Result<Vec<PendingChangelist>, ParseError> {
    let text = lines.join("\n");
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let raw: Vec<RawChangelist> = serde_json::from_str(text)?;
    raw.into_iter().map(convert_changelist).collect()
}

fn convert_changelist(raw: RawChangelist) -> Result<PendingChangelist, ParseError> {
    let files = raw
        .files
        .into_iter()
        .map(|file| {
            Ok(PendingFile {
                status: convert_status(&file.status)?,
                path: file.path,
            })
        })
        .collect::<Result<_, ParseError>>()?;
    let shelved = raw
        .shelved
        .into_iter()
        .map(|file| {
            Ok(PendingShelved {
                status: convert_status(&file.status)?,
                path: file.path,
                shelf: file.shelf,
            })
        })
        .collect::<Result<_, ParseError>>()?;
    Ok(PendingChangelist {
        name: raw.name,
        description: raw.description,
        files,
        shelved,
    })
}

fn convert_status(code: &str) -> Result<WorkspaceStatus, ParseError> {
    status_from_code(code).ok_or_else(|| malformed("changelist", "unknown status code", code))
}
