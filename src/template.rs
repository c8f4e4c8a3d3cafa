// src/template.rs

//! Command template rendering.
//!
//! Action command lines are written with placeholder tokens that are filled
//! in from the current request just before execution:
//!
//! - `#USER#`      → user name
//! - `#ACCOUNT#`   → account
//! - `#BASEPATH#`  → root of the user's file area
//! - `#FILE#`      → file path relative to `#BASEPATH#`
//! - `#COMMAND#`   → protocol command issued for the file
//! - `#SPECIALID#` → session-local transfer id
//! - `#UUID#`      → a fresh globally unique id (see [`render`] for the
//!   position rule)
//!
//! So `#BASEPATH##FILE#` is the full path of the file, and a transfer DSL such
//! as `-to hostB -file #BASEPATH##FILE# -rule R -info ##UUID## #USER#` is the
//! usual way to tag a follow-up transfer.

use tracing::debug;
use uuid::Uuid;

use crate::types::ExecutionRequest;

pub const USER: &str = "#USER#";
pub const ACCOUNT: &str = "#ACCOUNT#";
pub const BASEPATH: &str = "#BASEPATH#";
pub const FILE: &str = "#FILE#";
pub const COMMAND: &str = "#COMMAND#";
pub const SPECIALID: &str = "#SPECIALID#";
pub const UUID: &str = "#UUID#";

/// Values substituted into a command template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateValues<'a> {
    pub user: &'a str,
    pub account: &'a str,
    pub base_path: &'a str,
    pub file: &'a str,
    pub command_label: &'a str,
    pub transfer_id: u64,
}

impl<'a> From<&'a ExecutionRequest> for TemplateValues<'a> {
    fn from(req: &'a ExecutionRequest) -> Self {
        Self {
            user: &req.user,
            account: &req.account,
            base_path: &req.base_path,
            file: &req.relative_file,
            command_label: &req.command_label,
            transfer_id: req.transfer_id,
        }
    }
}

/// Render `template` with `values`.
///
/// The six fixed tokens are always replaced, in the order listed in the
/// module docs. `#UUID#` is only expanded when its first occurrence sits at
/// an offset strictly greater than zero: a template that *starts* with
/// `#UUID#` keeps the token verbatim. All occurrences share one generated id.
pub fn render(template: &str, values: &TemplateValues<'_>) -> String {
    debug!(
        template,
        user = values.user,
        account = values.account,
        base = values.base_path,
        file = values.file,
        command = values.command_label,
        "rendering command template"
    );

    let mut out = template.to_string();
    replace_all(&mut out, USER, values.user);
    replace_all(&mut out, ACCOUNT, values.account);
    replace_all(&mut out, BASEPATH, values.base_path);
    replace_all(&mut out, FILE, values.file);
    replace_all(&mut out, COMMAND, values.command_label);
    replace_all(&mut out, SPECIALID, &values.transfer_id.to_string());

    if matches!(out.find(UUID), Some(pos) if pos > 0) {
        replace_all(&mut out, UUID, &Uuid::new_v4().to_string());
    }

    debug!(rendered = %out, "rendered command template");
    out
}

/// Replace every occurrence of `token`, one at a time.
///
/// Scanning resumes after the inserted value, so a value that contains the
/// token itself is not expanded again.
fn replace_all(buf: &mut String, token: &str, value: &str) {
    let mut from = 0;
    while let Some(pos) = buf[from..].find(token) {
        let start = from + pos;
        buf.replace_range(start..start + token.len(), value);
        from = start + value.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> TemplateValues<'static> {
        TemplateValues {
            user: "alice",
            account: "acct",
            base_path: "/srv/ftp/alice",
            file: "/in/report.csv",
            command_label: "STOR",
            transfer_id: 42,
        }
    }

    #[test]
    fn replaces_every_fixed_token() {
        let out = render(
            "#USER# #ACCOUNT# #BASEPATH##FILE# #COMMAND# #SPECIALID#",
            &values(),
        );
        assert_eq!(out, "alice acct /srv/ftp/alice/in/report.csv STOR 42");
    }

    #[test]
    fn replaces_repeated_tokens() {
        let out = render("#USER#-#USER#-#USER#", &values());
        assert_eq!(out, "alice-alice-alice");
    }

    #[test]
    fn uuid_expanded_when_not_leading() {
        let out = render("-info ##UUID## #UUID#", &values());
        assert!(!out.contains(UUID));
        // Both occurrences get the same id.
        let parts: Vec<&str> = out.split_whitespace().collect();
        assert_eq!(parts[1], format!("#{}#", parts[2]));
        assert!(Uuid::parse_str(parts[2]).is_ok());
    }

    #[test]
    fn leading_uuid_is_left_verbatim() {
        let out = render("#UUID# #USER#", &values());
        assert_eq!(out, "#UUID# alice");
    }

    #[test]
    fn value_containing_its_own_token_terminates() {
        let mut v = values();
        v.user = "#USER#x";
        assert_eq!(render("#USER#", &v), "#USER#x");
    }

    #[test]
    fn template_without_tokens_is_unchanged() {
        assert_eq!(render("/bin/true", &values()), "/bin/true");
    }
}
