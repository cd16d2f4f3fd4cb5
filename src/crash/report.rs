//! Crash report files.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::compiler::Fault;
use crate::core::AppId;
use crate::process::ProcessId;
use crate::registry::manifest::is_valid_app_id;
use crate::utils::date::DateTimeUtc;

/// Reports sharing one millisecond stamp before giving up.
const MAX_ATTEMPTS: u32 = 100;

/// One crash, as written to disk.
#[derive(Debug, Clone)]
pub struct CrashReport<'a> {
    pub app: &'a AppId,
    pub process: Option<ProcessId>,
    pub fault: &'a Fault,
    pub time: DateTimeUtc,
}

impl<'a> CrashReport<'a> {
    pub fn new(app: &'a AppId, process: Option<ProcessId>, fault: &'a Fault) -> Self {
        Self {
            app,
            process,
            fault,
            time: DateTimeUtc::now(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "app: {}", self.app);
        if let Some(pid) = self.process {
            let _ = writeln!(out, "process: {pid}");
        }
        let _ = writeln!(out, "time: {}", self.time.to_rfc3339());
        let _ = writeln!(out, "kind: {}", self.fault.kind);
        let _ = writeln!(out, "message: {}", self.fault.message);
        let _ = writeln!(out);
        let _ = writeln!(out, "stack:");
        if self.fault.frames.is_empty() {
            let _ = writeln!(out, "  <no app frames>");
        } else {
            let _ = writeln!(out, "{}", self.fault.stack_text());
        }
        out
    }

    /// Write under `<dir>/<appId>/crash-<stamp>.log`. Never overwrites.
    pub fn write(&self, dir: &Path) -> io::Result<PathBuf> {
        let app_dir = dir.join(app_dir_name(self.app));
        fs::create_dir_all(&app_dir)?;

        let stamp = self.time.to_file_stamp();
        let text = self.render();
        for attempt in 0..MAX_ATTEMPTS {
            let name = match attempt {
                0 => format!("crash-{stamp}.log"),
                n => format!("crash-{stamp}-{n}.log"),
            };
            let path = app_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(text.as_bytes())?;
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("too many crash reports stamped {stamp}"),
        ))
    }
}

/// `app` as one directory name directly under the crash dir.
fn app_dir_name(app: &AppId) -> String {
    let name: String = app
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') { c } else { '_' })
        .collect();
    if is_valid_app_id(&name) { name } else { format!("_{name}") }
}
