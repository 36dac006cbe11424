//! Local command type used to drive the `ssh` and `scp` clients

use async_process::Command as AsyncCommand;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};

/// A local command to be executed
///
/// Unlike `async_process::Command` this type is `Clone` and inspectable,
/// which lets the SSH backend assemble an invocation once and render it in
/// logs and errors before spawning it.
#[derive(Debug, Clone)]
pub struct Command {
    program: OsString,
    args: Vec<OsString>,
    env: BTreeMap<OsString, OsString>,
}

impl Command {
    /// Create a new command for the given program
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Add an argument to the command
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Set an environment variable for the local process
    pub fn env<K, V>(&mut self, key: K, val: V) -> &mut Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.env
            .insert(key.as_ref().to_owned(), val.as_ref().to_owned());
        self
    }

    /// Get the program name
    pub fn get_program(&self) -> &OsStr {
        &self.program
    }

    /// Get the arguments
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Render the command as a single shell-safe line, env assignments first
    pub fn to_shell_string(&self) -> String {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|(key, val)| {
                format!(
                    "{}={}",
                    key.to_string_lossy(),
                    shell_quote(&val.to_string_lossy())
                )
            })
            .collect();
        parts.push(shell_quote(&self.program.to_string_lossy()));
        parts.extend(
            self.args
                .iter()
                .map(|arg| shell_quote(&arg.to_string_lossy())),
        );
        parts.join(" ")
    }

    /// Convert into an `async_process::Command` ready to spawn
    ///
    /// The child is killed when its handle is dropped, so abandoning the
    /// future on timeout never leaves a stray `ssh` behind.
    pub fn prepare(&self) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(&self.args);
        for (key, val) in &self.env {
            cmd.env(key, val);
        }
        cmd.kill_on_drop(true);
        cmd
    }
}

/// Quote a string for safe inclusion in a POSIX shell command line
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.contains(|c: char| c.is_whitespace() || "\"'\\$`!*?<>|&;()[]{}~#".contains(c)) {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    } else {
        s.to_string()
    }
}

/// Quote a remote path, leaving a leading `~/` unquoted so it still expands
pub fn quote_remote_path(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some("") => "~/".to_string(),
        Some(rest) => format!("~/{}", shell_quote(rest)),
        None if path == "~" => path.to_string(),
        None => shell_quote(path),
    }
}
