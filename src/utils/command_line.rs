//! Process command line with `--switch[=value]` parsing

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Command line shared on the main thread; the crash reporter appends to it
pub type SharedCommandLine = Rc<RefCell<CommandLine>>;

/// Parsed command line: program name, switches and positional arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    switches: BTreeMap<String, String>,
    args: Vec<String>,
}

impl CommandLine {
    /// Create an empty command line for `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Parse from an argv-style iterator (first item is the program)
    pub fn from_args<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut iter = argv.into_iter().map(Into::into);
        let mut cmd = Self::new(iter.next().unwrap_or_default());
        let mut only_args = false;

        for arg in iter {
            if only_args {
                cmd.args.push(arg);
                continue;
            }
            if arg == "--" {
                only_args = true;
                continue;
            }
            match arg.strip_prefix("--") {
                Some(switch) if !switch.is_empty() => match switch.split_once('=') {
                    Some((name, value)) => cmd.append_switch_with_value(name, value),
                    None => cmd.append_switch(switch),
                },
                _ => cmd.args.push(arg),
            }
        }

        cmd
    }

    /// Parse the current process arguments
    pub fn from_env() -> Self {
        Self::from_args(std::env::args())
    }

    pub fn into_shared(self) -> SharedCommandLine {
        Rc::new(RefCell::new(self))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn has_switch(&self, name: &str) -> bool {
        self.switches.contains_key(name)
    }

    /// Value of a switch; an empty string for a bare `--switch`
    pub fn switch_value(&self, name: &str) -> Option<&str> {
        self.switches.get(name).map(String::as_str)
    }

    pub fn append_switch(&mut self, name: &str) {
        self.append_switch_with_value(name, "");
    }

    pub fn append_switch_with_value(&mut self, name: &str, value: &str) {
        self.switches.insert(name.to_ascii_lowercase(), value.to_string());
    }

    /// Remove a switch; returns whether it was present
    pub fn remove_switch(&mut self, name: &str) -> bool {
        self.switches.remove(name).is_some()
    }

    /// Positional arguments
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Render back to argv form (switches sorted by name)
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![self.program.clone()];
        for (name, value) in &self.switches {
            if value.is_empty() {
                argv.push(format!("--{}", name));
            } else {
                argv.push(format!("--{}={}", name, value));
            }
        }
        argv.extend(self.args.iter().cloned());
        argv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_switches_and_args() {
        let cmd = CommandLine::from_args([
            "hearth",
            "--enable-profiling=0",
            "--exit-when-idle",
            "main.js",
        ]);
        assert_eq!(cmd.program(), "hearth");
        assert_eq!(cmd.switch_value("enable-profiling"), Some("0"));
        assert_eq!(cmd.switch_value("exit-when-idle"), Some(""));
        assert_eq!(cmd.args(), &["main.js".to_string()]);
    }

    #[test]
    fn test_double_dash_ends_switches() {
        let cmd = CommandLine::from_args(["hearth", "--", "--not-a-switch"]);
        assert!(!cmd.has_switch("not-a-switch"));
        assert_eq!(cmd.args(), &["--not-a-switch".to_string()]);
    }

    #[test]
    fn test_append_and_remove() {
        let mut cmd = CommandLine::new("hearth");
        cmd.append_switch("enable-crash-reporter");
        assert!(cmd.has_switch("enable-crash-reporter"));
        assert!(cmd.remove_switch("enable-crash-reporter"));
        assert!(!cmd.remove_switch("enable-crash-reporter"));
    }

    #[test]
    fn test_argv_round_trip() {
        let cmd = CommandLine::from_args(["hearth", "--user-data-dir=/tmp/x", "--quiet", "app"]);
        assert_eq!(
            cmd.argv(),
            vec!["hearth", "--quiet", "--user-data-dir=/tmp/x", "app"]
        );
    }
}
