//! Allow-list rule table and matching.
//!
//! Rules are checked in table order and the first rule that applies decides
//! the verdict. Literal rules match on whitespace-delimited tokens, so `jestx`
//! never matches `jest`. Custom rules carry their own checks (`sed` target
//! paths, directory arguments, the scaffolding relaxation).

use std::fmt;
use std::path::Path;

use crate::path::PathSandbox;
use crate::verdict::{DenyReason, DirectoryOp, ExecutionKind, Verdict};

/// How a rule's pattern is compared against a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The command's tokens start with the pattern's tokens.
    FullStringPrefix,
    /// The first two tokens of the command, joined by one space, equal the pattern.
    ExactTwoTokenPrefix,
    /// A rule with its own predicate.
    Custom(CustomRule),
}

/// Rules whose decision needs more than a literal comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomRule {
    /// `sed -i` with every target file inside the sandbox.
    SedInPlace,
    /// `cd`/`mkdir` with every path argument inside the sandbox.
    Directory(DirectoryCommand),
    /// Package scaffolding allowed without any path check.
    ScaffoldBypass,
}

/// The two commands the gateway treats as directory mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryCommand {
    ChangeDir,
    MakeDir,
}

impl DirectoryCommand {
    /// Map a base token to a directory command.
    pub fn from_base(base: &str) -> Option<Self> {
        match base {
            "cd" => Some(DirectoryCommand::ChangeDir),
            "mkdir" => Some(DirectoryCommand::MakeDir),
            _ => None,
        }
    }

    /// The command name.
    pub fn name(&self) -> &'static str {
        match self {
            DirectoryCommand::ChangeDir => "cd",
            DirectoryCommand::MakeDir => "mkdir",
        }
    }
}

/// One allow-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    /// Literal command prefix.
    pub pattern: &'static str,
    /// How the pattern is matched.
    pub kind: MatchKind,
    /// Known relaxation of the sandbox guarantee. Disabled along with the
    /// scaffold bypass.
    pub relaxation: bool,
}

impl Rule {
    const fn prefix(pattern: &'static str) -> Self {
        Self {
            pattern,
            kind: MatchKind::FullStringPrefix,
            relaxation: false,
        }
    }

    const fn two_token(pattern: &'static str) -> Self {
        Self {
            pattern,
            kind: MatchKind::ExactTwoTokenPrefix,
            relaxation: false,
        }
    }

    const fn custom(pattern: &'static str, rule: CustomRule) -> Self {
        Self {
            pattern,
            kind: MatchKind::Custom(rule),
            relaxation: false,
        }
    }

    const fn relaxed(mut self) -> Self {
        self.relaxation = true;
        self
    }

    fn matches_literal(&self, tokens: &[&str]) -> bool {
        match self.kind {
            MatchKind::FullStringPrefix | MatchKind::Custom(_) => {
                starts_with_tokens(tokens, self.pattern)
            }
            MatchKind::ExactTwoTokenPrefix => command_start(tokens) == self.pattern,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            MatchKind::FullStringPrefix => "prefix",
            MatchKind::ExactTwoTokenPrefix => "two-token",
            MatchKind::Custom(CustomRule::SedInPlace) => "custom: sed -i, targets in sandbox",
            MatchKind::Custom(CustomRule::Directory(_)) => "custom: paths in sandbox",
            MatchKind::Custom(CustomRule::ScaffoldBypass) => "custom: no path check",
        };
        write!(f, "{:<20} {}", self.pattern, kind)?;
        if self.relaxation {
            write!(f, " [relaxation]")?;
        }
        Ok(())
    }
}

/// The built-in allow-list, in precedence order.
pub const DEFAULT_RULES: &[Rule] = &[
    Rule::custom("sed", CustomRule::SedInPlace),
    Rule::custom("npm create", CustomRule::ScaffoldBypass).relaxed(),
    Rule::custom("yarn create", CustomRule::ScaffoldBypass).relaxed(),
    // Git
    Rule::two_token("git diff"),
    Rule::prefix("git diff --staged"),
    Rule::two_token("git apply"),
    Rule::prefix("git add -p"),
    Rule::two_token("git init"),
    Rule::two_token("git add"),
    Rule::two_token("git commit"),
    Rule::two_token("git status"),
    Rule::two_token("git log"),
    // Directories
    Rule::custom("mkdir", CustomRule::Directory(DirectoryCommand::MakeDir)),
    Rule::custom("cd", CustomRule::Directory(DirectoryCommand::ChangeDir)),
    // npm
    Rule::two_token("npm init"),
    Rule::prefix("npm init -y"),
    Rule::two_token("npm install"),
    Rule::two_token("npm run"),
    Rule::two_token("npm add"),
    Rule::two_token("npm remove"),
    Rule::two_token("npm create").relaxed(),
    // yarn
    Rule::two_token("yarn init"),
    Rule::prefix("yarn init -y"),
    Rule::two_token("yarn install"),
    Rule::two_token("yarn run"),
    Rule::two_token("yarn add"),
    Rule::two_token("yarn remove"),
    Rule::two_token("yarn create").relaxed(),
    // Test runners
    Rule::prefix("jest"),
    Rule::prefix("vitest"),
    Rule::prefix("cypress"),
    // Lint, format, compile
    Rule::prefix("eslint"),
    Rule::prefix("prettier"),
    Rule::prefix("tsc"),
];

/// Allow-list policy for command strings.
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    rules: Vec<Rule>,
    scaffold_bypass: bool,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.to_vec(),
            scaffold_bypass: true,
        }
    }
}

impl CommandPolicy {
    /// Create a policy with the built-in rule table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the `npm create` / `yarn create` relaxation.
    pub fn with_scaffold_bypass(mut self, enabled: bool) -> Self {
        self.scaffold_bypass = enabled;
        self
    }

    /// Whether the scaffolding relaxation is active.
    pub fn scaffold_bypass(&self) -> bool {
        self.scaffold_bypass
    }

    /// The active rules, in precedence order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules
            .iter()
            .filter(move |rule| self.scaffold_bypass || !rule.relaxation)
    }

    /// Decide whether `command` may run.
    ///
    /// Relative path arguments are resolved against `cwd`.
    pub fn decide(&self, command: &str, sandbox: &PathSandbox, cwd: &Path) -> Verdict {
        let tokens: Vec<&str> = command.split_whitespace().collect();
        if tokens.is_empty() {
            return Verdict::Denied(DenyReason::NotInAllowList);
        }

        for rule in self.rules() {
            let verdict = match rule.kind {
                MatchKind::Custom(CustomRule::SedInPlace) => {
                    if tokens[0] != rule.pattern {
                        continue;
                    }
                    check_sed(command, sandbox, cwd)
                }
                MatchKind::Custom(CustomRule::Directory(dir)) => {
                    if tokens[0] != dir.name() {
                        continue;
                    }
                    directory_verdict(dir, command, sandbox, cwd)
                }
                MatchKind::Custom(CustomRule::ScaffoldBypass) => {
                    if !rule.matches_literal(&tokens) {
                        continue;
                    }
                    tracing::warn!(
                        command,
                        rule = rule.pattern,
                        "allowing scaffolding command without path check"
                    );
                    Verdict::Allowed(ExecutionKind::Plain)
                }
                MatchKind::FullStringPrefix | MatchKind::ExactTwoTokenPrefix => {
                    if !rule.matches_literal(&tokens) {
                        continue;
                    }
                    Verdict::Allowed(ExecutionKind::Plain)
                }
            };
            tracing::debug!(command, rule = rule.pattern, %verdict, "rule matched");
            return verdict;
        }

        tracing::debug!(command, "no rule matched");
        Verdict::Denied(DenyReason::NotInAllowList)
    }
}

/// Check a `cd`/`mkdir` invocation.
///
/// The path arguments are the non-option tokens after the base command. `cd`
/// uses the first one, `mkdir` checks all of them.
pub fn directory_verdict(
    dir: DirectoryCommand,
    command: &str,
    sandbox: &PathSandbox,
    cwd: &Path,
) -> Verdict {
    let words = split_words(command);
    let mut paths = Vec::new();
    let mut mode = None;
    let mut args = words.iter().skip(1);
    while let Some(word) = args.next() {
        let w = word.as_str();
        if w == "--" {
            paths.extend(args.by_ref());
            break;
        }
        if dir == DirectoryCommand::MakeDir {
            if let Some(value) = mode_argument(w, &mut args) {
                match value.and_then(parse_mode) {
                    Some(bits) => mode = Some(bits),
                    None => {
                        return Verdict::Denied(DenyReason::InvalidArgument(
                            "mkdir mode must be octal digits".to_string(),
                        ));
                    }
                }
                continue;
            }
        }
        if w.starts_with('-') {
            continue;
        }
        paths.push(word);
    }

    if paths.is_empty() {
        return Verdict::Denied(DenyReason::MissingPathArgument);
    }
    if dir == DirectoryCommand::ChangeDir {
        paths.truncate(1);
    }

    let mut resolved = Vec::with_capacity(paths.len());
    for path in paths {
        match sandbox.check(path, cwd) {
            Ok(p) => resolved.push(p),
            Err(reason) => return Verdict::Denied(reason),
        }
    }

    let op = match dir {
        DirectoryCommand::ChangeDir => DirectoryOp::ChangeDir(resolved.remove(0)),
        DirectoryCommand::MakeDir => DirectoryOp::MakeDir {
            paths: resolved,
            mode,
        },
    };
    Verdict::Allowed(ExecutionKind::DirectoryMutation(op))
}

/// The value of a `mkdir` mode option, if `word` is one.
///
/// Handles `--mode V`, `--mode=V`, `-m V`, `-mV` and clusters like `-pm V`.
/// The inner `None` means the value is missing.
fn mode_argument<'a>(
    word: &'a str,
    rest: &mut impl Iterator<Item = &'a String>,
) -> Option<Option<&'a str>> {
    if word == "--mode" {
        return Some(rest.next().map(String::as_str));
    }
    if let Some(value) = word.strip_prefix("--mode=") {
        return Some(Some(value));
    }
    let cluster = word.strip_prefix('-').filter(|c| !c.starts_with('-'))?;
    let at = cluster.find('m')?;
    let inline = &cluster[at + 1..];
    if inline.is_empty() {
        Some(rest.next().map(String::as_str))
    } else {
        Some(Some(inline))
    }
}

fn parse_mode(value: &str) -> Option<u32> {
    if value.is_empty() || value.len() > 4 || !value.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
        return None;
    }
    u32::from_str_radix(value, 8).ok()
}

/// Check a `sed` invocation: in-place only, every target file in the sandbox.
fn check_sed(command: &str, sandbox: &PathSandbox, cwd: &Path) -> Verdict {
    let words = match shell_words::split(command) {
        Ok(words) => words,
        Err(_) => return malformed_sed("unbalanced quotes"),
    };
    if let Some(detail) = active_shell_syntax(command) {
        return malformed_sed(detail);
    }

    match words.get(1) {
        Some(flag) if flag.starts_with("-i") => {}
        _ => return malformed_sed("only in-place edits (sed -i) are allowed"),
    }

    let mut script_given = false;
    let mut positional: Vec<&str> = Vec::new();
    let mut args = words.iter().skip(2);
    while let Some(word) = args.next() {
        match word.as_str() {
            "-e" | "--expression" | "-f" | "--file" => {
                args.next();
                script_given = true;
            }
            "--" => {
                positional.extend(args.by_ref().map(String::as_str));
            }
            w if w.starts_with("--expression=") || w.starts_with("--file=") => {
                script_given = true;
            }
            w if (w.starts_with("-e") || w.starts_with("-f")) && w.len() > 2 => {
                script_given = true;
            }
            w if w.starts_with('-') && w.len() > 1 => {}
            w => positional.push(w),
        }
    }

    if !script_given {
        if positional.is_empty() {
            return malformed_sed("missing script");
        }
        positional.remove(0);
    }
    if positional.is_empty() {
        return malformed_sed("missing target file");
    }

    for target in positional {
        if let Some(detail) = shell_expansion(target) {
            return malformed_sed(&format!("{} in target '{}'", detail, target));
        }
        if let Err(reason) = sandbox.check(target, cwd) {
            return Verdict::Denied(reason);
        }
    }
    Verdict::Allowed(ExecutionKind::Plain)
}

/// Find shell syntax outside single quotes that would run or substitute
/// something before `sed` sees its arguments.
fn active_shell_syntax(command: &str) -> Option<&'static str> {
    let mut chars = command.chars().peekable();
    let mut single = false;
    let mut double = false;
    while let Some(c) = chars.next() {
        if single {
            single = c != '\'';
            continue;
        }
        match c {
            '\\' => {
                chars.next();
            }
            '\'' if !double => single = true,
            '"' => double = !double,
            '`' => return Some("command substitution"),
            '$' => match chars.peek() {
                Some('(') => return Some("command substitution"),
                Some(&next)
                    if next.is_ascii_alphanumeric()
                        || matches!(next, '_' | '{' | '@' | '*' | '#' | '?' | '$' | '!' | '-') =>
                {
                    return Some("variable expansion");
                }
                _ => {}
            },
            ';' | '|' | '&' | '<' | '>' | '\n' if !double => return Some("shell operator"),
            _ => {}
        }
    }
    None
}

/// Characters the shell expands or treats as syntax inside an unquoted word.
const SHELL_SPECIAL: &[char] = &[
    '$', '`', '*', '?', '[', ']', '{', '}', ';', '|', '&', '<', '>', '(', ')', '\\', '\n',
];

/// Why the shell would not pass `word` through literally, if it would not.
///
/// The command line runs through `$SHELL -c`, so a target is only checked
/// as written when the shell leaves it alone.
fn shell_expansion(word: &str) -> Option<&'static str> {
    if word.starts_with('~') {
        return Some("home directory expansion");
    }
    if word.contains(SHELL_SPECIAL) {
        return Some("shell expansion");
    }
    None
}

fn malformed_sed(detail: &str) -> Verdict {
    Verdict::Denied(DenyReason::MalformedSed(detail.to_string()))
}

/// Quote-aware split, falling back to whitespace on unbalanced quotes.
fn split_words(command: &str) -> Vec<String> {
    shell_words::split(command)
        .unwrap_or_else(|_| command.split_whitespace().map(str::to_string).collect())
}

fn starts_with_tokens(tokens: &[&str], pattern: &str) -> bool {
    let mut count = 0;
    for (i, part) in pattern.split_whitespace().enumerate() {
        if tokens.get(i) != Some(&part) {
            return false;
        }
        count += 1;
    }
    count > 0
}

fn command_start(tokens: &[&str]) -> String {
    tokens.iter().take(2).copied().collect::<Vec<_>>().join(" ")
}
