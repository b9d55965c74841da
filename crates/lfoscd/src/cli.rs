//! Command-line handling for the `lfoscd` binary.
//!
//! Configuration flags come first and are handed to `ortho_config`. The first
//! argument that is not a configuration flag starts the optional one-shot
//! command, written `<protocol>.<command> [args...]`.

use std::ffi::{OsStr, OsString};
use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

/// CLI flags recognised by the configuration loader.
///
/// Kept in step with the fields of `lfosc_config::Config`.
pub(crate) const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--bind-address",
    "--console-port",
    "--bus-port",
    "--http-port",
    "--modes",
    "--midi-input",
    "--midi-bindings",
    "--console-timeout-ms",
    "--log-filter",
    "--log-format",
];

pub(crate) const USAGE: &str =
    "usage: lfoscd [configuration flags] [<protocol>.<command> [arguments...]]";

/// Failures raised while interpreting the command line.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded.
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(#[source] Arc<OrthoError>),
    /// A flag appeared that the loader does not know.
    #[error("unknown flag '{flag}'")]
    UnknownFlag {
        /// Flag as supplied.
        flag: String,
    },
    /// The command token is not `<protocol>.<command>`.
    #[error("invalid command '{token}', expected <protocol>.<command>")]
    InvalidCommand {
        /// Token as supplied.
        token: String,
    },
    /// An argument was not valid UTF-8.
    #[error("argument '{argument}' is not valid UTF-8")]
    NonUtf8Argument {
        /// Lossy rendering of the argument.
        argument: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Skip,
}

fn classify_flag(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Skip;
    }
    let (flag, inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (text.as_ref(), false),
    };
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !inline_value,
        }
    } else {
        FlagAction::Skip
    }
}

/// Arguments split between the configuration loader and the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) command_start: usize,
}

/// Collects the program name and leading configuration flags.
pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let Some(program) = args.first() else {
        return ConfigArgumentSplit {
            config_arguments: Vec::new(),
            command_start: 0,
        };
    };

    let mut config_arguments = vec![program.clone()];
    let mut index = 1;
    while let Some(argument) = args.get(index) {
        match classify_flag(argument) {
            FlagAction::Include { needs_value } => {
                config_arguments.push(argument.clone());
                index += 1;
                if needs_value {
                    if let Some(value) = args.get(index) {
                        config_arguments.push(value.clone());
                        index += 1;
                    }
                }
            }
            FlagAction::Skip => break,
        }
    }

    ConfigArgumentSplit {
        config_arguments,
        command_start: index,
    }
}

/// A one-shot administrative command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocalCommand {
    pub(crate) protocol: String,
    pub(crate) name: String,
    pub(crate) args: Vec<String>,
}

/// Parses the tokens following the configuration flags.
///
/// Returns `None` when no command was given.
pub(crate) fn parse_local_command(tokens: &[OsString]) -> Result<Option<LocalCommand>, CliError> {
    let mut tokens = tokens.iter().map(|token| utf8(token));
    let Some(head) = tokens.next().transpose()? else {
        return Ok(None);
    };
    if head.starts_with("--") {
        return Err(CliError::UnknownFlag { flag: head });
    }
    let (protocol, name) = head
        .split_once('.')
        .filter(|(protocol, name)| !protocol.is_empty() && !name.is_empty())
        .ok_or_else(|| CliError::InvalidCommand {
            token: head.clone(),
        })?;
    Ok(Some(LocalCommand {
        protocol: protocol.to_owned(),
        name: name.to_owned(),
        args: tokens.collect::<Result<_, _>>()?,
    }))
}

fn utf8(token: &OsStr) -> Result<String, CliError> {
    token
        .to_str()
        .map(str::to_owned)
        .ok_or_else(|| CliError::NonUtf8Argument {
            argument: token.to_string_lossy().into_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[rstest]
    #[case("--log-filter=debug", FlagAction::Include { needs_value: false })]
    #[case("--log-filter", FlagAction::Include { needs_value: true })]
    #[case("--modes", FlagAction::Include { needs_value: true })]
    #[case("midi.list", FlagAction::Skip)]
    #[case("--unknown", FlagAction::Skip)]
    fn flags_are_classified(#[case] argument: &str, #[case] expected: FlagAction) {
        assert_eq!(classify_flag(OsStr::new(argument)), expected);
    }

    #[test]
    fn configuration_flags_precede_the_command() {
        let args = os(&[
            "lfoscd",
            "--console-port",
            "4100",
            "--modes=osc",
            "midi.learn",
            "--bus-port",
            "9",
        ]);
        let split = split_config_arguments(&args);
        assert_eq!(
            split.config_arguments,
            os(&["lfoscd", "--console-port", "4100", "--modes=osc"])
        );
        assert_eq!(split.command_start, 4);

        let command = parse_local_command(&args[split.command_start..])
            .expect("valid command")
            .expect("command present");
        assert_eq!(command.protocol, "midi");
        assert_eq!(command.name, "learn");
        assert_eq!(command.args, vec!["--bus-port", "9"]);
    }

    #[test]
    fn no_command_runs_the_daemon() {
        let args = os(&["lfoscd", "--modes", "lf"]);
        let split = split_config_arguments(&args);
        assert_eq!(split.command_start, args.len());
        assert_eq!(parse_local_command(&args[split.command_start..]).ok(), Some(None));
    }

    #[test]
    fn empty_arguments_split_cleanly() {
        let split = split_config_arguments(&[]);
        assert!(split.config_arguments.is_empty());
        assert_eq!(split.command_start, 0);
    }

    #[rstest]
    #[case("midi")]
    #[case(".list")]
    #[case("midi.")]
    fn malformed_commands_are_rejected(#[case] token: &str) {
        let error = parse_local_command(&os(&[token])).expect_err("invalid command");
        assert!(matches!(error, CliError::InvalidCommand { .. }));
    }

    #[test]
    fn stray_flags_are_reported() {
        let error = parse_local_command(&os(&["--verbose"])).expect_err("unknown flag");
        assert_eq!(error.to_string(), "unknown flag '--verbose'");
    }
}
